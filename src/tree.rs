//! Directory structure reporting for extracted archives.

use serde::Serialize;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::project::relative_display;

/// One visited directory: its path relative to the root and its immediate
/// children, split into folders and files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub path: String,
    pub folders: Vec<String>,
    pub files: Vec<String>,
}

/// Walks `root` depth-first with names sorted, reporting every directory
/// including the root itself as `"."`.
///
/// Directories that vanish or cannot be read mid-walk are left out; a missing
/// root produces an empty report.
pub fn report(root: &Path) -> Vec<DirectoryEntry> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| {
            let path = match relative_display(entry.path(), root) {
                p if p.is_empty() => ".".to_string(),
                p => p,
            };
            list_children(entry.path())
                .ok()
                .map(|(folders, files)| DirectoryEntry {
                    path,
                    folders,
                    files,
                })
        })
        .collect()
}

fn list_children(dir: &Path) -> io::Result<(Vec<String>, Vec<String>)> {
    let mut folders = Vec::new();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() {
            folders.push(name);
        } else {
            files.push(name);
        }
    }
    folders.sort();
    files.sort();
    Ok((folders, files))
}
