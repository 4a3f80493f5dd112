//! Safe ZIP extraction.
//!
//! Every entry is resolved against the destination before anything is
//! written; an entry that would land outside it (`../`, absolute paths, drive
//! prefixes) rejects the whole archive. Entries are size-bounded to guard
//! against decompression bombs. If a write fails part-way, everything this
//! call created is removed again.

use serde::Serialize;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::tree::{self, DirectoryEntry};

/// Maximum decompressed bytes accepted for a single entry.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 200 * 1024 * 1024;

/// A completed extraction: where the files went and what they look like.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub extract_path: PathBuf,
    pub structure: Vec<DirectoryEntry>,
    #[serde(skip)]
    pub files_extracted: usize,
}

/// Extracts ZIP archives into a destination directory.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    max_entry_bytes: u64,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRY_BYTES)
    }
}

/// One archive member scheduled for writing.
struct PlannedEntry {
    index: usize,
    target: PathBuf,
    is_dir: bool,
}

/// Paths created by an in-progress extraction, for rollback.
#[derive(Default)]
struct Created {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl Created {
    fn rollback(self) {
        for file in self.files.iter().rev() {
            let _ = fs::remove_file(file);
        }
        for dir in self.dirs.iter().rev() {
            let _ = fs::remove_dir(dir);
        }
    }
}

impl ArchiveExtractor {
    pub fn new(max_entry_bytes: u64) -> Self {
        Self { max_entry_bytes }
    }

    /// Extracts `archive` into `destination` and reports the resulting tree.
    pub fn extract(&self, archive: &[u8], destination: &Path) -> Result<ExtractionResult, EngineError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive))
            .map_err(|e| EngineError::InvalidArchive(e.to_string()))?;

        let root = normalize(destination);
        let plan = plan_entries(&mut zip, &root)?;

        let mut created = Created::default();
        match self.write_entries(&mut zip, &root, &plan, &mut created) {
            Ok(files_extracted) => {
                info!(
                    destination = %root.display(),
                    files = files_extracted,
                    "extracted archive"
                );
                Ok(ExtractionResult {
                    structure: tree::report(&root),
                    extract_path: root,
                    files_extracted,
                })
            }
            Err(err) => {
                warn!(destination = %root.display(), error = %err, "extraction failed, rolling back");
                created.rollback();
                Err(err)
            }
        }
    }

    fn write_entries(
        &self,
        zip: &mut zip::ZipArchive<Cursor<&[u8]>>,
        root: &Path,
        plan: &[PlannedEntry],
        created: &mut Created,
    ) -> Result<usize, EngineError> {
        create_dirs(root, created)?;

        let mut files = 0;
        for entry in plan {
            if entry.is_dir {
                create_dirs(&entry.target, created)?;
                continue;
            }
            if let Some(parent) = entry.target.parent() {
                create_dirs(parent, created)?;
            }

            let member = zip
                .by_index(entry.index)
                .map_err(|e| EngineError::InvalidArchive(e.to_string()))?;
            let name = member.name().to_string();

            let mut out = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&entry.target)
                .map_err(|e| match e.kind() {
                    io::ErrorKind::AlreadyExists => EngineError::InvalidArchive(format!(
                        "{} already exists in destination",
                        name
                    )),
                    _ => EngineError::Io(e),
                })?;
            created.files.push(entry.target.clone());

            let written = io::copy(&mut member.take(self.max_entry_bytes + 1), &mut out)
                .map_err(|e| EngineError::InvalidArchive(format!("{}: {}", name, e)))?;
            if written > self.max_entry_bytes {
                return Err(EngineError::InvalidArchive(format!(
                    "entry {} exceeds size limit ({} bytes)",
                    name, self.max_entry_bytes
                )));
            }
            out.flush()?;
            debug!(entry = %name, bytes = written, "wrote archive entry");
            files += 1;
        }
        Ok(files)
    }
}

/// Extracts with the default entry size limit.
pub fn extract_archive(archive: &[u8], destination: &Path) -> Result<ExtractionResult, EngineError> {
    ArchiveExtractor::default().extract(archive, destination)
}

/// Resolves every member against `root`, rejecting the archive on the first
/// entry that escapes it.
fn plan_entries(
    zip: &mut zip::ZipArchive<Cursor<&[u8]>>,
    root: &Path,
) -> Result<Vec<PlannedEntry>, EngineError> {
    let mut plan = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let member = zip
            .by_index_raw(index)
            .map_err(|e| EngineError::InvalidArchive(e.to_string()))?;
        let name = member.name().to_string();
        let target = resolve_member(root, &name).ok_or_else(|| {
            warn!(entry = %name, "rejecting archive with unsafe entry");
            EngineError::UnsafeArchive {
                entry: name.clone(),
            }
        })?;
        if target == root {
            continue;
        }
        plan.push(PlannedEntry {
            index,
            target,
            is_dir: member.is_dir(),
        });
    }
    Ok(plan)
}

/// Where `name` lands under `root`, or `None` if it escapes.
///
/// Both separators are accepted since some archivers write `\`.
pub fn resolve_member(root: &Path, name: &str) -> Option<PathBuf> {
    let name = name.replace('\\', "/");
    let resolved = normalize(&root.join(name));
    resolved.starts_with(root).then_some(resolved)
}

/// Whether `path` lies inside `root` once `.` and `..` are resolved.
pub fn is_within(root: &Path, path: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

/// Lexically resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// `create_dir_all`, remembering each directory that did not exist before.
fn create_dirs(dir: &Path, created: &mut Created) -> io::Result<()> {
    let missing: Vec<&Path> = dir
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .collect();
    for path in missing.into_iter().rev() {
        fs::create_dir(path)?;
        created.dirs.push(path.to_path_buf());
    }
    Ok(())
}
