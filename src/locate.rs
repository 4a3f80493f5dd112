//! Document discovery under a search root.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Patterns used when no `search.include_globs` are configured.
pub fn default_include_globs() -> Vec<String> {
    vec!["**/*.xml".to_string()]
}

/// Recursively finds candidate documents below a search root.
///
/// Patterns are matched case-insensitively against the path relative to the
/// root, so `**/*.xml` also accepts `CUSTOMIZATIONS.XML`.
#[derive(Debug, Clone)]
pub struct DocumentLocator {
    include: GlobSet,
}

impl DocumentLocator {
    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(patterns)?,
        })
    }

    /// Lazily yields matching files, sorted by name within each directory.
    ///
    /// A missing root, or one that cannot be read, yields nothing.
    pub fn locate<'a>(&'a self, search_root: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
        WalkDir::new(search_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(move |entry| {
                let relative = entry.path().strip_prefix(search_root).unwrap_or(entry.path());
                self.include.is_match(relative)
            })
            .map(walkdir::DirEntry::into_path)
    }
}

impl Default for DocumentLocator {
    fn default() -> Self {
        let include = build_globset(&default_include_globs())
            .unwrap_or_else(|_| GlobSet::empty());
        Self { include }
    }
}

/// Locates `.xml` files (any case) under `search_root`.
pub fn locate(search_root: &Path) -> Vec<PathBuf> {
    DocumentLocator::default().locate(search_root).collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
