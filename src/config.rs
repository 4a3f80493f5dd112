use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::archive::DEFAULT_MAX_ENTRY_BYTES;
use crate::filter::DEFAULT_SEARCH_FIELD;
use crate::locate::default_include_globs;
use crate::project::DEFAULT_FIELDS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Where uploaded archives are extracted.
///
/// When `root` is unset the CLI creates a temporary directory that lives as
/// long as the process.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub index_file: Option<PathBuf>,
    #[serde(default = "default_restrict_to_storage")]
    pub restrict_to_storage: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            index_file: None,
            restrict_to_storage: default_restrict_to_storage(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}
fn default_restrict_to_storage() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

fn default_max_entry_bytes() -> u64 {
    DEFAULT_MAX_ENTRY_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_field")]
    pub search_field: String,
    #[serde(default = "default_fields")]
    pub default_fields: Vec<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_element")]
    pub element: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_field: default_search_field(),
            default_fields: default_fields(),
            include_globs: default_include_globs(),
            element: default_element(),
        }
    }
}

fn default_search_field() -> String {
    DEFAULT_SEARCH_FIELD.to_string()
}
fn default_fields() -> Vec<String> {
    DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
}
fn default_element() -> String {
    crate::document::RELATIONSHIP_TAG.to_string()
}

impl Config {
    /// Built-in defaults, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise falls back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.server.max_upload_bytes == 0 {
        anyhow::bail!("server.max_upload_bytes must be > 0");
    }

    if config.extract.max_entry_bytes == 0 {
        anyhow::bail!("extract.max_entry_bytes must be > 0");
    }

    if config.search.search_field.trim().is_empty() {
        anyhow::bail!("search.search_field must not be empty");
    }

    if config.search.element.trim().is_empty() {
        anyhow::bail!("search.element must not be empty");
    }

    if config.search.include_globs.is_empty() {
        anyhow::bail!("search.include_globs must contain at least one pattern");
    }

    Ok(())
}
