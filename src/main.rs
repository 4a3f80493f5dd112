//! # relsearch CLI
//!
//! ## Usage
//!
//! ```bash
//! relsearch --config ./config/relsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relsearch serve` | Start the HTTP server |
//! | `relsearch extract <archive>` | Extract a ZIP and print its structure |
//! | `relsearch tree <dir>` | Print the structure of a directory |
//! | `relsearch search ...` | Query relationships in an extracted tree |
//!
//! ## Examples
//!
//! ```bash
//! # Extract a solution export
//! relsearch extract MySolution.zip --dest ./out
//!
//! # Lookups starting with mmpl_ that are not *Id columns
//! relsearch search --extract-path ./out --folder . \
//!     --starting mmpl_ --not-ending Id --attribute CascadeDelete
//!
//! # Start the server with uploads kept in a temp dir
//! relsearch serve
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use relsearch::archive::ArchiveExtractor;
use relsearch::config::{self, Config};
use relsearch::search::{self, QueryDescriptor};
use relsearch::{server, tree};

/// relsearch — extract XML archives and query their entity relationships.
#[derive(Parser)]
#[command(
    name = "relsearch",
    about = "relsearch — extract XML archives and query their entity relationships",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Built-in defaults are used when the file does not exist.
    #[arg(long, global = true, default_value = "./config/relsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. Uploads are extracted under `[storage].root`,
    /// or under a temporary directory removed on shutdown.
    Serve,

    /// Extract a ZIP archive and print its directory structure as JSON.
    Extract {
        /// Path to the archive.
        archive: PathBuf,

        /// Destination directory. Defaults to `<archive name>_extracted`
        /// in the current directory.
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Print the directory structure of an extracted tree as JSON.
    Tree {
        /// Directory to describe.
        dir: PathBuf,
    },

    /// Search relationship elements and print matching records as JSON.
    Search {
        /// Root of an extracted archive. Result paths are relative to it.
        #[arg(long)]
        extract_path: String,

        /// Folder inside the extract path to scan (use `.` for all).
        #[arg(long)]
        folder: String,

        /// Keyword every match must contain (case-insensitive). Repeatable.
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Extra field to include in each record. Repeatable.
        #[arg(long = "attribute")]
        attributes: Vec<String>,

        /// Reject values of the search field ending with this (case-insensitive). Repeatable.
        #[arg(long = "not-ending")]
        not_endings: Vec<String>,

        /// Keep only values of the search field starting with this (case-sensitive). Repeatable.
        #[arg(long = "starting")]
        startings: Vec<String>,

        /// Field the prefix/suffix filters test. Defaults to `[search].search_field`.
        #[arg(long)]
        search_field: Option<String>,

        /// Explicit list of fields to return, replacing the defaults. Repeatable.
        #[arg(long = "return-field")]
        return_fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            serve(&cfg).await?;
        }
        Commands::Extract { archive, dest } => {
            run_extract(&cfg, &archive, dest)?;
        }
        Commands::Tree { dir } => {
            println!("{}", serde_json::to_string_pretty(&tree::report(&dir))?);
        }
        Commands::Search {
            extract_path,
            folder,
            keywords,
            attributes,
            not_endings,
            startings,
            search_field,
            return_fields,
        } => {
            let query = QueryDescriptor {
                extract_path: Some(extract_path),
                folder: Some(folder),
                keywords,
                attributes,
                not_endings,
                startings,
                search_field,
                return_fields: (!return_fields.is_empty()).then_some(return_fields),
            };
            search::run_search(&cfg, &query)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so command output on stdout stays parseable.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relsearch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(cfg: &Config) -> Result<()> {
    // Held until the server stops; dropping it removes the directory.
    let mut _scratch = None;
    let storage_root = match &cfg.storage.root {
        Some(root) => {
            std::fs::create_dir_all(root)
                .with_context(|| format!("Failed to create storage root: {}", root.display()))?;
            root.clone()
        }
        None => {
            let dir = tempfile::Builder::new().prefix("relsearch-").tempdir()?;
            let path = dir.path().to_path_buf();
            _scratch = Some(dir);
            path
        }
    };
    let storage_root = storage_root.canonicalize()?;

    server::run_server(cfg, &storage_root).await
}

fn run_extract(cfg: &Config, archive: &Path, dest: Option<PathBuf>) -> Result<()> {
    let bytes = std::fs::read(archive)
        .with_context(|| format!("Failed to read archive: {}", archive.display()))?;
    let dest = dest.unwrap_or_else(|| {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        PathBuf::from(format!("{}_extracted", server::secure_filename(&name)))
    });

    let result = ArchiveExtractor::new(cfg.extract.max_entry_bytes).extract(&bytes, &dest)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
