//! Request-level errors raised by the engine.
//!
//! Per-document parse failures are deliberately *not* part of this enum: they
//! are recovered inside the document loop (see [`crate::document`]) and never
//! reach the caller.

use std::path::PathBuf;

/// Errors surfaced to the caller of an engine operation.
///
/// Every variant except [`EngineError::Io`] is a client error and maps to
/// HTTP 400 in [`crate::server`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Upload request without a file part.
    #[error("No file uploaded")]
    MissingUpload,

    /// An archive entry would resolve outside the destination directory.
    #[error("unsafe archive entry: {entry}")]
    UnsafeArchive { entry: String },

    /// The archive could not be opened or read.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// `extract_path` or `folder` missing from a query.
    #[error("Missing parameters: {0}")]
    MissingQueryParameter(&'static str),

    /// A query pointed outside the configured storage root.
    #[error("path is outside the storage root: {}", .0.display())]
    OutsideStorageRoot(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Io(_))
    }
}
