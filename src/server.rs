//! HTTP front end for the extraction and search engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload of a ZIP (`zipfile` part); returns extract path + structure |
//! | `POST` | `/search` | Run a relationship query against an extracted archive |
//! | `GET`  | `/` | Static index page, when `server.index_file` is configured |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every failure is a JSON object with a single message:
//!
//! ```json
//! { "error": "Missing parameters: folder" }
//! ```
//!
//! Request validation failures are `400`; unexpected I/O failures are `500`.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::archive::{self, ArchiveExtractor, ExtractionResult};
use crate::config::Config;
use crate::error::EngineError;
use crate::search::{QueryDescriptor, SearchEngine, SearchResponse};

/// Multipart part that carries the uploaded archive.
pub const UPLOAD_FIELD: &str = "zipfile";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    /// Directory every upload is extracted under.
    storage_root: Arc<PathBuf>,
    /// Reject searches whose paths leave `storage_root`.
    restrict_to_storage: bool,
    extractor: ArchiveExtractor,
    engine: Arc<SearchEngine>,
}

/// Builds the application router.
///
/// `storage_root` must already exist; its lifetime is owned by the caller.
pub fn router(config: &Config, storage_root: &Path) -> anyhow::Result<Router> {
    let state = AppState {
        storage_root: Arc::new(storage_root.to_path_buf()),
        restrict_to_storage: config.server.restrict_to_storage,
        extractor: ArchiveExtractor::new(config.extract.max_entry_bytes),
        engine: Arc::new(SearchEngine::new(&config.search)?),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/upload", post(handle_upload))
        .route("/search", post(handle_search))
        .route("/health", get(handle_health));

    app = match &config.server.index_file {
        Some(index) => app.route_service("/", ServeFile::new(index)),
        None => app.route("/", get(handle_no_index)),
    };

    Ok(app
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config, storage_root: &Path) -> anyhow::Result<()> {
    let app = router(config, storage_root)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    info!(
        bind = %config.server.bind,
        storage = %storage_root.display(),
        "server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        if err.is_client_error() {
            bad_request(err.to_string())
        } else {
            internal(err.to_string())
        }
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

/// Constructs a 500 Internal Server Error.
fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_no_index() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: "no index page configured".to_string(),
    }
}

// ============ POST /upload ============

/// Handler for `POST /upload`.
///
/// Reads the `zipfile` part, extracts it into a fresh directory under the
/// storage root, and returns the directory plus its structure. A failed
/// extraction leaves nothing behind.
async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> Result<Json<ExtractionResult>, AppError> {
    let mut multipart = multipart.map_err(|_| EngineError::MissingUpload)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        if file_name.is_empty() && bytes.is_empty() {
            break;
        }
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) = upload.ok_or(EngineError::MissingUpload)?;

    let storage_root = state.storage_root.clone();
    let extractor = state.extractor.clone();
    let result = tokio::task::spawn_blocking(move || {
        let destination = claim_destination(&storage_root, &file_name)?;
        extractor.extract(&bytes, &destination).inspect_err(|_| {
            let _ = std::fs::remove_dir(&destination);
        })
    })
    .await
    .map_err(|e| internal(e.to_string()))?;

    match result {
        Ok(extraction) => Ok(Json(extraction)),
        Err(err) => {
            warn!(error = %err, "upload rejected");
            Err(err.into())
        }
    }
}

/// Creates and returns a new directory under `root` named after the upload.
///
/// `create_dir` fails if the name is taken, so concurrent uploads of the same
/// file never share a directory.
fn claim_destination(root: &Path, file_name: &str) -> Result<PathBuf, EngineError> {
    let base = format!("{}_extracted", secure_filename(file_name));
    let mut candidate = root.join(&base);
    let mut counter = 1;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{}-{}", base, counter));
                counter += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Reduces an uploaded file name to a safe single path component.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            c if c.is_whitespace() => '_',
            _ => '\0',
        })
        .filter(|c| *c != '\0')
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

// ============ POST /search ============

/// Handler for `POST /search`.
async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<QueryDescriptor>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(query) = payload.map_err(|e| bad_request(e.body_text()))?;

    let search_root = query.search_root()?;
    if state.restrict_to_storage {
        let extract_path = Path::new(query.extract_path.as_deref().unwrap_or_default());
        for path in [extract_path, search_root.as_path()] {
            if !archive::is_within(&state.storage_root, path) {
                return Err(EngineError::OutsideStorageRoot(path.to_path_buf()).into());
            }
        }
    }

    let engine = state.engine.clone();
    let results = tokio::task::spawn_blocking(move || engine.search(&query))
        .await
        .map_err(|e| internal(e.to_string()))??;

    Ok(Json(SearchResponse { results }))
}
