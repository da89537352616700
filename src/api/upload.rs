use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Shared state for the upload and home endpoints
#[derive(Clone)]
pub struct UploadAppState {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Create router for `GET /` and `POST /file`
pub fn create_upload_router(state: UploadAppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(home))
        .route("/file", post(upload_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state))
}

/// GET / - Plain-text landing page
async fn home() -> &'static str {
    "This is my home page"
}

/// POST /file - Store the multipart field `file` under the upload directory
async fn upload_file(
    State(state): State<Arc<UploadAppState>>,
    mut multipart: Multipart,
) -> Result<&'static str, UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| UploadError::BadRequest("Missing or invalid file name".to_string()))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| UploadError::BadRequest(e.body_text()))?;

        tokio::fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(|e| UploadError::Storage(format!("Unable to create upload directory: {}", e)))?;

        let dest = state.upload_dir.join(&file_name);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| UploadError::Storage(format!("Failed to write {}: {}", dest.display(), e)))?;

        info!(file = %file_name, bytes = bytes.len(), "File uploaded");
        return Ok("File uploaded successfully!");
    }

    Err(UploadError::BadRequest(
        "File not found in request".to_string(),
    ))
}

/// Keep only the final path component so a client cannot escape the upload
/// directory.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Upload error types
enum UploadError {
    BadRequest(String),
    Storage(String),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            UploadError::Storage(detail) => {
                error!(error = %detail, "Upload storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Unable to save the file on server",
                )
                    .into_response()
            }
        }
    }
}
