use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gantry_store::StoreError;
use serde::Serialize;

/// Errors surfaced at the HTTP boundary. Validation failures map to
/// 4xx with no side effect, unknown repos/builds/jobs to 404,
/// signature mismatches to 403. `NoBuild` covers hook outcomes that
/// produced nothing to run (skip token, disabled event, ownerless
/// repo) and answers 204.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("unrecognized webhook payload")]
    UnrecognizedPayload,
    #[error("webhook signature verification failed")]
    InvalidSignature,
    #[error("repo not found")]
    RepoNotFound,
    #[error("build not found")]
    BuildNotFound,
    #[error("job not found")]
    JobNotFound,
    #[error("no build: {0}")]
    NoBuild(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::UnrecognizedPayload => StatusCode::NO_CONTENT,
            WebError::InvalidSignature => StatusCode::FORBIDDEN,
            WebError::RepoNotFound | WebError::BuildNotFound | WebError::JobNotFound => {
                StatusCode::NOT_FOUND
            }
            WebError::NoBuild(_) => StatusCode::NO_CONTENT,
            WebError::Store(e) => match e {
                StoreError::RepoNotFound(_)
                | StoreError::UserNotFound(_)
                | StoreError::BuildNotFound(_)
                | StoreError::JobNotFound(_)
                | StoreError::LogNotFound(_) => StatusCode::NOT_FOUND,
                #[allow(unreachable_patterns)]
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
