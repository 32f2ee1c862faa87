use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::error::WebError;
use crate::state::AppState;

/// `POST /hooks/:remote` — webhook intake for the named remote driver.
/// Responds 200 with the created build, or 200 with no body when the
/// event was ignorable or the branch was filtered out of the build
/// config (both are a normal "nothing to build" outcome, not an
/// error). A skipped commit, a disabled event kind, or an ownerless
/// repo answer 204. 403 on signature mismatch, 404 for an unknown
/// repo.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(remote): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, WebError> {
    match state.hooks.handle_hook(&remote, headers, body).await? {
        Some(build) => Ok((StatusCode::OK, Json(build)).into_response()),
        None => Ok(StatusCode::OK.into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct LastBuildQuery {
    pub branch: String,
}

/// `GET /api/repos/:full_name/builds/last?branch=main`
pub async fn get_last_build(
    State(state): State<AppState>,
    Path(full_name): Path<String>,
    Query(q): Query<LastBuildQuery>,
) -> Result<impl IntoResponse, WebError> {
    let repo = state.store.get_repo_by_full_name(&full_name).await?;
    let build = state
        .store
        .get_build_last(repo.id, &q.branch)
        .await?
        .ok_or(WebError::BuildNotFound)?;
    Ok(Json(build))
}

/// `GET /api/repos/:full_name`
pub async fn get_repo(
    State(state): State<AppState>,
    Path(full_name): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    let repo = state.store.get_repo_by_full_name(&full_name).await?;
    Ok(Json(repo))
}

/// `POST /api/repos/:full_name/builds/:number/cancel`
pub async fn cancel_build(
    State(state): State<AppState>,
    Path((full_name, number)): Path<(String, i64)>,
) -> Result<impl IntoResponse, WebError> {
    let cancelled = state.cancel.cancel_build(&full_name, number).await?;
    if cancelled {
        Ok(StatusCode::ACCEPTED)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
