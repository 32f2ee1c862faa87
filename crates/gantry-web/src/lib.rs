//! HTTP transport for the build-orchestration engine: webhook intake,
//! a small build/job JSON API, a live log WebSocket tail, and a cancel
//! endpoint. Deliberately thin — the hook pipeline, queueing, and
//! cancellation policy all live in the root crate and reach this crate
//! only through the [`HookHandler`] / [`CancelHandler`] trait objects in
//! [`AppState`], the way `ob-poc-web-server`'s route modules take their
//! domain logic through `AgentState` rather than reimplementing it.

mod error;
mod logs;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::WebError;
pub use state::{AppState, CancelHandler, HookHandler};

/// Build the full Axum router. Callers mount this under whatever
/// address `ServerConfig` resolves to.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hooks/{remote}", post(routes::handle_webhook))
        .route("/api/repos/{full_name}", get(routes::get_repo))
        .route(
            "/api/repos/{full_name}/builds/last",
            get(routes::get_last_build),
        )
        .route(
            "/api/repos/{full_name}/builds/{number}/cancel",
            post(routes::cancel_build),
        )
        .route("/ws/jobs/{job_id}/logs", get(logs::tail_job_log))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
