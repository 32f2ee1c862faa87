use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use gantry_bus::Bus;
use gantry_store::Store;
use gantry_types::Build;

use crate::error::WebError;

/// Implemented by the root crate's hook pipeline. `gantry-web` only
/// knows how to route bytes to it and turn the result into a response;
/// it has no opinion on driver selection, signature verification, or
/// queueing.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle_hook(
        &self,
        remote: &str,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> Result<Option<Build>, WebError>;
}

/// Implemented by the orchestrator. Cancels a build by
/// `(repo_full_name, build_number)`.
#[async_trait]
pub trait CancelHandler: Send + Sync {
    async fn cancel_build(&self, repo_full_name: &str, build_number: i64) -> Result<bool, WebError>;
}

#[derive(Clone)]
pub struct AppState {
    pub bus: Bus,
    pub store: Arc<dyn Store>,
    pub hooks: Arc<dyn HookHandler>,
    pub cancel: Arc<dyn CancelHandler>,
}
