//! Adapts the hook pipeline and orchestrator to the trait objects
//! `gantry-web` depends on, so the HTTP crate never needs to depend
//! back on this one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_config::TrustPolicy;
use gantry_driver::Driver;
use gantry_store::Store;
use gantry_types::Build;

use crate::error::GantryError;
use crate::hook;
use crate::orchestrator::Orchestrator;

/// Runs `hook::process_hook` behind the `gantry_web::HookHandler`
/// trait, selecting a `Driver` from a small registry keyed by the
/// `:remote` path segment.
pub struct HookPipeline {
    drivers: HashMap<String, Arc<dyn Driver>>,
    store: Arc<dyn Store>,
    orchestrator: Arc<Orchestrator>,
    trust: TrustPolicy,
}

impl HookPipeline {
    pub fn new(
        drivers: HashMap<String, Arc<dyn Driver>>,
        store: Arc<dyn Store>,
        orchestrator: Arc<Orchestrator>,
        trust: TrustPolicy,
    ) -> Self {
        Self { drivers, store, orchestrator, trust }
    }
}

#[async_trait]
impl gantry_web::HookHandler for HookPipeline {
    async fn handle_hook(
        &self,
        remote: &str,
        headers: http::HeaderMap,
        body: axum::body::Bytes,
    ) -> Result<Option<Build>, gantry_web::WebError> {
        let driver = self
            .drivers
            .get(remote)
            .ok_or(gantry_web::WebError::UnrecognizedPayload)?;

        match hook::process_hook(
            remote,
            driver.as_ref(),
            &self.store,
            &self.orchestrator,
            &self.trust,
            &headers,
            body.as_ref(),
        )
        .await
        {
            Ok(build) => Ok(build),
            // A branch-filter miss is a normal "no build for this
            // branch" result, answered 200 with no body same as an
            // ignorable event the driver itself returned `None` for.
            Err(GantryError::BranchFiltered(_)) => Ok(None),
            // These never produced a build either, but the caller
            // answers 204 for them rather than 200.
            Err(GantryError::EventDisabled) => Err(gantry_web::WebError::NoBuild(
                "event kind disabled for this repo".into(),
            )),
            Err(GantryError::SkipRequested) => Err(gantry_web::WebError::NoBuild(
                "commit message requests a skip".into(),
            )),
            Err(GantryError::NoOwner(full_name)) => Err(gantry_web::WebError::NoBuild(format!(
                "repo {full_name} has no owner"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

impl From<GantryError> for gantry_web::WebError {
    fn from(err: GantryError) -> Self {
        match err {
            GantryError::Driver(gantry_driver::DriverError::UnrecognizedPayload(_)) => {
                gantry_web::WebError::UnrecognizedPayload
            }
            GantryError::InvalidSignature
            | GantryError::Driver(gantry_driver::DriverError::InvalidSignature) => {
                gantry_web::WebError::InvalidSignature
            }
            GantryError::UnknownRepo(_) => gantry_web::WebError::RepoNotFound,
            GantryError::Store(e) => gantry_web::WebError::Store(e),
            other => gantry_web::WebError::Internal(other.to_string()),
        }
    }
}
