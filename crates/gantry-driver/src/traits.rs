use async_trait::async_trait;
use gantry_types::{Build, Repo, User};

use crate::error::DriverError;
use crate::types::{BuildDraft, Netrc, RepoHint};

/// The remote-provider boundary consumed by the hook pipeline and
/// runner. One concrete implementation (`GenericDriver`) ships here;
/// provider-specific adapters (GitHub, GitLab, ...) are out of scope
/// and register additional `Driver` impls against the same trait.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Parse an inbound webhook request into a repo hint and build
    /// draft. Returns `Ok(None)` for payloads the driver recognizes as
    /// "not a build-triggering event" (e.g. a ping), which the hook
    /// pipeline treats as 200-and-done.
    async fn parse_hook(
        &self,
        headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Option<(RepoHint, BuildDraft)>, DriverError>;

    /// Verify the request is authentically from this remote, using the
    /// repo's stored webhook secret. Kept separate from `parse_hook` so
    /// the hook pipeline can resolve the repo (and its secret) from the
    /// parsed payload before verifying.
    fn verify_signature(
        &self,
        secret: &str,
        headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<(), DriverError>;

    /// Fetch the build config YAML and any associated secret for a
    /// given commit.
    async fn fetch_script(
        &self,
        user: &User,
        repo: &Repo,
        build: &Build,
    ) -> Result<(String, Option<String>), DriverError>;

    async fn fetch_netrc(&self, user: &User, repo: &Repo) -> Result<Netrc, DriverError>;

    async fn post_status(
        &self,
        user: &User,
        repo: &Repo,
        build: &Build,
        link: &str,
    ) -> Result<(), DriverError>;
}
