use async_trait::async_trait;
use gantry_types::{Build, Job, Repo, User};
use uuid::Uuid;

use crate::error::StoreError;

/// Persistence boundary the core consumes. Each method is its own
/// transactional unit; `create_build` in particular must assign
/// `build.number` and every `job.number` atomically and return them
/// dense and unique per repo/build.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_repo_by_full_name(&self, full_name: &str) -> Result<Repo, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<User, StoreError>;

    /// Insert a build and its jobs in one unit, assigning `number` on
    /// both. `build.number`/`job.number` on the input are ignored.
    async fn create_build(
        &self,
        build: Build,
        jobs: Vec<Job>,
    ) -> Result<(Build, Vec<Job>), StoreError>;

    async fn update_build(&self, build: &Build) -> Result<(), StoreError>;
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_build(&self, id: Uuid) -> Result<Build, StoreError>;

    /// Every job belonging to a build, in no particular order.
    async fn list_jobs(&self, build_id: Uuid) -> Result<Vec<Job>, StoreError>;

    /// Most recent build for a repo/branch pair, if any.
    async fn get_build_last(&self, repo_id: Uuid, branch: &str) -> Result<Option<Build>, StoreError>;

    async fn write_log(&self, job_id: Uuid, bytes: &[u8]) -> Result<(), StoreError>;
    async fn read_log(&self, job_id: Uuid) -> Result<Vec<u8>, StoreError>;

    /// Force every non-terminal build and job to `killed`. Called once
    /// at boot to recover from an unclean shutdown.
    async fn kill_all_non_terminal(&self) -> Result<(), StoreError>;

    /// Run forward-only schema migrations. A no-op for the in-memory
    /// implementation.
    async fn migrate(&self) -> Result<(), StoreError>;
}
