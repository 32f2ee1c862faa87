use std::time::Duration;

use gantry_config::{Axis, Config};
use gantry_types::{Build, Job, Repo, User};

/// Credentials mounted into the clone container. Kept narrow and
/// driver-agnostic: the runner doesn't know or care which `Driver`
/// produced them.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub netrc: Option<String>,
    pub deploy_private_key: Option<String>,
}

/// Everything one job needs to run, independent of how it was
/// scheduled. One `Work` per job, not per build, so each job in a
/// matrix build can be picked up by a different worker.
#[derive(Debug, Clone)]
pub struct Work {
    pub user: User,
    pub repo: Repo,
    pub build: Build,
    pub job: Job,
    pub config: Config,
    pub axis: Axis,
    pub credentials: Credentials,
    pub timeout: Duration,
}
