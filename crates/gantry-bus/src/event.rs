use gantry_types::{Build, Job, Status};
use uuid::Uuid;

/// One state change published on the bus. Subscribers filter by repo id
/// themselves; the bus does not scope topics per repo.
#[derive(Debug, Clone)]
pub enum Event {
    RepoUpdate { repo_id: Uuid },
    BuildUpdate { repo_id: Uuid, build: Build },
    JobUpdate { repo_id: Uuid, build_id: Uuid, job: Job },
    LogAppend { job_id: Uuid, line: String },
    LogClose { job_id: Uuid, status: Status },
    /// Emitted once per gap instead of replaying the dropped events;
    /// subscribers should treat this as "re-read current state from the
    /// store" rather than try to recover the missed events.
    Lag { skipped: u64 },
}
