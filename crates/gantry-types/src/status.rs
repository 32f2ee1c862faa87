use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a build or job.
///
/// Terminal set = {Success, Failure, Killed, Error}; a job or build in a
/// terminal status never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failure,
    Killed,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Killed => "killed",
            Status::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failure | Status::Killed | Status::Error
        )
    }

    /// Roll up a build's status from its jobs: if any job is
    /// running/pending the build is running/pending; else if any job
    /// failed the build failed; else success.
    pub fn rollup(jobs: &[Status]) -> Status {
        if jobs.is_empty() {
            return Status::Pending;
        }
        if jobs.iter().any(|s| *s == Status::Running) {
            return Status::Running;
        }
        if jobs.iter().any(|s| *s == Status::Pending) {
            return Status::Pending;
        }
        if jobs
            .iter()
            .any(|s| matches!(s, Status::Failure | Status::Error | Status::Killed))
        {
            return Status::Failure;
        }
        Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "running" => Ok(Status::Running),
            "success" => Ok(Status::Success),
            "failure" => Ok(Status::Failure),
            "killed" => Ok(Status::Killed),
            "error" => Ok(Status::Error),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(String);

/// Kind of upstream event that triggered a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Tag,
    Deploy,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Tag => "tag",
            EventKind::Deploy => "deploy",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollup_failure_beats_success() {
        let jobs = [Status::Success, Status::Failure, Status::Success];
        assert_eq!(Status::rollup(&jobs), Status::Failure);
    }

    #[test]
    fn rollup_all_success() {
        let jobs = [Status::Success, Status::Success, Status::Success];
        assert_eq!(Status::rollup(&jobs), Status::Success);
    }

    #[test]
    fn rollup_pending_with_no_started_job() {
        let jobs = [Status::Pending, Status::Success];
        assert_eq!(Status::rollup(&jobs), Status::Pending);
    }

    #[test]
    fn rollup_running_beats_pending() {
        let jobs = [Status::Running, Status::Pending];
        assert_eq!(Status::rollup(&jobs), Status::Running);
    }

    #[test]
    fn terminal_set_is_exact() {
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(Status::Success.is_terminal());
        assert!(Status::Failure.is_terminal());
        assert!(Status::Killed.is_terminal());
        assert!(Status::Error.is_terminal());
    }
}
