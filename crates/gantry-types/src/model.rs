use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::status::{EventKind, Status};

/// Owner identity from the upstream version-control provider.
///
/// Created on first login; mutated on re-login (token refresh) and
/// admin toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    /// Provider access token. Never serialized to API responses.
    #[serde(skip_serializing)]
    pub token: String,
    /// Provider refresh secret. Never serialized to API responses.
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
    pub admin: bool,
    /// Per-user random hash used to sign webhook callbacks.
    #[serde(skip_serializing)]
    pub hash: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Per-event allow flags controlling which upstream event kinds may
/// trigger a build for a repo.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AllowFlags {
    pub push: bool,
    pub pull_request: bool,
    pub tag: bool,
    pub deploy: bool,
}

impl AllowFlags {
    pub fn allows(&self, event: EventKind) -> bool {
        match event {
            EventKind::Push => self.push,
            EventKind::PullRequest => self.pull_request,
            EventKind::Tag => self.tag,
            EventKind::Deploy => self.deploy,
        }
    }
}

/// A tracked repository.
///
/// Created when a user activates it; mutated by settings edits and
/// re-activation; deleted on deactivation (cascades to builds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
    /// Timeout applied to every job of this repo, in minutes.
    pub timeout_minutes: u32,
    pub is_private: bool,
    pub is_trusted: bool,
    pub allow: AllowFlags,
    /// Webhook signing secret.
    #[serde(skip_serializing)]
    pub hash: String,
    #[serde(skip_serializing)]
    pub deploy_public_key: String,
    #[serde(skip_serializing)]
    pub deploy_private_key: String,
    pub avatar_url: Option<String>,
    pub link_url: Option<String>,
}

/// One invocation triggered by one upstream event.
///
/// Created by the hook pipeline; mutated only by the runner and the
/// cancel path; never deleted except on repo delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub repo_id: Uuid,
    /// Monotonically increasing, dense, unique per repo; assigned
    /// atomically at creation.
    pub number: i64,
    pub event: EventKind,
    pub commit_sha: String,
    pub branch: String,
    pub git_ref: String,
    pub message: String,
    pub author: String,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Build {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One matrix axis of a build; the unit of work the queue carries.
///
/// A job is a pipeline of containers, not a container itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub build_id: Uuid,
    /// Dense, unique per build, starting at 1.
    pub number: i64,
    pub status: Status,
    pub exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Matrix axis variable bindings for this job.
    pub environment: HashMap<String, String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Identifies an append-only log stream: (repo id, build number, job
/// number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogKey {
    pub repo_id: Uuid,
    pub build_number: i64,
    pub job_number: i64,
}

impl LogKey {
    pub fn new(repo_id: Uuid, build_number: i64, job_number: i64) -> Self {
        Self {
            repo_id,
            build_number,
            job_number,
        }
    }
}

impl std::fmt::Display for LogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.repo_id, self.build_number, self.job_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_flags_gate_by_event() {
        let flags = AllowFlags {
            push: true,
            pull_request: false,
            tag: false,
            deploy: false,
        };
        assert!(flags.allows(EventKind::Push));
        assert!(!flags.allows(EventKind::PullRequest));
    }

    #[test]
    fn log_key_formats_as_path() {
        let key = LogKey::new(Uuid::nil(), 4, 2);
        assert_eq!(
            key.to_string(),
            format!("{}/4/2", Uuid::nil())
        );
    }
}
