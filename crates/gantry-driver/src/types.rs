use chrono::{DateTime, Utc};
use gantry_types::EventKind;
use serde::{Deserialize, Serialize};

/// Repo identity extracted from a raw webhook payload, before it is
/// resolved against the store. `owner`/`name` are matched against
/// `Repo.full_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoHint {
    pub owner: String,
    pub name: String,
}

/// Build fields extracted from a raw webhook payload. `number` is not
/// set here; the store assigns it on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDraft {
    pub event: EventKind,
    pub commit_sha: String,
    pub branch: String,
    pub git_ref: String,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Netrc credentials handed to the runner's clone step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Netrc {
    pub machine: String,
    pub login: String,
    pub password: String,
}
