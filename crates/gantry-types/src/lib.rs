//! Shared data model for the gantry build-orchestration engine.
//!
//! Kept deliberately small and dependency-light: every other crate in the
//! workspace depends on this one, so it must not pull in `tokio`, `axum`,
//! or `sqlx`.

mod model;
mod status;

pub use model::{AllowFlags, Build, Job, LogKey, Repo, User};
pub use status::{EventKind, ParseStatusError, Status};
