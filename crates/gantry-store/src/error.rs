use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("repo not found: {0}")]
    RepoNotFound(String),
    #[error("user not found: {0}")]
    UserNotFound(Uuid),
    #[error("build not found: {0}")]
    BuildNotFound(Uuid),
    #[error("job not found: {0}")]
    JobNotFound(Uuid),
    #[error("log not found for job {0}")]
    LogNotFound(Uuid),
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
