#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("docker daemon error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("container exited non-zero: {0}")]
    NonZeroExit(i64),
    #[error("job cancelled")]
    Cancelled,
    #[error("job timed out after its repo-configured limit")]
    TimedOut,
    #[error("store error: {0}")]
    Store(#[from] gantry_store::StoreError),
    #[error("internal runner error: {0}")]
    Internal(String),
}
