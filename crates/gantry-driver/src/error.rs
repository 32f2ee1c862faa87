#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("unrecognized webhook payload: {0}")]
    UnrecognizedPayload(String),
    #[error("webhook signature missing or invalid")]
    InvalidSignature,
    #[error("failed to fetch build script: {0}")]
    ScriptFetch(String),
    #[error("failed to post commit status: {0}")]
    StatusPost(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
