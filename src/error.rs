use gantry_config::ConfigError;
use gantry_driver::DriverError;
use gantry_runner::RunnerError;
use gantry_store::StoreError;

/// Umbrella error composing every subsystem's typed error at the
/// process boundary, rather than one flat enum of leaf variants.
#[derive(Debug, thiserror::Error)]
pub enum GantryError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("webhook signature verification failed")]
    InvalidSignature,
    #[error("unknown repo: {0}")]
    UnknownRepo(String),
    #[error("event kind disabled for this repo")]
    EventDisabled,
    #[error("commit message contains a skip token")]
    SkipRequested,
    #[error("no branch pattern in the build config matched {0}")]
    BranchFiltered(String),
    #[error("repo {0} has no owner")]
    NoOwner(String),
}

impl GantryError {
    /// Maps to the HTTP status the hook pipeline should answer with:
    /// validation failures are 4xx, transient upstream failures are
    /// 5xx. A branch-filter miss is a normal "nothing to build" result
    /// (200, no body); a skipped/disabled/ownerless repo is treated as
    /// "there was nothing here to act on" (204).
    pub fn status_code(&self) -> u16 {
        match self {
            GantryError::Driver(DriverError::UnrecognizedPayload(_)) => 400,
            GantryError::Driver(DriverError::InvalidSignature) | GantryError::InvalidSignature => 403,
            GantryError::UnknownRepo(_) => 404,
            GantryError::BranchFiltered(_) => 200,
            GantryError::EventDisabled | GantryError::SkipRequested | GantryError::NoOwner(_) => 204,
            GantryError::Config(_) => 400,
            GantryError::Driver(_) => 502,
            GantryError::Store(_) => 500,
            GantryError::Runner(_) => 500,
        }
    }
}
