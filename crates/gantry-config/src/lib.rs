//! Build config parsing, matrix expansion, and plugin image lint.
//!
//! A parse-then-lint pipeline, with matrix expansion split into its
//! own module so axis ordering stays independently testable.

mod lint;
mod matrix;
mod yaml;

pub use lint::{lint, LintError, TrustPolicy};
pub use matrix::{expand, Axis};
pub use yaml::{CacheConfig, Config, Step, WhenFilter};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse build config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("build config failed lint: {0}")]
    Lint(#[from] LintError),
}

/// Parse, lint, and expand a build config document in one call,
/// returning the per-axis job list a build should schedule.
pub fn load(yaml: &str, trust: &TrustPolicy) -> Result<(Config, Vec<Axis>), ConfigError> {
    let config = Config::parse(yaml)?;
    lint(&config, trust)?;
    let axes = expand(&config);
    Ok((config, axes))
}
