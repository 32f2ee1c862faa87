use glob::Pattern;

use crate::yaml::{Config, Step};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LintError {
    #[error("config must define a build section with a non-empty image")]
    MissingBuildImage,
    #[error("config must define build commands")]
    MissingBuildCommands,
    #[error("untrusted image '{0}' is not allowed by the repo's plugin whitelist")]
    UntrustedImage(String),
}

/// Image-trust whitelist for a repo: an operator-supplied list of glob
/// patterns a plugin image must match to be considered trusted.
#[derive(Debug, Clone, Default)]
pub struct TrustPolicy {
    patterns: Vec<Pattern>,
}

impl TrustPolicy {
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Result<Self, glob::PatternError> {
        let patterns = patterns
            .into_iter()
            .map(|p| Pattern::new(&p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn allows(&self, image: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(image))
    }
}

/// Run every lint rule against a parsed config, using `trust` to decide
/// whether plugin steps outside the core pipeline run trusted images.
pub fn lint(config: &Config, trust: &TrustPolicy) -> Result<(), LintError> {
    expect_build(config)?;
    expect_command(config)?;
    expect_trusted(config.clone.as_ref().into_iter(), trust)?;
    expect_trusted(config.setup.as_ref().into_iter(), trust)?;
    expect_trusted(config.publish.iter(), trust)?;
    expect_trusted(config.deploy.iter(), trust)?;
    expect_trusted(config.notify.iter(), trust)?;
    Ok(())
}

fn expect_build(config: &Config) -> Result<(), LintError> {
    if config.build.image.is_empty() {
        return Err(LintError::MissingBuildImage);
    }
    Ok(())
}

fn expect_command(config: &Config) -> Result<(), LintError> {
    match config.build.commands() {
        Some(serde_yaml::Value::Sequence(seq)) if !seq.is_empty() => Ok(()),
        _ => Err(LintError::MissingBuildCommands),
    }
}

fn expect_trusted<'a>(
    steps: impl Iterator<Item = &'a Step>,
    trust: &TrustPolicy,
) -> Result<(), LintError> {
    for step in steps {
        if !trust.allows(&step.image) {
            return Err(LintError::UntrustedImage(step.image.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn step(image: &str, commands: bool) -> Step {
        let mut settings = IndexMap::new();
        if commands {
            settings.insert(
                "commands".to_string(),
                serde_yaml::Value::Sequence(vec![serde_yaml::Value::String("go build".into())]),
            );
        }
        Step {
            image: image.to_string(),
            when: None,
            settings,
        }
    }

    fn config_with_build(image: &str, commands: bool) -> Config {
        Config {
            clone: None,
            setup: None,
            services: vec![],
            build: step(image, commands),
            publish: vec![],
            deploy: vec![],
            notify: vec![],
            matrix: IndexMap::new(),
            include: vec![],
            exclude: vec![],
            branches: vec![],
            cache: Default::default(),
        }
    }

    #[test]
    fn rejects_missing_build_image() {
        let config = config_with_build("", true);
        let trust = TrustPolicy::default();
        assert_eq!(lint(&config, &trust), Err(LintError::MissingBuildImage));
    }

    #[test]
    fn rejects_missing_build_commands() {
        let config = config_with_build("golang", false);
        let trust = TrustPolicy::new(["golang".to_string()]).unwrap();
        assert_eq!(lint(&config, &trust), Err(LintError::MissingBuildCommands));
    }

    #[test]
    fn rejects_untrusted_publish_image() {
        let mut config = config_with_build("golang", true);
        config.publish.push(step("evil/plugin", false));
        let trust = TrustPolicy::new(["golang".to_string()]).unwrap();
        assert_eq!(
            lint(&config, &trust),
            Err(LintError::UntrustedImage("evil/plugin".into()))
        );
    }

    #[test]
    fn allows_whitelisted_wildcard() {
        let mut config = config_with_build("golang", true);
        config.publish.push(step("plugins/docker", false));
        let trust = TrustPolicy::new(["golang".to_string(), "plugins/*".to_string()]).unwrap();
        assert_eq!(lint(&config, &trust), Ok(()));
    }
}
