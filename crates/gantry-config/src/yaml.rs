use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single plugin/build step. `commands` and other plugin-specific keys
/// are carried in `settings` rather than modeled individually, since the
/// core only needs `image` and `when` to schedule and lint the step — the
/// runner passes `settings` through to the container environment
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub image: String,
    #[serde(default)]
    pub when: Option<WhenFilter>,
    #[serde(flatten)]
    pub settings: IndexMap<String, serde_yaml::Value>,
}

impl Step {
    pub fn commands(&self) -> Option<&serde_yaml::Value> {
        self.settings.get("commands")
    }
}

/// Predicate over job status, branch, and event kind controlling whether
/// a publish/deploy/notify plugin step runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhenFilter {
    #[serde(default)]
    pub status: Option<Vec<String>>,
    #[serde(default)]
    pub branch: Option<Vec<String>>,
    #[serde(default)]
    pub event: Option<Vec<String>>,
}

impl WhenFilter {
    /// `status` of "always" (or no status filter at all) always matches.
    pub fn matches(&self, status: &str, branch: &str, event: &str) -> bool {
        let status_ok = match &self.status {
            None => true,
            Some(statuses) => {
                statuses.iter().any(|s| s == "always") || statuses.iter().any(|s| s == status)
            }
        };
        let branch_ok = match &self.branch {
            None => true,
            Some(branches) => branches
                .iter()
                .any(|b| glob::Pattern::new(b).map(|p| p.matches(branch)).unwrap_or(false)),
        };
        let event_ok = match &self.event {
            None => true,
            Some(events) => events.iter().any(|e| e == event),
        };
        status_ok && branch_ok && event_ok
    }
}

/// Cache path configuration. Paths must resolve inside the workspace
/// directory and must not contain `:`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub mount: Vec<String>,
}

/// Root of a build configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clone: Option<Step>,
    #[serde(default)]
    pub setup: Option<Step>,
    #[serde(default)]
    pub services: Vec<Step>,
    pub build: Step,
    #[serde(default)]
    pub publish: Vec<Step>,
    #[serde(default)]
    pub deploy: Vec<Step>,
    #[serde(default)]
    pub notify: Vec<Step>,
    #[serde(default)]
    pub matrix: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub include: Vec<IndexMap<String, String>>,
    #[serde(default)]
    pub exclude: Vec<IndexMap<String, String>>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    pub fn parse(yaml: &str) -> Result<Config, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
