//! Orchestrator configuration
//!
//! Every deadline the orchestrator applies is an explicit value here, with the
//! defaults documented on [`OrchestratorConfig`]. Values resolve in this
//! order: built-in defaults, then a YAML file, then `QUERY_ORCHESTRATOR_*`
//! environment variables (a `.env` file is honoured).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "QUERY_ORCHESTRATOR_";

/// Backend endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendEndpoints {
    pub intent_url: String,
    pub graph_url: String,
    pub vector_url: String,
}

impl Default for BackendEndpoints {
    fn default() -> Self {
        Self {
            intent_url: "http://127.0.0.1:8080/api/intent".to_string(),
            graph_url: "http://127.0.0.1:8080/api/graph/query".to_string(),
            vector_url: "http://127.0.0.1:8080/api/vector/query".to_string(),
        }
    }
}

/// Configuration for the orchestrator
///
/// # Examples
///
/// ```
/// use query_orchestrator::config::OrchestratorConfig;
///
/// // Millisecond deadlines for tests
/// let config = OrchestratorConfig {
///     intent_deadline_ms: 50,
///     source_deadline_ms: 120,
///     querying_deadline_ms: 150,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Deadline for intent classification (default 5000)
    pub intent_deadline_ms: u64,
    /// Per-source retrieval deadline (default 12000)
    pub source_deadline_ms: u64,
    /// Overall deadline for the querying phase (default 15000)
    pub querying_deadline_ms: u64,
    /// Ask backends to return partial results instead of nothing
    pub include_partial: bool,
    /// Capacity of the run-state broadcast channel
    pub event_capacity: usize,
    pub endpoints: BackendEndpoints,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            intent_deadline_ms: 5_000,
            source_deadline_ms: 12_000,
            querying_deadline_ms: 15_000,
            include_partial: true,
            event_capacity: 1_024,
            endpoints: BackendEndpoints::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn intent_deadline(&self) -> Duration {
        Duration::from_millis(self.intent_deadline_ms)
    }

    pub fn source_deadline(&self) -> Duration {
        Duration::from_millis(self.source_deadline_ms)
    }

    pub fn querying_deadline(&self) -> Duration {
        Duration::from_millis(self.querying_deadline_ms)
    }

    /// Resolve the effective configuration.
    ///
    /// `path` is an explicit config file (must exist). Without it the default
    /// location from [`default_config_path`] is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(default) if default.is_file() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `QUERY_ORCHESTRATOR_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let millis = |name: &str| -> Result<Option<u64>> {
            var(name)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{ENV_PREFIX}{name} must be milliseconds, got '{raw}'"))
                })
                .transpose()
        };

        if let Some(url) = var("INTENT_URL") {
            self.endpoints.intent_url = url;
        }
        if let Some(url) = var("GRAPH_URL") {
            self.endpoints.graph_url = url;
        }
        if let Some(url) = var("VECTOR_URL") {
            self.endpoints.vector_url = url;
        }
        if let Some(ms) = millis("INTENT_DEADLINE_MS")? {
            self.intent_deadline_ms = ms;
        }
        if let Some(ms) = millis("SOURCE_DEADLINE_MS")? {
            self.source_deadline_ms = ms;
        }
        if let Some(ms) = millis("QUERYING_DEADLINE_MS")? {
            self.querying_deadline_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("intent_deadline_ms", self.intent_deadline_ms),
            ("source_deadline_ms", self.source_deadline_ms),
            ("querying_deadline_ms", self.querying_deadline_ms),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.event_capacity == 0 {
            bail!("event_capacity must be greater than zero");
        }
        for (name, url) in [
            ("endpoints.intent_url", &self.endpoints.intent_url),
            ("endpoints.graph_url", &self.endpoints.graph_url),
            ("endpoints.vector_url", &self.endpoints.vector_url),
        ] {
            if url.trim().is_empty() {
                bail!("{name} must not be empty");
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// `<config_dir>/query-orchestrator/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    use directories::ProjectDirs;

    ProjectDirs::from("com", "query-orchestrator", "query-orchestrator")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}
