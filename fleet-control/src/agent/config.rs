//! Agent configuration: node identity, controller endpoint, loop pacing and
//! the check inputs.

use crate::agent::pipeline::CheckConfig;
use crate::logging::config::LoggingConfig;
use duration_str::deserialize_duration;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment fallback for the node API key so it can stay out of the file.
pub const API_KEY_ENV: &str = "FLEET_NODE_KEY";

#[derive(Debug, Error)]
pub enum AgentConfigError {
    #[error("reading config {path}: {err}")]
    Read { path: String, err: String },
    #[error("parsing config {path}: {err}")]
    Parse { path: String, err: String },
    #[error("missing node identity: set node_id and api_key (or {API_KEY_ENV}) after enrolling")]
    MissingIdentity,
}

fn default_controller_url() -> String {
    "http://127.0.0.1:8600".to_string()
}

fn default_interval() -> Duration {
    crate::agent::reporter::DEFAULT_REPORT_INTERVAL
}

fn default_tier() -> String {
    "self_hosted".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub node_id: Option<String>,
    /// Node API key; falls back to the environment when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_controller_url")]
    pub controller_url: String,
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_interval"
    )]
    pub interval: Duration,
    /// Enables the remediation polling loop.
    #[serde(default)]
    pub remediate: bool,
    /// Local dashboard port; the dashboard is off when unset.
    #[serde(default)]
    pub dashboard_port: Option<u16>,
    #[serde(default = "default_tier")]
    pub deployment_tier: String,
    #[serde(default)]
    pub checks: CheckConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config deserializes via defaults")
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self, AgentConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| AgentConfigError::Read {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|err| AgentConfigError::Parse {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })
    }

    /// Node identity for the fleet loops; required unless running one-shot
    /// checks.
    pub fn resolve_identity(&self) -> Result<(String, String), AgentConfigError> {
        let node_id = self
            .node_id
            .as_ref()
            .filter(|id| !id.is_empty())
            .ok_or(AgentConfigError::MissingIdentity)?;
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
            .ok_or(AgentConfigError::MissingIdentity)?;
        Ok((node_id.clone(), api_key))
    }
}
