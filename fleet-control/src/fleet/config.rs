//! Controller configuration, deserialized from YAML with per-field defaults.

use crate::agent::pipeline::CheckConfig;
use crate::fleet::monitor::MonitorConfig;
use crate::logging::config::LoggingConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ADMIN_KEY_ENV: &str = "FLEET_ADMIN_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {err}")]
    Read { path: String, err: String },
    #[error("parsing config {path}: {err}")]
    Parse { path: String, err: String },
    #[error("missing admin key: set admin_key in the config or {ADMIN_KEY_ENV} in the environment")]
    MissingAdminKey,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8600
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/fips-fleet/fleet.db")
}

fn default_tier() -> String {
    "self_hosted".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Admin bearer key; falls back to the environment when absent.
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_tier")]
    pub deployment_tier: String,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub checks: CheckConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config deserializes via defaults")
    }
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|err| ConfigError::Parse {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })
    }

    /// Resolves the admin key from the config or the environment; a missing
    /// key is a fatal configuration error.
    pub fn resolve_admin_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.admin_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(ADMIN_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingAdminKey)
    }
}
