//! Gateway configuration. The certificate and key paths are required; a
//! missing entry is a fatal startup error.

use crate::logging::config::LoggingConfig;
use crate::proxy::inspector::DEFAULT_RING_CAPACITY;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayConfigError {
    #[error("reading config {path}: {err}")]
    Read { path: String, err: String },
    #[error("parsing config {path}: {err}")]
    Parse { path: String, err: String },
}

fn default_listen_addr() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_stats_addr() -> String {
    "127.0.0.1:9400".to_string()
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_ring_capacity() -> usize {
    DEFAULT_RING_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_stats_addr")]
    pub stats_addr: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    #[serde(default)]
    pub upstream_tls: bool,
    /// Development only: skip upstream certificate verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, GatewayConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| GatewayConfigError::Read {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|err| GatewayConfigError::Parse {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })
    }

    /// The upstream URL the proxy actually dials: with `upstream_tls` an
    /// `http://` upstream is auto-upgraded to `https://`.
    pub fn effective_upstream_url(&self) -> String {
        if self.upstream_tls {
            if let Some(rest) = self.upstream_url.strip_prefix("http://") {
                return format!("https://{rest}");
            }
        }
        self.upstream_url.clone()
    }
}
