//! The check pipeline: the same section battery whether it runs from the
//! periodic reporter, a one-shot CLI invocation or the dashboard endpoints.

use crate::checker::local_service::LocalServiceChecks;
use crate::checker::posture::{PostureCollector, local_device_id, probe_local_posture};
use crate::checker::proxy_stats::ProxyStatsChecker;
use crate::checker::supply_chain::BuildSupplyChainChecks;
use crate::checker::tunnel::TunnelChecks;
use crate::checker::{Checker, ComplianceReport};
use crate::http::client::HttpClient;
use crate::http::config::HttpConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const STATS_POLL_TIMEOUT: Duration = Duration::from_secs(5);

fn default_manifest_path() -> PathBuf {
    PathBuf::from("/etc/fips-tunnel/build-manifest.json")
}

fn default_metrics_url() -> String {
    "http://127.0.0.1:9300/metrics".to_string()
}

/// Inputs for the check battery, a section of every component configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
    #[serde(default)]
    pub tunnel_config: Option<PathBuf>,
    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,
    /// Ingress targets (`host:port`) probed by the local-service checks.
    #[serde(default)]
    pub ingress_targets: Vec<String>,
    /// Clients endpoint of the TLS gateway, when one runs nearby.
    #[serde(default)]
    pub gateway_stats_url: Option<String>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            tunnel_config: None,
            metrics_url: default_metrics_url(),
            ingress_targets: Vec::new(),
            gateway_stats_url: None,
        }
    }
}

/// Builds the checker and generates one report against a throwaway posture
/// collector. One-shot callers (CLI, dashboard) use this; the agent loops use
/// [run_checks_with] so they share the process-wide collector.
pub fn run_checks(config: &CheckConfig) -> ComplianceReport {
    run_checks_with(config, &PostureCollector::new())
}

/// Builds the checker and generates one report. The local device's posture is
/// freshly probed and recorded into `posture` first, so the collector always
/// reflects the run it produced. Probe clients are constructed per run; a
/// client build failure downgrades the affected sections rather than aborting
/// the run.
pub fn run_checks_with(config: &CheckConfig, posture: &PostureCollector) -> ComplianceReport {
    let device_id = local_device_id();
    posture.record(&device_id, probe_local_posture());

    let mut checker = Checker::new();

    match HttpClient::new(HttpConfig::new(PROBE_TIMEOUT, PROBE_TIMEOUT)) {
        Ok(probe_client) => {
            let tunnel = TunnelChecks::new(
                probe_client,
                config.metrics_url.clone(),
                config.manifest_path.clone(),
            )
            .with_config_path(config.tunnel_config.clone());
            checker.add_section(tunnel.build_section());
        }
        Err(err) => warn!(error_msg = %err, "could not build probe client, skipping tunnel section"),
    }

    if !config.ingress_targets.is_empty() {
        checker.add_section(LocalServiceChecks::new(config.ingress_targets.clone()).build_section());
    }

    checker.add_section(BuildSupplyChainChecks::new(config.manifest_path.clone()).build_section());

    checker.add_section(posture.build_section(&device_id));

    if let Some(stats_url) = &config.gateway_stats_url {
        match HttpClient::new(HttpConfig::new(STATS_POLL_TIMEOUT, STATS_POLL_TIMEOUT)) {
            Ok(stats_client) => {
                checker.add_section(
                    ProxyStatsChecker::new(stats_client, stats_url.clone()).build_section(),
                );
            }
            Err(err) => {
                warn!(error_msg = %err, "could not build stats client, skipping gateway section")
            }
        }
    }

    checker.generate_report()
}
