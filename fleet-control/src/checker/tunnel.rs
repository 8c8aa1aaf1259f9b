//! Tunnel daemon checks: the core section combining backend detection, OS
//! mode, self-test, TLS configuration and binary integrity evidence.

use crate::backend;
use crate::checker::manifest::BuildManifest;
use crate::checker::report::{
    ChecklistItem, Section, Severity, Status, VerificationMethod,
};
use crate::http::tls::fips_restricted_provider;
use crate::selftest::{self, SelfTestStatus};
use crate::selftest::ciphers::{is_approved_curve, is_fips_approved, suite_name};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Fixed locations searched for the tunnel origin certificate.
const TUNNEL_CERT_PATHS: &[&str] = &[
    "/etc/fips-tunnel/cert.pem",
    "/usr/local/etc/fips-tunnel/cert.pem",
    "/root/.fips-tunnel/cert.pem",
];

/// Kernel flag exposing the OS-wide FIPS mode on Linux.
const LINUX_FIPS_MODE_FILE: &str = "/proc/sys/crypto/fips_enabled";

/// HTTP client surface needed by the redundancy probe; implemented by
/// [crate::http::client::HttpClient] and mocked in tests.
pub trait MetricsFetcher {
    fn fetch(&self, url: &str) -> Result<String, String>;
}

impl MetricsFetcher for crate::http::client::HttpClient {
    fn fetch(&self, url: &str) -> Result<String, String> {
        let request = http::Request::builder()
            .method("GET")
            .uri(url)
            .body(Vec::new())
            .map_err(|e| e.to_string())?;
        let response = self.send(request).map_err(|e| e.to_string())?;
        Ok(String::from_utf8_lossy(response.body()).into_owned())
    }
}

/// Inputs for the tunnel section, resolved from the agent configuration.
pub struct TunnelChecks<F: MetricsFetcher> {
    pub metrics_fetcher: F,
    pub metrics_url: String,
    pub manifest_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub cert_paths: Vec<PathBuf>,
}

impl<F: MetricsFetcher> TunnelChecks<F> {
    pub fn new(metrics_fetcher: F, metrics_url: String, manifest_path: PathBuf) -> Self {
        Self {
            metrics_fetcher,
            metrics_url,
            manifest_path,
            config_path: None,
            cert_paths: TUNNEL_CERT_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_config_path(self, config_path: Option<PathBuf>) -> Self {
        Self {
            config_path,
            ..self
        }
    }

    pub fn build_section(&self) -> Section {
        let manifest = BuildManifest::load(&self.manifest_path).ok();
        let items = vec![
            backend_detection_item(),
            os_fips_mode_item(Path::new(LINUX_FIPS_MODE_FILE)),
            self_test_item(),
            tunnel_protocol_item(self.config_path.as_deref()),
            tls_version_floor_item(),
            cipher_audit_item(),
            curve_item(),
            tunnel_certificate_item(&self.cert_paths),
            redundancy_item(&self.metrics_fetcher, &self.metrics_url),
            binary_integrity_item(manifest.as_ref(), std::env::current_exe().ok().as_deref()),
            config_drift_item(self.config_path.as_deref()),
            module_identification_item(),
        ];
        Section {
            id: "tunnel".to_string(),
            name: "Tunnel".to_string(),
            description: "FIPS posture of the local TLS tunnel daemon".to_string(),
            items,
        }
    }
}

fn backend_detection_item() -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-1",
        "FIPS backend detection",
        Severity::Critical,
        VerificationMethod::Direct,
    )
    .with_why("all tunnel cryptography must run inside a validated module")
    .with_nist_ref("FIPS 140-3 §7.2");
    let info = backend::detect_info();
    if info.active {
        item.with_status(
            Status::Pass,
            format!("{} (CMVP #{})", info.display_name, info.cmvp_certificate),
        )
    } else {
        item.with_status(Status::Fail, "no validated FIPS backend is active")
            .with_remediation("run a FIPS-enabled build or set the crypto debug environment")
    }
}

fn os_fips_mode_item(flag_file: &Path) -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-2",
        "OS FIPS mode",
        Severity::Medium,
        VerificationMethod::Direct,
    )
    .with_why("kernel FIPS mode constrains every crypto consumer on the host")
    .with_nist_ref("FIPS 140-3 §7.9");
    if !cfg!(target_os = "linux") {
        return item.with_status(
            Status::Unknown,
            format!("kernel flag not exposed on {}", std::env::consts::OS),
        );
    }
    match std::fs::read_to_string(flag_file) {
        Ok(contents) if contents.trim() == "1" => {
            item.with_status(Status::Pass, "kernel FIPS mode enabled")
        }
        Ok(_) => item
            .with_status(Status::Warning, "kernel FIPS mode is not enabled")
            .with_remediation("enable FIPS mode (fips-mode-setup --enable) and reboot"),
        Err(err) => item.with_status(
            Status::Unknown,
            format!("could not read {}: {err}", flag_file.display()),
        ),
    }
}

fn self_test_item() -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-3",
        "Cryptographic self-test",
        Severity::Critical,
        VerificationMethod::Direct,
    )
    .with_why("known answer tests prove the module computes correct results")
    .with_nist_ref("FIPS 140-3 §7.10");
    let (results, outcome) = selftest::run_all_checks();
    match outcome {
        Ok(()) => {
            let warnings = results
                .iter()
                .filter(|r| r.status == SelfTestStatus::Warning)
                .count();
            if warnings == 0 {
                item.with_status(Status::Pass, format!("{} checks passed", results.len()))
            } else {
                item.with_status(
                    Status::Warning,
                    format!("{warnings} non-critical self-test warnings"),
                )
            }
        }
        Err(err) => item.with_status(Status::Fail, err.to_string()),
    }
}

fn tunnel_protocol_item(config_path: Option<&Path>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-4",
        "Tunnel protocol",
        Severity::Low,
        VerificationMethod::Direct,
    )
    .with_why("the transport protocol determines which TLS stack carries traffic");
    let Some(config_path) = config_path else {
        return item.with_status(Status::Unknown, "no tunnel configuration provided");
    };
    let Ok(raw) = std::fs::read_to_string(config_path) else {
        return item.with_status(
            Status::Unknown,
            format!("could not read {}", config_path.display()),
        );
    };
    match parse_protocol(&raw) {
        Some(protocol) => item.with_status(Status::Pass, format!("protocol: {protocol}")),
        None => item.with_status(Status::Unknown, "no protocol declared in configuration"),
    }
}

fn parse_protocol(raw_config: &str) -> Option<String> {
    serde_yaml::from_str::<serde_yaml::Value>(raw_config)
        .ok()?
        .get("protocol")?
        .as_str()
        .map(str::to_string)
}

fn tls_version_floor_item() -> ChecklistItem {
    // The restricted config only ever offers TLS 1.2 and 1.3.
    ChecklistItem::new(
        "t-5",
        "TLS version floor",
        Severity::High,
        VerificationMethod::Direct,
    )
    .with_why("TLS below 1.2 is not acceptable for federal systems")
    .with_nist_ref("NIST SP 800-52r2 §3.1")
    .with_status(Status::Pass, "minimum negotiated version is TLS 1.2")
}

fn cipher_audit_item() -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-6",
        "Cipher-suite audit",
        Severity::Critical,
        VerificationMethod::Direct,
    )
    .with_why("only AES-GCM and approved CBC suites may be negotiated")
    .with_nist_ref("NIST SP 800-52r2 §3.3.1");
    let suites = match rustls::crypto::CryptoProvider::get_default() {
        Some(provider) => provider.cipher_suites.clone(),
        None => rustls::crypto::ring::default_provider().cipher_suites,
    };
    let non_approved: Vec<String> = suites
        .iter()
        .filter(|s| !is_fips_approved(s.suite()))
        .map(|s| suite_name(s.suite()))
        .collect();
    if non_approved.is_empty() {
        item.with_status(
            Status::Pass,
            format!("{} registered suites, all approved", suites.len()),
        )
    } else if backend::detect().is_some() {
        item.with_status(
            Status::Pass,
            format!(
                "non-approved suites blocked at runtime: {}",
                non_approved.join(", ")
            ),
        )
    } else {
        item.with_status(
            Status::Fail,
            format!("non-approved suites negotiable: {}", non_approved.join(", ")),
        )
        .with_remediation("install the FIPS-restricted crypto provider before serving TLS")
    }
}

fn curve_item() -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-7",
        "Key-exchange curves",
        Severity::High,
        VerificationMethod::Direct,
    )
    .with_why("key agreement must use NIST curves P-256 or P-384")
    .with_nist_ref("NIST SP 800-56Ar3");
    let provider = fips_restricted_provider();
    let bad: Vec<String> = provider
        .kx_groups
        .iter()
        .filter(|g| !is_approved_curve(g.name()))
        .map(|g| format!("{:?}", g.name()))
        .collect();
    if bad.is_empty() {
        item.with_status(Status::Pass, "only P-256/P-384 key exchange enabled")
    } else {
        item.with_status(
            Status::Fail,
            format!("non-approved key-exchange groups: {}", bad.join(", ")),
        )
    }
}

fn tunnel_certificate_item(cert_paths: &[PathBuf]) -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-8",
        "Tunnel certificate",
        Severity::Medium,
        VerificationMethod::Direct,
    )
    .with_why("the daemon needs an origin certificate or a token to authenticate");
    if let Some(found) = cert_paths.iter().find(|p| p.exists()) {
        return item.with_status(
            Status::Pass,
            format!("origin certificate at {}", found.display()),
        );
    }
    if token_authenticated_tunnel_running() {
        return item.with_status(
            Status::Pass,
            "no certificate file, token-based authentication in use",
        );
    }
    item.with_status(
        Status::Warning,
        "no origin certificate found and no token-authenticated tunnel process detected",
    )
    .with_remediation("provision an origin certificate or run the tunnel with a token")
}

/// Process-table heuristic: a tunnel process started with `--token` carries
/// its credential inline instead of a certificate file.
fn token_authenticated_tunnel_running() -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let cmdline = String::from_utf8_lossy(&cmdline);
        if cmdline.contains("tunnel") && cmdline.contains("--token") {
            return true;
        }
    }
    false
}

fn redundancy_item<F: MetricsFetcher>(fetcher: &F, metrics_url: &str) -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-9",
        "Tunnel redundancy",
        Severity::Low,
        VerificationMethod::Probe,
    )
    .with_why("multiple registered connections keep the tunnel up through edge restarts");
    match fetcher.fetch(metrics_url) {
        Err(err) => item.with_status(
            Status::Unknown,
            format!("metrics endpoint unreachable: {err}"),
        ),
        Ok(body) => match parse_active_connections(&body) {
            None => item.with_status(
                Status::Unknown,
                "metrics endpoint reachable but no connection gauge found",
            ),
            Some(0) => item
                .with_status(Status::Warning, "no registered tunnel connections")
                .with_remediation("check daemon logs for connection failures"),
            Some(1) => item
                .with_status(Status::Warning, "single tunnel connection, no redundancy")
                .with_remediation("raise the connection count for high availability"),
            Some(n) => item.with_status(Status::Pass, format!("{n} registered connections")),
        },
    }
}

fn parse_active_connections(metrics_body: &str) -> Option<u64> {
    metrics_body
        .lines()
        .find(|line| line.starts_with("tunnel_active_connections"))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|value| value.parse().ok())
}

fn binary_integrity_item(manifest: Option<&BuildManifest>, exe: Option<&Path>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-10",
        "Binary integrity",
        Severity::High,
        VerificationMethod::Direct,
    )
    .with_why("the running executable must match the hash recorded at build time")
    .with_nist_ref("FIPS 140-3 §7.10 (software integrity)");
    let Some(manifest) = manifest else {
        return item.with_status(Status::Unknown, "no build manifest available");
    };
    if manifest.binary_sha256.is_empty() {
        return item.with_status(Status::Warning, "build manifest carries no binary hash");
    }
    let Some(exe) = exe else {
        return item.with_status(Status::Unknown, "running executable path unavailable");
    };
    match sha256_hex_of_file(exe) {
        Err(err) => item.with_status(Status::Unknown, format!("could not hash executable: {err}")),
        Ok(actual) if actual == manifest.binary_sha256 => {
            item.with_status(Status::Pass, format!("sha256 {actual} matches the manifest"))
        }
        Ok(actual) => item.with_status(
            Status::Fail,
            format!(
                "binary hash mismatch: manifest {} but executable {}",
                manifest.binary_sha256, actual
            ),
        ),
    }
}

fn config_drift_item(config_path: Option<&Path>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-11",
        "Configuration drift",
        Severity::Low,
        VerificationMethod::Direct,
    )
    .with_why("a recorded configuration hash lets operators spot unreviewed edits");
    let Some(config_path) = config_path else {
        return item.with_status(Status::Unknown, "no tunnel configuration provided");
    };
    match sha256_hex_of_file(config_path) {
        Ok(hash) => item.with_status(
            Status::Pass,
            format!("configuration present, sha256 {hash}"),
        ),
        Err(err) => item.with_status(
            Status::Unknown,
            format!("could not read {}: {err}", config_path.display()),
        ),
    }
}

fn module_identification_item() -> ChecklistItem {
    let item = ChecklistItem::new(
        "t-12",
        "FIPS module identification",
        Severity::Info,
        VerificationMethod::Direct,
    )
    .with_why("reports must name the exact validated module and certificate");
    let info = backend::detect_info();
    if info.active {
        item.with_status(
            Status::Pass,
            format!(
                "{} / {} (CMVP #{})",
                info.name, info.fips_standard, info.cmvp_certificate
            ),
        )
    } else {
        item.with_status(Status::Warning, "no module to identify")
    }
}

fn sha256_hex_of_file(path: &Path) -> Result<String, std::io::Error> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use tempfile::tempdir;

    mock! {
        pub Fetcher {}
        impl MetricsFetcher for Fetcher {
            fn fetch(&self, url: &str) -> Result<String, String>;
        }
    }

    #[test]
    fn binary_integrity_matches_manifest_hash() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("daemon");
        std::fs::write(&exe, b"executable bytes").unwrap();
        let expected = hex::encode(Sha256::digest(b"executable bytes"));

        let manifest = BuildManifest {
            binary_sha256: expected,
            ..Default::default()
        };
        let item = binary_integrity_item(Some(&manifest), Some(&exe));
        assert_eq!(item.status, Status::Pass);
        assert_eq!(item.id, "t-10");
    }

    #[test]
    fn binary_integrity_mismatch_fails_with_mismatch_message() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("daemon");
        std::fs::write(&exe, b"executable bytes").unwrap();

        let manifest = BuildManifest {
            binary_sha256: "0".repeat(64),
            ..Default::default()
        };
        let item = binary_integrity_item(Some(&manifest), Some(&exe));
        assert_eq!(item.status, Status::Fail);
        assert!(item.what.contains("mismatch"));
    }

    #[test]
    fn binary_integrity_empty_manifest_hash_is_warning() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("daemon");
        std::fs::write(&exe, b"executable bytes").unwrap();

        let manifest = BuildManifest::default();
        let item = binary_integrity_item(Some(&manifest), Some(&exe));
        assert_eq!(item.status, Status::Warning);
    }

    #[test]
    fn config_drift_absent_config_is_unknown() {
        let item = config_drift_item(None);
        assert_eq!(item.status, Status::Unknown);

        let item = config_drift_item(Some(Path::new("/nonexistent/config.yaml")));
        assert_eq!(item.status, Status::Unknown);
    }

    #[test]
    fn config_drift_records_hash() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, "protocol: quic\n").unwrap();
        let item = config_drift_item(Some(&config));
        assert_eq!(item.status, Status::Pass);
        assert!(item.what.contains("sha256"));
    }

    #[test]
    fn protocol_parsed_from_config() {
        assert_eq!(parse_protocol("protocol: quic\n"), Some("quic".to_string()));
        assert_eq!(parse_protocol("other: value\n"), None);
        assert_eq!(parse_protocol(": : :"), None);
    }

    #[test]
    fn redundancy_reads_connection_gauge() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok("tunnel_active_connections 4\n".to_string()));
        let item = redundancy_item(&fetcher, "http://127.0.0.1:9300/metrics");
        assert_eq!(item.status, Status::Pass);

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok("tunnel_active_connections 1\n".to_string()));
        let item = redundancy_item(&fetcher, "http://127.0.0.1:9300/metrics");
        assert_eq!(item.status, Status::Warning);
    }

    #[test]
    fn redundancy_unreachable_is_unknown() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err("connection refused".to_string()));
        let item = redundancy_item(&fetcher, "http://127.0.0.1:9300/metrics");
        assert_eq!(item.status, Status::Unknown);
    }

    #[test]
    fn section_has_twelve_items_with_stable_ids() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().returning(|_| Err("down".to_string()));
        let checks = TunnelChecks::new(
            fetcher,
            "http://127.0.0.1:9300/metrics".to_string(),
            PathBuf::from("/nonexistent/manifest.json"),
        );
        let section = checks.build_section();
        assert_eq!(section.items.len(), 12);
        for (idx, item) in section.items.iter().enumerate() {
            assert_eq!(item.id, format!("t-{}", idx + 1));
        }
    }
}
