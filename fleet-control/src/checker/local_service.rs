//! Local service checks: probes each configured ingress target for TLS
//! reachability, negotiated cipher, certificate validity and raw TCP
//! reachability.
//!
//! Loopback targets get the NIST SP 800-52 §3.5 carve-out: traffic that never
//! leaves the host does not require TLS, so the TLS-facing checks record pass
//! with an explanatory message.

use crate::checker::report::{ChecklistItem, Section, Severity, Status, VerificationMethod};
use crate::http::tls::build_fips_client_config;
use crate::selftest::ciphers::{is_fips_approved, suite_name};
use chrono::{DateTime, TimeZone, Utc};
use rustls::pki_types::ServerName;
use std::net::{IpAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Fixed dial timeout for every probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Certificates expiring within this window draw a warning.
const EXPIRY_WARNING_DAYS: i64 = 30;

pub struct LocalServiceChecks {
    targets: Vec<String>,
}

impl LocalServiceChecks {
    pub fn new(targets: Vec<String>) -> Self {
        Self { targets }
    }

    pub fn build_section(&self) -> Section {
        let mut items = Vec::new();
        for target in &self.targets {
            items.extend(check_target(target));
        }
        Section {
            id: "local-services".to_string(),
            name: "Local services".to_string(),
            description: "TLS posture of configured ingress targets".to_string(),
            items,
        }
    }
}

/// True when the target's host part is a loopback address: 127.0.0.0/8, ::1,
/// or the literal hostname "localhost".
pub fn is_loopback(target: &str) -> bool {
    let host = host_of(target);
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Extracts the host part of a `host:port` target, unwrapping IPv6 brackets.
fn host_of(target: &str) -> &str {
    if let Some(rest) = target.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once(']') {
            return host;
        }
    }
    match target.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => target,
    }
}

fn check_target(target: &str) -> Vec<ChecklistItem> {
    let tls_item = |suffix: &str, name: &str, severity| {
        ChecklistItem::new(
            &format!("svc-{target}-{suffix}"),
            &format!("{name} ({target})"),
            severity,
            VerificationMethod::Probe,
        )
        .with_nist_ref("NIST SP 800-52r2 §3.5")
    };

    let tcp = tcp_item(target);

    if is_loopback(target) {
        let carve_out =
            "loopback target: TLS not required for traffic that never leaves the host";
        return vec![
            tls_item("tls", "TLS reachability", Severity::Medium)
                .with_status(Status::Pass, carve_out),
            tls_item("cipher", "Negotiated cipher", Severity::Medium)
                .with_status(Status::Pass, carve_out),
            tls_item("cert", "Certificate validity", Severity::Medium)
                .with_status(Status::Pass, carve_out),
            tcp,
        ];
    }

    match probe_tls(target) {
        Err(err) => vec![
            tls_item("tls", "TLS reachability", Severity::High)
                .with_status(Status::Fail, format!("TLS handshake failed: {err}"))
                .with_remediation("serve TLS on the ingress target or move it to loopback"),
            tls_item("cipher", "Negotiated cipher", Severity::Medium)
                .with_status(Status::Unknown, "no TLS session to inspect"),
            tls_item("cert", "Certificate validity", Severity::Medium)
                .with_status(Status::Unknown, "no peer certificate received"),
            tcp,
        ],
        Ok(probe) => {
            let cipher_item = if is_fips_approved(probe.cipher) {
                tls_item("cipher", "Negotiated cipher", Severity::Medium).with_status(
                    Status::Pass,
                    format!("negotiated {}", suite_name(probe.cipher)),
                )
            } else {
                tls_item("cipher", "Negotiated cipher", Severity::High).with_status(
                    Status::Fail,
                    format!("negotiated non-approved suite {}", suite_name(probe.cipher)),
                )
            };
            let cert_item = match probe.peer_cert_der {
                Some(der) => certificate_validity_item(target, &der, Utc::now()),
                None => tls_item("cert", "Certificate validity", Severity::Medium)
                    .with_status(Status::Unknown, "no peer certificate received"),
            };
            vec![
                tls_item("tls", "TLS reachability", Severity::Medium)
                    .with_status(Status::Pass, "TLS handshake completed"),
                cipher_item,
                cert_item,
                tcp,
            ]
        }
    }
}

fn tcp_item(target: &str) -> ChecklistItem {
    let item = ChecklistItem::new(
        &format!("svc-{target}-tcp"),
        &format!("TCP reachability ({target})"),
        Severity::Medium,
        VerificationMethod::Probe,
    );
    match probe_tcp(target) {
        Ok(()) => item.with_status(Status::Pass, "TCP connection accepted"),
        Err(err) => item
            .with_status(Status::Fail, format!("TCP connect failed: {err}"))
            .with_remediation("check the service is running and listening on the target"),
    }
}

fn probe_tcp(target: &str) -> Result<(), String> {
    let addr = target
        .to_socket_addrs()
        .map_err(|e| e.to_string())?
        .next()
        .ok_or_else(|| "target resolved to no addresses".to_string())?;
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).map_err(|e| e.to_string())?;
    Ok(())
}

struct TlsProbe {
    cipher: rustls::CipherSuite,
    peer_cert_der: Option<Vec<u8>>,
}

/// Completes a TLS handshake against the target with the FIPS-restricted
/// client config. Verification is disabled: the probe gathers evidence about
/// the peer, it does not establish trust.
fn probe_tls(target: &str) -> Result<TlsProbe, String> {
    let addr = target
        .to_socket_addrs()
        .map_err(|e| e.to_string())?
        .next()
        .ok_or_else(|| "target resolved to no addresses".to_string())?;
    let mut tcp = TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).map_err(|e| e.to_string())?;
    tcp.set_read_timeout(Some(PROBE_TIMEOUT))
        .map_err(|e| e.to_string())?;
    tcp.set_write_timeout(Some(PROBE_TIMEOUT))
        .map_err(|e| e.to_string())?;

    let config = build_fips_client_config(true).map_err(|e| e.to_string())?;
    let server_name = ServerName::try_from(host_of(target).to_string())
        .map_err(|e| format!("invalid server name: {e}"))?;
    let mut conn =
        rustls::ClientConnection::new(Arc::new(config), server_name).map_err(|e| e.to_string())?;

    while conn.is_handshaking() {
        conn.complete_io(&mut tcp).map_err(|e| e.to_string())?;
    }

    let cipher = conn
        .negotiated_cipher_suite()
        .ok_or_else(|| "handshake completed without a negotiated suite".to_string())?
        .suite();
    let peer_cert_der = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|cert| cert.as_ref().to_vec());

    Ok(TlsProbe {
        cipher,
        peer_cert_der,
    })
}

fn certificate_validity_item(target: &str, der: &[u8], now: DateTime<Utc>) -> ChecklistItem {
    let item = ChecklistItem::new(
        &format!("svc-{target}-cert"),
        &format!("Certificate validity ({target})"),
        Severity::Medium,
        VerificationMethod::Probe,
    )
    .with_nist_ref("NIST SP 800-52r2 §3.5");

    let Ok((_, cert)) = X509Certificate::from_der(der) else {
        return item.with_status(Status::Unknown, "peer certificate could not be parsed");
    };
    let validity = cert.validity();
    let not_before = Utc
        .timestamp_opt(validity.not_before.timestamp(), 0)
        .single();
    let not_after = Utc
        .timestamp_opt(validity.not_after.timestamp(), 0)
        .single();
    let (Some(not_before), Some(not_after)) = (not_before, not_after) else {
        return item.with_status(Status::Unknown, "certificate validity window unparseable");
    };

    if now < not_before {
        return item.with_status(
            Status::Fail,
            format!("certificate not valid until {not_before}"),
        );
    }
    if now > not_after {
        return item
            .with_status(Status::Fail, format!("certificate expired {not_after}"))
            .with_remediation("rotate the service certificate");
    }
    let days_left = (not_after - now).num_days();
    if days_left <= EXPIRY_WARNING_DAYS {
        return item
            .with_status(
                Status::Warning,
                format!("certificate expires in {days_left} days"),
            )
            .with_remediation("rotate the service certificate before expiry");
    }
    item.with_status(
        Status::Pass,
        format!("valid until {not_after} ({days_left} days)"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn loopback_carve_out_law() {
        assert!(is_loopback("localhost:8080"));
        assert!(is_loopback("127.0.0.1:8080"));
        assert!(is_loopback("127.1.2.3:443"));
        assert!(is_loopback("[::1]:8080"));
        assert!(!is_loopback("10.0.0.1:8080"));
        assert!(!is_loopback("example.com:443"));
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("localhost:8080"), "localhost");
        assert_eq!(host_of("[::1]:8080"), "::1");
        assert_eq!(host_of("10.0.0.1:443"), "10.0.0.1");
        assert_eq!(host_of("bare-host"), "bare-host");
    }

    #[test]
    fn loopback_target_passes_tls_items_without_probing_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let target = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

        let items = check_target(&target);
        assert_eq!(items.len(), 4);
        // TLS-facing items pass via the carve-out even though the listener
        // speaks no TLS at all
        assert_eq!(items[0].status, Status::Pass);
        assert!(items[0].what.contains("loopback"));
        assert_eq!(items[1].status, Status::Pass);
        assert_eq!(items[2].status, Status::Pass);
        // TCP probe actually connected
        assert_eq!(items[3].status, Status::Pass);
    }

    #[test]
    fn tcp_probe_failure_is_reported() {
        // Port 1 on loopback is essentially never listening
        let items = check_target("127.0.0.1:1");
        let tcp = items.last().unwrap();
        assert_eq!(tcp.status, Status::Fail);
        assert!(tcp.what.contains("TCP connect failed"));
    }

    #[test]
    fn certificate_validity_window() {
        let rcgen::CertifiedKey { cert, .. } =
            rcgen::generate_simple_self_signed(vec!["svc.internal".to_string()]).unwrap();
        let der = cert.der().as_ref().to_vec();

        let item = certificate_validity_item("svc.internal:443", &der, Utc::now());
        assert_eq!(item.status, Status::Pass);

        // Far future: past rcgen's default not_after
        let far_future = Utc::now() + chrono::Duration::days(365 * 200);
        let item = certificate_validity_item("svc.internal:443", &der, far_future);
        assert_eq!(item.status, Status::Fail);
        assert!(item.what.contains("expired"));
    }

    #[test]
    fn garbage_certificate_is_unknown() {
        let item = certificate_validity_item("svc:443", b"not-a-certificate", Utc::now());
        assert_eq!(item.status, Status::Unknown);
    }
}
