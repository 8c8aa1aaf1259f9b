//! ClientHello inspection.
//!
//! The gateway's certificate resolver routes every handshake through
//! [ClientInspector::record]: the offered cipher list is classified against
//! the approved set, a record lands in a bounded ring buffer and the running
//! counters advance. The handshake itself always proceeds; inspection never
//! rejects a connection. One inspector instance exists per gateway process so
//! every call path feeds the same summary.

use crate::checker::proxy_stats::ClientsSummary;
use crate::selftest::ciphers::{is_fips_capable, suite_name};
use crate::utils::time::now_rfc3339;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use rustls::CipherSuite;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Default capacity of the recent-clients ring buffer.
pub const DEFAULT_RING_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum InspectorError {
    #[error("registering metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRecord {
    pub timestamp: String,
    pub server_name: Option<String>,
    pub fips_capable: bool,
    pub offered_suites: Vec<String>,
}

pub struct ClientInspector {
    capacity: usize,
    recent: Mutex<VecDeque<ClientRecord>>,
    registry: Registry,
    total: IntCounter,
    fips_capable: IntCounter,
    non_fips: IntCounter,
}

impl ClientInspector {
    pub fn new(capacity: usize) -> Result<Self, InspectorError> {
        let registry = Registry::new();
        let total = IntCounter::new(
            "fips_proxy_clients_total",
            "Total client connections inspected",
        )?;
        let fips_capable = IntCounter::new(
            "fips_proxy_clients_fips",
            "Client connections offering at least one FIPS-approved cipher",
        )?;
        let non_fips = IntCounter::new(
            "fips_proxy_clients_nonfips",
            "Client connections offering no FIPS-approved cipher",
        )?;
        registry.register(Box::new(total.clone()))?;
        registry.register(Box::new(fips_capable.clone()))?;
        registry.register(Box::new(non_fips.clone()))?;
        Ok(Self {
            capacity: capacity.max(1),
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            registry,
            total,
            fips_capable,
            non_fips,
        })
    }

    /// Classifies one ClientHello offer and records it. Returns the
    /// classification for the caller's own use.
    pub fn record(&self, offered: &[CipherSuite], server_name: Option<&str>) -> bool {
        let fips_capable = is_fips_capable(offered);
        self.total.inc();
        if fips_capable {
            self.fips_capable.inc();
        } else {
            self.non_fips.inc();
        }

        let record = ClientRecord {
            timestamp: now_rfc3339(),
            server_name: server_name.map(str::to_string),
            fips_capable,
            offered_suites: offered.iter().map(|s| suite_name(*s)).collect(),
        };
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(record);
        fips_capable
    }

    /// Copy-out snapshot for the clients endpoint.
    pub fn snapshot(&self) -> (Vec<ClientRecord>, ClientsSummary) {
        let recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        let records: Vec<ClientRecord> = recent.iter().cloned().collect();
        (records, self.summary())
    }

    pub fn summary(&self) -> ClientsSummary {
        ClientsSummary {
            total: self.total.get(),
            fips_capable: self.fips_capable.get(),
            non_fips: self.non_fips.get(),
        }
    }

    /// Prometheus text exposition of the three counters.
    pub fn render_metrics(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Certificate resolver that funnels every ClientHello through the inspector
/// before serving the configured certificate.
pub struct InspectingCertResolver {
    certified_key: Arc<CertifiedKey>,
    inspector: Arc<ClientInspector>,
}

impl InspectingCertResolver {
    pub fn new(certified_key: Arc<CertifiedKey>, inspector: Arc<ClientInspector>) -> Self {
        Self {
            certified_key,
            inspector,
        }
    }
}

impl std::fmt::Debug for InspectingCertResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectingCertResolver").finish_non_exhaustive()
    }
}

impl ResolvesServerCert for InspectingCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.inspector
            .record(client_hello.cipher_suites(), client_hello.server_name());
        Some(self.certified_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_feeds_counters_and_ring() {
        let inspector = ClientInspector::new(DEFAULT_RING_CAPACITY).unwrap();

        // Mixed offer including an approved suite: FIPS-capable
        assert!(inspector.record(
            &[
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                CipherSuite::TLS13_AES_128_GCM_SHA256,
            ],
            Some("origin.example"),
        ));
        // ChaCha20-only offer: non-FIPS
        assert!(!inspector.record(
            &[CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256],
            None,
        ));

        let (recent, summary) = inspector.snapshot();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.fips_capable, 1);
        assert_eq!(summary.non_fips, 1);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].fips_capable);
        assert_eq!(recent[0].server_name.as_deref(), Some("origin.example"));
        assert!(!recent[1].fips_capable);
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let inspector = ClientInspector::new(3).unwrap();
        for i in 0..5 {
            let name = format!("client-{i}");
            inspector.record(&[CipherSuite::TLS13_AES_128_GCM_SHA256], Some(&name));
        }
        let (recent, summary) = inspector.snapshot();
        // Counters are monotonic, the ring holds only the last 3
        assert_eq!(summary.total, 5);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].server_name.as_deref(), Some("client-2"));
        assert_eq!(recent[2].server_name.as_deref(), Some("client-4"));
    }

    #[test]
    fn metrics_exposition_has_help_and_type_lines() {
        let inspector = ClientInspector::new(16).unwrap();
        inspector.record(&[CipherSuite::TLS13_AES_128_GCM_SHA256], None);
        inspector.record(
            &[CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256],
            None,
        );

        let text = inspector.render_metrics();
        assert!(text.contains("# HELP fips_proxy_clients_total"));
        assert!(text.contains("# TYPE fips_proxy_clients_total counter"));
        assert!(text.contains("fips_proxy_clients_total 2"));
        assert!(text.contains("# HELP fips_proxy_clients_fips"));
        assert!(text.contains("# TYPE fips_proxy_clients_fips counter"));
        assert!(text.contains("fips_proxy_clients_fips 1"));
        assert!(text.contains("# HELP fips_proxy_clients_nonfips"));
        assert!(text.contains("# TYPE fips_proxy_clients_nonfips counter"));
        assert!(text.contains("fips_proxy_clients_nonfips 1"));
    }

    #[test]
    fn empty_offer_classifies_non_fips() {
        let inspector = ClientInspector::new(16).unwrap();
        assert!(!inspector.record(&[], None));
        assert_eq!(inspector.summary().non_fips, 1);
    }
}
