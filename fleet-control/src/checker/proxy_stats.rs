//! Gateway client checks: polls the TLS gateway's clients endpoint and turns
//! the FIPS-capability summary into checklist items. Fail-closed: when the
//! gateway is unreachable every item reports `unknown`.

use crate::checker::report::{ChecklistItem, Section, Severity, Status, VerificationMethod};
use serde::{Deserialize, Serialize};

/// Client surface for the stats poll; the production implementation is an
/// [crate::http::client::HttpClient] built with the 5 s poll timeout.
pub trait StatsFetcher {
    fn fetch_clients(&self, url: &str) -> Result<String, String>;
}

impl StatsFetcher for crate::http::client::HttpClient {
    fn fetch_clients(&self, url: &str) -> Result<String, String> {
        let request = http::Request::builder()
            .method("GET")
            .uri(url)
            .body(Vec::new())
            .map_err(|e| e.to_string())?;
        let response = self.send(request).map_err(|e| e.to_string())?;
        Ok(String::from_utf8_lossy(response.body()).into_owned())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientsSummary {
    pub total: u64,
    pub fips_capable: u64,
    pub non_fips: u64,
}

#[derive(Debug, Deserialize)]
struct ClientsResponse {
    summary: ClientsSummary,
}

pub struct ProxyStatsChecker<F: StatsFetcher> {
    fetcher: F,
    clients_url: String,
}

impl<F: StatsFetcher> ProxyStatsChecker<F> {
    pub fn new(fetcher: F, clients_url: String) -> Self {
        Self {
            fetcher,
            clients_url,
        }
    }

    pub fn build_section(&self) -> Section {
        let summary = self
            .fetcher
            .fetch_clients(&self.clients_url)
            .and_then(|body| {
                serde_json::from_str::<ClientsResponse>(&body)
                    .map(|r| r.summary)
                    .map_err(|e| format!("unparseable clients response: {e}"))
            });
        Section {
            id: "gateway-clients".to_string(),
            name: "Gateway clients".to_string(),
            description: "FIPS capability of clients observed by the TLS gateway".to_string(),
            items: items_for(summary),
        }
    }
}

fn items_for(summary: Result<ClientsSummary, String>) -> Vec<ChecklistItem> {
    let item = |id: &str, name: &str, severity| {
        ChecklistItem::new(id, name, severity, VerificationMethod::Api)
            .with_why("non-FIPS clients indicate endpoints that would break under enforcement")
    };

    match summary {
        Err(err) => {
            let unreachable = format!("gateway stats unreachable: {err}");
            vec![
                item("g-1", "Gateway reachability", Severity::Medium)
                    .with_status(Status::Unknown, unreachable.clone()),
                item("g-2", "Connection volume", Severity::Info)
                    .with_status(Status::Unknown, unreachable.clone()),
                item("g-3", "FIPS-capable ratio", Severity::Medium)
                    .with_status(Status::Unknown, unreachable.clone()),
                item("g-4", "Non-FIPS clients", Severity::Medium)
                    .with_status(Status::Unknown, unreachable),
            ]
        }
        Ok(summary) => {
            let reachability = item("g-1", "Gateway reachability", Severity::Medium)
                .with_status(Status::Pass, "gateway stats endpoint reachable");
            let volume = item("g-2", "Connection volume", Severity::Info).with_status(
                Status::Pass,
                format!("{} connections observed", summary.total),
            );
            let (ratio, non_fips) = if summary.total == 0 {
                (
                    item("g-3", "FIPS-capable ratio", Severity::Medium)
                        .with_status(Status::Unknown, "no client connections recorded yet"),
                    item("g-4", "Non-FIPS clients", Severity::Medium)
                        .with_status(Status::Unknown, "no client connections recorded yet"),
                )
            } else {
                let pct = summary.fips_capable as f64 * 100.0 / summary.total as f64;
                let ratio = if summary.fips_capable == summary.total {
                    item("g-3", "FIPS-capable ratio", Severity::Medium)
                        .with_status(Status::Pass, "100% of observed clients are FIPS-capable")
                } else {
                    item("g-3", "FIPS-capable ratio", Severity::Medium)
                        .with_status(
                            Status::Warning,
                            format!(
                                "{pct:.1}% of clients FIPS-capable ({}/{})",
                                summary.fips_capable, summary.total
                            ),
                        )
                        .with_remediation("upgrade the non-capable clients before enforcement")
                };
                let non_fips = if summary.non_fips == 0 {
                    item("g-4", "Non-FIPS clients", Severity::Medium)
                        .with_status(Status::Pass, "no non-FIPS clients observed")
                } else {
                    item("g-4", "Non-FIPS clients", Severity::Medium)
                        .with_status(
                            Status::Warning,
                            format!("{} non-FIPS client connections", summary.non_fips),
                        )
                        .with_remediation("identify the non-FIPS clients from the gateway records")
                };
                (ratio, non_fips)
            };
            vec![reachability, volume, ratio, non_fips]
        }
    }
}
