//! HTTP client for the controller's fleet API, used by the reporter and the
//! remediation poller.

use crate::checker::ComplianceReport;
use crate::fleet::api::{AGENT_VERSION_HEADER, FIPS_BACKEND_HEADER};
use crate::fleet::types::{RemediationRequest, RemediationResult};
use crate::http::client::{HttpClient, HttpError};
use http::Request;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetClientError {
    #[error("building request: {0}")]
    BuildingRequest(String),
    #[error("encoding body: {0}")]
    Encoding(String),
    #[error("decoding response: {0}")]
    Decoding(String),
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl FleetClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FleetClientError::Http(err) if err.is_transient())
    }
}

/// Role and region are bound by the token; restating them is optional and
/// must match the binding when present.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollRequest {
    pub token: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub labels: HashMap<String, String>,
    pub version: String,
    pub fips_backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollResponse {
    pub node_id: String,
    pub api_key: String,
}

/// Client bound to one node identity.
pub struct FleetClient {
    http: HttpClient,
    base_url: String,
    node_id: String,
    api_key: String,
    version: String,
    fips_backend: String,
}

impl FleetClient {
    pub fn new(
        http: HttpClient,
        base_url: &str,
        node_id: &str,
        api_key: &str,
        version: &str,
        fips_backend: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            node_id: node_id.to_string(),
            api_key: api_key.to_string(),
            version: version.to_string(),
            fips_backend: fips_backend.to_string(),
        }
    }

    /// One-shot enrollment: exchanges a token for a node identity. The
    /// returned API key is shown once and must be persisted by the caller.
    pub fn enroll(
        http: &HttpClient,
        base_url: &str,
        request: &EnrollRequest,
    ) -> Result<EnrollResponse, FleetClientError> {
        let url = format!("{}/api/v1/fleet/enroll", base_url.trim_end_matches('/'));
        let body =
            serde_json::to_vec(request).map_err(|e| FleetClientError::Encoding(e.to_string()))?;
        let req = Request::builder()
            .method("POST")
            .uri(url)
            .header("content-type", "application/json")
            .body(body)
            .map_err(|e| FleetClientError::BuildingRequest(e.to_string()))?;
        let response = http.send(req)?;
        serde_json::from_slice(response.body())
            .map_err(|e| FleetClientError::Decoding(e.to_string()))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn push_report(&self, report: &ComplianceReport) -> Result<(), FleetClientError> {
        let body =
            serde_json::to_vec(report).map_err(|e| FleetClientError::Encoding(e.to_string()))?;
        let req = self
            .request_builder("POST", &format!("nodes/{}/report", self.node_id))
            .header(AGENT_VERSION_HEADER, &self.version)
            .header(FIPS_BACKEND_HEADER, &self.fips_backend)
            .header("content-type", "application/json")
            .body(body)
            .map_err(|e| FleetClientError::BuildingRequest(e.to_string()))?;
        self.http.send(req)?;
        Ok(())
    }

    pub fn heartbeat(&self) -> Result<(), FleetClientError> {
        let body = serde_json::json!({
            "version": self.version,
            "fips_backend": self.fips_backend,
        });
        let req = self
            .request_builder("POST", &format!("nodes/{}/heartbeat", self.node_id))
            .header("content-type", "application/json")
            .body(body.to_string().into_bytes())
            .map_err(|e| FleetClientError::BuildingRequest(e.to_string()))?;
        self.http.send(req)?;
        Ok(())
    }

    pub fn poll_remediations(&self) -> Result<Vec<RemediationRequest>, FleetClientError> {
        let req = self
            .request_builder("GET", &format!("nodes/{}/remediate", self.node_id))
            .body(Vec::new())
            .map_err(|e| FleetClientError::BuildingRequest(e.to_string()))?;
        let response = self.http.send(req)?;
        serde_json::from_slice(response.body())
            .map_err(|e| FleetClientError::Decoding(e.to_string()))
    }

    pub fn post_remediation_result(
        &self,
        result: &RemediationResult,
    ) -> Result<(), FleetClientError> {
        let body = serde_json::json!({
            "request_id": result.request_id,
            "result": result,
        });
        let req = self
            .request_builder("POST", &format!("nodes/{}/remediate/result", self.node_id))
            .header("content-type", "application/json")
            .body(body.to_string().into_bytes())
            .map_err(|e| FleetClientError::BuildingRequest(e.to_string()))?;
        self.http.send(req)?;
        Ok(())
    }

    fn request_builder(&self, method: &str, path: &str) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(format!("{}/api/v1/fleet/{path}", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::ReportSummary;
    use crate::http::config::HttpConfig;
    use assert_matches::assert_matches;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;

    fn http_client() -> HttpClient {
        HttpClient::new(HttpConfig::default()).unwrap()
    }

    fn fleet_client(base_url: &str) -> FleetClient {
        FleetClient::new(
            http_client(),
            base_url,
            "N1",
            "secret-key",
            "0.9.2",
            "boringcrypto",
        )
    }

    fn empty_report() -> ComplianceReport {
        ComplianceReport {
            timestamp: "2026-08-01T00:00:00Z".to_string(),
            sections: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    #[test]
    fn push_report_sends_bearer_and_hint_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/fleet/nodes/N1/report")
                .header("authorization", "Bearer secret-key")
                .header(AGENT_VERSION_HEADER, "0.9.2")
                .header(FIPS_BACKEND_HEADER, "boringcrypto");
            then.status(204);
        });

        fleet_client(&server.base_url())
            .push_report(&empty_report())
            .unwrap();
        mock.assert();
    }

    #[test]
    fn unauthorized_push_is_not_transient() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/fleet/nodes/N1/report");
            then.status(401).json_body(serde_json::json!({"error": "unauthorized"}));
        });

        let err = fleet_client(&server.base_url())
            .push_report(&empty_report())
            .unwrap_err();
        assert!(!err.is_transient());
        assert_matches!(err, FleetClientError::Http(_));
    }

    #[test]
    fn poll_remediations_parses_pending_array() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/fleet/nodes/N1/remediate")
                .header("authorization", "Bearer secret-key");
            then.status(200).json_body(serde_json::json!([
                {"id": "r1", "node_id": "N1", "actions": ["enable_os_fips"], "dry_run": true}
            ]));
        });

        let pending = fleet_client(&server.base_url()).poll_remediations().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r1");
        assert!(pending[0].dry_run);
    }

    #[test]
    fn enroll_round_trip() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/fleet/enroll");
            then.status(200)
                .json_body(serde_json::json!({"node_id": "N9", "api_key": "K9"}));
        });

        let response = FleetClient::enroll(
            &http_client(),
            &server.base_url(),
            &EnrollRequest {
                token: "T".to_string(),
                name: "web-1".to_string(),
                role: Some("server".to_string()),
                region: Some("us-east".to_string()),
                labels: HashMap::new(),
                version: "0.9.2".to_string(),
                fips_backend: String::new(),
            },
        )
        .unwrap();
        assert_eq!(response.node_id, "N9");
        assert_eq!(response.api_key, "K9");
    }
}
