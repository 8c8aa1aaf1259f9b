//! Reverse-proxy data path: accepted plaintext requests are forwarded to the
//! upstream URL. With `upstream_tls` the upstream transport runs the same
//! FIPS-restricted TLS configuration the listener does.

use crate::http::tls::{
    TlsConfigBuildingError, build_fips_client_config, build_fips_server_config, load_certs,
    load_private_key,
};
use crate::proxy::config::GatewayConfig;
use crate::proxy::inspector::{ClientInspector, InspectingCertResolver};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use rustls::ServerConfig;
use rustls::sign::CertifiedKey;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const UPSTREAM_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const UPSTREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPSTREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Headers that must not be forwarded hop-to-hop.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "host",
];

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("tls configuration: {0}")]
    Tls(#[from] TlsConfigBuildingError),
    #[error("building upstream client: {0}")]
    UpstreamClient(String),
}

/// Builds the listener's TLS configuration: FIPS-restricted provider with the
/// inspecting certificate resolver so every ClientHello is classified.
pub fn build_listener_tls(
    config: &GatewayConfig,
    inspector: Arc<ClientInspector>,
) -> Result<ServerConfig, GatewayError> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| GatewayError::Tls(TlsConfigBuildingError::BuildingError(e.to_string())))?;
    let certified_key = Arc::new(CertifiedKey::new(certs, signing_key));
    let resolver = Arc::new(InspectingCertResolver::new(certified_key, inspector));
    Ok(build_fips_server_config(resolver)?)
}

/// Builds the upstream transport. With `upstream_tls` the client carries the
/// FIPS-restricted rustls configuration (optionally without verification for
/// development upstreams).
pub fn build_upstream_client(
    config: &GatewayConfig,
) -> Result<reqwest::blocking::Client, GatewayError> {
    let mut builder = reqwest::blocking::Client::builder()
        .timeout(UPSTREAM_REQUEST_TIMEOUT)
        .connect_timeout(UPSTREAM_HANDSHAKE_TIMEOUT)
        .pool_idle_timeout(UPSTREAM_IDLE_TIMEOUT);
    if config.upstream_tls {
        let tls = build_fips_client_config(config.insecure_skip_verify)?;
        builder = builder.use_preconfigured_tls(tls);
    }
    builder
        .build()
        .map_err(|e| GatewayError::UpstreamClient(e.to_string()))
}

pub struct GatewayState {
    pub upstream_url: String,
    pub client: reqwest::blocking::Client,
}

/// Default service of the TLS listener: forward everything to the upstream.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> HttpResponse {
    let target = target_url(&state.upstream_url, &req);
    let method = match reqwest::Method::from_bytes(req.method().as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => return HttpResponse::MethodNotAllowed().finish(),
    };

    let client = state.client.clone();
    let mut upstream_req = client.request(method, &target);
    for (name, value) in req.headers() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            upstream_req = upstream_req.header(name.as_str(), value);
        }
    }
    upstream_req = upstream_req.body(body.to_vec());

    let result = web::block(move || {
        upstream_req.send().and_then(|resp| {
            let status = resp.status().as_u16();
            let headers = resp
                .headers()
                .iter()
                .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(&name.as_str()))
                .map(|(name, value)| (name.to_string(), value.as_bytes().to_vec()))
                .collect::<Vec<_>>();
            resp.bytes().map(|bytes| (status, headers, bytes))
        })
    })
    .await;

    match result {
        Ok(Ok((status, headers, bytes))) => {
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = HttpResponse::build(status);
            for (name, value) in headers {
                let Ok(name) = actix_web::http::header::HeaderName::try_from(name.as_str()) else {
                    continue;
                };
                let Ok(value) = actix_web::http::header::HeaderValue::from_bytes(&value) else {
                    continue;
                };
                response.insert_header((name, value));
            }
            response.body(bytes.to_vec())
        }
        Ok(Err(err)) => {
            warn!(error_msg = %err, upstream = %target, "upstream request failed");
            HttpResponse::BadGateway().json(serde_json::json!({ "error": "bad gateway" }))
        }
        Err(err) => {
            warn!(error_msg = %err, "upstream forwarding task failed");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "internal error" }))
        }
    }
}

fn target_url(upstream: &str, req: &HttpRequest) -> String {
    let upstream = upstream.trim_end_matches('/');
    match req.query_string() {
        "" => format!("{upstream}{}", req.path()),
        query => format!("{upstream}{}?{query}", req.path()),
    }
}
