//! Controller HTTP API: compliance endpoints, fleet admin endpoints and the
//! agent-facing enrollment/report/remediation endpoints.
//!
//! Admin endpoints authenticate against the configured admin key, agent
//! endpoints against the node's API key; both comparisons are constant-time
//! and plaintext credentials are never logged.

use crate::agent::pipeline::{CheckConfig, run_checks};
use crate::backend;
use crate::build_info;
use crate::checker::ComplianceReport;
use crate::fleet::remediation::RemediationQueue;
use crate::fleet::store::{SqliteStore, StoreError};
use crate::fleet::types::{NodeRole, NodeStatus, RemediationResult};
use crate::selftest;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Version/backend hints an agent may attach to a report push.
pub const AGENT_VERSION_HEADER: &str = "x-agent-version";
pub const FIPS_BACKEND_HEADER: &str = "x-fips-backend";

pub struct ApiState {
    pub store: Arc<SqliteStore>,
    pub queue: Arc<RemediationQueue>,
    pub admin_key: String,
    pub deployment_tier: String,
    pub check_config: CheckConfig,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The payload is kept for logs only; the wire message never carries it.
    #[error("internal error")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // The Display impl never embeds internals, so it is safe on the wire
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TokenInvalid(_) => ApiError::Unauthorized,
            StoreError::NodeNotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn require_admin(req: &HttpRequest, state: &ApiState) -> Result<(), ApiError> {
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    if crate::fleet::auth::constant_time_eq(token, &state.admin_key) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn require_node(req: &HttpRequest, state: &ApiState, node_id: &str) -> Result<(), ApiError> {
    let key = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    match state.store.verify_node_key(node_id, key) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ApiError::Unauthorized),
        Err(err) => Err(err.into()),
    }
}

// ---- compliance endpoints ----

async fn get_compliance(state: web::Data<ApiState>) -> Result<HttpResponse, ApiError> {
    let config = state.check_config.clone();
    let report: ComplianceReport = web::block(move || run_checks(&config))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok().json(report))
}

async fn get_backend() -> HttpResponse {
    HttpResponse::Ok().json(backend::detect_info())
}

async fn get_migration() -> HttpResponse {
    HttpResponse::Ok().json(backend::migration_status())
}

async fn get_deployment(state: web::Data<ApiState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "tier": state.deployment_tier }))
}

async fn get_selftest() -> Result<HttpResponse, ApiError> {
    let report = web::block(|| selftest::generate_report(build_info::CRATE_VERSION))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok().json(report))
}

// ---- admin: tokens ----

#[derive(Debug, Deserialize)]
struct CreateTokenBody {
    role: String,
    region: String,
    expires_at: DateTime<Utc>,
    max_uses: u32,
}

#[derive(Debug, Serialize)]
struct CreateTokenResponse {
    id: String,
    token: String,
    expires_at: DateTime<Utc>,
}

async fn create_token(
    req: HttpRequest,
    state: web::Data<ApiState>,
    body: web::Json<CreateTokenBody>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    let role = NodeRole::parse(&body.role)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown role {:?}", body.role)))?;
    if body.max_uses == 0 {
        return Err(ApiError::BadRequest("max_uses must be positive".to_string()));
    }
    let issued = state
        .store
        .create_token(role, &body.region, body.expires_at, body.max_uses)?;
    info!(token_id = %issued.token.id, role = role.as_str(), region = %body.region,
          "enrollment token created");
    Ok(HttpResponse::Ok().json(CreateTokenResponse {
        id: issued.token.id,
        token: issued.plaintext,
        expires_at: issued.token.expires_at,
    }))
}

async fn list_tokens(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    Ok(HttpResponse::Ok().json(state.store.list_tokens()?))
}

async fn delete_token(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    if state.store.delete_token(&path)? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound)
    }
}

// ---- admin: nodes ----

#[derive(Debug, Deserialize)]
struct NodesQuery {
    role: Option<String>,
    status: Option<String>,
    region: Option<String>,
}

async fn list_nodes(
    req: HttpRequest,
    state: web::Data<ApiState>,
    query: web::Query<NodesQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    let role = query
        .role
        .as_deref()
        .map(|r| NodeRole::parse(r).ok_or_else(|| ApiError::BadRequest(format!("unknown role {r:?}"))))
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            NodeStatus::parse(s).ok_or_else(|| ApiError::BadRequest(format!("unknown status {s:?}")))
        })
        .transpose()?;
    let nodes = state.store.list_nodes(role, status, query.region.as_deref())?;
    let summary = state.store.summary()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "nodes": nodes, "summary": summary })))
}

async fn get_node(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    Ok(HttpResponse::Ok().json(state.store.get_node(&path)?))
}

async fn delete_node(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    if state.store.delete_node(&path)? {
        info!(node_id = %path, "node deleted");
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound)
    }
}

async fn get_node_report(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    match state.store.get_report(&path)? {
        Some(payload) => Ok(HttpResponse::Ok()
            .content_type("application/json")
            .body(payload)),
        None => Err(ApiError::NotFound),
    }
}

#[derive(Debug, Deserialize)]
struct RemediateBody {
    actions: Vec<String>,
    #[serde(default)]
    dry_run: bool,
}

async fn post_remediation(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<RemediateBody>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;
    // Queueing for an unknown node is a client error
    state.store.get_node(&path)?;
    let request_id = state
        .queue
        .enqueue(&path, body.actions.clone(), body.dry_run);
    info!(node_id = %path, request_id = %request_id, dry_run = body.dry_run,
          "remediation request queued");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "request_id": request_id })))
}

// ---- agent endpoints ----

#[derive(Debug, Deserialize)]
struct EnrollBody {
    token: String,
    name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    version: String,
    #[serde(default)]
    fips_backend: String,
}

async fn enroll(
    state: web::Data<ApiState>,
    body: web::Json<EnrollBody>,
) -> Result<HttpResponse, ApiError> {
    let token = state.store.consume_token(&body.token, Utc::now())?;

    // The token binds role and region; metadata may restate them but not
    // contradict them.
    if let Some(role) = body.role.as_deref() {
        if role != token.role.as_str() {
            return Err(ApiError::BadRequest(format!(
                "token is bound to role {}",
                token.role.as_str()
            )));
        }
    }
    if let Some(region) = body.region.as_deref() {
        if region != token.region {
            return Err(ApiError::BadRequest(format!(
                "token is bound to region {}",
                token.region
            )));
        }
    }

    let enrolled = state.store.enroll_node(
        &token,
        &body.name,
        &body.labels,
        &body.version,
        &body.fips_backend,
        Utc::now(),
    )?;
    info!(node_id = %enrolled.node.id, name = %body.name, role = token.role.as_str(),
          "node enrolled");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "node_id": enrolled.node.id,
        "api_key": enrolled.api_key,
    })))
}

async fn post_report(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
    payload: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    require_node(&req, &state, &path)?;
    let report: ComplianceReport = serde_json::from_slice(&payload)
        .map_err(|e| ApiError::BadRequest(format!("malformed report: {e}")))?;
    let version = header_value(&req, AGENT_VERSION_HEADER);
    let fips_backend = header_value(&req, FIPS_BACKEND_HEADER);
    state.store.ingest_report(
        &path,
        &payload,
        &report.summary,
        version.as_deref(),
        fips_backend.as_deref(),
        Utc::now(),
    )?;
    debug!(node_id = %path, failed = report.summary.failed, "report ingested");
    Ok(HttpResponse::NoContent().finish())
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct HeartbeatBody {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    fips_backend: Option<String>,
}

async fn heartbeat(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<HeartbeatBody>,
) -> Result<HttpResponse, ApiError> {
    require_node(&req, &state, &path)?;
    state.store.record_heartbeat(
        &path,
        body.version.as_deref(),
        body.fips_backend.as_deref(),
        Utc::now(),
    )?;
    Ok(HttpResponse::NoContent().finish())
}

async fn poll_remediation(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_node(&req, &state, &path)?;
    Ok(HttpResponse::Ok().json(state.queue.pending_for(&path)))
}

#[derive(Debug, Deserialize)]
struct RemediationResultBody {
    request_id: String,
    result: RemediationResult,
}

async fn post_remediation_result(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<RemediationResultBody>,
) -> Result<HttpResponse, ApiError> {
    require_node(&req, &state, &path)?;
    let body = body.into_inner();
    if body.result.request_id != body.request_id {
        return Err(ApiError::BadRequest(
            "request_id does not match the embedded result".to_string(),
        ));
    }
    info!(node_id = %path, request_id = %body.request_id, "remediation result recorded");
    state.queue.record_result(body.result);
    Ok(HttpResponse::NoContent().finish())
}

/// Mounts every route; the caller supplies the shared state via `app_data`.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/compliance", web::get().to(get_compliance))
            .route("/backend", web::get().to(get_backend))
            .route("/migration", web::get().to(get_migration))
            .route("/deployment", web::get().to(get_deployment))
            .route("/selftest", web::get().to(get_selftest))
            .service(
                web::scope("/fleet")
                    .route("/tokens", web::post().to(create_token))
                    .route("/tokens", web::get().to(list_tokens))
                    .route("/tokens/{id}", web::delete().to(delete_token))
                    .route("/enroll", web::post().to(enroll))
                    .route("/nodes", web::get().to(list_nodes))
                    .route("/nodes/{id}", web::get().to(get_node))
                    .route("/nodes/{id}", web::delete().to(delete_node))
                    .route("/nodes/{id}/report", web::get().to(get_node_report))
                    .route("/nodes/{id}/report", web::post().to(post_report))
                    .route("/nodes/{id}/heartbeat", web::post().to(heartbeat))
                    .route("/nodes/{id}/remediate", web::get().to(poll_remediation))
                    .route("/nodes/{id}/remediate", web::post().to(post_remediation))
                    .route(
                        "/nodes/{id}/remediate/result",
                        web::post().to(post_remediation_result),
                    ),
            ),
    );
}
