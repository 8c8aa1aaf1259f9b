//! Fleet data model: nodes, enrollment tokens, remediation exchanges and the
//! aggregate summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Controller,
    Server,
    Proxy,
    Client,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Controller => "controller",
            NodeRole::Server => "server",
            NodeRole::Proxy => "proxy",
            NodeRole::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "controller" => Some(NodeRole::Controller),
            "server" => Some(NodeRole::Server),
            "proxy" => Some(NodeRole::Proxy),
            "client" => Some(NodeRole::Client),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Degraded,
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Degraded => "degraded",
            NodeStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(NodeStatus::Online),
            "degraded" => Some(NodeStatus::Degraded),
            "offline" => Some(NodeStatus::Offline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub role: NodeRole,
    pub region: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub enrolled_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: NodeStatus,
    pub version: String,
    pub fips_backend: String,
    pub compliance_pass: u32,
    pub compliance_fail: u32,
    pub compliance_warn: u32,
}

/// Enrollment token as listed to admins; the plaintext is only ever returned
/// by the create call and the hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentToken {
    pub id: String,
    pub role: NodeRole,
    pub region: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub used_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Executing,
    Success,
    NeedsReboot,
    Failed,
    ManualOnly,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRequest {
    pub id: String,
    pub node_id: String,
    pub actions: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationActionResult {
    pub id: String,
    pub status: ActionStatus,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub request_id: String,
    pub node_id: String,
    pub dry_run: bool,
    pub completed_at: DateTime<Utc>,
    pub actions: Vec<RemediationActionResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total_nodes: u64,
    pub online: u64,
    pub degraded: u64,
    pub offline: u64,
    pub by_role: HashMap<String, u64>,
    pub by_region: HashMap<String, u64>,
    /// Nodes that are online with zero compliance failures.
    pub fully_compliant: u64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Degraded,
    Offline,
}

impl NodeEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeEventKind::Degraded => "node_degraded",
            NodeEventKind::Offline => "node_offline",
        }
    }
}

/// Status-transition event published by the monitor on its bounded channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEvent {
    #[serde(rename = "type", serialize_with = "serialize_kind")]
    pub kind: NodeEventKind,
    pub node_id: String,
}

fn serialize_kind<S: serde::Serializer>(
    kind: &NodeEventKind,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.as_str())
}
