//! SQLite-backed fleet store: nodes, enrollment tokens and latest reports.
//!
//! The connection is serialized behind a mutex; every operation is a short
//! transaction. The store is the single source of truth for node data, there
//! is no in-memory node cache.

use crate::checker::ReportSummary;
use crate::fleet::auth;
use crate::fleet::types::{EnrollmentToken, Node, NodeRole, NodeStatus};
use crate::utils::time::to_rfc3339;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid enrollment token: {0}")]
    TokenInvalid(String),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("duplicate node identity: {0}")]
    DuplicateNode(String),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id               TEXT PRIMARY KEY,
    api_key_hash     TEXT UNIQUE NOT NULL,
    name             TEXT NOT NULL,
    role             TEXT NOT NULL,
    region           TEXT NOT NULL,
    labels           TEXT NOT NULL DEFAULT '{}',
    enrolled_at      TEXT NOT NULL,
    last_heartbeat   TEXT NOT NULL,
    status           TEXT NOT NULL,
    version          TEXT NOT NULL DEFAULT '',
    fips_backend     TEXT NOT NULL DEFAULT '',
    compliance_pass  INTEGER NOT NULL DEFAULT 0,
    compliance_fail  INTEGER NOT NULL DEFAULT 0,
    compliance_warn  INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS tokens (
    id          TEXT PRIMARY KEY,
    token_hash  TEXT UNIQUE NOT NULL,
    role        TEXT NOT NULL,
    region      TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    max_uses    INTEGER NOT NULL,
    used_count  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reports (
    node_id     TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL,
    payload     BLOB NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Plaintext credentials returned exactly once at creation time.
pub struct IssuedToken {
    pub token: EnrollmentToken,
    pub plaintext: String,
}

pub struct EnrolledNode {
    pub node: Node,
    pub api_key: String,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- tokens ----

    pub fn create_token(
        &self,
        role: NodeRole,
        region: &str,
        expires_at: DateTime<Utc>,
        max_uses: u32,
    ) -> Result<IssuedToken, StoreError> {
        let plaintext = auth::generate_secret();
        let token = EnrollmentToken {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            region: region.to_string(),
            expires_at,
            max_uses,
            used_count: 0,
            created_at: Utc::now(),
        };
        self.lock().execute(
            "INSERT INTO tokens (id, token_hash, role, region, expires_at, max_uses, used_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                token.id,
                auth::token_hash(&plaintext),
                token.role.as_str(),
                token.region,
                to_rfc3339(token.expires_at),
                token.max_uses,
                to_rfc3339(token.created_at),
            ],
        )?;
        Ok(IssuedToken { token, plaintext })
    }

    pub fn list_tokens(&self) -> Result<Vec<EnrollmentToken>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, role, region, expires_at, max_uses, used_count, created_at
             FROM tokens ORDER BY created_at",
        )?;
        let tokens = stmt
            .query_map([], row_to_token)?
            .collect::<Result<Vec<_>, _>>()?;
        tokens.into_iter().collect()
    }

    pub fn delete_token(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .lock()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Verifies and consumes one use of the presented token: looked up by
    /// hash, checked for expiry and exhaustion, then incremented inside the
    /// same transaction.
    pub fn consume_token(
        &self,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentToken, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let hash = auth::token_hash(plaintext);
        let token = tx
            .query_row(
                "SELECT id, role, region, expires_at, max_uses, used_count, created_at
                 FROM tokens WHERE token_hash = ?1",
                params![hash],
                row_to_token,
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| StoreError::TokenInvalid("unknown token".to_string()))?;

        if now > token.expires_at {
            return Err(StoreError::TokenInvalid("token expired".to_string()));
        }
        if token.used_count >= token.max_uses {
            return Err(StoreError::TokenInvalid("token exhausted".to_string()));
        }
        tx.execute(
            "UPDATE tokens SET used_count = used_count + 1 WHERE id = ?1",
            params![token.id],
        )?;
        tx.commit()?;
        Ok(EnrollmentToken {
            used_count: token.used_count + 1,
            ..token
        })
    }

    // ---- nodes ----

    /// Enrolls a node against a consumed token: assigns a fresh id and API
    /// key, persists the salted key hash, returns the plaintext key once.
    #[allow(clippy::too_many_arguments)]
    pub fn enroll_node(
        &self,
        token: &EnrollmentToken,
        name: &str,
        labels: &HashMap<String, String>,
        version: &str,
        fips_backend: &str,
        now: DateTime<Utc>,
    ) -> Result<EnrolledNode, StoreError> {
        let api_key = auth::generate_secret();
        let node = Node {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            role: token.role,
            region: token.region.clone(),
            labels: labels.clone(),
            enrolled_at: now,
            last_heartbeat: now,
            status: NodeStatus::Online,
            version: version.to_string(),
            fips_backend: fips_backend.to_string(),
            compliance_pass: 0,
            compliance_fail: 0,
            compliance_warn: 0,
        };
        let labels_json = serde_json::to_string(&node.labels)
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
        self.lock()
            .execute(
                "INSERT INTO nodes (id, api_key_hash, name, role, region, labels, enrolled_at,
                                    last_heartbeat, status, version, fips_backend)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    node.id,
                    auth::hash_api_key(&api_key),
                    node.name,
                    node.role.as_str(),
                    node.region,
                    labels_json,
                    to_rfc3339(node.enrolled_at),
                    to_rfc3339(node.last_heartbeat),
                    node.status.as_str(),
                    node.version,
                    node.fips_backend,
                ],
            )
            .map_err(|err| match constraint_violation(&err) {
                true => StoreError::DuplicateNode(node.id.clone()),
                false => StoreError::Sqlite(err),
            })?;
        Ok(EnrolledNode { node, api_key })
    }

    pub fn get_node(&self, id: &str) -> Result<Node, StoreError> {
        self.lock()
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![id],
                row_to_node,
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| StoreError::NodeNotFound(id.to_string()))
    }

    pub fn delete_node(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .lock()
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn list_nodes(
        &self,
        role: Option<NodeRole>,
        status: Option<NodeStatus>,
        region: Option<&str>,
    ) -> Result<Vec<Node>, StoreError> {
        let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(role) = role {
            args.push(role.as_str().to_string());
            sql.push_str(&format!(" AND role = ?{}", args.len()));
        }
        if let Some(status) = status {
            args.push(status.as_str().to_string());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(region) = region {
            args.push(region.to_string());
            sql.push_str(&format!(" AND region = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY enrolled_at");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(rusqlite::params_from_iter(args), row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        nodes.into_iter().collect()
    }

    /// Verifies a presented API key against the node's stored salted hash.
    pub fn verify_node_key(&self, node_id: &str, api_key: &str) -> Result<bool, StoreError> {
        let stored: Option<String> = self
            .lock()
            .query_row(
                "SELECT api_key_hash FROM nodes WHERE id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.is_some_and(|hash| auth::verify_api_key(api_key, &hash)))
    }

    /// A heartbeat always re-elevates the node to online.
    pub fn record_heartbeat(
        &self,
        node_id: &str,
        version: Option<&str>,
        fips_backend: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let updated = self.lock().execute(
            "UPDATE nodes SET last_heartbeat = ?2, status = 'online',
                              version = COALESCE(?3, version),
                              fips_backend = COALESCE(?4, fips_backend)
             WHERE id = ?1",
            params![node_id, to_rfc3339(now), version, fips_backend],
        )?;
        if updated == 0 {
            return Err(StoreError::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }

    /// Report ingestion: refreshes the heartbeat and compliance counters and
    /// replaces the stored blob. Successful ingestion elevates the node to
    /// online.
    pub fn ingest_report(
        &self,
        node_id: &str,
        payload: &[u8],
        summary: &ReportSummary,
        version: Option<&str>,
        fips_backend: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE nodes SET last_heartbeat = ?2, status = 'online',
                              compliance_pass = ?3, compliance_fail = ?4, compliance_warn = ?5,
                              version = COALESCE(?6, version),
                              fips_backend = COALESCE(?7, fips_backend)
             WHERE id = ?1",
            params![
                node_id,
                to_rfc3339(now),
                summary.passed as i64,
                summary.failed as i64,
                summary.warnings as i64,
                version,
                fips_backend,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NodeNotFound(node_id.to_string()));
        }
        tx.execute("DELETE FROM reports WHERE node_id = ?1", params![node_id])?;
        tx.execute(
            "INSERT INTO reports (node_id, created_at, payload) VALUES (?1, ?2, ?3)",
            params![node_id, to_rfc3339(now), payload],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Returns the latest stored report, pruning any older rows for the node.
    pub fn get_report(&self, node_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM reports WHERE node_id = ?1 AND rowid NOT IN
               (SELECT rowid FROM reports WHERE node_id = ?1 ORDER BY created_at DESC LIMIT 1)",
            params![node_id],
        )?;
        let payload: Option<Vec<u8>> = tx
            .query_row(
                "SELECT payload FROM reports WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;
        Ok(payload)
    }

    /// Monitor support: every node the sweep still needs to look at. Offline
    /// nodes are excluded, they emit no further transitions.
    pub fn list_non_offline(&self) -> Result<Vec<Node>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE status != 'offline'"
        ))?;
        let nodes = stmt
            .query_map([], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        nodes.into_iter().collect()
    }

    pub fn set_node_status(&self, node_id: &str, status: NodeStatus) -> Result<(), StoreError> {
        let updated = self.lock().execute(
            "UPDATE nodes SET status = ?2 WHERE id = ?1",
            params![node_id, status.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }

    pub fn summary(&self) -> Result<crate::fleet::types::FleetSummary, StoreError> {
        let nodes = self.list_nodes(None, None, None)?;
        let mut summary = crate::fleet::types::FleetSummary {
            updated_at: crate::utils::time::now_rfc3339(),
            ..Default::default()
        };
        for node in &nodes {
            summary.total_nodes += 1;
            match node.status {
                NodeStatus::Online => summary.online += 1,
                NodeStatus::Degraded => summary.degraded += 1,
                NodeStatus::Offline => summary.offline += 1,
            }
            *summary
                .by_role
                .entry(node.role.as_str().to_string())
                .or_default() += 1;
            *summary.by_region.entry(node.region.clone()).or_default() += 1;
            if node.status == NodeStatus::Online && node.compliance_fail == 0 {
                summary.fully_compliant += 1;
            }
        }
        Ok(summary)
    }
}

const NODE_COLUMNS: &str = "id, name, role, region, labels, enrolled_at, last_heartbeat, status,
                            version, fips_backend, compliance_pass, compliance_fail, compliance_warn";

fn constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation)
    )
}

type RowResult<T> = rusqlite::Result<Result<T, StoreError>>;

fn row_to_token(row: &rusqlite::Row<'_>) -> RowResult<EnrollmentToken> {
    let role_raw: String = row.get(1)?;
    let expires_raw: String = row.get(3)?;
    let created_raw: String = row.get(6)?;
    Ok((|| {
        Ok(EnrollmentToken {
            id: row.get(0).map_err(StoreError::Sqlite)?,
            role: NodeRole::parse(&role_raw)
                .ok_or_else(|| StoreError::CorruptRow(format!("bad role {role_raw:?}")))?,
            region: row.get(2).map_err(StoreError::Sqlite)?,
            expires_at: parse_ts(&expires_raw)?,
            max_uses: row.get(4).map_err(StoreError::Sqlite)?,
            used_count: row.get(5).map_err(StoreError::Sqlite)?,
            created_at: parse_ts(&created_raw)?,
        })
    })())
}

fn row_to_node(row: &rusqlite::Row<'_>) -> RowResult<Node> {
    let role_raw: String = row.get(2)?;
    let labels_raw: String = row.get(4)?;
    let enrolled_raw: String = row.get(5)?;
    let heartbeat_raw: String = row.get(6)?;
    let status_raw: String = row.get(7)?;
    Ok((|| {
        Ok(Node {
            id: row.get(0).map_err(StoreError::Sqlite)?,
            name: row.get(1).map_err(StoreError::Sqlite)?,
            role: NodeRole::parse(&role_raw)
                .ok_or_else(|| StoreError::CorruptRow(format!("bad role {role_raw:?}")))?,
            region: row.get(3).map_err(StoreError::Sqlite)?,
            labels: serde_json::from_str(&labels_raw)
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
            enrolled_at: parse_ts(&enrolled_raw)?,
            last_heartbeat: parse_ts(&heartbeat_raw)?,
            status: NodeStatus::parse(&status_raw)
                .ok_or_else(|| StoreError::CorruptRow(format!("bad status {status_raw:?}")))?,
            version: row.get(8).map_err(StoreError::Sqlite)?,
            fips_backend: row.get(9).map_err(StoreError::Sqlite)?,
            compliance_pass: row.get(10).map_err(StoreError::Sqlite)?,
            compliance_fail: row.get(11).map_err(StoreError::Sqlite)?,
            compliance_warn: row.get(12).map_err(StoreError::Sqlite)?,
        })
    })())
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
impl SqliteStore {
    /// Test support: back-dates a node's heartbeat without touching status.
    pub(crate) fn set_last_heartbeat(
        &self,
        node_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let updated = self.lock().execute(
            "UPDATE nodes SET last_heartbeat = ?2 WHERE id = ?1",
            params![node_id, to_rfc3339(ts)],
        )?;
        if updated == 0 {
            return Err(StoreError::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    pub(crate) fn far_future() -> DateTime<Utc> {
        Utc::now() + Duration::days(365 * 10)
    }

    pub(crate) fn enroll_test_node(store: &SqliteStore, name: &str) -> EnrolledNode {
        let issued = store
            .create_token(NodeRole::Server, "us-east", far_future(), 10)
            .unwrap();
        let token = store.consume_token(&issued.plaintext, Utc::now()).unwrap();
        store
            .enroll_node(&token, name, &HashMap::new(), "0.9.2", "boringcrypto", Utc::now())
            .unwrap()
    }

    #[test]
    fn token_lifecycle_single_use() {
        let store = SqliteStore::open_in_memory().unwrap();
        let issued = store
            .create_token(NodeRole::Server, "us-east", far_future(), 1)
            .unwrap();
        assert_eq!(issued.token.used_count, 0);

        let consumed = store.consume_token(&issued.plaintext, Utc::now()).unwrap();
        assert_eq!(consumed.used_count, 1);

        // Second use: exhausted
        let err = store
            .consume_token(&issued.plaintext, Utc::now())
            .unwrap_err();
        assert_matches!(err, StoreError::TokenInvalid(reason) => {
            assert!(reason.contains("exhausted"));
        });

        // used_count never exceeds max_uses
        let listed = store.list_tokens().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].used_count, 1);
        assert!(listed[0].used_count <= listed[0].max_uses);
    }

    #[test]
    fn expired_token_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let issued = store
            .create_token(
                NodeRole::Client,
                "eu-west",
                Utc::now() - Duration::hours(1),
                5,
            )
            .unwrap();
        let err = store
            .consume_token(&issued.plaintext, Utc::now())
            .unwrap_err();
        assert_matches!(err, StoreError::TokenInvalid(reason) => {
            assert!(reason.contains("expired"));
        });
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.consume_token("no-such-token", Utc::now()).unwrap_err();
        assert_matches!(err, StoreError::TokenInvalid(_));
    }

    #[test]
    fn enrollment_binds_role_and_region_from_token() {
        let store = SqliteStore::open_in_memory().unwrap();
        let enrolled = enroll_test_node(&store, "web-1");
        assert_eq!(enrolled.node.role, NodeRole::Server);
        assert_eq!(enrolled.node.region, "us-east");
        assert_eq!(enrolled.node.status, NodeStatus::Online);

        // Key verifies against the stored salted hash
        assert!(
            store
                .verify_node_key(&enrolled.node.id, &enrolled.api_key)
                .unwrap()
        );
        assert!(
            !store
                .verify_node_key(&enrolled.node.id, "wrong-key")
                .unwrap()
        );
    }

    #[test]
    fn report_ingestion_updates_counters_and_replaces_blob() {
        let store = SqliteStore::open_in_memory().unwrap();
        let enrolled = enroll_test_node(&store, "web-1");
        store
            .set_node_status(&enrolled.node.id, NodeStatus::Degraded)
            .unwrap();

        let summary = ReportSummary {
            total: 5,
            passed: 3,
            failed: 1,
            warnings: 1,
            unknown: 0,
        };
        store
            .ingest_report(
                &enrolled.node.id,
                b"{\"first\":true}",
                &summary,
                Some("1.0.0"),
                Some("native-fips"),
                Utc::now(),
            )
            .unwrap();

        let node = store.get_node(&enrolled.node.id).unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.compliance_pass, 3);
        assert_eq!(node.compliance_fail, 1);
        assert_eq!(node.compliance_warn, 1);
        assert_eq!(node.version, "1.0.0");
        assert_eq!(node.fips_backend, "native-fips");

        store
            .ingest_report(
                &enrolled.node.id,
                b"{\"second\":true}",
                &summary,
                None,
                None,
                Utc::now(),
            )
            .unwrap();
        let report = store.get_report(&enrolled.node.id).unwrap().unwrap();
        assert_eq!(report, b"{\"second\":true}");
        // Version untouched when the push carries none
        assert_eq!(store.get_node(&enrolled.node.id).unwrap().version, "1.0.0");
    }

    #[test]
    fn report_for_unknown_node_errors() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .ingest_report(
                "ghost",
                b"{}",
                &ReportSummary::default(),
                None,
                None,
                Utc::now(),
            )
            .unwrap_err();
        assert_matches!(err, StoreError::NodeNotFound(_));
    }

    #[test]
    fn deleting_node_cascades_to_reports() {
        let store = SqliteStore::open_in_memory().unwrap();
        let enrolled = enroll_test_node(&store, "web-1");
        store
            .ingest_report(
                &enrolled.node.id,
                b"{}",
                &ReportSummary::default(),
                None,
                None,
                Utc::now(),
            )
            .unwrap();

        assert!(store.delete_node(&enrolled.node.id).unwrap());
        assert!(store.get_report(&enrolled.node.id).unwrap().is_none());
        assert_matches!(
            store.get_node(&enrolled.node.id).unwrap_err(),
            StoreError::NodeNotFound(_)
        );
    }

    #[test]
    fn list_nodes_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        enroll_test_node(&store, "web-1");
        enroll_test_node(&store, "web-2");

        assert_eq!(store.list_nodes(None, None, None).unwrap().len(), 2);
        assert_eq!(
            store
                .list_nodes(Some(NodeRole::Server), None, Some("us-east"))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            store
                .list_nodes(Some(NodeRole::Proxy), None, None)
                .unwrap()
                .len(),
            0
        );
        assert_eq!(
            store
                .list_nodes(None, Some(NodeStatus::Offline), None)
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn summary_counts_fully_compliant_online_nodes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = enroll_test_node(&store, "clean");
        let b = enroll_test_node(&store, "failing");
        let c = enroll_test_node(&store, "offline");

        store
            .ingest_report(
                &b.node.id,
                b"{}",
                &ReportSummary {
                    total: 1,
                    failed: 1,
                    ..Default::default()
                },
                None,
                None,
                Utc::now(),
            )
            .unwrap();
        store
            .set_node_status(&c.node.id, NodeStatus::Offline)
            .unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.total_nodes, 3);
        assert_eq!(summary.online, 2);
        assert_eq!(summary.offline, 1);
        assert_eq!(summary.fully_compliant, 1);
        assert_eq!(summary.by_role.get("server"), Some(&3));
        assert_eq!(summary.by_region.get("us-east"), Some(&3));
        let _ = a;
    }
}
