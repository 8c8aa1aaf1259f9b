//! In-memory remediation dispatch queue.
//!
//! Requests are queued per node, handed out on every agent poll, and cleared
//! when the matching result arrives. The queue is deliberately not persisted:
//! node data lives in the store, a lost queue entry is re-issued by the
//! operator.

use crate::fleet::types::{RemediationRequest, RemediationResult};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct RemediationQueue {
    pending: Mutex<HashMap<String, Vec<RemediationRequest>>>,
    results: Mutex<Vec<RemediationResult>>,
}

impl RemediationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request for a node, assigning it a unique request id.
    pub fn enqueue(&self, node_id: &str, actions: Vec<String>, dry_run: bool) -> String {
        let request = RemediationRequest {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            actions,
            dry_run,
        };
        let id = request.id.clone();
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(node_id.to_string())
            .or_default()
            .push(request);
        id
    }

    /// Pending requests for a node. Polling does not clear them; only a
    /// posted result does.
    pub fn pending_for(&self, node_id: &str) -> Vec<RemediationRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(node_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Records an outcome and clears the matching pending entry. Results for
    /// unknown request ids are still recorded; out-of-order arrivals are
    /// correlated by request id.
    pub fn record_result(&self, result: RemediationResult) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(requests) = pending.get_mut(&result.node_id) {
            requests.retain(|r| r.id != result.request_id);
            if requests.is_empty() {
                pending.remove(&result.node_id);
            }
        }
        drop(pending);
        self.results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(result);
    }

    pub fn results_for(&self, node_id: &str) -> Vec<RemediationResult> {
        self.results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|r| r.node_id == node_id)
            .cloned()
            .collect()
    }
}
