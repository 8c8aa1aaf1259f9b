//! Heartbeat liveness monitor.
//!
//! A single background thread sweeps every non-offline node and derives its
//! status from heartbeat staleness. The sweep only ever moves a node downward
//! (online → degraded → offline); re-elevation to online happens exclusively
//! when a heartbeat or report arrives. Transition events go out on a bounded
//! channel with non-blocking sends, so a slow consumer drops events rather
//! than stalling the sweep.

use crate::event::channel::{EventPublisher, EventPublisherError};
use crate::fleet::store::SqliteStore;
use crate::fleet::types::{NodeEvent, NodeEventKind, NodeStatus};
use crate::utils::worker::Worker;
use chrono::{DateTime, Utc};
use duration_str::deserialize_duration;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const MONITOR_THREAD_NAME: &str = "fleet_monitor";

const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_DEGRADED_AFTER: Duration = Duration::from_secs(90);
const DEFAULT_OFFLINE_AFTER: Duration = Duration::from_secs(180);

/// Recommended lower bound for the event channel capacity.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MonitorConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_interval"
    )]
    pub interval: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_degraded_after"
    )]
    pub degraded_after: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_offline_after"
    )]
    pub offline_after: Duration,
}

fn default_interval() -> Duration {
    DEFAULT_MONITOR_INTERVAL
}

fn default_degraded_after() -> Duration {
    DEFAULT_DEGRADED_AFTER
}

fn default_offline_after() -> Duration {
    DEFAULT_OFFLINE_AFTER
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            degraded_after: DEFAULT_DEGRADED_AFTER,
            offline_after: DEFAULT_OFFLINE_AFTER,
        }
    }
}

/// Pure staleness mapping. A heartbeat exactly at the threshold keeps the
/// node in the better state; only strictly-later observations degrade it.
pub fn evaluate_status(
    last_heartbeat: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &MonitorConfig,
) -> NodeStatus {
    let elapsed = now - last_heartbeat;
    let degraded_after =
        chrono::Duration::from_std(config.degraded_after).unwrap_or(chrono::Duration::MAX);
    let offline_after =
        chrono::Duration::from_std(config.offline_after).unwrap_or(chrono::Duration::MAX);

    if elapsed > offline_after {
        NodeStatus::Offline
    } else if elapsed > degraded_after {
        NodeStatus::Degraded
    } else {
        NodeStatus::Online
    }
}

fn rank(status: NodeStatus) -> u8 {
    match status {
        NodeStatus::Online => 0,
        NodeStatus::Degraded => 1,
        NodeStatus::Offline => 2,
    }
}

pub struct Monitor {
    store: Arc<SqliteStore>,
    config: MonitorConfig,
    events: Option<EventPublisher<NodeEvent>>,
}

impl Monitor {
    pub fn new(
        store: Arc<SqliteStore>,
        config: MonitorConfig,
        events: Option<EventPublisher<NodeEvent>>,
    ) -> Self {
        Self {
            store,
            config,
            events,
        }
    }

    /// Starts the sweep loop on its own thread.
    pub fn spawn(self) -> Worker {
        info!(
            interval = ?self.config.interval,
            degraded_after = ?self.config.degraded_after,
            offline_after = ?self.config.offline_after,
            "starting fleet liveness monitor"
        );
        Worker::spawn(MONITOR_THREAD_NAME, move |cancel| {
            loop {
                self.sweep(Utc::now());
                if cancel.is_cancelled(self.config.interval) {
                    break;
                }
            }
        })
    }

    /// One pass over the non-offline nodes. Per-node errors are logged and the
    /// sweep continues.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let nodes = match self.store.list_non_offline() {
            Ok(nodes) => nodes,
            Err(err) => {
                error!(error_msg = %err, "monitor sweep could not list nodes");
                return;
            }
        };
        for node in nodes {
            let target = evaluate_status(node.last_heartbeat, now, &self.config);
            if rank(target) <= rank(node.status) {
                continue;
            }
            if let Err(err) = self.store.set_node_status(&node.id, target) {
                error!(node_id = %node.id, error_msg = %err, "could not persist status transition");
                continue;
            }
            debug!(node_id = %node.id, status = target.as_str(), "node status transition");
            let kind = match target {
                NodeStatus::Degraded => NodeEventKind::Degraded,
                NodeStatus::Offline => NodeEventKind::Offline,
                NodeStatus::Online => continue,
            };
            self.publish(NodeEvent {
                kind,
                node_id: node.id,
            });
        }
    }

    fn publish(&self, event: NodeEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_publish(event) {
            Ok(()) | Err(EventPublisherError::ChannelFull) => {}
            Err(err) => debug!(error_msg = %err, "could not publish node event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::channel::pub_sub_bounded;
    use crate::fleet::store::tests::enroll_test_node;
    use chrono::Duration as ChronoDuration;

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_millis(200),
            degraded_after: Duration::from_secs(1),
            offline_after: Duration::from_secs(3),
        }
    }

    #[test]
    fn staleness_boundaries() {
        let config = MonitorConfig::default();
        let now = Utc::now();

        // Exactly at the degraded threshold: still online
        let at_threshold = now - ChronoDuration::seconds(90);
        assert_eq!(evaluate_status(at_threshold, now, &config), NodeStatus::Online);

        // One nanosecond past: degraded
        let past_threshold = at_threshold - ChronoDuration::nanoseconds(1);
        assert_eq!(
            evaluate_status(past_threshold, now, &config),
            NodeStatus::Degraded
        );

        // Exactly at the offline threshold: still degraded
        let at_offline = now - ChronoDuration::seconds(180);
        assert_eq!(
            evaluate_status(at_offline, now, &config),
            NodeStatus::Degraded
        );
        let past_offline = at_offline - ChronoDuration::nanoseconds(1);
        assert_eq!(
            evaluate_status(past_offline, now, &config),
            NodeStatus::Offline
        );
    }

    #[test]
    fn sweep_degrades_then_offlines_and_heartbeat_recovers() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let enrolled = enroll_test_node(&store, "web-1");
        let node_id = enrolled.node.id.clone();
        let (publisher, consumer) = pub_sub_bounded(EVENT_CHANNEL_CAPACITY);
        let monitor = Monitor::new(store.clone(), test_config(), Some(publisher));

        // Heartbeat 2s old: past degraded (1s), before offline (3s)
        store
            .set_last_heartbeat(&node_id, Utc::now() - ChronoDuration::seconds(2))
            .unwrap();
        monitor.sweep(Utc::now());
        assert_eq!(store.get_node(&node_id).unwrap().status, NodeStatus::Degraded);
        let event = consumer.as_ref().recv().unwrap();
        assert_eq!(event.kind, NodeEventKind::Degraded);
        assert_eq!(event.node_id, node_id);

        // Heartbeat 4s old: offline
        store
            .set_last_heartbeat(&node_id, Utc::now() - ChronoDuration::seconds(4))
            .unwrap();
        monitor.sweep(Utc::now());
        assert_eq!(store.get_node(&node_id).unwrap().status, NodeStatus::Offline);
        let event = consumer.as_ref().recv().unwrap();
        assert_eq!(event.kind, NodeEventKind::Offline);

        // Offline node emits no further events
        monitor.sweep(Utc::now());
        assert!(consumer.as_ref().try_recv().is_err());

        // Only a heartbeat re-elevates to online
        store
            .record_heartbeat(&node_id, None, None, Utc::now())
            .unwrap();
        assert_eq!(store.get_node(&node_id).unwrap().status, NodeStatus::Online);
        monitor.sweep(Utc::now());
        assert_eq!(store.get_node(&node_id).unwrap().status, NodeStatus::Online);
    }

    #[test]
    fn sweep_never_upgrades_status() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let enrolled = enroll_test_node(&store, "web-1");
        let node_id = enrolled.node.id.clone();
        let monitor = Monitor::new(store.clone(), test_config(), None);

        // Degraded by an operator but with a fresh heartbeat: the sweep leaves
        // the status alone, recovery is the heartbeat path's job
        store
            .set_node_status(&node_id, NodeStatus::Degraded)
            .unwrap();
        monitor.sweep(Utc::now());
        assert_eq!(
            store.get_node(&node_id).unwrap().status,
            NodeStatus::Degraded
        );
    }

    #[test]
    fn full_event_channel_does_not_stall_the_sweep() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (publisher, _consumer) = pub_sub_bounded(1);
        let monitor = Monitor::new(store.clone(), test_config(), Some(publisher));

        for i in 0..3 {
            let enrolled = enroll_test_node(&store, &format!("web-{i}"));
            store
                .set_last_heartbeat(&enrolled.node.id, Utc::now() - ChronoDuration::seconds(2))
                .unwrap();
        }
        // Channel capacity 1, three transitions: the sweep must complete and
        // persist all of them regardless
        monitor.sweep(Utc::now());
        let degraded = store
            .list_nodes(None, Some(NodeStatus::Degraded), None)
            .unwrap();
        assert_eq!(degraded.len(), 3);
    }

    #[test]
    fn spawned_monitor_stops_cleanly() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let monitor = Monitor::new(store, test_config(), None);
        let worker = monitor.spawn();
        worker.join().unwrap();
    }
}
