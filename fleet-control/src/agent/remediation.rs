//! Remediation polling loop: fetch pending requests, re-run the checker so
//! the plan reflects current state, execute, post the result back.

use crate::agent::client::{FleetClient, FleetClientError};
use crate::agent::executor::Executor;
use crate::agent::pipeline::{CheckConfig, run_checks_with};
use crate::agent::platform::PlatformActions;
use crate::checker::posture::PostureCollector;
use crate::fleet::types::{RemediationRequest, RemediationResult};
use crate::utils::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const REMEDIATION_THREAD_NAME: &str = "remediation_poller";

/// Remediation surface of the fleet client, split out so the loop is testable.
pub trait RemediationApi {
    fn poll(&self) -> Result<Vec<RemediationRequest>, FleetClientError>;
    fn post_result(&self, result: &RemediationResult) -> Result<(), FleetClientError>;
}

impl RemediationApi for FleetClient {
    fn poll(&self) -> Result<Vec<RemediationRequest>, FleetClientError> {
        self.poll_remediations()
    }

    fn post_result(&self, result: &RemediationResult) -> Result<(), FleetClientError> {
        self.post_remediation_result(result)
    }
}

pub fn spawn_remediation_poller<A, P>(
    api: A,
    executor: Executor<P>,
    check_config: CheckConfig,
    posture: Arc<PostureCollector>,
    interval: Duration,
) -> Worker
where
    A: RemediationApi + Send + 'static,
    P: PlatformActions + Send + 'static,
{
    info!(interval = ?interval, "starting remediation poller");
    Worker::spawn(REMEDIATION_THREAD_NAME, move |cancel| {
        loop {
            match api.poll() {
                Err(err) => {
                    warn!(error_msg = %err, "remediation poll failed");
                }
                Ok(pending) if pending.is_empty() => {
                    debug!("no pending remediation requests");
                }
                Ok(pending) => {
                    for request in pending {
                        handle_request(&api, &executor, &check_config, &posture, &request);
                    }
                }
            }
            if cancel.is_cancelled(interval) {
                break;
            }
        }
    })
}

fn handle_request<A: RemediationApi, P: PlatformActions>(
    api: &A,
    executor: &Executor<P>,
    check_config: &CheckConfig,
    posture: &PostureCollector,
    request: &RemediationRequest,
) {
    info!(request_id = %request.id, dry_run = request.dry_run,
          actions = request.actions.len(), "handling remediation request");

    // Fresh checker run so the plan reflects current state
    let report = run_checks_with(check_config, posture);
    let plan = executor.plan(&report.sections);
    let result = executor.execute(request, &plan);
    if let Err(err) = api.post_result(&result) {
        warn!(request_id = %request.id, error_msg = %err, "could not post remediation result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::platform::tests::MockPlatform;
    use crate::fleet::types::ActionStatus;
    use mockall::mock;
    use std::sync::mpsc;

    mock! {
        pub Api {}
        impl RemediationApi for Api {
            fn poll(&self) -> Result<Vec<RemediationRequest>, FleetClientError>;
            fn post_result(&self, result: &RemediationResult) -> Result<(), FleetClientError>;
        }
    }

    #[test]
    fn dry_run_request_round_trips_a_result() {
        let request = RemediationRequest {
            id: "r1".to_string(),
            node_id: "N1".to_string(),
            actions: vec![
                "enable_os_fips".to_string(),
                "enable_disk_encryption".to_string(),
            ],
            dry_run: true,
        };

        let mut api = MockApi::new();
        let (result_tx, result_rx) = mpsc::channel();
        api.expect_poll().returning(move || Ok(vec![request.clone()]));
        api.expect_post_result().returning(move |result| {
            result_tx.send(result.clone()).unwrap();
            Ok(())
        });

        let posture = Arc::new(PostureCollector::new());
        let worker = spawn_remediation_poller(
            api,
            Executor::new(MockPlatform::new()),
            CheckConfig::default(),
            posture.clone(),
            Duration::from_secs(3600),
        );

        let result = result_rx.recv().unwrap();
        assert_eq!(result.request_id, "r1");
        assert!(result.dry_run);
        assert_eq!(result.actions.len(), 2);
        // The manual-only action never executes, dry-run or not
        assert_eq!(result.actions[1].status, ActionStatus::ManualOnly);
        // The fresh checker run fed the shared posture collector
        assert!(posture.device_count() >= 1);

        worker.join().unwrap();
    }

    #[test]
    fn poll_failure_does_not_kill_the_loop() {
        let mut api = MockApi::new();
        let (tick_tx, tick_rx) = mpsc::channel();
        api.expect_poll().returning(move || {
            let _ = tick_tx.send(());
            Err(FleetClientError::Decoding("bad payload".to_string()))
        });

        let worker = spawn_remediation_poller(
            api,
            Executor::new(MockPlatform::new()),
            CheckConfig::default(),
            Arc::new(PostureCollector::new()),
            Duration::from_millis(10),
        );

        // Two polls prove the loop survived the first failure
        tick_rx.recv().unwrap();
        tick_rx.recv().unwrap();
        worker.join().unwrap();
    }
}
