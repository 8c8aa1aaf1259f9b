//! Periodic check→push loop. A tick always fires on schedule regardless of
//! how the previous push went; transient failures are logged and the loop
//! keeps going until cancellation.

use crate::agent::client::{FleetClient, FleetClientError};
use crate::checker::ComplianceReport;
use crate::utils::worker::Worker;
use std::time::Duration;
use tracing::{debug, info, warn};

const REPORTER_THREAD_NAME: &str = "fleet_reporter";

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Push surface of the fleet client, split out so the loop is testable.
pub trait ReportSink {
    fn push(&self, report: &ComplianceReport) -> Result<(), FleetClientError>;
}

impl ReportSink for FleetClient {
    fn push(&self, report: &ComplianceReport) -> Result<(), FleetClientError> {
        self.push_report(report)
    }
}

pub fn spawn_reporter<C, S>(run_checks: C, sink: S, interval: Duration) -> Worker
where
    C: Fn() -> ComplianceReport + Send + 'static,
    S: ReportSink + Send + 'static,
{
    info!(interval = ?interval, "starting compliance reporter");
    // Tracks whether the previous push got through, for log noise control.
    let mut push_succeeded = false;
    Worker::spawn(REPORTER_THREAD_NAME, move |cancel| {
        loop {
            let report = run_checks();
            match sink.push(&report) {
                Ok(()) => {
                    if !push_succeeded {
                        info!(
                            failed = report.summary.failed,
                            warnings = report.summary.warnings,
                            "compliance report pushed"
                        );
                        push_succeeded = true;
                    } else {
                        debug!(failed = report.summary.failed, "compliance report pushed");
                    }
                }
                Err(err) => {
                    warn!(error_msg = %err, transient = err.is_transient(), "report push failed");
                    push_succeeded = false;
                }
            }
            if cancel.is_cancelled(interval) {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::ReportSummary;
    use crate::http::client::HttpError;
    use mockall::{Sequence, mock};

    mock! {
        pub Sink {}
        impl ReportSink for Sink {
            fn push(&self, report: &ComplianceReport) -> Result<(), FleetClientError>;
        }
    }

    fn empty_report() -> ComplianceReport {
        ComplianceReport {
            timestamp: "2026-08-01T00:00:00Z".to_string(),
            sections: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    #[test]
    fn reporter_pushes_on_every_tick_and_survives_failures() {
        let mut sink = MockSink::new();
        let mut seq = Sequence::new();
        sink.expect_push()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(FleetClientError::Http(HttpError::Build(
                    "boom".to_string(),
                )))
            });
        sink.expect_push()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        // Subsequent ticks may or may not fire before the stop lands
        sink.expect_push().returning(|_| Ok(()));

        let (tick_publisher, tick_consumer) = crate::event::channel::pub_sub();
        let run_checks = move || {
            let _ = tick_publisher.publish(());
            empty_report()
        };

        let worker = spawn_reporter(run_checks, sink, Duration::from_millis(10));

        // First two ticks fired despite the first push failing
        tick_consumer.as_ref().recv().unwrap();
        tick_consumer.as_ref().recv().unwrap();

        worker.join().unwrap();
    }

    #[test]
    fn reporter_exits_promptly_on_cancellation() {
        let mut sink = MockSink::new();
        sink.expect_push().returning(|_| Ok(()));

        let worker = spawn_reporter(empty_report, sink, Duration::from_secs(3600));
        // A long interval must not delay shutdown
        worker.join().unwrap();
    }
}
