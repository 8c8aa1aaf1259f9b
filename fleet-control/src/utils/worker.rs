//! Background worker threads.
//!
//! Every periodic loop in this crate (reporter, remediation poller, liveness
//! monitor) runs as a [Worker]: a named thread whose body receives a
//! cancellation consumer and pairs it with [EventConsumer::is_cancelled] as
//! its tick. Shutdown is a stop message followed by a join, either unbounded
//! or against a deadline.

use crate::event::channel::{CancellationMessage, EventConsumer, EventPublisher, pub_sub};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WorkerError {
    #[error("worker '{worker}' ignored the stop signal: {reason}")]
    StopRejected { worker: String, reason: String },
    #[error("worker '{worker}' panicked")]
    Panicked { worker: String },
    #[error("worker '{worker}' still running after {waited:?}")]
    JoinDeadline { worker: String, waited: Duration },
}

/// A running background thread, stoppable through its cancellation channel.
pub struct Worker {
    name: String,
    stop: EventPublisher<CancellationMessage>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawns `body` on a named thread. The body gets the cancellation
    /// consumer and is expected to return soon after a message arrives on it.
    pub fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(EventConsumer<CancellationMessage>) + Send + 'static,
    {
        let (stop, stop_consumer) = pub_sub::<CancellationMessage>();
        let handle = super::spawn_named(name, move || body(stop_consumer));
        Self {
            name: name.to_string(),
            stop,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signals stop and waits for the thread, however long it takes.
    pub fn join(self) -> Result<(), WorkerError> {
        let (name, handle) = self.signal_stop()?;
        handle
            .join()
            .map_err(|_| WorkerError::Panicked { worker: name })
    }

    /// Signals stop, then polls the thread handle until `deadline` elapses.
    /// A worker stuck past the deadline is left detached and reported.
    pub fn join_within(self, deadline: Duration) -> Result<(), WorkerError> {
        let (name, handle) = self.signal_stop()?;
        let started = Instant::now();
        loop {
            if handle.is_finished() {
                return handle
                    .join()
                    .map_err(|_| WorkerError::Panicked { worker: name });
            }
            let waited = started.elapsed();
            if waited >= deadline {
                return Err(WorkerError::JoinDeadline {
                    worker: name,
                    waited,
                });
            }
            std::thread::sleep(JOIN_POLL_INTERVAL.min(deadline - waited));
        }
    }

    fn signal_stop(self) -> Result<(String, JoinHandle<()>), WorkerError> {
        // A closed channel means the body already returned; joining is still
        // the right move, so only a genuinely rejected send is an error.
        if let Err(err) = self.stop.publish(()) {
            if !self.handle.is_finished() {
                return Err(WorkerError::StopRejected {
                    worker: self.name,
                    reason: err.to_string(),
                });
            }
        }
        Ok((self.name, self.handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn worker_ticks_until_stopped() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counted = ticks.clone();
        let worker = Worker::spawn("ticker", move |cancel| {
            loop {
                counted.fetch_add(1, Ordering::SeqCst);
                if cancel.is_cancelled(Duration::from_millis(5)) {
                    break;
                }
            }
        });
        assert_eq!(worker.name(), "ticker");

        // Give it room for at least one tick, then stop
        std::thread::sleep(Duration::from_millis(30));
        worker.join().unwrap();
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn join_works_when_the_body_already_returned() {
        let worker = Worker::spawn("one-shot", |_cancel| {});
        // The body exits immediately and drops its consumer; the stop send
        // fails but the join must still succeed
        std::thread::sleep(Duration::from_millis(20));
        worker.join().unwrap();
    }

    #[test]
    fn join_within_gives_up_on_a_stuck_worker() {
        let worker = Worker::spawn("stuck", |_cancel| {
            std::thread::sleep(Duration::from_secs(3600));
        });
        let err = worker.join_within(Duration::from_millis(120)).unwrap_err();
        assert_matches::assert_matches!(
            err,
            WorkerError::JoinDeadline { worker, waited } => {
                assert_eq!(worker, "stuck");
                assert!(waited >= Duration::from_millis(120));
            }
        );
    }

    #[test]
    fn panicking_worker_is_reported() {
        let worker = Worker::spawn("doomed", |cancel| {
            let _ = cancel.is_cancelled(Duration::from_secs(3600));
            panic!("boom");
        });
        assert_eq!(
            worker.join().unwrap_err(),
            WorkerError::Panicked {
                worker: "doomed".to_string()
            }
        );
    }
}
