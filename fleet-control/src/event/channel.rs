use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use std::time::Duration;
use thiserror::Error;

/// Message published to ask a loop to stop.
pub type CancellationMessage = ();

/// Receiving half of an event channel.
pub struct EventConsumer<E>(Receiver<E>);

impl<E> From<Receiver<E>> for EventConsumer<E> {
    fn from(value: Receiver<E>) -> Self {
        Self(value)
    }
}

/// Sending half of an event channel.
pub struct EventPublisher<E>(Sender<E>);

impl<E> From<Sender<E>> for EventPublisher<E> {
    fn from(value: Sender<E>) -> Self {
        Self(value)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EventPublisherError {
    #[error("error while publishing event: {0}")]
    SendError(String),
    #[error("channel is full, event dropped")]
    ChannelFull,
}

pub fn pub_sub<E>() -> (EventPublisher<E>, EventConsumer<E>) {
    let (s, r) = unbounded();
    (EventPublisher(s), EventConsumer(r))
}

/// Builds a bounded channel. Publishers are expected to use [EventPublisher::try_publish]
/// so a slow consumer drops events instead of stalling the producer.
pub fn pub_sub_bounded<E>(capacity: usize) -> (EventPublisher<E>, EventConsumer<E>) {
    let (s, r) = bounded(capacity);
    (EventPublisher(s), EventConsumer(r))
}

impl<E> EventPublisher<E> {
    pub fn publish(&self, event: E) -> Result<(), EventPublisherError> {
        self.0
            .send(event)
            .map_err(|err| EventPublisherError::SendError(err.to_string()))
    }

    /// Non-blocking publish. Returns [EventPublisherError::ChannelFull] when the
    /// channel has no capacity left.
    pub fn try_publish(&self, event: E) -> Result<(), EventPublisherError> {
        self.0.try_send(event).map_err(|err| {
            if err.is_full() {
                EventPublisherError::ChannelFull
            } else {
                EventPublisherError::SendError(err.to_string())
            }
        })
    }
}

impl<E> Clone for EventPublisher<E> {
    fn clone(&self) -> Self {
        EventPublisher(self.0.clone())
    }
}

impl<E> AsRef<Receiver<E>> for EventConsumer<E> {
    fn as_ref(&self) -> &Receiver<E> {
        &self.0
    }
}

impl EventConsumer<CancellationMessage> {
    /// Combined tick and cancellation primitive for periodic loops: blocks up
    /// to `timeout` waiting for a cancellation message. Returns true when one
    /// arrived (or the channel closed), false when the timeout elapsed and
    /// the loop should run another iteration.
    pub fn is_cancelled(&self, timeout: Duration) -> bool {
        let timed_out = matches!(
            self.0.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        );
        !timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_consume() {
        let (publisher, consumer) = pub_sub();
        publisher.publish("event".to_string()).unwrap();
        assert_eq!("event".to_string(), consumer.as_ref().recv().unwrap());
    }

    #[test]
    fn bounded_channel_drops_when_full() {
        let (publisher, consumer) = pub_sub_bounded(2);
        publisher.try_publish(1).unwrap();
        publisher.try_publish(2).unwrap();
        assert_eq!(
            publisher.try_publish(3).unwrap_err(),
            EventPublisherError::ChannelFull
        );
        assert_eq!(1, consumer.as_ref().recv().unwrap());
        assert_eq!(2, consumer.as_ref().recv().unwrap());
        // Capacity freed, publishing works again
        publisher.try_publish(4).unwrap();
    }

    #[test]
    fn publish_on_closed_channel_errors() {
        let (publisher, consumer) = pub_sub();
        drop(consumer);
        assert_matches::assert_matches!(
            publisher.publish(1),
            Err(EventPublisherError::SendError(_))
        );
    }

    #[test]
    fn cancellation_times_out_then_fires() {
        let (publisher, consumer) = pub_sub::<CancellationMessage>();
        assert!(!consumer.is_cancelled(Duration::from_millis(5)));
        publisher.publish(()).unwrap();
        assert!(consumer.is_cancelled(Duration::from_millis(5)));
        // A closed channel also reads as cancelled
        drop(publisher);
        assert!(consumer.is_cancelled(Duration::from_millis(5)));
    }
}
