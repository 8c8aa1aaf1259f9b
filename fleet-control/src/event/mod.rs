pub mod channel;

/// Application-wide lifecycle events, published by the signal handler and
/// consumed by each binary's main loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationEvent {
    StopRequested,
}
