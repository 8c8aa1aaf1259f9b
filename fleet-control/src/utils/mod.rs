pub mod worker;

use std::thread;

/// Spawns an OS thread carrying a readable name for logs and stack traces.
pub fn spawn_named<T>(name: &str, f: impl FnOnce() -> T + Send + 'static) -> thread::JoinHandle<T>
where
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(f)
        .expect("a non-empty thread name cannot fail to spawn")
}

/// RFC3339-UTC timestamp helpers, the wire format used by reports and the
/// fleet store.
pub mod time {
    use chrono::{DateTime, SecondsFormat, Utc};

    pub fn to_rfc3339(ts: DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn now_rfc3339() -> String {
        to_rfc3339(Utc::now())
    }

}
