use duration_str::deserialize_duration;
use serde::Deserialize;
use std::time::Duration;

/// Default timeout for generic agent-to-controller HTTP calls.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONN_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration to build an [crate::http::client::HttpClient].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HttpConfig {
    #[serde(deserialize_with = "deserialize_duration", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_conn_timeout"
    )]
    pub conn_timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_CLIENT_TIMEOUT
}

fn default_conn_timeout() -> Duration {
    DEFAULT_CONN_TIMEOUT
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CLIENT_TIMEOUT,
            conn_timeout: DEFAULT_CONN_TIMEOUT,
        }
    }
}

impl HttpConfig {
    pub fn new(timeout: Duration, conn_timeout: Duration) -> Self {
        Self {
            timeout,
            conn_timeout,
        }
    }
}
