//! Blocking HTTP client used by the agent loops and the compliance probes.
//!
//! Errors carry the method and URL so a single log line identifies the failing
//! call, and they classify into transport failures (retried on the next tick)
//! versus everything else.

use crate::http::config::HttpConfig;
use http::{Request, Response, StatusCode};
use thiserror::Error;

/// Why a request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Timeout,
    Dns,
    Other,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Connect => write!(f, "connect"),
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Dns => write!(f, "dns"),
            TransportKind::Other => write!(f, "transport"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("could not build the http client: {0}")]
    Build(String),
    #[error("malformed request for {url}: {reason}")]
    Request { url: String, reason: String },
    #[error("{method} {url} failed ({kind}): {source}")]
    Transport {
        method: String,
        url: String,
        kind: TransportKind,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}: {}", String::from_utf8_lossy(body))]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        body: Vec<u8>,
    },
    #[error("{method} {url}: reading response body: {source}")]
    Body {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    /// Transport-level failures are worth retrying on the next tick; status
    /// and body errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, HttpError::Transport { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::blocking::Client,
}

impl HttpClient {
    /// Builds a reqwest blocking client on the rustls backend with the
    /// configured timeouts and the system trust store.
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let inner = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(true)
            .timeout(config.timeout)
            .connect_timeout(config.conn_timeout)
            .build()
            .map_err(|err| HttpError::Build(err.to_string()))?;
        Ok(Self { inner })
    }

    /// Sends the request and returns the response with status, version and
    /// body. Non-2xx statuses come back as [HttpError::Status] with the body
    /// attached; the body is read exactly once either way.
    pub fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError> {
        let method = request.method().to_string();
        let url = request.uri().to_string();

        let outcome = self
            .inner
            .request(request.method().clone(), &url)
            .headers(request.headers().clone())
            .body(request.into_body())
            .send()
            .map_err(|source| HttpError::Transport {
                method: method.clone(),
                url: url.clone(),
                kind: transport_kind(&source),
                source,
            })?;

        let status = outcome.status();
        let version = outcome.version();
        let body = outcome
            .bytes()
            .map_err(|source| HttpError::Body {
                method: method.clone(),
                url: url.clone(),
                source,
            })?
            .to_vec();

        if !status.is_success() {
            return Err(HttpError::Status {
                method,
                url,
                status,
                body,
            });
        }

        Response::builder()
            .status(status)
            .version(version)
            .body(body)
            .map_err(|err| HttpError::Request {
                url,
                reason: err.to_string(),
            })
    }
}

fn transport_kind(err: &reqwest::Error) -> TransportKind {
    if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_connect() {
        TransportKind::Connect
    } else if err.to_string().to_lowercase().contains("dns") {
        TransportKind::Dns
    } else {
        TransportKind::Other
    }
}
