use reqwest::StatusCode;
use thiserror::Error;

/// Unified error type for a benchmarking call.
///
/// Errors never escape [`Requester::call`](crate::Requester::call); they end up in
/// [`StatsRecord::last_exception`](crate::StatsRecord::last_exception).
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP/network error from the reqwest transport.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic transport failure (connection reset, refused, DNS) from a custom transport.
    #[error("transport: {0}")]
    Transport(String),

    /// Final HTTP status was not a success and strict mode is enabled.
    #[error("http status {status}: {}", reason.as_deref().unwrap_or("unknown reason"))]
    Status {
        status: u16,
        reason: Option<String>,
        request_id: Option<String>,
    },

    /// Caller-side deadline elapsed.
    #[error("timeout")]
    Timeout,

    /// Call was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(String),

    /// Invalid configuration or request body.
    #[error("config: {0}")]
    Config(String),

    /// Missing API key for an endpoint.
    #[error("missing API key for {0}")]
    MissingApiKey(String),
}

impl Error {
    /// Returns true if a transport-level retry may succeed.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => match e.status() {
                Some(status) => status == StatusCode::TOO_MANY_REQUESTS,
                None => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            },
            Error::Transport(_) | Error::Timeout => true,
            Error::Status { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS.as_u16(),
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for HTTP client errors that are not throttling; these are never retried.
    pub fn is_terminal_status(&self) -> bool {
        self.status()
            .is_some_and(|s| s != StatusCode::TOO_MANY_REQUESTS.as_u16())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
