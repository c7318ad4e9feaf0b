//! HTTP transport seam and the reqwest-backed implementation.

use crate::error::Error;
use crate::sse::SseLines;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Forward-only stream of body lines, terminators stripped.
///
/// Dropping it releases the underlying connection.
pub type LineStream = BoxStream<'static, Result<Bytes, Error>>;

/// One HTTP exchange to perform.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Status, headers and a lazily-read body.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: LineStream,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: LineStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a response whose body is an in-memory list of lines.
    pub fn from_lines<I, L>(status: StatusCode, headers: HeaderMap, lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Bytes>,
    {
        let lines: Vec<Result<Bytes, Error>> = lines.into_iter().map(|l| Ok(l.into())).collect();
        Self::new(status, headers, futures::stream::iter(lines).boxed())
    }

    /// Canonical reason phrase for the status.
    pub fn reason(&self) -> Option<&'static str> {
        self.status.canonical_reason()
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The capability the engine needs from an HTTP client.
///
/// Implementations may be shared across many concurrent calls.
pub trait Transport: Send + Sync {
    /// POST `request` and return once headers are received.
    ///
    /// Non-success statuses are returned as responses, not errors.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, Error>> + Send;
}

/// Transport backed by a pooled `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with default settings.
    pub fn new() -> Result<Self, Error> {
        ReqwestTransportBuilder::new().build()
    }

    /// Create a new transport builder.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let response = self
            .http
            .post(&request.url)
            .headers(request.headers)
            .json(&request.body)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = SseLines::new(response.bytes_stream()).boxed();
        Ok(HttpResponse::new(status, headers, body))
    }
}

/// Builder for [`ReqwestTransport`].
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    http_builder: reqwest::ClientBuilder,
}

impl ReqwestTransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            http_builder: reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_nodelay(true),
        }
    }

    /// Set the per-exchange timeout, covering the whole streamed body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum idle connections kept per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.http_builder = self.http_builder.pool_max_idle_per_host(max);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport, Error> {
        let http = self
            .http_builder
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(ReqwestTransport { http })
    }
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
