//! Request engine: one logical streaming call with governed retries.

use crate::error::Error;
use crate::headers;
use crate::providers::Endpoint;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::stats::StatsRecord;
use crate::stream::StreamParser;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use futures::future::{self, Either};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, debug_span, warn, Instrument};

/// Issues streaming requests against one endpoint and measures them.
///
/// Cheap to clone; clones share the endpoint. Holds no per-call state, so one
/// requester can drive any number of concurrent calls.
#[derive(Clone)]
pub struct Requester {
    endpoint: Arc<dyn Endpoint>,
    policy: RetryPolicy,
    strict: bool,
}

/// Builder for [`Requester`].
pub struct RequesterBuilder {
    endpoint: Arc<dyn Endpoint>,
    policy: RetryPolicy,
    strict: bool,
}

impl RequesterBuilder {
    pub fn new(endpoint: impl Endpoint + 'static) -> Self {
        Self::from_arc(Arc::new(endpoint))
    }

    pub fn from_arc(endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            endpoint,
            policy: RetryPolicy::default(),
            strict: false,
        }
    }

    /// Retry throttled responses and transport errors.
    pub fn backoff(mut self, enabled: bool) -> Self {
        self.policy.backoff = enabled;
        self
    }

    /// Record any final non-success status as `last_exception`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the wall-clock budget for all attempts of one call.
    pub fn max_retry_time(mut self, budget: Duration) -> Self {
        self.policy.max_retry_time = budget;
        self
    }

    /// Set initial transport-error backoff.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.policy.initial_backoff = backoff;
        self
    }

    /// Set maximum transport-error backoff.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.policy.max_backoff = backoff;
        self
    }

    /// Set backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.backoff_multiplier = multiplier;
        self
    }

    /// Replace the whole retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Requester {
        Requester {
            endpoint: self.endpoint,
            policy: self.policy,
            strict: self.strict,
        }
    }
}

impl Requester {
    /// Create a requester with default settings (no retries, not strict).
    pub fn new(endpoint: impl Endpoint + 'static) -> Self {
        RequesterBuilder::new(endpoint).build()
    }

    /// Create a new requester builder.
    pub fn builder(endpoint: impl Endpoint + 'static) -> RequesterBuilder {
        RequesterBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &dyn Endpoint {
        self.endpoint.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one call to completion. Never fails; see [`StatsRecord::last_exception`].
    pub async fn call<T: Transport>(
        &self,
        transport: &T,
        body: Map<String, Value>,
    ) -> StatsRecord {
        self.call_until(transport, body, future::pending::<Error>()).await
    }

    /// Run one call, giving up after `timeout` with [`Error::Timeout`].
    pub async fn call_with_timeout<T: Transport>(
        &self,
        transport: &T,
        body: Map<String, Value>,
        timeout: Duration,
    ) -> StatsRecord {
        let deadline = async move {
            sleep(timeout).await;
            Error::Timeout
        };
        self.call_until(transport, body, deadline).await
    }

    /// Run one call until it completes or `cancel` resolves.
    ///
    /// When `cancel` wins, the in-flight send, read or retry sleep is dropped and
    /// the error it yields is recorded. Fields populated up to that point are kept.
    pub async fn call_until<T, C>(
        &self,
        transport: &T,
        body: Map<String, Value>,
        cancel: C,
    ) -> StatsRecord
    where
        T: Transport,
        C: Future<Output = Error>,
    {
        let mut stats = StatsRecord::new();
        let span = debug_span!("call", endpoint = self.endpoint.name());

        let outcome = {
            let run = pin!(self.execute(transport, body, &mut stats).instrument(span));
            let cancel = pin!(cancel);
            match future::select(run, cancel).await {
                Either::Left((outcome, _)) => outcome,
                Either::Right((err, _)) => Err(err),
            }
        };

        if let Err(err) = outcome {
            warn!(
                endpoint = self.endpoint.name(),
                calls = stats.calls,
                status = stats.response_status_code,
                error = %err,
                "call failed"
            );
            stats.last_exception = Some(err);
        }
        stats
    }

    async fn execute<T: Transport>(
        &self,
        transport: &T,
        mut body: Map<String, Value>,
        stats: &mut StatsRecord,
    ) -> Result<(), Error> {
        let started = Instant::now();
        stats.request_start_time = Some(started);

        let response = self.exchange(transport, &mut body, stats, started).await?;
        let status = response.status;

        if status.is_success() {
            stats.response_time = Some(Instant::now());
            let mut parser = StreamParser::new();
            return parser.consume(response.body, stats).await;
        }

        let request_id = headers::request_id(&response.headers).map(str::to_owned);
        let reason = response.reason().map(str::to_owned);
        if status != StatusCode::TOO_MANY_REQUESTS {
            warn!(
                request_id = request_id.as_deref().unwrap_or("-"),
                status = status.as_u16(),
                reason = reason.as_deref().unwrap_or("-"),
                "request failed"
            );
        }
        if self.strict {
            return Err(Error::Status {
                status: status.as_u16(),
                reason,
                request_id,
            });
        }
        Ok(())
    }

    /// Attempt loop. Returns the final response; transport errors that exhaust the
    /// policy are returned as `Err`.
    async fn exchange<T: Transport>(
        &self,
        transport: &T,
        fields: &mut Map<String, Value>,
        stats: &mut StatsRecord,
        started: Instant,
    ) -> Result<HttpResponse, Error> {
        let mut attempt = 0u32;
        loop {
            self.endpoint.prepare_body(fields);
            let request = HttpRequest {
                url: self.endpoint.url().to_owned(),
                headers: self.endpoint.headers(),
                body: Value::Object(fields.clone()),
            };

            attempt += 1;
            stats.calls += 1;

            let response = match transport.send(request).await {
                Ok(response) => response,
                Err(err) => match self.policy.on_error(&err, attempt, started.elapsed()) {
                    RetryDecision::Retry(delay) => {
                        sleep(delay).await;
                        continue;
                    }
                    RetryDecision::Stop => return Err(err),
                },
            };

            stats.response_status_code = response.status.as_u16();
            if let Some(name) = self.endpoint.utilization_header() {
                if let Some(pct) = headers::utilization(&response.headers, name) {
                    stats.deployment_utilization = Some(pct);
                }
            }

            if response.status != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            match self.policy.on_throttled(&response.headers, started.elapsed()) {
                RetryDecision::Retry(delay) => {
                    drop(response);
                    sleep(delay).await;
                    debug!(attempt, "retrying throttled request");
                }
                RetryDecision::Stop => return Ok(response),
            }
        }
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("endpoint", &self.endpoint.name())
            .field("policy", &self.policy)
            .field("strict", &self.strict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ManagedEndpoint, OpenAiCompatEndpoint};

    #[test]
    fn test_requester_builder() {
        let requester = Requester::builder(ManagedEndpoint::new("https://x", "k", "blue"))
            .backoff(true)
            .strict(true)
            .max_retry_time(Duration::from_secs(10))
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_secs(2))
            .backoff_multiplier(3.0)
            .build();

        let policy = requester.retry_policy();
        assert!(policy.backoff);
        assert_eq!(policy.max_retry_time, Duration::from_secs(10));
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
        assert!(requester.strict);
        assert_eq!(requester.endpoint().name(), "managed");
    }

    #[test]
    fn test_default_requester_does_not_retry() {
        let requester = Requester::new(OpenAiCompatEndpoint::new("http://x"));
        assert!(!requester.retry_policy().backoff);
        assert_eq!(requester.retry_policy().max_retry_time, Duration::from_secs(60));
        assert!(!requester.strict);
    }
}
