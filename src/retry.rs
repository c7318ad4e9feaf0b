//! Retry decisions for throttled and failed exchanges.
//!
//! Throttling (429) is retried only when the server names a delay in the
//! `retry-after-ms` header. Transport errors are retried with exponential backoff
//! and full jitter. Both are bounded by one wall-clock budget measured from the
//! start of the call.

use crate::error::Error;
use crate::headers::{self, RetryAfter};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Whether to issue another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then retry.
    Retry(Duration),
    /// Keep the last outcome as final.
    Stop,
}

/// Retry configuration and decision logic.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Master switch; when off every outcome is final.
    pub backoff: bool,
    /// Budget for all attempts of one call.
    pub max_retry_time: Duration,
    /// Backoff ceiling for the first transport-error retry.
    pub initial_backoff: Duration,
    /// Maximum backoff ceiling.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: false,
            max_retry_time: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy with retries enabled and default timings.
    pub fn enabled() -> Self {
        Self {
            backoff: true,
            ..Self::default()
        }
    }

    /// Decide after a 429 response.
    ///
    /// `elapsed` is the time since the call started.
    pub fn on_throttled(&self, headers: &HeaderMap, elapsed: Duration) -> RetryDecision {
        if !self.backoff {
            debug!("throttled with backoff disabled");
            return RetryDecision::Stop;
        }
        let delay = match headers::retry_after(headers) {
            RetryAfter::Delay(delay) => delay,
            RetryAfter::Absent => {
                debug!("throttled without {}", headers::RETRY_AFTER_MS_HEADER);
                return RetryDecision::Stop;
            }
            RetryAfter::Invalid(raw) => {
                warn!(
                    header = headers::RETRY_AFTER_MS_HEADER,
                    value = %raw,
                    "unable to parse retry-after header value"
                );
                return RetryDecision::Stop;
            }
        };
        if !self.within_budget(elapsed.saturating_add(delay)) {
            debug!(
                elapsed_ms = elapsed.as_millis(),
                delay_ms = delay.as_millis(),
                "retry budget exhausted"
            );
            return RetryDecision::Stop;
        }
        debug!(delay_ms = delay.as_millis(), "retry-after sleeping");
        RetryDecision::Retry(delay)
    }

    /// Decide after a transport error on attempt number `attempt` (1-based).
    pub fn on_error(&self, error: &Error, attempt: u32, elapsed: Duration) -> RetryDecision {
        if !self.backoff || error.is_terminal_status() || !error.is_retryable() {
            return RetryDecision::Stop;
        }
        if !self.within_budget(elapsed) {
            debug!(elapsed_ms = elapsed.as_millis(), "retry budget exhausted");
            return RetryDecision::Stop;
        }
        let remaining = self.max_retry_time.saturating_sub(elapsed);
        let delay = self.jittered_backoff(attempt).min(remaining);
        debug!(
            attempt,
            delay_ms = delay.as_millis(),
            error = %error,
            "transport error, backing off"
        );
        RetryDecision::Retry(delay)
    }

    /// Exponential ceiling for `attempt` (1-based), before jitter.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1).min(30)).unwrap_or(30);
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Full jitter: uniform in `[0, ceiling]`.
    fn jittered_backoff(&self, attempt: u32) -> Duration {
        self.backoff_ceiling(attempt).mul_f64(fastrand::f64())
    }

    /// True while an attempt starting `elapsed` after the call began is allowed.
    pub fn within_budget(&self, elapsed: Duration) -> bool {
        elapsed < self.max_retry_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn retry_after(ms: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(headers::RETRY_AFTER_MS_HEADER, HeaderValue::from_static(ms));
        headers
    }

    #[test]
    fn test_disabled_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.on_throttled(&retry_after("50"), Duration::ZERO),
            RetryDecision::Stop
        );
        assert_eq!(
            policy.on_error(&Error::transport("reset"), 1, Duration::ZERO),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_retry_after_honored() {
        let policy = RetryPolicy::enabled();
        assert_eq!(
            policy.on_throttled(&retry_after("50"), Duration::ZERO),
            RetryDecision::Retry(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_missing_or_invalid_retry_after_stops() {
        let policy = RetryPolicy::enabled();
        assert_eq!(
            policy.on_throttled(&HeaderMap::new(), Duration::ZERO),
            RetryDecision::Stop
        );
        assert_eq!(
            policy.on_throttled(&retry_after("later"), Duration::ZERO),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_budget_bounds_throttle_retries() {
        let policy = RetryPolicy::enabled();
        assert_eq!(
            policy.on_throttled(&retry_after("20000"), Duration::from_secs(40)),
            RetryDecision::Stop
        );
        assert_eq!(
            policy.on_throttled(&retry_after("20000"), Duration::from_secs(39)),
            RetryDecision::Retry(Duration::from_secs(20))
        );
    }

    #[test]
    fn test_terminal_status_gives_up() {
        let policy = RetryPolicy::enabled();
        let err = Error::Status {
            status: 404,
            reason: None,
            request_id: None,
        };
        assert_eq!(policy.on_error(&err, 1, Duration::ZERO), RetryDecision::Stop);
        assert_eq!(
            policy.on_error(&Error::config("bad body"), 1, Duration::ZERO),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_transport_error_backoff_is_jittered_and_capped() {
        let policy = RetryPolicy::enabled();
        for attempt in 1..=10 {
            match policy.on_error(&Error::transport("reset"), attempt, Duration::ZERO) {
                RetryDecision::Retry(delay) => assert!(delay <= policy.backoff_ceiling(attempt)),
                RetryDecision::Stop => panic!("attempt {attempt} should retry"),
            }
        }
    }

    #[test]
    fn test_transport_error_backoff_clamped_to_budget() {
        let policy = RetryPolicy::enabled();
        match policy.on_error(&Error::Timeout, 8, Duration::from_millis(59_990)) {
            RetryDecision::Retry(delay) => assert!(delay <= Duration::from_millis(10)),
            RetryDecision::Stop => panic!("budget not yet spent"),
        }
        assert_eq!(
            policy.on_error(&Error::Timeout, 8, Duration::from_secs(60)),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_backoff_ceiling_grows_then_caps() {
        let policy = RetryPolicy::enabled();
        assert_eq!(policy.backoff_ceiling(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_ceiling(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_ceiling(50), Duration::from_secs(30));
    }

    #[test]
    fn test_budget_edge_agrees_for_both_causes() {
        let policy = RetryPolicy::enabled();
        assert!(policy.within_budget(Duration::from_secs(59)));
        assert!(!policy.within_budget(Duration::from_secs(60)));

        assert_eq!(
            policy.on_throttled(&retry_after("1000"), Duration::from_secs(59)),
            RetryDecision::Stop
        );
        assert_eq!(
            policy.on_throttled(&retry_after("999"), Duration::from_secs(59)),
            RetryDecision::Retry(Duration::from_millis(999))
        );
        assert_eq!(
            policy.on_error(&Error::Timeout, 1, Duration::from_secs(60)),
            RetryDecision::Stop
        );
        assert!(matches!(
            policy.on_error(&Error::Timeout, 1, Duration::from_secs(59)),
            RetryDecision::Retry(_)
        ));
    }
}
