//! Per-request statistics.

use crate::error::Error;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Timing and outcome of one logical call, possibly spanning several HTTP exchanges.
///
/// Fields only move from unset to set and counters only grow while the call is in
/// flight. Once handed back by [`Requester`](crate::Requester) the record is not
/// touched again.
#[derive(Debug, Default)]
pub struct StatsRecord {
    /// Set once, before the first attempt.
    pub request_start_time: Option<Instant>,
    /// Status of the last HTTP exchange attempted; 0 if none completed.
    pub response_status_code: u16,
    /// Headers received for the successful exchange.
    pub response_time: Option<Instant>,
    /// First streamed token event.
    pub first_token_time: Option<Instant>,
    /// Stream fully drained.
    pub response_end_time: Option<Instant>,
    /// Streamed token events; `None` until the first one arrives.
    pub generated_tokens: Option<u32>,
    /// Concatenated deltas, set when the stream is drained.
    pub generated_text: Option<String>,
    /// Percentage from the deployment-utilization header.
    pub deployment_utilization: Option<f64>,
    /// HTTP exchanges attempted.
    pub calls: u32,
    /// Unrecoverable failure of the whole call.
    pub last_exception: Option<Error>,
}

impl StatsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token event, stamping the first one.
    pub(crate) fn record_token(&mut self, now: Instant) {
        if self.first_token_time.is_none() {
            self.first_token_time = Some(now);
        }
        self.generated_tokens = Some(self.generated_tokens.map_or(1, |n| n.saturating_add(1)));
    }

    /// True when no error was recorded and the final status is 200.
    pub fn is_success(&self) -> bool {
        self.last_exception.is_none() && self.response_status_code == 200
    }

    /// Time to first token.
    pub fn ttft(&self) -> Option<Duration> {
        Some(self.first_token_time? - self.request_start_time?)
    }

    /// End-to-end latency, from first attempt to drained stream.
    pub fn e2e(&self) -> Option<Duration> {
        Some(self.response_end_time? - self.request_start_time?)
    }

    /// Mean gap between consecutive token events.
    pub fn time_between_tokens(&self) -> Option<Duration> {
        let tokens = self.generated_tokens?;
        if tokens < 2 {
            return None;
        }
        let span = self.response_end_time? - self.first_token_time?;
        Some(span / (tokens - 1))
    }

    /// Flatten into a serializable row for downstream aggregation.
    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            status: self.response_status_code,
            calls: self.calls,
            ttft: self.ttft().map(|d| d.as_secs_f64()),
            tbt: self.time_between_tokens().map(|d| d.as_secs_f64()),
            e2e: self.e2e().map(|d| d.as_secs_f64()),
            generated_tokens: self.generated_tokens,
            deployment_utilization: self.deployment_utilization,
            error: self.last_exception.as_ref().map(ToString::to_string),
        }
    }
}

/// Serializable view of a [`StatsRecord`], durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub status: u16,
    pub calls: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttft: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e2e: Option<f64>,
    pub generated_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
