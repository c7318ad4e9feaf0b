//! Response headers consulted by the engine. None of them are required.

use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::warn;

/// Request id echoed by the gateway, used in failure diagnostics.
pub const REQUEST_ID_HEADER: &str = "apim-request-id";
/// Server-directed retry delay in milliseconds.
pub const RETRY_AFTER_MS_HEADER: &str = "retry-after-ms";
/// Utilization percentage reported by managed deployments.
pub const MANAGED_UTILIZATION_HEADER: &str = "azureml-deployment-utilization";
/// Deployment name routing header for managed endpoints.
pub const DEPLOYMENT_NAME_HEADER: &str = "azureml-model-deployment";
/// Marker letting extra body parameters through to the model server.
pub const EXTRA_PARAMETERS_HEADER: &str = "extra-parameters";

/// Outcome of reading the retry-after header.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryAfter {
    Absent,
    Delay(Duration),
    /// Present but not a usable number of milliseconds; carries the raw value.
    Invalid(String),
}

/// Read the server-directed retry delay.
pub fn retry_after(headers: &HeaderMap) -> RetryAfter {
    let Some(value) = headers.get(RETRY_AFTER_MS_HEADER) else {
        return RetryAfter::Absent;
    };
    let raw = String::from_utf8_lossy(value.as_bytes());
    match raw.trim().parse::<f64>() {
        Ok(ms) => match Duration::try_from_secs_f64(ms / 1000.0) {
            Ok(delay) => RetryAfter::Delay(delay),
            Err(_) => RetryAfter::Invalid(raw.into_owned()),
        },
        Err(_) => RetryAfter::Invalid(raw.into_owned()),
    }
}

/// Parse a utilization header such as `73.5%`.
///
/// Missing headers yield `None` silently; malformed values are logged and skipped.
pub fn utilization(headers: &HeaderMap, name: &str) -> Option<f64> {
    let value = headers.get(name)?;
    let Ok(raw) = value.to_str() else {
        warn!(header = name, "utilization header is not valid text");
        return None;
    };
    if raw.is_empty() {
        warn!(header = name, "got empty utilization header");
        return None;
    }
    let Some(number) = raw.strip_suffix('%') else {
        warn!(header = name, value = raw, "invalid utilization header value");
        return None;
    };
    match number.trim().parse::<f64>() {
        Ok(pct) => Some(pct),
        Err(e) => {
            warn!(
                header = name,
                value = raw,
                error = %e,
                "unable to parse utilization header value"
            );
            None
        }
    }
}

/// Request id for diagnostics.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
}
