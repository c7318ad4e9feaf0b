//! Endpoint conventions: URL, auth/routing headers and body augmentation.

pub mod managed;
pub mod openai_compat;

use crate::error::Error;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::str::FromStr;

pub use managed::ManagedEndpoint;
pub use openai_compat::OpenAiCompatEndpoint;

/// How a particular serving stack wants to be called.
pub trait Endpoint: Send + Sync {
    /// Short name used in logs (e.g., "managed", "openai").
    fn name(&self) -> &str;

    /// Full URL for the streaming completion request.
    fn url(&self) -> &str;

    /// Request headers including auth.
    fn headers(&self) -> HeaderMap;

    /// Add transport-required fields to the body. Must be idempotent.
    fn prepare_body(&self, body: &mut Map<String, Value>);

    /// Response header carrying a utilization percentage, if this endpoint reports one.
    fn utilization_header(&self) -> Option<&str> {
        None
    }
}

/// Known endpoint flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Managed online endpoint with bearer auth and deployment routing.
    Managed,
    /// Self-hosted OpenAI-compatible server.
    OpenAi,
}

impl FromStr for EndpointKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" | "aml" | "azureml" => Ok(Self::Managed),
            "openai" | "vllm" => Ok(Self::OpenAi),
            other => Err(Error::config(format!("unknown endpoint kind: {other}"))),
        }
    }
}

/// Environment variable names read by [`from_env`].
pub const ENV_ENDPOINT: &str = "LLM_BENCH_ENDPOINT";
pub const ENV_URL: &str = "LLM_BENCH_URL";
pub const ENV_API_KEY: &str = "LLM_BENCH_API_KEY";
pub const ENV_DEPLOYMENT: &str = "LLM_BENCH_DEPLOYMENT";
pub const ENV_MODEL: &str = "LLM_BENCH_MODEL";

/// Build an endpoint from environment variables.
pub fn from_env() -> Result<Box<dyn Endpoint>, Error> {
    from_lookup(|name| std::env::var(name).ok())
}

/// Build an endpoint from a variable lookup.
pub fn from_lookup<F>(lookup: F) -> Result<Box<dyn Endpoint>, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let kind = match get(ENV_ENDPOINT) {
        Some(raw) => raw.parse::<EndpointKind>()?,
        None => EndpointKind::Managed,
    };
    let url = get(ENV_URL).ok_or_else(|| Error::config(format!("{ENV_URL} is not set")))?;

    match kind {
        EndpointKind::Managed => {
            let api_key = get(ENV_API_KEY)
                .ok_or_else(|| Error::MissingApiKey(format!("managed endpoint {url}")))?;
            let deployment = get(ENV_DEPLOYMENT)
                .ok_or_else(|| Error::config(format!("{ENV_DEPLOYMENT} is not set")))?;
            Ok(Box::new(ManagedEndpoint::new(url, api_key, deployment)))
        }
        EndpointKind::OpenAi => {
            let mut endpoint = OpenAiCompatEndpoint::new(url);
            if let Some(model) = get(ENV_MODEL) {
                endpoint = endpoint.with_model(model);
            }
            if let Some(key) = get(ENV_API_KEY) {
                endpoint = endpoint.with_api_key(key);
            }
            Ok(Box::new(endpoint))
        }
    }
}
