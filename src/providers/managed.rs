//! Managed online endpoint.
//!
//! Bearer auth, a deployment routing header, and a pass-through marker so that
//! non-standard body fields such as `ignore_eos` reach the model server.

use crate::headers::{
    DEPLOYMENT_NAME_HEADER, EXTRA_PARAMETERS_HEADER, MANAGED_UTILIZATION_HEADER,
};
use crate::providers::Endpoint;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value};
use tracing::warn;

/// Managed endpoint targeting one named deployment.
pub struct ManagedEndpoint {
    url: String,
    api_key: String,
    deployment: String,
    ignore_eos: bool,
}

impl ManagedEndpoint {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            ignore_eos: true,
        }
    }

    /// Whether to ask the server to keep generating past end-of-sequence.
    pub fn ignore_eos(mut self, ignore: bool) -> Self {
        self.ignore_eos = ignore;
        self
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }
}

impl Endpoint for ManagedEndpoint {
    fn name(&self) -> &'static str {
        "managed"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            Ok(mut auth) => {
                auth.set_sensitive(true);
                headers.insert(AUTHORIZATION, auth);
            }
            Err(_) => warn!(
                endpoint = %self.url,
                "api key is not a valid header value, sending without authorization"
            ),
        }
        match HeaderValue::from_str(&self.deployment) {
            Ok(deployment) => {
                headers.insert(DEPLOYMENT_NAME_HEADER, deployment);
            }
            Err(_) => warn!(
                deployment = %self.deployment,
                "deployment name is not a valid header value, sending without routing header"
            ),
        }
        headers.insert(
            EXTRA_PARAMETERS_HEADER,
            HeaderValue::from_static("pass-through"),
        );
        headers
    }

    fn prepare_body(&self, body: &mut Map<String, Value>) {
        body.insert("stream".to_string(), Value::Bool(true));
        if self.ignore_eos {
            body.insert("ignore_eos".to_string(), Value::Bool(true));
        }
    }

    fn utilization_header(&self) -> Option<&str> {
        Some(MANAGED_UTILIZATION_HEADER)
    }
}
