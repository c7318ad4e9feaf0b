//! Self-hosted OpenAI-compatible server (vLLM and friends).
//!
//! No auth or routing headers by default; the model is named in the body.

use crate::providers::Endpoint;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value};

/// OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatEndpoint {
    url: String,
    model: Option<String>,
    api_key: Option<String>,
}

impl OpenAiCompatEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: None,
            api_key: None,
        }
    }

    /// Model written into every request body.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Send a bearer token; most self-hosted servers do not need one.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

impl Endpoint for OpenAiCompatEndpoint {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(AUTHORIZATION, auth);
            }
        }
        headers
    }

    fn prepare_body(&self, body: &mut Map<String, Value>) {
        body.insert("stream".to_string(), Value::Bool(true));
        if let Some(model) = &self.model {
            body.insert("model".to_string(), Value::String(model.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_without_auth() {
        let headers =
            OpenAiCompatEndpoint::new("http://localhost:8000/v1/chat/completions").headers();
        assert_eq!(headers.len(), 1);
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_headers_with_key() {
        let headers = OpenAiCompatEndpoint::new("http://x").with_api_key("EMPTY").headers();
        assert_eq!(headers[AUTHORIZATION], "Bearer EMPTY");
    }

    #[test]
    fn test_prepare_body_sets_model() {
        let endpoint = OpenAiCompatEndpoint::new("http://x").with_model("phi-3-mini");
        let mut body = Map::new();
        endpoint.prepare_body(&mut body);
        endpoint.prepare_body(&mut body);

        assert_eq!(body.len(), 2);
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "phi-3-mini");
        assert!(!body.contains_key("ignore_eos"));
    }
}
