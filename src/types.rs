use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message role in conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat-completions request body.
///
/// The endpoint adds `stream` and any server-specific flags at send time.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Extra fields merged into the body, overriding the above.
    pub extra: Option<Map<String, Value>>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Set maximum tokens to generate.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Set temperature for sampling.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Add an extra body field.
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Render the JSON body.
    pub fn into_body(self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(
            "messages".to_string(),
            serde_json::to_value(self.messages).unwrap_or(Value::Null),
        );
        if let Some(max_tokens) = self.max_tokens {
            body.insert("max_tokens".to_string(), Value::Number(max_tokens.into()));
        }
        if let Some(temperature) = self.temperature {
            body.insert("temperature".to_string(), serde_json::json!(temperature));
        }
        if let Some(extra) = self.extra {
            body.extend(extra);
        }
        body
    }
}

impl From<ChatRequest> for Map<String, Value> {
    fn from(request: ChatRequest) -> Self {
        request.into_body()
    }
}

impl From<ChatRequest> for Value {
    fn from(request: ChatRequest) -> Self {
        Value::Object(request.into_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_body() {
        let body = ChatRequest::new(vec![
            Message::system("Be brief."),
            Message::user("Flights from Miami to Seattle?"),
        ])
        .max_tokens(10)
        .temperature(0.5)
        .into_body();

        assert_eq!(
            Value::Object(body),
            json!({
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Flights from Miami to Seattle?"}
                ],
                "max_tokens": 10,
                "temperature": 0.5
            })
        );
    }

    #[test]
    fn test_extra_overrides() {
        let body: Value = ChatRequest::new(vec![Message::user("hi")])
            .max_tokens(10)
            .extra("max_tokens", json!(20))
            .extra("top_p", json!(0.9))
            .into();

        assert_eq!(body["max_tokens"], 20);
        assert_eq!(body["top_p"], 0.9);
        assert!(body.get("temperature").is_none());
    }
}
