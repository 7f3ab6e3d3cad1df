pub mod decoder;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `OpenAI` Chat Completion request wire type (the subset the relay reads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<OpenAiMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl OpenAiChatRequest {
    /// Streaming unless the caller explicitly sent `"stream": false`.
    #[must_use]
    pub fn wants_stream(&self) -> bool {
        self.stream != Some(false)
    }

    /// Requested model echoed verbatim, or `default_model` when absent or empty.
    #[must_use]
    pub fn resolved_model<'a>(&'a self, default_model: &'a str) -> &'a str {
        self.model
            .as_deref()
            .filter(|model| !model.is_empty())
            .unwrap_or(default_model)
    }
}

/// A chat message. `content` is kept as raw JSON: either a string or an
/// array of content parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl OpenAiMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Value::String(content.into()),
            extra: serde_json::Map::new(),
        }
    }

    /// Plain-text view of `content`; content-part arrays contribute their
    /// `text` parts in order.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect(),
            _ => String::new(),
        }
    }
}

/// `OpenAI` Chat Completion (non-streaming) response wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    pub usage: OpenAiUsage,
}

impl OpenAiChatResponse {
    /// Wrap aggregated assistant text. Upstreams never report token counts,
    /// so usage is zeroed.
    #[must_use]
    pub fn from_text(id: String, model: String, created: u64, content: String) -> Self {
        Self {
            id,
            object: "chat.completion".to_string(),
            created,
            model,
            choices: vec![OpenAiChoice {
                index: 0,
                message: OpenAiResponseMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: "stop".to_string(),
            }],
            usage: OpenAiUsage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub message: OpenAiResponseMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponseMessage {
    pub role: String,
    pub content: String,
}

/// Usage info in the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// `GET /v1/models` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiModelList {
    pub object: String,
    pub data: Vec<OpenAiModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiModel {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

impl OpenAiModelList {
    #[must_use]
    pub fn new<I, S>(ids: I, created: u64, owned_by: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object: "list".to_string(),
            data: ids
                .into_iter()
                .map(|id| OpenAiModel {
                    id: id.into(),
                    object: "model".to_string(),
                    created,
                    owned_by: owned_by.to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_to_streaming() {
        let req: OpenAiChatRequest =
            serde_json::from_value(json!({"messages": [{"role": "user", "content": "hi"}]}))
                .unwrap();
        assert!(req.wants_stream());
        assert_eq!(req.resolved_model("fallback"), "fallback");

        let req: OpenAiChatRequest = serde_json::from_value(
            json!({"model": "m", "messages": [], "stream": false, "is_web_ui": true}),
        )
        .unwrap();
        assert!(!req.wants_stream());
        assert_eq!(req.resolved_model("fallback"), "m");
        assert_eq!(req.extra.get("is_web_ui"), Some(&json!(true)));
    }

    #[test]
    fn test_model_is_echoed_verbatim() {
        let req: OpenAiChatRequest =
            serde_json::from_value(json!({"model": "", "messages": []})).unwrap();
        assert_eq!(req.resolved_model("fallback"), "fallback");

        let req: OpenAiChatRequest =
            serde_json::from_value(json!({"model": " gpt-4o ", "messages": []})).unwrap();
        assert_eq!(req.resolved_model("fallback"), " gpt-4o ");
    }

    #[test]
    fn test_message_text_flattens_content_parts() {
        let msg: OpenAiMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "look "},
                {"type": "image_url", "image_url": {"url": "https://x"}},
                {"type": "text", "text": "here"}
            ]
        }))
        .unwrap();
        assert_eq!(msg.text(), "look here");
        assert_eq!(OpenAiMessage::new("user", "plain").text(), "plain");
    }

    #[test]
    fn test_response_from_text_has_zero_usage() {
        let resp = OpenAiChatResponse::from_text("id1".into(), "m".into(), 1, "Hello".into());
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["content"], "Hello");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["usage"]["total_tokens"], 0);
    }
}
