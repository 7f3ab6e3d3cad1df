use bytes::Bytes;

use super::{to_json_bytes, UpstreamRequestBuilder};
use crate::error::RelayError;
use crate::protocol::openai_chat::OpenAiChatRequest;

/// Forwards the inbound request with the resolved model and `stream: true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiPayloadBuilder;

impl UpstreamRequestBuilder for OpenAiPayloadBuilder {
    fn build_body(&self, request: &OpenAiChatRequest, model: &str) -> Result<Bytes, RelayError> {
        let mut forwarded = request.clone();
        forwarded.model = Some(model.to_owned());
        forwarded.stream = Some(true);
        to_json_bytes(&forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_forwards_extra_fields_and_forces_stream() {
        let request: OpenAiChatRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false,
            "temperature": 0.5
        }))
        .unwrap();
        let body = OpenAiPayloadBuilder.build_body(&request, "gpt-x").unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["model"], "gpt-x");
        assert_eq!(value["stream"], true);
        assert_eq!(value["temperature"], 0.5);
        assert_eq!(value["messages"][0]["content"], "hi");
    }
}
