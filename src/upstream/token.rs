use bytes::Bytes;
use serde::Serialize;

use super::{to_json_bytes, UpstreamRequestBuilder};
use crate::error::RelayError;
use crate::protocol::openai_chat::{OpenAiChatRequest, OpenAiMessage};

/// Builds `{model, messages, stream: true}` payloads for token-stream upstreams.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPayloadBuilder;

#[derive(Debug, Serialize)]
struct TokenPayload<'a> {
    model: &'a str,
    messages: &'a [OpenAiMessage],
    stream: bool,
}

impl UpstreamRequestBuilder for TokenPayloadBuilder {
    fn build_body(&self, request: &OpenAiChatRequest, model: &str) -> Result<Bytes, RelayError> {
        to_json_bytes(&TokenPayload {
            model,
            messages: &request.messages,
            stream: true,
        })
    }
}
