use bytes::Bytes;
use serde::Serialize;

use super::{to_json_bytes, UpstreamRequestBuilder};
use crate::error::RelayError;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::util::random_alnum_id;

const ID_LEN: usize = 16;
const TRIGGER: &str = "submit-message";

/// Builds Vercel AI SDK UI-message chat payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AiSdkPayloadBuilder {
    web_search: bool,
}

impl AiSdkPayloadBuilder {
    #[must_use]
    pub fn new(web_search: bool) -> Self {
        Self { web_search }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AiSdkPayload<'a> {
    model: &'a str,
    web_search: bool,
    id: String,
    messages: Vec<AiSdkMessage<'a>>,
    trigger: &'static str,
}

#[derive(Debug, Serialize)]
struct AiSdkMessage<'a> {
    parts: [AiSdkPart; 1],
    id: String,
    role: &'a str,
}

#[derive(Debug, Serialize)]
struct AiSdkPart {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

impl UpstreamRequestBuilder for AiSdkPayloadBuilder {
    fn build_body(&self, request: &OpenAiChatRequest, model: &str) -> Result<Bytes, RelayError> {
        let messages = request
            .messages
            .iter()
            .map(|message| AiSdkMessage {
                parts: [AiSdkPart {
                    kind: "text",
                    text: message.text(),
                }],
                id: random_alnum_id(ID_LEN),
                role: &message.role,
            })
            .collect();

        to_json_bytes(&AiSdkPayload {
            model,
            web_search: self.web_search,
            id: random_alnum_id(ID_LEN),
            messages,
            trigger: TRIGGER,
        })
    }
}
