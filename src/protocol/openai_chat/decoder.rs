//! OpenAI-compatible upstreams: `chat.completion.chunk` frames, or a whole
//! `chat.completion` body when the upstream ignored `stream: true`.
use serde_json::Value;

use crate::protocol::{decode_common_markers, non_empty_str, FrameDecoder};
use crate::stream::DecodedEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiDecoder;

impl FrameDecoder for OpenAiDecoder {
    fn decode_value(&self, value: &Value) -> DecodedEvent {
        if let Some(event) = decode_common_markers(value) {
            return event;
        }
        let Some(choice) = value
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return DecodedEvent::Ignore;
        };

        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty());
        if let Some(text) = choice.get("delta").and_then(|d| non_empty_str(d, "content")) {
            let text = text.to_owned();
            return match finish_reason {
                Some(reason) => DecodedEvent::FinalDelta {
                    text,
                    reason: reason.to_owned(),
                },
                None => DecodedEvent::TextDelta { text },
            };
        }
        if let Some(text) = choice
            .get("message")
            .and_then(|m| non_empty_str(m, "content"))
        {
            return DecodedEvent::Complete {
                text: text.to_owned(),
            };
        }
        match finish_reason {
            Some(reason) => DecodedEvent::Finish {
                reason: Some(reason.to_owned()),
            },
            None => DecodedEvent::Ignore,
        }
    }
}
