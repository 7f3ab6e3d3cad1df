//! Vercel AI SDK UI-message stream (`data: {"type":"text-delta","delta":"..."}`).
use serde_json::Value;

use super::{decode_common_markers, non_empty_str, FrameDecoder};
use crate::stream::DecodedEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct AiSdkDecoder;

impl FrameDecoder for AiSdkDecoder {
    fn decode_value(&self, value: &Value) -> DecodedEvent {
        if let Some(event) = decode_common_markers(value) {
            return event;
        }
        if value.get("type").and_then(Value::as_str) != Some("text-delta") {
            // start, start-step, text-start, text-end, finish-step, ...
            return DecodedEvent::Ignore;
        }
        // Older SDK releases name the field `textDelta`.
        non_empty_str(value, "delta")
            .or_else(|| non_empty_str(value, "textDelta"))
            .map_or(DecodedEvent::Ignore, |text| DecodedEvent::TextDelta {
                text: text.to_owned(),
            })
    }
}
