//! Token streams: `{"type":"token","token":"..."}` followed by `{"type":"done"}`.
use serde_json::Value;

use super::{decode_common_markers, non_empty_str, FrameDecoder};
use crate::stream::DecodedEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDecoder;

impl FrameDecoder for TokenDecoder {
    fn decode_value(&self, value: &Value) -> DecodedEvent {
        if let Some(event) = decode_common_markers(value) {
            return event;
        }
        non_empty_str(value, "token").map_or(DecodedEvent::Ignore, |text| {
            DecodedEvent::TextDelta {
                text: text.to_owned(),
            }
        })
    }
}
