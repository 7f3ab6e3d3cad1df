//! Upstream frame decoders.
//!
//! Each upstream speaks its own JSON event dialect. A [`FrameDecoder`] maps one
//! frame of that dialect onto the closed [`DecodedEvent`] set so the lexer,
//! accumulator and aggregator stay upstream-agnostic.

pub mod ai_sdk;
pub mod openai_chat;
pub mod token;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::{DecodedEvent, UpstreamFrame};

pub use ai_sdk::AiSdkDecoder;
pub use openai_chat::decoder::OpenAiDecoder;
pub use token::TokenDecoder;

const DONE_SENTINEL: &str = "[DONE]";
const DEFAULT_ERROR_MESSAGE: &str = "upstream reported an error";

/// What a frame payload turned out to be before upstream-specific decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// Literal `[DONE]` end-of-stream sentinel.
    Sentinel,
    Empty,
    /// Payload is not valid JSON.
    Malformed,
    Json(Value),
}

impl FramePayload {
    #[must_use]
    pub fn parse(frame: &UpstreamFrame) -> Self {
        let payload = frame.raw.trim();
        if payload.is_empty() {
            return FramePayload::Empty;
        }
        if payload == DONE_SENTINEL {
            return FramePayload::Sentinel;
        }
        match serde_json::from_str(payload) {
            Ok(value) => FramePayload::Json(value),
            Err(_) => FramePayload::Malformed,
        }
    }
}

/// Strategy that classifies one upstream frame.
///
/// Implementations only provide [`FrameDecoder::decode_value`]; sentinel and
/// malformed-payload handling is shared and never fails.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &UpstreamFrame) -> DecodedEvent {
        match FramePayload::parse(frame) {
            FramePayload::Sentinel => DecodedEvent::Finish { reason: None },
            FramePayload::Empty => DecodedEvent::Ignore,
            FramePayload::Malformed => {
                tracing::trace!(frame = %frame.raw, "ignoring malformed upstream frame");
                DecodedEvent::Ignore
            }
            FramePayload::Json(value) => self.decode_value(&value),
        }
    }

    /// Classify an already-parsed JSON payload.
    fn decode_value(&self, value: &Value) -> DecodedEvent;
}

/// Upstream dialect selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpstreamKind {
    /// Vercel AI SDK UI-message stream (`text-delta` events).
    #[default]
    AiSdk,
    /// `{"type":"token","token":"..."}` style streams.
    Token,
    /// OpenAI-compatible `chat.completion.chunk` streams.
    #[serde(rename = "openai")]
    OpenAi,
}

impl UpstreamKind {
    #[must_use]
    pub fn decoder(self) -> &'static dyn FrameDecoder {
        match self {
            UpstreamKind::AiSdk => &AiSdkDecoder,
            UpstreamKind::Token => &TokenDecoder,
            UpstreamKind::OpenAi => &OpenAiDecoder,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamKind::AiSdk => "ai-sdk",
            UpstreamKind::Token => "token",
            UpstreamKind::OpenAi => "openai",
        }
    }
}

/// Terminal, error and whole-message markers shared by every dialect.
///
/// Returns `None` when the payload carries none of them and the
/// upstream-specific text lookup should run.
#[must_use]
pub(crate) fn decode_common_markers(value: &Value) -> Option<DecodedEvent> {
    match value.get("type").and_then(Value::as_str) {
        Some("done" | "finish") => {
            return Some(DecodedEvent::Finish {
                reason: finish_reason(value),
            });
        }
        Some("error") => {
            return Some(DecodedEvent::ErrorEvent {
                message: error_message(value),
            });
        }
        Some("complete") => {
            if let Some(text) = non_empty_str(value, "text").or_else(|| non_empty_str(value, "content"))
            {
                return Some(DecodedEvent::Complete {
                    text: text.to_owned(),
                });
            }
        }
        _ => {}
    }

    match value.get("error") {
        None | Some(Value::Null | Value::Bool(false)) => None,
        Some(_) => Some(DecodedEvent::ErrorEvent {
            message: error_message(value),
        }),
    }
}

#[inline]
pub(crate) fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

fn finish_reason(value: &Value) -> Option<String> {
    non_empty_str(value, "finishReason")
        .or_else(|| non_empty_str(value, "finish_reason"))
        .map(str::to_owned)
}

fn error_message(value: &Value) -> String {
    if let Some(message) =
        non_empty_str(value, "message").or_else(|| non_empty_str(value, "errorText"))
    {
        return message.to_owned();
    }
    match value.get("error") {
        Some(Value::String(message)) if !message.is_empty() => message.clone(),
        Some(Value::Object(error)) => error
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map_or_else(|| Value::Object(error.clone()).to_string(), str::to_owned),
        _ => DEFAULT_ERROR_MESSAGE.to_owned(),
    }
}
