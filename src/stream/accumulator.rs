/// Re-emits decoded upstream events as `chat.completion.chunk` SSE records.
use bytes::Bytes;
use serde::Serialize;
use smallvec::SmallVec;

use super::{DecodedEvent, StreamSession};
use crate::util::{push_json_string_escaped, push_u64_decimal};

const DONE_FRAME: &str = "data: [DONE]\n\n";
const STOP_REASON: &str = "stop";
const ERROR_REASON: &str = "error";

/// One OpenAI-shaped streaming chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: [ChunkChoice; 1],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl OutboundChunk {
    fn new(session: &StreamSession, content: Option<String>, finish_reason: Option<String>) -> Self {
        Self {
            id: session.request_id.clone(),
            object: "chat.completion.chunk",
            created: session.created,
            model: session.model.clone(),
            choices: [ChunkChoice {
                index: 0,
                delta: ChunkDelta { content },
                finish_reason,
            }],
        }
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices[0].delta.content.as_deref()
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices[0].finish_reason.as_deref()
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.choices[0].finish_reason.is_some()
    }

    /// Serialize as one `data: {...}\n\n` SSE record.
    #[must_use]
    pub fn to_sse(&self) -> String {
        let choice = &self.choices[0];
        let content_len = choice.delta.content.as_ref().map_or(0, String::len);
        let mut out = String::with_capacity(160 + self.id.len() + self.model.len() + content_len);
        out.push_str("data: {\"id\":");
        push_json_string_escaped(&mut out, &self.id);
        out.push_str(",\"object\":\"");
        out.push_str(self.object);
        out.push_str("\",\"created\":");
        push_u64_decimal(&mut out, self.created);
        out.push_str(",\"model\":");
        push_json_string_escaped(&mut out, &self.model);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{");
        if let Some(content) = choice.delta.content.as_deref() {
            out.push_str("\"content\":");
            push_json_string_escaped(&mut out, content);
        }
        out.push_str("},\"finish_reason\":");
        match choice.finish_reason.as_deref() {
            Some(reason) => push_json_string_escaped(&mut out, reason),
            None => out.push_str("null"),
        }
        out.push_str("}]}\n\n");
        out
    }
}

/// One record written to the outbound SSE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Chunk(OutboundChunk),
    Done,
}

impl Emission {
    #[must_use]
    pub fn to_sse(&self) -> String {
        match self {
            Emission::Chunk(chunk) => chunk.to_sse(),
            Emission::Done => DONE_FRAME.to_owned(),
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Emission::Chunk(chunk) => Bytes::from(chunk.to_sse()),
            Emission::Done => Bytes::from_static(DONE_FRAME.as_bytes()),
        }
    }
}

pub type Emissions = SmallVec<[Emission; 3]>;

/// Inline rendering of an error inside assistant content.
#[must_use]
pub fn inline_error_text(message: &str) -> String {
    format!("\n\n[Error: {message}]")
}

/// Turns [`DecodedEvent`]s into outbound chunks for one [`StreamSession`].
///
/// Every session ends with exactly one terminal chunk followed by exactly
/// one `[DONE]` record, however many terminal signals upstream sends.
#[derive(Debug)]
pub struct DeltaAccumulator {
    session: StreamSession,
}

impl DeltaAccumulator {
    #[must_use]
    pub fn new(session: StreamSession) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    #[must_use]
    pub fn into_session(self) -> StreamSession {
        self.session
    }

    /// Consume one decoded event.
    pub fn push(&mut self, event: DecodedEvent) -> Emissions {
        let mut out = Emissions::new();
        if self.session.is_terminated() {
            return out;
        }

        match event {
            DecodedEvent::TextDelta { text } => self.push_content(text, &mut out),
            DecodedEvent::FinalDelta { text, reason } => {
                self.push_content(text, &mut out);
                self.push_terminal(reason, &mut out);
            }
            DecodedEvent::Complete { mut text } => {
                // Only the part not yet streamed is sent; a whole message
                // that contradicts the streamed prefix cannot be retracted.
                let streamed = self.session.streamed_text();
                if text.starts_with(streamed) {
                    let rest = text.split_off(streamed.len());
                    self.push_content(rest, &mut out);
                } else {
                    tracing::debug!(
                        request_id = %self.session.request_id,
                        streamed_chars = self.session.emitted_chars(),
                        "complete payload diverges from streamed text; ignoring"
                    );
                }
            }
            DecodedEvent::Finish { reason } => {
                self.push_terminal(reason.unwrap_or_else(|| STOP_REASON.to_owned()), &mut out);
            }
            DecodedEvent::ErrorEvent { message } => {
                self.push_content(inline_error_text(&message), &mut out);
                self.push_terminal(STOP_REASON.to_owned(), &mut out);
            }
            DecodedEvent::Ignore => {}
        }
        out
    }

    /// Upstream body ended. Synthesizes the terminal sequence if no terminal
    /// event was seen.
    pub fn finish(&mut self) -> Emissions {
        let mut out = Emissions::new();
        if !self.session.is_terminated() {
            self.push_terminal(STOP_REASON.to_owned(), &mut out);
        }
        out
    }

    /// The stream cannot continue (transport failure, stalled upstream).
    ///
    /// The message is inlined into the terminal chunk, which carries
    /// `finish_reason: "error"`.
    pub fn fail(&mut self, message: &str) -> Emissions {
        let mut out = Emissions::new();
        if self.session.is_terminated() {
            return out;
        }
        let text = inline_error_text(message);
        self.session.record_content(&text);
        out.push(Emission::Chunk(OutboundChunk::new(
            &self.session,
            Some(text),
            Some(ERROR_REASON.to_owned()),
        )));
        self.session.mark_terminated();
        out.push(Emission::Done);
        out
    }

    fn push_content(&mut self, text: String, out: &mut Emissions) {
        if text.is_empty() {
            return;
        }
        self.session.record_content(&text);
        out.push(Emission::Chunk(OutboundChunk::new(
            &self.session,
            Some(text),
            None,
        )));
    }

    fn push_terminal(&mut self, reason: String, out: &mut Emissions) {
        out.push(Emission::Chunk(OutboundChunk::new(
            &self.session,
            None,
            Some(reason),
        )));
        self.session.mark_terminated();
        out.push(Emission::Done);
    }
}
