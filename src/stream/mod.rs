pub mod accumulator;
pub mod aggregator;
pub mod lexer;

pub use accumulator::{DeltaAccumulator, OutboundChunk};
pub use aggregator::{aggregate, Aggregator};
pub use lexer::{FrameLexer, FramePrefix};

/// One unit of upstream output after line splitting and prefix removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFrame {
    pub raw: String,
}

impl UpstreamFrame {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

/// Upstream-agnostic classification of a single frame.
///
/// Decoders map every frame to exactly one variant; malformed input is
/// [`DecodedEvent::Ignore`], never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    TextDelta { text: String },
    /// Last piece of output and the finish reason, sent in one frame.
    FinalDelta { text: String, reason: String },
    /// Whole assistant message delivered in one payload.
    Complete { text: String },
    Finish { reason: Option<String> },
    ErrorEvent { message: String },
    Ignore,
}

/// Per-request state shared by the lexer loop and the accumulator.
#[derive(Debug)]
pub struct StreamSession {
    pub request_id: String,
    pub model: String,
    pub created: u64,
    terminated: bool,
    streamed: String,
    emitted_chars: usize,
}

impl StreamSession {
    #[must_use]
    pub fn new(request_id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            request_id: request_id.into(),
            model: model.into(),
            created,
            terminated: false,
            streamed: String::new(),
            emitted_chars: 0,
        }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of characters of assistant content sent to the caller so far.
    #[must_use]
    pub fn emitted_chars(&self) -> usize {
        self.emitted_chars
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.terminated = true;
    }

    /// Assistant content sent to the caller so far, in order.
    #[must_use]
    pub fn streamed_text(&self) -> &str {
        &self.streamed
    }

    pub(crate) fn record_content(&mut self, text: &str) {
        self.streamed.push_str(text);
        self.emitted_chars += text.chars().count();
    }
}
