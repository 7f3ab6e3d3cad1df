//! Non-streaming consumption: folds decoded events into one message string.
use super::{DecodedEvent, UpstreamFrame};
use crate::error::RelayError;
use crate::protocol::FrameDecoder;

/// Accumulates assistant text for callers that want a single JSON response.
#[derive(Debug, Default)]
pub struct Aggregator {
    text: String,
    finished: bool,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one decoded event.
    ///
    /// Events after a `Finish` are ignored, matching what the streaming path
    /// sends after its terminal chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Upstream`] when upstream declared an error.
    pub fn push(&mut self, event: DecodedEvent) -> Result<(), RelayError> {
        if self.finished {
            return Ok(());
        }
        match event {
            DecodedEvent::TextDelta { text } => self.text.push_str(&text),
            DecodedEvent::FinalDelta { text, .. } => {
                self.text.push_str(&text);
                self.finished = true;
            }
            DecodedEvent::Complete { text } => self.text = text,
            DecodedEvent::Finish { .. } => self.finished = true,
            DecodedEvent::ErrorEvent { message } => {
                return Err(RelayError::upstream_event(message));
            }
            DecodedEvent::Ignore => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Decode every frame and concatenate the assistant text in order.
///
/// # Errors
///
/// Returns [`RelayError::Upstream`] on the first upstream-declared error.
pub fn aggregate<I>(frames: I, decoder: &dyn FrameDecoder) -> Result<String, RelayError>
where
    I: IntoIterator<Item = UpstreamFrame>,
{
    let mut aggregator = Aggregator::new();
    for frame in frames {
        aggregator.push(decoder.decode(&frame))?;
        if aggregator.is_finished() {
            break;
        }
    }
    Ok(aggregator.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TokenDecoder;

    fn frames(raw: &[&str]) -> Vec<UpstreamFrame> {
        raw.iter().map(|r| UpstreamFrame::new(*r)).collect()
    }

    #[test]
    fn test_concatenates_tokens_in_order() {
        let text = aggregate(
            frames(&[
                r#"{"type":"token","token":"Hel"}"#,
                r#"{"type":"token","token":"lo"}"#,
                r#"{"type":"done"}"#,
            ]),
            &TokenDecoder,
        )
        .unwrap();
        assert_eq!(text, "Hello");
    }

    #[test]
    fn test_done_sentinel_only_yields_empty_text() {
        let text = aggregate(frames(&["[DONE]"]), &TokenDecoder).unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn test_garbage_frame_is_skipped() {
        let text = aggregate(
            frames(&[r#"{"token":"a"}"#, "not-json", r#"{"token":"b"}"#]),
            &TokenDecoder,
        )
        .unwrap();
        assert_eq!(text, "ab");
    }

    #[test]
    fn test_error_event_fails_aggregation() {
        let err = aggregate(
            frames(&[
                r#"{"token":"partial"}"#,
                r#"{"type":"error","message":"quota exceeded"}"#,
            ]),
            &TokenDecoder,
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::Upstream { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_complete_payload_replaces_accumulated_text() {
        let mut aggregator = Aggregator::new();
        aggregator
            .push(DecodedEvent::TextDelta {
                text: "draft".into(),
            })
            .unwrap();
        aggregator
            .push(DecodedEvent::Complete {
                text: "final answer".into(),
            })
            .unwrap();
        assert_eq!(aggregator.text(), "final answer");
    }

    #[test]
    fn test_final_delta_appends_then_finishes() {
        let mut aggregator = Aggregator::new();
        for event in [
            DecodedEvent::TextDelta { text: "a".into() },
            DecodedEvent::FinalDelta {
                text: "b".into(),
                reason: "length".into(),
            },
            DecodedEvent::TextDelta { text: "c".into() },
        ] {
            aggregator.push(event).unwrap();
        }
        assert!(aggregator.is_finished());
        assert_eq!(aggregator.text(), "ab");
    }

    #[test]
    fn test_events_after_finish_are_ignored() {
        let text = aggregate(
            frames(&[r#"{"token":"a"}"#, "[DONE]", r#"{"token":"b"}"#]),
            &TokenDecoder,
        )
        .unwrap();
        assert_eq!(text, "a");
    }
}
