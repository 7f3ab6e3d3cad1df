/// Incremental line lexer for upstream response bodies.
///
/// Bytes arrive in arbitrary chunks. The lexer carries incomplete UTF-8
/// sequences and incomplete lines across [`FrameLexer::feed`] calls, and only
/// emits lines that carry the configured record prefix.
use memchr::memchr_iter;

use super::UpstreamFrame;

/// Record prefix a line must carry to be forwarded as a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePrefix {
    /// SSE-style `data:` records. The prefix and one optional space are stripped.
    #[default]
    Data,
    /// Every non-blank line is a frame (newline-delimited JSON).
    None,
}

impl FramePrefix {
    #[inline]
    fn extract<'a>(self, line: &'a str) -> Option<&'a str> {
        match self {
            FramePrefix::Data => {
                let value = line.strip_prefix("data:")?;
                Some(value.strip_prefix(' ').unwrap_or(value))
            }
            FramePrefix::None => Some(line),
        }
    }
}

/// Splits a byte stream into [`UpstreamFrame`]s.
///
/// Retains at most one incomplete line plus up to three bytes of an
/// incomplete UTF-8 sequence.
#[derive(Debug, Default)]
pub struct FrameLexer {
    prefix: FramePrefix,
    buffer: String,
    utf8_tail: Vec<u8>,
}

impl FrameLexer {
    #[must_use]
    pub fn new(prefix: FramePrefix) -> Self {
        Self {
            prefix,
            buffer: String::new(),
            utf8_tail: Vec::new(),
        }
    }

    /// Feed one chunk of raw bytes and return the frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<UpstreamFrame> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one chunk and append completed frames into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<UpstreamFrame>) {
        self.push_utf8(chunk);

        let mut consumed = 0usize;
        for line_end in memchr_iter(b'\n', self.buffer.as_bytes()) {
            let line = &self.buffer[consumed..line_end];
            if let Some(frame) = self.frame_from_line(line) {
                out.push(frame);
            }
            consumed = line_end + 1;
        }

        if consumed == self.buffer.len() {
            self.buffer.clear();
        } else if consumed > 0 {
            self.buffer.drain(..consumed);
        }
    }

    /// Emit whatever is left once the upstream body has ended.
    ///
    /// A trailing line without a newline is still a frame. An incomplete UTF-8
    /// sequence left at end of stream cannot be completed and is dropped.
    pub fn flush(&mut self) -> Option<UpstreamFrame> {
        if !self.utf8_tail.is_empty() {
            tracing::debug!(
                bytes = self.utf8_tail.len(),
                "dropping incomplete UTF-8 sequence at end of upstream body"
            );
            self.utf8_tail.clear();
        }
        let rest = std::mem::take(&mut self.buffer);
        self.frame_from_line(&rest)
    }

    /// Bytes currently held back waiting for more input.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len() + self.utf8_tail.len()
    }

    fn frame_from_line(&self, line: &str) -> Option<UpstreamFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return None;
        }
        let payload = self.prefix.extract(line)?;
        Some(UpstreamFrame {
            raw: payload.to_owned(),
        })
    }

    fn push_utf8(&mut self, chunk: &[u8]) {
        if self.utf8_tail.is_empty() {
            self.push_valid_prefix(chunk);
            return;
        }

        let mut joined = std::mem::take(&mut self.utf8_tail);
        joined.extend_from_slice(chunk);
        self.push_valid_prefix(&joined);
    }

    fn push_valid_prefix(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match err.error_len() {
                        // Sequence cut off by the chunk boundary: wait for more bytes.
                        None => {
                            self.utf8_tail.extend_from_slice(after);
                            return;
                        }
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[invalid_len..];
                        }
                    }
                }
            }
        }
    }
}
