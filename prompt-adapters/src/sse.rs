//! Incremental server-sent events decoding.

use bytes::{Buf, BytesMut};

/// One dispatched server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if present.
    pub event: Option<String>,
    /// Concatenated `data:` lines, joined by `\n`.
    pub data: String,
}

/// Splits a byte stream into server-sent events.
///
/// Chunks may end anywhere, including inside a line or a UTF-8 sequence;
/// incomplete lines are buffered until the next [`SseDecoder::push`].
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    pending: Option<SseEvent>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes, returning every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.split_to(newline);
            self.buffer.advance(1);
            let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
            if let Some(event) = self.consume_line(&String::from_utf8_lossy(line)) {
                events.push(event);
            }
        }

        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = self.buffer.split();
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(event) = self.consume_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.pending.take()
    }

    fn consume_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.pending.take();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                let event = self.pending.get_or_insert_with(SseEvent::default);
                if !event.data.is_empty() {
                    event.data.push('\n');
                }
                event.data.push_str(value);
            }
            "event" => {
                self.pending.get_or_insert_with(SseEvent::default).event = Some(value.to_owned());
            }
            _ => {}
        }
        None
    }
}
