//! Incremental Server-Sent-Events decoding.
//!
//! Bytes arrive in arbitrary chunks. [`Utf8ChunkDecoder`] turns them into text
//! without splitting code points, [`SseDecoder`] reassembles lines and field
//! blocks, and [`EventDecoder`] glues the two together for the reader loop.

use tracing::trace;

const REPLACEMENT: char = '\u{FFFD}';
const BOM: char = '\u{FEFF}';

/// One dispatched SSE event.
///
/// Only field blocks that carried at least one `data` line are dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Value of the `event` field, if the block had one.
    pub event: Option<String>,
    /// All `data` lines of the block joined with `\n`.
    pub data: String,
    /// Last event id in effect when the block was dispatched.
    pub id: Option<String>,
    /// Reconnection delay (ms) announced by this block.
    pub retry: Option<u64>,
}

/// Stream-mode UTF-8 decoder.
///
/// An incomplete code point at the end of a chunk is held back until the next
/// chunk completes it. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    /// Decodes as much of `chunk` (plus any held-back bytes) as is complete.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&rest[..valid_up_to]) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(REPLACEMENT);
                            consumed += valid_up_to + invalid_len;
                        }
                        None => {
                            consumed += valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
        out
    }

    /// Flushes held-back bytes at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Returns `true` when bytes are waiting for the rest of a code point.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Line-oriented SSE field parser.
///
/// Accepts `\n`, `\r\n` and bare `\r` line endings, including a `\r\n` pair
/// split across two chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: String,
    pending_cr: bool,
    started: bool,
    event: Option<String>,
    data_lines: Vec<String>,
    retry: Option<u64>,
    last_event_id: Option<String>,
    reconnect_interval: Option<u64>,
}

impl SseDecoder {
    /// Feeds decoded text and invokes `on_event` for every completed event,
    /// in arrival order.
    pub fn feed(&mut self, text: &str, mut on_event: impl FnMut(StreamEvent)) {
        if text.is_empty() {
            return;
        }
        let mut rest = text;
        if !self.started {
            self.started = true;
            rest = rest.strip_prefix(BOM).unwrap_or(rest);
        }
        if self.pending_cr {
            self.pending_cr = false;
            rest = rest.strip_prefix('\n').unwrap_or(rest);
        }
        while let Some(pos) = rest.find(['\r', '\n']) {
            self.line.push_str(&rest[..pos]);
            let was_cr = rest.as_bytes()[pos] == b'\r';
            rest = &rest[pos + 1..];
            if was_cr {
                if rest.is_empty() {
                    self.pending_cr = true;
                } else {
                    rest = rest.strip_prefix('\n').unwrap_or(rest);
                }
            }
            let line = std::mem::take(&mut self.line);
            if let Some(event) = self.process_line(&line) {
                on_event(event);
            }
        }
        self.line.push_str(rest);
    }

    /// Reconnection delay most recently announced by the server.
    pub fn reconnect_interval(&self) -> Option<u64> {
        self.reconnect_interval
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty()
                    && value.bytes().all(|b| b.is_ascii_digit())
                    && let Ok(ms) = value.parse()
                {
                    self.retry = Some(ms);
                    self.reconnect_interval = Some(ms);
                }
            }
            other => trace!(field = other, "ignoring unknown SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let event = self.event.take();
        let retry = self.retry.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(StreamEvent {
            event,
            data,
            id: self.last_event_id.clone(),
            retry,
        })
    }
}

/// Byte-level SSE decoder: UTF-8 stream decoding followed by event framing.
#[derive(Debug, Default)]
pub struct EventDecoder {
    text: Utf8ChunkDecoder,
    events: SseDecoder,
}

impl EventDecoder {
    /// Feeds one raw chunk and invokes `on_event` for each completed event.
    pub fn push_chunk(&mut self, chunk: &[u8], on_event: impl FnMut(StreamEvent)) {
        let text = self.text.decode(chunk);
        self.events.feed(&text, on_event);
    }

    /// Flushes held-back bytes at end of stream.
    ///
    /// A trailing event without its terminating blank line is discarded.
    pub fn finish(&mut self, on_event: impl FnMut(StreamEvent)) {
        let tail = self.text.finish();
        self.events.feed(&tail, on_event);
    }

    /// Reconnection delay most recently announced by the server.
    pub fn reconnect_interval(&self) -> Option<u64> {
        self.events.reconnect_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = EventDecoder::default();
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.push_chunk(chunk, |event| out.push(event));
        }
        decoder.finish(|event| out.push(event));
        out
    }

    const SAMPLE: &str = "event: message\nid: 7\ndata: {\"text\":\"酸甜可口\"}\n\n: keep-alive\n\ndata: first\ndata: second\nretry: 1500\n\ndata:no-space\r\n\r\n";

    #[test]
    fn dispatches_events_on_blank_lines() {
        let events = decode_chunks(&[SAMPLE.as_bytes()]);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].data, "{\"text\":\"酸甜可口\"}");
        assert_eq!(events[1].data, "first\nsecond");
        assert_eq!(events[1].event, None);
        assert_eq!(events[1].id.as_deref(), Some("7"));
        assert_eq!(events[1].retry, Some(1500));
        assert_eq!(events[2].data, "no-space");
        assert_eq!(events[2].retry, None);
    }

    #[test]
    fn every_split_point_matches_single_chunk_parse() {
        let bytes = SAMPLE.as_bytes();
        let whole = decode_chunks(&[bytes]);
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_chunks(&[a, b]), whole, "split at byte {split}");
        }
        let single_bytes: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_chunks(&single_bytes), whole);
    }

    #[test]
    fn split_code_point_is_held_back() {
        let mut decoder = Utf8ChunkDecoder::default();
        let bytes = "鲜".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&bytes[1..2]), "");
        assert_eq!(decoder.decode(&bytes[2..]), "鲜");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = Utf8ChunkDecoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(&[0xE9, 0xB2]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn bare_carriage_returns_and_split_crlf_are_line_endings() {
        let mut decoder = SseDecoder::default();
        let mut events = Vec::new();
        decoder.feed("data: a\r", |e| events.push(e));
        decoder.feed("\n\r", |e| events.push(e));
        decoder.feed("data: b\r\r", |e| events.push(e));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
    }

    #[test]
    fn events_without_data_are_not_dispatched_and_type_resets() {
        let events = decode_chunks(&[b"event: ping\n\ndata: x\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, None);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn field_without_colon_and_unknown_fields_are_tolerated() {
        let events = decode_chunks(&[b"data\nfoo: bar\nretry: soon\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
        assert_eq!(events[0].retry, None);
    }

    #[test]
    fn leading_bom_is_dropped_and_trailing_partial_event_discarded() {
        let mut bytes = "\u{FEFF}data: hi\n\n".as_bytes().to_vec();
        bytes.extend_from_slice(b"data: unterminated");
        let events = decode_chunks(&[&bytes]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn reconnect_interval_is_remembered() {
        let mut decoder = EventDecoder::default();
        decoder.push_chunk(b"retry: 3000\n\n", |_| {});
        assert_eq!(decoder.reconnect_interval(), Some(3000));
    }
}
