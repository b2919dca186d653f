//! `text/event-stream` framing for the document feed.
//!
//! Lines are split on `\n` (a trailing `\r` is dropped). `event:` sets
//! the event name, `data:` lines accumulate, lines starting with `:`
//! are comments, and a blank line dispatches the pending event.
//!
//! An event that breaks the size limit or is not UTF-8 is skipped up to
//! its terminating blank line and reported as [`SseFrame::Discarded`].
//! `FramedRead` ends the stream after any decoder error, so only I/O
//! failures surface as `Err`.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::error::MarqueeError;

/// Default cap on a single line or event body.
pub const MAX_EVENT_SIZE: usize = 1 << 20;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Output of [`EventStreamCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A complete event.
    Event(SseEvent),
    /// An event that was skipped, with the reason.
    Discarded(String),
}

/// Incremental decoder for server-sent events.
#[derive(Debug)]
pub struct EventStreamCodec {
    max_size: usize,
    event: Option<String>,
    data: Option<String>,
    /// Inside an over-long line; skip to the next `\n`.
    discarding_line: bool,
    /// Set while the current event is being skipped.
    dropped: Option<String>,
}

impl EventStreamCodec {
    pub fn new() -> Self {
        Self::with_max_size(MAX_EVENT_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            event: None,
            data: None,
            discarding_line: false,
            dropped: None,
        }
    }

    fn drop_event(&mut self, reason: &str) {
        self.event = None;
        self.data = None;
        self.dropped.get_or_insert_with(|| reason.to_owned());
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if let Some(reason) = self.dropped.take() {
            return Some(SseFrame::Discarded(reason));
        }
        if self.event.is_none() && self.data.is_none() {
            return None;
        }
        Some(SseFrame::Event(SseEvent {
            event: self.event.take().unwrap_or_else(|| "message".into()),
            data: self.data.take().unwrap_or_default(),
        }))
    }

    fn field(&mut self, line: &str) {
        if self.dropped.is_some() {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                match self.data.as_mut() {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_owned()),
                }
                if self.data.as_ref().map_or(0, String::len) > self.max_size {
                    self.drop_event("event data too large");
                }
            }
            // `id` and `retry` do not matter for a live feed.
            _ => {}
        }
    }
}

impl Default for EventStreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EventStreamCodec {
    type Item = SseFrame;
    type Error = MarqueeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                if self.discarding_line {
                    src.clear();
                } else if src.len() > self.max_size {
                    src.clear();
                    self.discarding_line = true;
                    self.drop_event("event line too long");
                }
                return Ok(None);
            };

            let raw = src.split_to(pos + 1);
            if self.discarding_line {
                self.discarding_line = false;
                continue;
            }

            let mut line = &raw[..pos];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let Ok(line) = std::str::from_utf8(line) else {
                self.drop_event("invalid utf-8");
                continue;
            };

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    return Ok(Some(frame));
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            self.field(line);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // An unterminated event at end of stream is discarded.
        let frame = self.decode(src)?;
        if frame.is_none() {
            src.clear();
            self.event = None;
            self.data = None;
            self.dropped = None;
            self.discarding_line = false;
        }
        Ok(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_frames(codec: &mut EventStreamCodec, input: &str) -> Vec<SseFrame> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(frame);
        }
        out
    }

    fn decode_all(codec: &mut EventStreamCodec, input: &str) -> Vec<SseEvent> {
        decode_frames(codec, input)
            .into_iter()
            .filter_map(|frame| match frame {
                SseFrame::Event(event) => Some(event),
                SseFrame::Discarded(_) => None,
            })
            .collect()
    }

    #[test]
    fn put_event() {
        let mut codec = EventStreamCodec::new();
        let events = decode_all(
            &mut codec,
            "event: put\ndata: {\"path\":\"/\",\"data\":null}\n\n",
        );
        assert_eq!(
            events,
            vec![SseEvent {
                event: "put".into(),
                data: "{\"path\":\"/\",\"data\":null}".into(),
            }]
        );
    }

    #[test]
    fn crlf_comments_and_multiline_data() {
        let mut codec = EventStreamCodec::new();
        let events = decode_all(
            &mut codec,
            ": hello\r\nevent: keep-alive\r\ndata: null\r\n\r\ndata: a\ndata: b\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "keep-alive");
        assert_eq!(events[0].data, "null");
        assert_eq!(events[1].event, "message");
        assert_eq!(events[1].data, "a\nb");
    }

    #[test]
    fn partial_input_waits() {
        let mut codec = EventStreamCodec::new();
        let mut buf = BytesMut::from("event: put\nda");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ta: 1\n\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            frame,
            SseFrame::Event(SseEvent {
                event: "put".into(),
                data: "1".into(),
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn blank_lines_alone_dispatch_nothing() {
        let mut codec = EventStreamCodec::new();
        assert!(decode_frames(&mut codec, "\n\n\n").is_empty());
    }

    #[test]
    fn oversized_line_is_skipped_and_decoding_resumes() {
        let mut codec = EventStreamCodec::with_max_size(16);
        let mut buf = BytesMut::from("event: put\ndata: 0123456789abcdefghij");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // The rest of the long line arrives later, then a good event.
        buf.extend_from_slice(b"klmnop\n\nevent: put\ndata: 1\n\n");
        let frames = {
            let mut out = Vec::new();
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                out.push(frame);
            }
            out
        };
        assert_eq!(
            frames,
            vec![
                SseFrame::Discarded("event line too long".into()),
                SseFrame::Event(SseEvent {
                    event: "put".into(),
                    data: "1".into(),
                }),
            ]
        );
    }

    #[test]
    fn oversized_data_is_skipped() {
        let mut codec = EventStreamCodec::with_max_size(8);
        let frames = decode_frames(
            &mut codec,
            "data: 12345\ndata: 67890\nevent: put\n\ndata: ok\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], SseFrame::Discarded("event data too large".into()));
        assert!(matches!(&frames[1], SseFrame::Event(e) if e.data == "ok"));
    }

    #[test]
    fn invalid_utf8_drops_only_that_event() {
        let mut codec = EventStreamCodec::new();
        let mut buf = BytesMut::from(&b"data: \xff\xfe\n\ndata: 2\n\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(SseFrame::Discarded(_))
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(SseFrame::Event(e)) if e.data == "2"
        ));
    }

    #[test]
    fn eof_discards_unterminated_event() {
        let mut codec = EventStreamCodec::new();
        let mut buf = BytesMut::from("event: put\ndata: 1\n");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}
