//! Incremental `text/event-stream` decoding.

use std::time::Duration;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// `retry:` field.
    pub retry: Option<Duration>,
}

impl SseFrame {
    /// Event type with the protocol default applied.
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Accumulates raw body chunks and yields complete frames.
///
/// Chunks may split lines or even multi-byte characters anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current: SseFrame,
    has_fields: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if !self.has_fields {
                return None;
            }
            self.has_fields = false;
            return Some(std::mem::take(&mut self.current));
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
            }
            "retry" => match value.trim().parse::<u64>() {
                Ok(ms) => self.current.retry = Some(Duration::from_millis(ms)),
                Err(_) => return None,
            },
            _ => return None,
        }
        self.has_fields = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_hint_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"retry: 5000\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: None,
                data: String::new(),
                retry: Some(Duration::from_millis(5000)),
            }]
        );
    }

    #[test]
    fn test_newsletter_and_ping() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(
            b"event: newsletter\ndata: {\"id\":1}\n\nevent: ping\ndata: ping\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_type(), "newsletter");
        assert_eq!(frames[0].data, r#"{"id":1}"#);
        assert_eq!(frames[1].event_type(), "ping");
        assert_eq!(frames[1].data, "ping");
    }

    #[test]
    fn test_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: news").is_empty());
        assert!(decoder.push(b"letter\r\ndata: {\"title\":").is_empty());
        let frames = decoder.push(b"\"caf\xc3\xa9\"}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, r#"{"title":"café"}"#);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keepalive\n\ndata: a\ndata: b\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "a\nb");
        assert_eq!(frames[0].event_type(), "message");
    }

    #[test]
    fn test_compact_field_syntax() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"retry:250\nevent:ping\ndata:ping\n\n");
        assert_eq!(frames[0].retry, Some(Duration::from_millis(250)));
        assert_eq!(frames[0].event_type(), "ping");
        assert_eq!(frames[0].data, "ping");
    }
}
