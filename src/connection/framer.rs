//! Line-or-JSON framing for tool-server output streams.
//!
//! A server may split one reply over several reads, or put several replies
//! (and stray log lines) into one. The framer accumulates bytes and yields a
//! value as soon as the buffer starts with a complete JSON object or array.
//! Anything else at the head of the buffer is treated as noise and dropped
//! through the next newline. An incomplete value just means "read more",
//! until the buffer exceeds its limit.

use serde_json::Value;
use thiserror::Error;

/// The buffer outgrew its limit without yielding a value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{buffered} bytes buffered without a complete message (limit {limit})")]
pub struct FrameOverflow {
    pub buffered: usize,
    pub limit: usize,
}

/// Incremental JSON message framer.
#[derive(Debug)]
pub struct JsonFramer {
    buf: Vec<u8>,
    max_bytes: usize,
}

impl JsonFramer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_bytes,
        }
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete message, if the buffer holds one.
    ///
    /// `Ok(None)` means more data is needed. On overflow the buffer is
    /// cleared so the stream can resynchronise.
    pub fn next_value(&mut self) -> Result<Option<Value>, FrameOverflow> {
        loop {
            self.trim_leading_whitespace();
            if self.buf.is_empty() {
                return Ok(None);
            }

            let (parsed, consumed) = {
                let mut stream =
                    serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
                let parsed = stream.next();
                (parsed, stream.byte_offset())
            };

            match parsed {
                Some(Ok(value)) if value.is_object() || value.is_array() => {
                    self.buf.drain(..consumed);
                    return Ok(Some(value));
                }
                // An unterminated line followed by a complete object was noise.
                Some(Err(e)) if e.is_eof() && self.object_follows_first_line() => {
                    self.drop_line();
                }
                Some(Err(e)) if e.is_eof() => return self.need_more(),
                // A scalar or a syntax error: not a message, skip the line.
                Some(_) => {
                    if !self.drop_line() {
                        return self.need_more();
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn trim_leading_whitespace(&mut self) {
        let start = self
            .buf
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buf.len());
        if start > 0 {
            self.buf.drain(..start);
        }
    }

    /// Whether the bytes after the first newline start with a complete object.
    fn object_follows_first_line(&self) -> bool {
        let Some(end) = self.buf.iter().position(|b| *b == b'\n') else {
            return false;
        };
        let mut stream =
            serde_json::Deserializer::from_slice(&self.buf[end + 1..]).into_iter::<Value>();
        matches!(stream.next(), Some(Ok(Value::Object(_))))
    }

    /// Drop bytes through the next newline. Returns false if there is none yet.
    fn drop_line(&mut self) -> bool {
        match self.buf.iter().position(|b| *b == b'\n') {
            Some(end) => {
                let line = String::from_utf8_lossy(&self.buf[..end]);
                tracing::debug!(line = %line.trim_end(), "skipping non-JSON output");
                self.buf.drain(..=end);
                true
            }
            None => false,
        }
    }

    fn need_more(&mut self) -> Result<Option<Value>, FrameOverflow> {
        if self.buf.len() > self.max_bytes {
            let buffered = self.buf.len();
            self.buf.clear();
            return Err(FrameOverflow {
                buffered,
                limit: self.max_bytes,
            });
        }
        Ok(None)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_complete_message() {
        let mut f = JsonFramer::new(1024);
        f.push(b"{\"id\":1,\"result\":{}}\n");
        assert_eq!(f.next_value().unwrap(), Some(json!({"id": 1, "result": {}})));
        assert_eq!(f.next_value().unwrap(), None);
        assert_eq!(f.buffered(), 0);
    }

    #[test]
    fn test_message_split_across_chunks() {
        let mut f = JsonFramer::new(1024);
        f.push(b"{\"id\":7,\"result\":{\"text\":\"line one\\nline");
        assert_eq!(f.next_value().unwrap(), None);
        f.push(b" two\"}}");
        let value = f.next_value().unwrap().unwrap();
        assert_eq!(value["result"]["text"], "line one\nline two");
    }

    #[test]
    fn test_two_messages_in_one_chunk() {
        let mut f = JsonFramer::new(1024);
        f.push(b"{\"id\":1}\n{\"id\":2}\n");
        assert_eq!(f.next_value().unwrap().unwrap()["id"], 1);
        assert_eq!(f.next_value().unwrap().unwrap()["id"], 2);
        assert_eq!(f.next_value().unwrap(), None);
    }

    #[test]
    fn test_messages_without_newline_separator() {
        let mut f = JsonFramer::new(1024);
        f.push(b"{\"id\":1}{\"id\":2}");
        assert_eq!(f.next_value().unwrap().unwrap()["id"], 1);
        assert_eq!(f.next_value().unwrap().unwrap()["id"], 2);
    }

    #[test]
    fn test_log_noise_is_skipped() {
        let mut f = JsonFramer::new(1024);
        f.push(b"Server listening on stdio\n42 tools loaded\n{\"id\":3}\n");
        assert_eq!(f.next_value().unwrap().unwrap()["id"], 3);
    }

    #[test]
    fn test_partial_noise_line_waits_for_newline() {
        let mut f = JsonFramer::new(1024);
        f.push(b"warming up");
        assert_eq!(f.next_value().unwrap(), None);
        f.push(b" caches\n{\"id\":4}");
        assert_eq!(f.next_value().unwrap().unwrap()["id"], 4);
    }

    #[test]
    fn test_unterminated_prefix_line_does_not_stall() {
        let mut f = JsonFramer::new(1024);
        f.push(b"[\n{\"jsonrpc\":\"2.0\",\"id\":5,\"result\":{}}\n");
        assert_eq!(
            f.next_value().unwrap(),
            Some(json!({"jsonrpc": "2.0", "id": 5, "result": {}}))
        );
        assert_eq!(f.buffered(), 0);
    }

    #[test]
    fn test_pretty_printed_message_waits_for_the_rest() {
        let mut f = JsonFramer::new(1024);
        f.push(b"{\n  \"id\": 6,\n  \"result\": {\n");
        assert_eq!(f.next_value().unwrap(), None);
        f.push(b"    \"ok\": true\n  }\n}\n");
        assert_eq!(
            f.next_value().unwrap(),
            Some(json!({"id": 6, "result": {"ok": true}}))
        );
    }

    #[test]
    fn test_overflow_without_complete_message() {
        let mut f = JsonFramer::new(16);
        f.push(b"{\"id\":1,\"result\":\"aaaaaaaaaaaaaaaaaaaa");
        let err = f.next_value().unwrap_err();
        assert_eq!(err.limit, 16);
        assert!(err.buffered > 16);
        assert_eq!(f.buffered(), 0, "buffer is cleared after overflow");
    }

    #[test]
    fn test_large_complete_message_under_limit() {
        let mut f = JsonFramer::new(1 << 20);
        let text = "x".repeat(100_000);
        let payload = serde_json::to_vec(&json!({"id": 9, "result": {"text": text}})).unwrap();
        for chunk in payload.chunks(4096) {
            f.push(chunk);
        }
        assert_eq!(f.next_value().unwrap().unwrap()["id"], 9);
    }
}
