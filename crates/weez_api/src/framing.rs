//! Server-Sent-Events framing
//!
//! Incoming bytes are accumulated in a [`SseFrameBuffer`] until a blank line
//! closes a message. Only complete messages ever leave the buffer, so a message
//! split across any number of network chunks is reassembled before it is parsed.
//! The buffer works on raw bytes: a multi-byte UTF-8 character cut in half by a
//! chunk boundary is only decoded once both halves have arrived.

use serde_json::Value;

const DELIMITER: &[u8] = b"\n\n";

/// Growable byte buffer that yields complete SSE message blocks
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    buffer: Vec<u8>,
}

impl SseFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every message block it completes, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // CR never occurs inside a multi-byte sequence, so dropping it turns
        // CRLF line endings into LF without touching the payload.
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut blocks = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = find_delimiter(&self.buffer[consumed..]) {
            let end = consumed + pos;
            let block = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            if !block.trim().is_empty() {
                blocks.push(block);
            }
            consumed = end + DELIMITER.len();
        }
        self.buffer.drain(..consumed);
        blocks
    }

    /// Take whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let block = String::from_utf8_lossy(&rest).into_owned();
        if block.trim().is_empty() {
            None
        } else {
            Some(block)
        }
    }

    /// Number of buffered bytes that do not yet form a complete message
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

/// One SSE message split into its `event:` and `data:` fields
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Per-message faults; the offending message is dropped and decoding goes on
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FramingError {
    #[error("message has no data line: {0:?}")]
    MissingData(String),

    #[error("data is not valid JSON ({error}): {data:?}")]
    InvalidJson { data: String, error: String },
}

/// Split a message block into its fields.
///
/// Returns `Ok(None)` for blocks that only carry comments (`: keep-alive`).
/// Multiple `data:` lines are joined with `\n`.
pub fn parse_frame(block: &str) -> Result<Option<RawFrame>, FramingError> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();
    let mut has_fields = false;

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        has_fields = true;
        match field {
            "event" => event = Some(value.trim().to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if !has_fields {
        return Ok(None);
    }
    if data_lines.is_empty() {
        return Err(FramingError::MissingData(block.to_string()));
    }

    Ok(Some(RawFrame {
        event: event.filter(|e| !e.is_empty()),
        data: data_lines.join("\n"),
    }))
}

/// Decode a `data:` payload as JSON
pub fn decode_json(data: &str) -> Result<Value, FramingError> {
    serde_json::from_str(data.trim()).map_err(|e| FramingError::InvalidJson {
        data: data.to_string(),
        error: e.to_string(),
    })
}

/// First string-valued field among `keys`, in order
pub(crate) fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
