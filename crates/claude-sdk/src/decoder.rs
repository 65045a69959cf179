use serde_json::Value;

use crate::error::{ClaudeSdkError, DecodeFailure};
use crate::Result;

/// Largest document the decoder will buffer before giving up (50 MiB).
pub const MAX_BUFFER_SIZE: usize = 50 * 1024 * 1024;

/// Past this many buffered characters a failed parse is treated as malformed
/// input rather than a document still waiting for its remaining bytes.
pub const AMBIGUOUS_PARSE_LIMIT: usize = 10_000;

/// Incremental NDJSON reassembly.
///
/// Units (usually stdout lines) are trimmed and appended to a single buffer;
/// each push attempts to parse the whole buffer as one JSON document. The
/// decoder is either idle (empty buffer) or accumulating a document that
/// has failed to parse so far.
///
/// A failed parse is only fatal once the buffer holds an embedded newline or
/// grows past [`AMBIGUOUS_PARSE_LIMIT`]. Below that, a truncated document and
/// a short malformed line look the same, so the decoder keeps buffering.
#[derive(Debug)]
pub struct NdjsonDecoder {
    buffer: String,
    max_buffer_size: usize,
}

impl Default for NdjsonDecoder {
    fn default() -> Self {
        Self::new(MAX_BUFFER_SIZE)
    }
}

impl NdjsonDecoder {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            buffer: String::new(),
            max_buffer_size,
        }
    }

    /// Feed one unit of input. Returns the decoded document once the buffer
    /// forms a complete one.
    pub fn push(&mut self, unit: &str) -> Result<Option<Value>> {
        let unit = unit.trim();
        if unit.is_empty() {
            return Ok(None);
        }

        self.buffer.push_str(unit);
        if self.buffer.len() > self.max_buffer_size {
            return Err(self.overflow(""));
        }

        match serde_json::from_str::<Value>(&self.buffer) {
            Ok(value) => {
                self.buffer.clear();
                Ok(Some(value))
            }
            Err(e) => {
                if self.buffer.contains('\n') || self.buffer.len() > AMBIGUOUS_PARSE_LIMIT {
                    Err(self.malformed(e))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Final parse attempt once the input has ended.
    pub fn finish(&mut self) -> Result<Option<Value>> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&self.buffer) {
            Ok(value) => {
                self.buffer.clear();
                Ok(Some(value))
            }
            Err(e) => Err(self.malformed(e)),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Error for input that pushed (or would push) the buffer past its limit.
    /// `pending` is input not yet handed to [`push`](Self::push). The buffer
    /// is cleared.
    pub(crate) fn overflow(&mut self, pending: &str) -> ClaudeSdkError {
        let mut line = std::mem::take(&mut self.buffer);
        line.push_str(pending);
        ClaudeSdkError::JsonDecode {
            line,
            source: DecodeFailure::BufferOverflow {
                limit: self.max_buffer_size,
            },
        }
    }

    fn malformed(&mut self, source: serde_json::Error) -> ClaudeSdkError {
        let line = std::mem::take(&mut self.buffer);
        ClaudeSdkError::JsonDecode {
            line,
            source: DecodeFailure::Syntax(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_line_decodes_immediately() {
        let mut d = NdjsonDecoder::default();
        let v = d.push(r#"{"type":"system","subtype":"init"}"#).unwrap();
        assert_eq!(v, Some(json!({"type": "system", "subtype": "init"})));
        assert!(d.is_idle());
    }

    #[test]
    fn blank_units_are_skipped() {
        let mut d = NdjsonDecoder::default();
        assert_eq!(d.push("").unwrap(), None);
        assert_eq!(d.push("   \t ").unwrap(), None);
        assert!(d.is_idle());
    }

    #[test]
    fn split_document_is_reassembled() {
        let doc = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}"#;
        let (a, b) = doc.split_at(17);
        let mut d = NdjsonDecoder::default();
        assert_eq!(d.push(a).unwrap(), None);
        assert!(!d.is_idle());
        let v = d.push(b).unwrap().unwrap();
        assert_eq!(v["message"]["content"][0]["text"], "hi");
        assert!(d.is_idle());
    }

    #[test]
    fn short_garbage_keeps_accumulating() {
        let mut d = NdjsonDecoder::default();
        assert_eq!(d.push("not json").unwrap(), None);
        assert_eq!(d.buffer_len(), "not json".len());
    }

    #[test]
    fn embedded_newline_is_fatal() {
        let mut d = NdjsonDecoder::default();
        let err = d.push("{\"a\": 1}\n{\"b\"").unwrap_err();
        assert!(err.is_json_decode());
        assert!(d.is_idle());
    }

    #[test]
    fn long_unparseable_buffer_is_fatal() {
        let mut d = NdjsonDecoder::default();
        let junk = "x".repeat(AMBIGUOUS_PARSE_LIMIT + 1);
        let err = d.push(&junk).unwrap_err();
        let ClaudeSdkError::JsonDecode { line, source } = err else {
            panic!("expected JsonDecode")
        };
        assert_eq!(line.len(), AMBIGUOUS_PARSE_LIMIT + 1);
        assert!(matches!(source, DecodeFailure::Syntax(_)));
        assert!(d.is_idle());
    }

    #[test]
    fn overflow_clears_buffer_even_for_valid_json() {
        let mut d = NdjsonDecoder::new(32);
        let doc = format!(r#"{{"type":"result","result":"{}"}}"#, "a".repeat(64));
        let err = d.push(&doc).unwrap_err();
        let ClaudeSdkError::JsonDecode { source, .. } = err else {
            panic!("expected JsonDecode")
        };
        assert!(matches!(source, DecodeFailure::BufferOverflow { limit: 32 }));
        assert!(d.is_idle());

        // The decoder is usable again afterwards.
        assert_eq!(d.push("{}").unwrap(), Some(json!({})));
    }

    #[test]
    fn finish_parses_leftover_or_fails() {
        let mut d = NdjsonDecoder::default();
        assert_eq!(d.finish().unwrap(), None);

        d.push(r#"{"type":"res"#).unwrap();
        let err = d.finish().unwrap_err();
        assert!(err.is_json_decode());
        assert!(d.is_idle());
    }
}
