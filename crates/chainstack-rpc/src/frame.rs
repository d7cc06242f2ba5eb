//! Inbound frame reassembly for streaming transports.
//!
//! A socket read may carry several JSON documents back to back
//! (`{..}{..}`, `{..}\n[{..}]`) or stop in the middle of one. The decoder
//! yields every complete document and keeps the unfinished tail until the
//! next read completes it.

use serde_json::Value;
use tracing::warn;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns the documents it completes, in order.
    ///
    /// Unparseable input that is not a truncated document is dropped.
    pub fn push(&mut self, chunk: &str) -> Vec<Value> {
        self.pending.push_str(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut stream = serde_json::Deserializer::from_str(&self.pending).into_iter::<Value>();
        loop {
            match stream.next() {
                Some(Ok(value)) => {
                    consumed = stream.byte_offset();
                    frames.push(value);
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => {
                    warn!(error = %e, "discarding malformed frame data");
                    consumed = self.pending.len();
                    break;
                }
                None => {
                    consumed = self.pending.len();
                    break;
                }
            }
        }

        self.pending.drain(..consumed);
        if self.pending.trim().is_empty() {
            self.pending.clear();
        }
        frames
    }

    /// Whether an incomplete document is buffered.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#);
        assert_eq!(frames, vec![json!({"jsonrpc": "2.0", "id": 1, "result": "0x1"})]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn splits_concatenated_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(r#"{"id":1}{"id":2}[{"id":3}][{"id":4}]{"id":5}"#);
        assert_eq!(
            frames,
            vec![
                json!({"id": 1}),
                json!({"id": 2}),
                json!([{"id": 3}]),
                json!([{"id": 4}]),
                json!({"id": 5}),
            ]
        );
    }

    #[test]
    fn line_breaks_between_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push("{\"id\":1}\r\n{\"id\":2}\n[{\"id\":3}]\n");
        assert_eq!(frames.len(), 3);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn buffers_partial_frame_until_complete() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(r#"{"id":1}{"id":2,"res"#), vec![json!({"id": 1})]);
        assert!(decoder.has_partial());
        assert!(decoder.push(r#"ult":"0x"#).is_empty());
        assert_eq!(
            decoder.push(r#"ff"}{"id":3}"#),
            vec![json!({"id": 2, "result": "0xff"}), json!({"id": 3})]
        );
        assert!(!decoder.has_partial());
    }

    #[test]
    fn braces_inside_strings_do_not_split() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(r#"{"id":1,"result":"}{"}"#);
        assert_eq!(frames, vec![json!({"id": 1, "result": "}{"})]);
    }

    #[test]
    fn garbage_is_dropped() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push("not json").is_empty());
        assert!(!decoder.has_partial());
        assert_eq!(decoder.push(r#"{"id":9}"#), vec![json!({"id": 9})]);
    }

    #[test]
    fn clear_discards_partial() {
        let mut decoder = FrameDecoder::new();
        decoder.push(r#"{"id":"#);
        assert!(decoder.has_partial());
        decoder.clear();
        assert_eq!(decoder.push(r#"{"id":2}"#), vec![json!({"id": 2})]);
    }
}
