//! SSE (Server-Sent Events) frame decoder
//!
//! Frames are blocks of lines terminated by a blank line. The payload of
//! every `data:` line (at most one leading space removed) is joined with
//! `\n` to form one JSON document per frame.

use serde_json::Value;
use tracing::trace;

use super::types::{FrameError, FrameResult, StreamPayload};

/// Incremental frame decoder
///
/// Bytes may arrive split at any position, including inside a multi-byte
/// UTF-8 sequence or between the two newlines of a frame separator.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of the current incomplete line
    buffer: Vec<u8>,
    /// Data lines of the current frame, joined with newlines
    data_buffer: String,
    /// Whether the current frame has seen a `data:` line
    has_data: bool,
    /// Current frame contained a line that was not valid UTF-8
    poisoned: bool,
}

impl FrameDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and extract any complete frames
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<FrameResult<StreamPayload>> {
        let mut frames = Vec::new();

        self.buffer.extend_from_slice(bytes);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let mut line = &self.buffer[start..end];

            // Handle \r\n line endings
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }

            // Copy out so the buffer can be borrowed mutably below
            let line = line.to_vec();
            start = end + 1;

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..start);

        frames
    }

    /// Whether a partial line or frame is still buffered
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.has_data || self.poisoned
    }

    fn process_line(&mut self, line: &[u8]) -> Option<FrameResult<StreamPayload>> {
        // Empty line ends the frame
        if line.is_empty() {
            return self.dispatch_frame();
        }

        // Comment line (keepalive)
        if line.starts_with(b":") {
            trace!("SSE keepalive/comment");
            return None;
        }

        let Ok(line) = std::str::from_utf8(line) else {
            self.poisoned = true;
            return None;
        };

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data_buffer.push('\n');
                }
                self.data_buffer.push_str(value);
                self.has_data = true;
            }
            "event" | "id" | "retry" => {
                trace!("SSE {}: {}", field, value);
            }
            _ => {
                trace!("SSE unknown field: {}", field);
            }
        }

        None
    }

    fn dispatch_frame(&mut self) -> Option<FrameResult<StreamPayload>> {
        let has_data = std::mem::take(&mut self.has_data);
        let poisoned = std::mem::take(&mut self.poisoned);
        let data = std::mem::take(&mut self.data_buffer);

        if poisoned {
            return Some(Err(FrameError::InvalidUtf8));
        }

        // Frames without data lines (e.g. only `event:`) carry nothing
        if !has_data {
            return None;
        }

        let value = match serde_json::from_str::<Value>(&data) {
            Ok(value) => value,
            Err(source) => {
                return Some(Err(FrameError::Json {
                    source,
                    preview: preview(&data),
                }))
            }
        };

        Some(StreamPayload::from_value(value))
    }
}

fn preview(data: &str) -> String {
    const MAX: usize = 100;
    match data.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &data[..idx]),
        None => data.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vqt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decode_all(decoder: &mut FrameDecoder, input: &[u8]) -> Vec<StreamPayload> {
        decoder
            .feed(input)
            .into_iter()
            .map(|r| r.expect("frame should decode"))
            .collect()
    }

    #[test]
    fn test_parse_simple_frame() {
        let mut decoder = FrameDecoder::new();

        let input = b"data: {\"obj-1\": {\"data\": [{\"value\": 72.5, \"quality\": \"Good\", \"timestamp\": \"t1\"}]}}\n\n";
        let frames = decode_all(&mut decoder, input);
        assert_eq!(frames.len(), 1);

        let batches: Vec<_> = frames[0]
            .clone()
            .into_batches()
            .into_iter()
            .map(|batch| batch.expect("update should decode"))
            .collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);

        let change = &batches[0][0];
        assert_eq!(change.element_id, "obj-1");
        assert_eq!(
            change.data,
            vec![Vqt {
                value: json!(72.5),
                quality: "Good".into(),
                timestamp: "t1".into(),
            }]
        );
    }

    #[test]
    fn test_parse_multiple_frames() {
        let mut decoder = FrameDecoder::new();

        let input = b"data: {\"a\":{}}\n\ndata: [{\"b\":{}}]\n\n";
        let frames = decode_all(&mut decoder, input);

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], StreamPayload::Single(_)));
        assert!(matches!(frames[1], StreamPayload::Batch(_)));
    }

    #[test]
    fn test_parse_chunked_data() {
        let mut decoder = FrameDecoder::new();

        // First chunk - incomplete
        let frames1 = decoder.feed(b"data: {\"obj-1\": {\"da");
        assert_eq!(frames1.len(), 0);
        assert!(decoder.has_pending());

        // Separator split across chunks
        let frames2 = decoder.feed(b"ta\": []}}\n");
        assert_eq!(frames2.len(), 0);

        let frames3 = decoder.feed(b"\n");
        assert_eq!(frames3.len(), 1);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let input = "data: {\"sensor-°C\": {\"data\": [{\"value\": \"héllo\"}]}}\n\n\
                     : keepalive\n\n\
                     data: [\n\
                     data: {\"x\": {\"data\": []}},\n\
                     data: {\"y\": {\"data\": [{\"value\": 1}]}}\n\
                     data: ]\n\n\
                     data: not json\n\n\
                     event: update\r\n\
                     data:{\"z\":{}}\r\n\r\n";
        let bytes = input.as_bytes();

        let whole: Vec<String> = FrameDecoder::new()
            .feed(bytes)
            .into_iter()
            .map(|r| format!("{:?}", r.map_err(|e| e.to_string())))
            .collect();
        assert_eq!(whole.len(), 4);

        for chunk_size in 1..=7 {
            let mut decoder = FrameDecoder::new();
            let mut chunked = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                chunked.extend(
                    decoder
                        .feed(chunk)
                        .into_iter()
                        .map(|r| format!("{:?}", r.map_err(|e| e.to_string()))),
                );
            }
            assert_eq!(chunked, whole, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_multiline_data_joined_with_newline() {
        let mut decoder = FrameDecoder::new();
        let input = b"data: {\"a\":\ndata:  {\"data\": []}}\n\n";
        let frames = decode_all(&mut decoder, input);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_only_one_leading_space_stripped() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data:  \"x\"\n");
        assert_eq!(decoder.data_buffer, " \"x\"");

        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data:\"x\"\n");
        assert_eq!(decoder.data_buffer, "\"x\"");
    }

    #[test]
    fn test_invalid_json_is_frame_error() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: {broken\n\ndata: {\"ok\": {}}\n\n");

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(FrameError::Json { .. })));
        assert!(frames[1].is_ok());
    }

    #[test]
    fn test_invalid_utf8_poisons_only_its_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: {\"\xff\": {}}\n\ndata: {\"ok\": {}}\n\n");

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(FrameError::InvalidUtf8)));
        assert!(frames[1].is_ok());
    }

    #[test]
    fn test_ignore_comments_and_empty_frames() {
        let mut decoder = FrameDecoder::new();

        let input = b": keepalive\n\n\n\nevent: ping\n\ndata: {\"a\": {}}\n\n";
        let frames = decoder.feed(input);

        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 103);
    }
}
