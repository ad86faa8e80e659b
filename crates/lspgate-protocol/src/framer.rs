//! `Content-Length`-delimited framing for the LSP stdio transport.
//!
//! Encoding is stateless. Decoding is incremental: a [`FrameDecoder`]
//! accumulates bytes across arbitrarily split reads and yields complete
//! JSON values as they become extractable. The decoder is deliberately
//! forgiving about peer bugs:
//!
//! - A header split across chunk boundaries is not an error; we wait.
//! - A frame whose payload fails to parse as JSON is skipped by the
//!   declared length, never fatal to the stream.
//! - A second `Content-Length:` header appearing before the declared
//!   boundary is treated as an authoritative re-sync point (the peer
//!   declared a wrong length) and the earlier boundary wins.
//!
//! Two hard limits keep adversarial input from wedging the gateway: a
//! buffer byte cap and a per-`feed` iteration cap. Tripping either clears
//! the buffer and surfaces a [`FramingError`], since framing state is
//! unrecoverable at that point.

use crate::error::{FramingError, ProtocolResult};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

const HEADER_TOKEN: &[u8] = b"Content-Length:";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Hard cap on buffered bytes before the stream is declared broken.
pub const MAX_BUFFER_BYTES: usize = 16 * 1024 * 1024;

/// Hard cap on frames extracted by a single `feed` call.
pub const MAX_FRAMES_PER_FEED: usize = 1024;

/// Encode a JSON value as an LSP wire frame.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let payload = value.to_string();
    let mut out = Vec::with_capacity(payload.len() + 32);
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
    out.extend_from_slice(payload.as_bytes());
    out
}

/// Encode any serializable message as an LSP wire frame.
pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    Ok(encode_value(&serde_json::to_value(message)?))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

enum Extract {
    /// A complete frame was decoded.
    Frame(Value),
    /// A corrupt frame was consumed and dropped.
    Skipped,
    /// Not enough data for another frame.
    NeedMore,
}

/// Incremental decoder for `Content-Length`-framed JSON-RPC streams.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_buffer: usize,
    max_frames: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default limits.
    pub fn new() -> Self {
        Self::with_limits(MAX_BUFFER_BYTES, MAX_FRAMES_PER_FEED)
    }

    /// Create a decoder with explicit limits. Primarily for tests.
    pub fn with_limits(max_buffer: usize, max_frames: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_buffer,
            max_frames,
        }
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append bytes and extract every complete frame.
    ///
    /// After a successful call the internal buffer holds only the (possibly
    /// empty) trailing partial frame. On error the buffer has been cleared
    /// and the stream should be torn down by the caller.
    pub fn feed(&mut self, bytes: &[u8]) -> ProtocolResult<Vec<Value>> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.max_buffer {
            self.buf.clear();
            return Err(FramingError::BufferOverflow {
                limit: self.max_buffer,
            });
        }

        let mut frames = Vec::new();
        let mut iterations = 0;
        loop {
            if iterations >= self.max_frames {
                self.buf.clear();
                return Err(FramingError::IterationCap {
                    limit: self.max_frames,
                });
            }
            iterations += 1;

            match self.extract_one()? {
                Extract::Frame(value) => frames.push(value),
                Extract::Skipped => continue,
                Extract::NeedMore => break,
            }
        }

        Ok(frames)
    }

    fn extract_one(&mut self) -> ProtocolResult<Extract> {
        let Some(header_pos) = find(&self.buf, HEADER_TOKEN) else {
            // No header yet. It may simply be split across chunks, so keep
            // buffering; the byte cap bounds how long we will wait.
            return Ok(Extract::NeedMore);
        };

        if header_pos > 0 {
            warn!(
                bytes = header_pos,
                "discarding stray bytes before Content-Length header"
            );
            self.buf.drain(..header_pos);
        }

        let Some(terminator_pos) = find(&self.buf, HEADER_TERMINATOR) else {
            return Ok(Extract::NeedMore);
        };
        let header_end = terminator_pos + HEADER_TERMINATOR.len();

        // The length value runs from the header token to the first CRLF.
        let line_end = find(&self.buf, b"\r\n").unwrap_or(terminator_pos);
        let digits = &self.buf[HEADER_TOKEN.len()..line_end];
        let declared: usize = match std::str::from_utf8(digits)
            .ok()
            .map(str::trim)
            .and_then(|s| s.parse().ok())
        {
            Some(len) => len,
            None => {
                warn!("unparseable Content-Length value; dropping header block");
                self.buf.drain(..header_end);
                return Ok(Extract::Skipped);
            }
        };

        if header_end.saturating_add(declared) > self.max_buffer {
            // The declared frame can never fit; the peer is broken.
            self.buf.clear();
            return Err(FramingError::BufferOverflow {
                limit: self.max_buffer,
            });
        }

        let boundary = header_end + declared;
        let available_end = boundary.min(self.buf.len());

        // A peer that declared too large a length will start its next frame
        // inside our declared region. Trust the earlier boundary.
        if let Some(next) = find(&self.buf[header_end..available_end], HEADER_TOKEN) {
            warn!(
                declared,
                actual = next,
                "framing mismatch; re-syncing at earlier Content-Length header"
            );
            let payload: Vec<u8> = self.buf.drain(..header_end + next).collect();
            return Ok(match serde_json::from_slice(&payload[header_end..]) {
                Ok(value) => Extract::Frame(value),
                Err(error) => {
                    warn!(%error, "dropping malformed frame at re-sync boundary");
                    Extract::Skipped
                }
            });
        }

        if self.buf.len() < boundary {
            return Ok(Extract::NeedMore);
        }

        let parsed = serde_json::from_slice(&self.buf[header_end..boundary]);
        self.buf.drain(..boundary);
        Ok(match parsed {
            Ok(value) => Extract::Frame(value),
            Err(error) => {
                // Skip forward by the declared length; one bad message must
                // never wedge the stream.
                warn!(%error, declared, "dropping malformed frame");
                Extract::Skipped
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(payload: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload).into_bytes()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let message = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"a": [1, 2]}});
        let bytes = encode_value(&message);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames, vec![message]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_encode_counts_bytes_not_chars() {
        let message = json!({"text": "héllo — ∀x"});
        let bytes = encode_value(&message);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames, vec![message]);
    }

    #[test]
    fn test_feed_byte_by_byte() {
        let message = json!({"jsonrpc": "2.0", "method": "textDocument/publishDiagnostics"});
        let bytes = encode_value(&message);

        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for byte in bytes {
            decoded.extend(decoder.feed(&[byte]).unwrap());
        }
        assert_eq!(decoded, vec![message]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut bytes = encode_value(&json!({"id": 1}));
        bytes.extend(encode_value(&json!({"id": 2})));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn test_corrupt_frame_does_not_wedge_stream() {
        let mut bytes = frame("{not json");
        bytes.extend(encode_value(&json!({"id": 2})));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames, vec![json!({"id": 2})]);
    }

    #[test]
    fn test_resync_on_early_header() {
        // Peer declares 999 bytes but the next frame starts well before that.
        let payload = r#"{"id":1}"#;
        let mut bytes = format!("Content-Length: 999\r\n\r\n{}", payload).into_bytes();
        bytes.extend(encode_value(&json!({"id": 2})));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames, vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_stray_bytes_before_header_are_dropped() {
        let mut bytes = b"garbage".to_vec();
        bytes.extend(encode_value(&json!({"id": 3})));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames, vec![json!({"id": 3})]);
    }

    #[test]
    fn test_incomplete_payload_waits() {
        let bytes = encode_value(&json!({"id": 4, "result": {"ok": true}}));
        let (head, tail) = bytes.split_at(bytes.len() - 5);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(head).unwrap().is_empty());
        assert!(decoder.buffered() > 0);
        let frames = decoder.feed(tail).unwrap();
        assert_eq!(frames, vec![json!({"id": 4, "result": {"ok": true}})]);
    }

    #[test]
    fn test_unparseable_length_skips_header_block() {
        let mut bytes = b"Content-Length: banana\r\n\r\n".to_vec();
        bytes.extend(encode_value(&json!({"id": 5})));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames, vec![json!({"id": 5})]);
    }

    #[test]
    fn test_iteration_cap_clears_buffer() {
        let mut decoder = FrameDecoder::with_limits(MAX_BUFFER_BYTES, 3);
        let mut bytes = Vec::new();
        for i in 0..10 {
            bytes.extend(encode_value(&json!({ "id": i })));
        }

        let err = decoder.feed(&bytes).unwrap_err();
        assert!(matches!(err, FramingError::IterationCap { limit: 3 }));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_buffer_cap_clears_buffer() {
        let mut decoder = FrameDecoder::with_limits(32, MAX_FRAMES_PER_FEED);
        let err = decoder.feed(&[b'x'; 64]).unwrap_err();
        assert!(matches!(err, FramingError::BufferOverflow { limit: 32 }));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversized_declared_length_is_fatal() {
        let mut decoder = FrameDecoder::with_limits(64, MAX_FRAMES_PER_FEED);
        let err = decoder
            .feed(b"Content-Length: 9999\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, FramingError::BufferOverflow { .. }));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_extra_headers_are_tolerated() {
        let payload = r#"{"id":9}"#;
        let bytes = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
            payload.len(),
            payload
        );

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(bytes.as_bytes()).unwrap();
        assert_eq!(frames, vec![json!({"id": 9})]);
    }
}
