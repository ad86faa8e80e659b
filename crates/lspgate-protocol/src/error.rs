//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, FramingError>;

/// Errors raised by the wire framing layer.
///
/// Framing recovers locally from malformed single frames (they are skipped,
/// not errors). These variants are the unrecoverable cases that require the
/// caller to treat the stream as broken.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The internal buffer exceeded the hard cap without yielding frames.
    #[error("frame buffer exceeded {limit} bytes; stream reset")]
    BufferOverflow { limit: usize },

    /// A single feed produced more frames than the iteration cap allows.
    #[error("frame extraction exceeded {limit} iterations; stream reset")]
    IterationCap { limit: usize },

    /// Message serialization failed while encoding an outbound frame.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FramingError {
    /// Whether this error invalidated the decoder's buffered state.
    pub fn is_stream_reset(&self) -> bool {
        matches!(
            self,
            Self::BufferOverflow { .. } | Self::IterationCap { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FramingError::BufferOverflow { limit: 1024 };
        assert_eq!(err.to_string(), "frame buffer exceeded 1024 bytes; stream reset");

        let err = FramingError::IterationCap { limit: 16 };
        assert_eq!(
            err.to_string(),
            "frame extraction exceeded 16 iterations; stream reset"
        );
    }

    #[test]
    fn test_is_stream_reset() {
        assert!(FramingError::BufferOverflow { limit: 1 }.is_stream_reset());
        assert!(FramingError::IterationCap { limit: 1 }.is_stream_reset());

        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        assert!(!FramingError::Json(json_err).is_stream_reset());
    }
}
