use thiserror::Error;

/// Failures surfaced by the frame decoder.
///
/// Every malformed-stream condition aborts the current frame; the decoder never
/// guesses at partial output. Whether to skip, repeat or abort playback is up to
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid frame geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },
    #[error("stream truncated at byte {offset}: needed {needed} byte(s), {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("repeat run at byte {offset} has no previous block to copy")]
    RepeatWithoutPrevious { offset: usize },
    #[error(
        "{colors}-color cache reference {index} at byte {offset}, {cached} palette(s) cached"
    )]
    InvalidCacheReference {
        colors: usize,
        index: u8,
        cached: usize,
        offset: usize,
    },
    #[error("destination buffer holds {actual} bytes, frame needs {expected}")]
    DestinationTooSmall { expected: usize, actual: usize },
}

impl DecodeError {
    /// True for errors caused by the compressed payload itself rather than by
    /// the caller's arguments.
    pub fn is_stream_corruption(&self) -> bool {
        matches!(
            self,
            DecodeError::Truncated { .. }
                | DecodeError::RepeatWithoutPrevious { .. }
                | DecodeError::InvalidCacheReference { .. }
        )
    }

    /// True for the two back-reference failures (repeat at stream start, unknown
    /// cache entry).
    pub fn is_invalid_back_reference(&self) -> bool {
        matches!(
            self,
            DecodeError::RepeatWithoutPrevious { .. } | DecodeError::InvalidCacheReference { .. }
        )
    }
}
