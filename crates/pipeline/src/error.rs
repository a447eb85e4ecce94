//! Codec error types.

/// Errors raised while decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Payload carries an unknown derivation version.
    #[error("Invalid version: {0}")]
    InvalidVersion(u8),
    /// Input ended before a complete frame could be read.
    #[error("Truncated data at offset {0}")]
    Truncated(usize),
    /// Frame data length exceeds the decoder limit.
    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge {
        /// Declared data length.
        size: usize,
        /// Maximum allowed data length.
        max: usize,
    },
    /// The trailing `is_last` byte is neither 0 nor 1.
    #[error("Invalid is_last byte: {0}")]
    InvalidIsLast(u8),
    /// Payload contains no frames.
    #[error("Empty payload")]
    Empty,
}
