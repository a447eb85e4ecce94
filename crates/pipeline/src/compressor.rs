//! Streaming compression contract for channels.

use std::{fmt, str::FromStr};

/// Codec level settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionConfig {
    /// Compression level (0-9 for zlib, 0-11 for brotli).
    pub level: u32,
    /// Log2 of window size.
    pub window_size: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: 9,        // Best zlib compression
            window_size: 15, // zlib maximum window
        }
    }
}

/// Compression errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    /// Compression failed.
    #[error("Compression failed: {0}")]
    Failed(String),
    /// Decompression failed due to corrupted data.
    #[error("Decompression failed: corrupted data")]
    Corrupted,
    /// The stream was written to after it was closed.
    #[error("Compressor already closed")]
    Closed,
    /// Unknown compression algorithm name.
    #[error("Unknown compression algorithm: {0}")]
    UnknownAlgo(String),
}

/// Compression algorithm used for a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressionAlgo {
    /// Zlib (DEFLATE).
    #[default]
    Zlib,
    /// Brotli at quality 9.
    Brotli9,
    /// Brotli at quality 10.
    Brotli10,
    /// Brotli at quality 11.
    Brotli11,
}

impl CompressionAlgo {
    /// All supported algorithms.
    pub const ALL: [Self; 4] = [Self::Zlib, Self::Brotli9, Self::Brotli10, Self::Brotli11];

    /// Returns `true` for any brotli variant.
    pub const fn is_brotli(&self) -> bool {
        !matches!(self, Self::Zlib)
    }

    /// Returns the codec settings for this algorithm.
    pub const fn config(&self) -> CompressionConfig {
        match self {
            Self::Zlib => CompressionConfig { level: 9, window_size: 15 },
            Self::Brotli9 => CompressionConfig { level: 9, window_size: 24 },
            Self::Brotli10 => CompressionConfig { level: 10, window_size: 24 },
            Self::Brotli11 => CompressionConfig { level: 11, window_size: 24 },
        }
    }
}

impl fmt::Display for CompressionAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zlib => write!(f, "zlib"),
            Self::Brotli9 => write!(f, "brotli-9"),
            Self::Brotli10 => write!(f, "brotli-10"),
            Self::Brotli11 => write!(f, "brotli-11"),
        }
    }
}

impl FromStr for CompressionAlgo {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zlib" => Ok(Self::Zlib),
            "brotli" | "brotli-10" => Ok(Self::Brotli10),
            "brotli-9" => Ok(Self::Brotli9),
            "brotli-11" => Ok(Self::Brotli11),
            other => Err(CompressionError::UnknownAlgo(other.to_string())),
        }
    }
}

/// A streaming compressor that a channel writes batches into and reads
/// frames out of.
///
/// Compressed output accumulates internally until it is drained with
/// [`read`](Self::read). [`len`](Self::len) reports how many compressed bytes
/// are ready to be read.
pub trait ChannelCompressor: Send {
    /// Feeds `data` into the compression stream.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::Closed`] once the stream is closed.
    fn write(&mut self, data: &[u8]) -> Result<usize, CompressionError>;

    /// Flushes buffered input so that [`len`](Self::len) reflects all written data.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying codec fails.
    fn flush(&mut self) -> Result<(), CompressionError>;

    /// Finishes the stream. No more data may be written afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying codec fails.
    fn close(&mut self) -> Result<(), CompressionError>;

    /// Number of compressed bytes ready to be read.
    fn len(&self) -> usize;

    /// Returns `true` if no compressed bytes are ready.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves up to `buf.len()` ready bytes into `buf`, returning the count.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Discards all state and starts a fresh stream.
    fn reset(&mut self);
}
