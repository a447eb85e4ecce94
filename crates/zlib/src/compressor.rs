//! Zlib compressor implementation.

use std::io::{Read, Write};

use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use sluice_pipeline::{ChannelCompressor, CompressionConfig, CompressionError};

/// Encoder state: either still accepting input or finished.
enum Stream {
    Open(ZlibEncoder<Vec<u8>>),
    Closed(Vec<u8>),
}

impl Stream {
    fn new(level: u32) -> Self {
        Self::Open(ZlibEncoder::new(Vec::new(), Compression::new(level)))
    }

    fn output(&self) -> &[u8] {
        match self {
            Self::Open(encoder) => encoder.get_ref(),
            Self::Closed(out) => out,
        }
    }
}

/// A streaming compressor using the Zlib (DEFLATE) algorithm.
///
/// Compressed bytes are produced incrementally as the encoder fills its
/// internal buffer; [`flush`](ChannelCompressor::flush) forces a sync flush so
/// that all written input is reflected in [`len`](ChannelCompressor::len).
///
/// # Examples
///
/// ```
/// use sluice_pipeline::ChannelCompressor;
/// use sluice_zlib::{ZlibCompressor, decompress};
///
/// let mut compressor = ZlibCompressor::default();
/// compressor.write(b"Hello, World!").unwrap();
/// compressor.close().unwrap();
///
/// let mut out = vec![0u8; compressor.len()];
/// compressor.read(&mut out);
/// assert_eq!(decompress(&out).unwrap(), b"Hello, World!");
/// ```
pub struct ZlibCompressor {
    config: CompressionConfig,
    stream: Stream,
    read_offset: usize,
}

impl ZlibCompressor {
    /// Create a new Zlib compressor with the given configuration.
    pub fn new(config: CompressionConfig) -> Self {
        Self { config, stream: Stream::new(config.level), read_offset: 0 }
    }

    /// Create a new Zlib compressor with best compression settings.
    pub fn best() -> Self {
        Self::new(CompressionConfig { level: 9, window_size: 15 })
    }

    /// Create a new Zlib compressor optimized for speed.
    pub fn fast() -> Self {
        Self::new(CompressionConfig { level: 1, window_size: 15 })
    }

    /// Get the compression configuration.
    pub const fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Returns `true` once the stream has been closed.
    pub const fn is_closed(&self) -> bool {
        matches!(self.stream, Stream::Closed(_))
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::best()
    }
}

impl std::fmt::Debug for ZlibCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZlibCompressor")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("ready", &self.len())
            .finish()
    }
}

impl ChannelCompressor for ZlibCompressor {
    fn write(&mut self, data: &[u8]) -> Result<usize, CompressionError> {
        match &mut self.stream {
            Stream::Open(encoder) => {
                encoder.write_all(data).map_err(|e| CompressionError::Failed(e.to_string()))?;
                Ok(data.len())
            }
            Stream::Closed(_) => Err(CompressionError::Closed),
        }
    }

    fn flush(&mut self) -> Result<(), CompressionError> {
        match &mut self.stream {
            Stream::Open(encoder) => {
                encoder.flush().map_err(|e| CompressionError::Failed(e.to_string()))
            }
            Stream::Closed(_) => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), CompressionError> {
        let stream = std::mem::replace(&mut self.stream, Stream::Closed(Vec::new()));
        self.stream = match stream {
            Stream::Open(encoder) => Stream::Closed(
                encoder.finish().map_err(|e| CompressionError::Failed(e.to_string()))?,
            ),
            closed @ Stream::Closed(_) => closed,
        };
        Ok(())
    }

    fn len(&self) -> usize {
        self.stream.output().len() - self.read_offset
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.stream.output()[self.read_offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_offset += n;
        n
    }

    fn reset(&mut self) {
        self.stream = Stream::new(self.config.level);
        self.read_offset = 0;
    }
}

/// Decompresses a complete zlib stream.
///
/// # Errors
///
/// Returns [`CompressionError::Corrupted`] if the input is not valid zlib data.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::new();
    decoder.read_to_end(&mut output).map_err(|_| CompressionError::Corrupted)?;
    Ok(output)
}
