//! Brotli compressor implementation.

use std::io::{Cursor, Write};

use brotli::CompressorWriter;
use sluice_pipeline::{
    ChannelCompressor, CompressionAlgo, CompressionConfig, CompressionError,
    constants::CHANNEL_VERSION_BROTLI,
};

/// Internal buffer size of the brotli writer.
const BUFFER_SIZE: usize = 4096;

enum Stream {
    Open(Box<CompressorWriter<Vec<u8>>>),
    Closed(Vec<u8>),
}

impl Stream {
    fn new(config: &CompressionConfig) -> Self {
        Self::Open(Box::new(CompressorWriter::new(
            Vec::new(),
            BUFFER_SIZE,
            config.level,
            config.window_size,
        )))
    }

    fn output(&self) -> &[u8] {
        match self {
            Self::Open(writer) => writer.get_ref(),
            Self::Closed(out) => out,
        }
    }
}

/// A streaming compressor using the Brotli algorithm.
///
/// The emitted stream starts with the brotli channel version byte, which is
/// counted in [`len`](ChannelCompressor::len) and returned by the first
/// [`read`](ChannelCompressor::read).
pub struct BrotliCompressor {
    config: CompressionConfig,
    stream: Stream,
    /// Position in the virtual `version || brotli` output.
    read_offset: usize,
}

impl BrotliCompressor {
    /// Create a new Brotli compressor with the given configuration.
    pub fn new(config: CompressionConfig) -> Self {
        Self { stream: Stream::new(&config), config, read_offset: 0 }
    }

    /// Create a compressor for one of the brotli [`CompressionAlgo`] variants.
    pub fn from_algo(algo: CompressionAlgo) -> Self {
        Self::new(algo.config())
    }

    /// Get the compression configuration.
    pub const fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Returns `true` once the stream has been closed.
    pub const fn is_closed(&self) -> bool {
        matches!(self.stream, Stream::Closed(_))
    }

    fn total_len(&self) -> usize {
        1 + self.stream.output().len()
    }
}

impl Default for BrotliCompressor {
    fn default() -> Self {
        Self::from_algo(CompressionAlgo::Brotli10)
    }
}

impl std::fmt::Debug for BrotliCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrotliCompressor")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("ready", &self.len())
            .finish()
    }
}

impl ChannelCompressor for BrotliCompressor {
    fn write(&mut self, data: &[u8]) -> Result<usize, CompressionError> {
        match &mut self.stream {
            Stream::Open(writer) => {
                writer.write_all(data).map_err(|e| CompressionError::Failed(e.to_string()))?;
                Ok(data.len())
            }
            Stream::Closed(_) => Err(CompressionError::Closed),
        }
    }

    fn flush(&mut self) -> Result<(), CompressionError> {
        match &mut self.stream {
            Stream::Open(writer) => {
                writer.flush().map_err(|e| CompressionError::Failed(e.to_string()))
            }
            Stream::Closed(_) => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), CompressionError> {
        let stream = std::mem::replace(&mut self.stream, Stream::Closed(Vec::new()));
        self.stream = match stream {
            Stream::Open(writer) => Stream::Closed(writer.into_inner()),
            closed @ Stream::Closed(_) => closed,
        };
        Ok(())
    }

    fn len(&self) -> usize {
        self.total_len() - self.read_offset
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let mut written = 0;
        if self.read_offset == 0 {
            buf[0] = CHANNEL_VERSION_BROTLI;
            self.read_offset = 1;
            written = 1;
        }

        let available = &self.stream.output()[self.read_offset - 1..];
        let n = available.len().min(buf.len() - written);
        buf[written..written + n].copy_from_slice(&available[..n]);
        self.read_offset += n;
        written + n
    }

    fn reset(&mut self) {
        self.stream = Stream::new(&self.config);
        self.read_offset = 0;
    }
}

/// Decompresses a version-prefixed brotli channel stream.
///
/// # Errors
///
/// Returns [`CompressionError::Corrupted`] if the version byte is missing or
/// the payload is not valid brotli data.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let (&version, body) = data.split_first().ok_or(CompressionError::Corrupted)?;
    if version != CHANNEL_VERSION_BROTLI {
        return Err(CompressionError::Corrupted);
    }
    let mut output = Vec::new();
    brotli::BrotliDecompress(&mut Cursor::new(body), &mut output)
        .map_err(|_| CompressionError::Corrupted)?;
    Ok(output)
}
