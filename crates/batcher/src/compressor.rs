//! Compression policies deciding when a channel is full.
//!
//! A policy wraps one or two streaming [`ChannelCompressor`]s and reports
//! [`FullReason::CompressorFull`] once the channel should stop taking blocks.

use std::{fmt, str::FromStr};

use sluice_brotli::BrotliCompressor;
use sluice_pipeline::{ChannelCompressor, CompressionAlgo, CompressionConfig};
use sluice_zlib::ZlibCompressor;

use crate::error::{ChannelError, FullReason};

/// Bytes a zlib stream may add when it is closed.
pub const CLOSE_OVERHEAD_ZLIB: u64 = 9;

/// Which policy decides that a channel is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressorKind {
    /// Full once the input reaches `target_output_size / approx_compr_ratio`.
    Ratio,
    /// Full once a flushed shadow stream exceeds the target.
    #[default]
    Shadow,
    /// Stores data without compression; full once the output exceeds the target.
    None,
}

impl fmt::Display for CompressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ratio => write!(f, "ratio"),
            Self::Shadow => write!(f, "shadow"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for CompressorKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ratio" => Ok(Self::Ratio),
            "shadow" => Ok(Self::Shadow),
            "none" => Ok(Self::None),
            _ => Err(ChannelError::InvalidConfig("unknown compressor kind")),
        }
    }
}

/// Settings for a channel's compression policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressorConfig {
    /// Compressed size the channel aims for.
    pub target_output_size: u64,
    /// Expected output to input ratio, used by [`CompressorKind::Ratio`].
    pub approx_compr_ratio: f64,
    /// Policy.
    pub kind: CompressorKind,
    /// Stream algorithm.
    pub algo: CompressionAlgo,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            target_output_size: 100_000,
            approx_compr_ratio: 0.6,
            kind: CompressorKind::Shadow,
            algo: CompressionAlgo::Zlib,
        }
    }
}

impl CompressorConfig {
    /// Creates a new builder.
    pub fn builder() -> CompressorConfigBuilder {
        CompressorConfigBuilder::default()
    }
}

/// Builder for [`CompressorConfig`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CompressorConfigBuilder {
    config: CompressorConfig,
}

impl CompressorConfigBuilder {
    /// Sets the target output size.
    pub const fn target_output_size(mut self, target_output_size: u64) -> Self {
        self.config.target_output_size = target_output_size;
        self
    }

    /// Sets the approximate compression ratio.
    pub const fn approx_compr_ratio(mut self, approx_compr_ratio: f64) -> Self {
        self.config.approx_compr_ratio = approx_compr_ratio;
        self
    }

    /// Sets the policy.
    pub const fn kind(mut self, kind: CompressorKind) -> Self {
        self.config.kind = kind;
        self
    }

    /// Sets the stream algorithm.
    pub const fn algo(mut self, algo: CompressionAlgo) -> Self {
        self.config.algo = algo;
        self
    }

    /// Builds the config.
    pub const fn build(self) -> CompressorConfig {
        self.config
    }
}

/// Creates a streaming compressor for `algo`.
pub fn new_compressor(algo: CompressionAlgo) -> Box<dyn ChannelCompressor> {
    if algo.is_brotli() {
        Box::new(BrotliCompressor::from_algo(algo))
    } else {
        Box::new(ZlibCompressor::new(algo.config()))
    }
}

/// Creates the policy described by `config`.
///
/// # Errors
///
/// Returns [`ChannelError::InvalidConfig`] for a ratio policy without a
/// positive ratio.
pub fn new_batch_compressor(
    config: &CompressorConfig,
) -> Result<Box<dyn BatchCompressor>, ChannelError> {
    Ok(match config.kind {
        CompressorKind::Ratio => Box::new(RatioCompressor::new(config)?),
        CompressorKind::Shadow => Box::new(ShadowCompressor::new(config)),
        CompressorKind::None => Box::new(NonCompressor::new(config)),
    })
}

/// A compression stream that knows when its channel is full.
pub trait BatchCompressor: Send {
    /// Writes one encoded batch.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Full`] without writing when the policy rejects
    /// the data, or a compression error.
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError>;

    /// Flushes buffered input to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails.
    fn flush(&mut self) -> Result<(), ChannelError>;

    /// Finishes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails.
    fn close(&mut self) -> Result<(), ChannelError>;

    /// Compressed bytes ready to be read.
    fn len(&self) -> usize;

    /// Returns `true` if no compressed bytes are ready.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves ready bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Starts over with an empty stream.
    fn reset(&mut self);

    /// Returns `true` once no more data should be written.
    fn is_full(&self) -> bool;
}

/// Declares the channel full once the input crosses a threshold derived
/// from an assumed compression ratio.
pub struct RatioCompressor {
    stream: Box<dyn ChannelCompressor>,
    input_threshold: u64,
    input_bytes: u64,
}

impl RatioCompressor {
    /// Creates a ratio compressor.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] if the ratio is not positive.
    pub fn new(config: &CompressorConfig) -> Result<Self, ChannelError> {
        if config.approx_compr_ratio <= 0.0 {
            return Err(ChannelError::InvalidConfig("approx_compr_ratio must be positive"));
        }
        Ok(Self {
            stream: new_compressor(config.algo),
            input_threshold: (config.target_output_size as f64 / config.approx_compr_ratio) as u64,
            input_bytes: 0,
        })
    }

    /// Input size at which the compressor reports full.
    pub const fn input_threshold(&self) -> u64 {
        self.input_threshold
    }
}

impl fmt::Debug for RatioCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatioCompressor")
            .field("input_threshold", &self.input_threshold)
            .field("input_bytes", &self.input_bytes)
            .finish_non_exhaustive()
    }
}

impl BatchCompressor for RatioCompressor {
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        if self.is_full() {
            return Err(ChannelError::Full(FullReason::CompressorFull));
        }
        self.input_bytes += data.len() as u64;
        Ok(self.stream.write(data)?)
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        Ok(self.stream.flush()?)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(self.stream.close()?)
    }

    fn len(&self) -> usize {
        self.stream.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.stream.read(buf)
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.input_bytes = 0;
    }

    fn is_full(&self) -> bool {
        self.input_bytes >= self.input_threshold
    }
}

/// Measures the real compressed size on a second, flushed stream.
///
/// The shadow stream is flushed only when an upper bound of the output
/// could exceed the target. A write that pushes the shadow over the target
/// is rejected, unless it is the first write.
pub struct ShadowCompressor {
    stream: Box<dyn ChannelCompressor>,
    shadow: Box<dyn ChannelCompressor>,
    target_output_size: u64,
    bound: u64,
    input_bytes: u64,
    full: bool,
}

impl ShadowCompressor {
    /// Creates a shadow compressor.
    pub fn new(config: &CompressorConfig) -> Self {
        Self {
            stream: new_compressor(config.algo),
            shadow: new_compressor(config.algo),
            target_output_size: config.target_output_size,
            bound: CLOSE_OVERHEAD_ZLIB,
            input_bytes: 0,
            full: false,
        }
    }
}

impl fmt::Debug for ShadowCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowCompressor")
            .field("target_output_size", &self.target_output_size)
            .field("bound", &self.bound)
            .field("full", &self.full)
            .finish_non_exhaustive()
    }
}

impl BatchCompressor for ShadowCompressor {
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        if self.full {
            return Err(ChannelError::Full(FullReason::CompressorFull));
        }
        self.shadow.write(data)?;

        let mut bound = self.bound + data.len() as u64;
        if bound > self.target_output_size {
            self.shadow.flush()?;
            bound = self.shadow.len() as u64 + CLOSE_OVERHEAD_ZLIB;
            if bound > self.target_output_size {
                self.full = true;
                if self.input_bytes > 0 {
                    return Err(ChannelError::Full(FullReason::CompressorFull));
                }
            }
        }
        self.bound = bound;
        self.input_bytes += data.len() as u64;
        Ok(self.stream.write(data)?)
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        Ok(self.stream.flush()?)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(self.stream.close()?)
    }

    fn len(&self) -> usize {
        self.stream.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.stream.read(buf)
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.shadow.reset();
        self.bound = CLOSE_OVERHEAD_ZLIB;
        self.input_bytes = 0;
        self.full = false;
    }

    fn is_full(&self) -> bool {
        self.full
    }
}

/// Stores batches in an uncompressed zlib stream, flushed after every write.
///
/// Output size is predictable, which makes it useful for sizing tests and
/// for data that does not compress.
pub struct NonCompressor {
    stream: ZlibCompressor,
    target_output_size: u64,
    drained: u64,
    full: bool,
}

impl NonCompressor {
    /// Creates a non-compressing compressor.
    pub fn new(config: &CompressorConfig) -> Self {
        Self {
            stream: ZlibCompressor::new(CompressionConfig { level: 0, window_size: 15 }),
            target_output_size: config.target_output_size,
            drained: 0,
            full: false,
        }
    }
}

impl fmt::Debug for NonCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonCompressor")
            .field("target_output_size", &self.target_output_size)
            .field("full", &self.full)
            .finish_non_exhaustive()
    }
}

impl BatchCompressor for NonCompressor {
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        if self.full {
            return Err(ChannelError::Full(FullReason::CompressorFull));
        }
        let written = self.stream.write(data)?;
        self.stream.flush()?;
        if self.drained + self.stream.len() as u64 > self.target_output_size {
            self.full = true;
        }
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        Ok(self.stream.flush()?)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(self.stream.close()?)
    }

    fn len(&self) -> usize {
        self.stream.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let read = self.stream.read(buf);
        self.drained += read as u64;
        read
    }

    fn reset(&mut self) {
        self.stream.reset();
        self.drained = 0;
        self.full = false;
    }

    fn is_full(&self) -> bool {
        self.full
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn config(kind: CompressorKind, target: u64) -> CompressorConfig {
        CompressorConfig::builder().kind(kind).target_output_size(target).build()
    }

    #[rstest]
    #[case("ratio", CompressorKind::Ratio)]
    #[case("shadow", CompressorKind::Shadow)]
    #[case("none", CompressorKind::None)]
    fn test_kind_round_trips_through_str(#[case] name: &str, #[case] kind: CompressorKind) {
        assert_eq!(name.parse::<CompressorKind>().unwrap(), kind);
        assert_eq!(kind.to_string(), name);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!("zstd".parse::<CompressorKind>().is_err());
    }

    #[test]
    fn test_ratio_threshold() {
        let cfg = CompressorConfig::builder()
            .kind(CompressorKind::Ratio)
            .target_output_size(1000)
            .approx_compr_ratio(0.5)
            .build();
        let mut compressor = RatioCompressor::new(&cfg).unwrap();
        assert_eq!(compressor.input_threshold(), 2000);

        compressor.write(&[1u8; 1999]).unwrap();
        assert!(!compressor.is_full());
        compressor.write(&[1u8; 1]).unwrap();
        assert!(compressor.is_full());
        assert_eq!(
            compressor.write(&[1u8]).unwrap_err(),
            ChannelError::Full(FullReason::CompressorFull)
        );

        compressor.reset();
        assert!(!compressor.is_full());
    }

    #[test]
    fn test_ratio_requires_positive_ratio() {
        let cfg = CompressorConfig::builder()
            .kind(CompressorKind::Ratio)
            .approx_compr_ratio(0.0)
            .build();
        assert!(matches!(new_batch_compressor(&cfg), Err(ChannelError::InvalidConfig(_))));
    }

    #[test]
    fn test_shadow_accepts_first_oversized_write() {
        let mut compressor = ShadowCompressor::new(&config(CompressorKind::Shadow, 100));
        let data = pseudo_random(1000, 7);

        assert_eq!(compressor.write(&data).unwrap(), 1000);
        assert!(compressor.is_full());
        assert_eq!(
            compressor.write(&data).unwrap_err(),
            ChannelError::Full(FullReason::CompressorFull)
        );
    }

    #[test]
    fn test_shadow_rejects_write_over_target() {
        let mut compressor = ShadowCompressor::new(&config(CompressorKind::Shadow, 1000));
        compressor.write(&pseudo_random(600, 1)).unwrap();
        assert!(!compressor.is_full());

        let err = compressor.write(&pseudo_random(600, 2)).unwrap_err();
        assert_eq!(err, ChannelError::Full(FullReason::CompressorFull));
        assert!(compressor.is_full());

        compressor.close().unwrap();
        // Only the accepted write reached the main stream.
        assert!(compressor.len() < 700);
    }

    #[test]
    fn test_shadow_packs_compressible_data_past_target() {
        let mut compressor = ShadowCompressor::new(&config(CompressorKind::Shadow, 1000));
        let mut written = 0;
        while compressor.write(&[0u8; 500]).is_ok() {
            written += 500;
            if written > 1_000_000 {
                break;
            }
        }
        assert!(written > 1000, "zeros compress well below the target");
    }

    #[test]
    fn test_non_compressor_tracks_output() {
        let mut compressor = NonCompressor::new(&config(CompressorKind::None, 1000));
        compressor.write(&pseudo_random(500, 3)).unwrap();
        assert!(!compressor.is_full());
        assert!(compressor.len() >= 500);

        let mut buf = vec![0u8; compressor.len()];
        compressor.read(&mut buf);
        assert!(compressor.is_empty());

        compressor.write(&pseudo_random(600, 4)).unwrap();
        assert!(compressor.is_full(), "drained bytes still count against the target");
    }

    #[rstest]
    #[case(CompressionAlgo::Zlib)]
    #[case(CompressionAlgo::Brotli10)]
    fn test_new_compressor_streams(#[case] algo: CompressionAlgo) {
        let mut stream = new_compressor(algo);
        stream.write(b"hello").unwrap();
        stream.close().unwrap();
        assert!(!stream.is_empty());
    }
}
