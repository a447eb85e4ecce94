//! Compression selection for CLI.

use clap::ValueEnum;
use sluice_batcher::CompressorKind;
use sluice_pipeline::CompressionAlgo;

/// Available compression algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CompressionAlgorithm {
    /// Zlib (DEFLATE) compression (default).
    #[default]
    Zlib,
    /// Brotli at quality 9.
    #[value(name = "brotli-9")]
    Brotli9,
    /// Brotli at quality 10.
    #[value(name = "brotli-10")]
    Brotli10,
    /// Brotli at quality 11.
    #[value(name = "brotli-11")]
    Brotli11,
}

impl From<CompressionAlgorithm> for CompressionAlgo {
    fn from(algo: CompressionAlgorithm) -> Self {
        match algo {
            CompressionAlgorithm::Zlib => Self::Zlib,
            CompressionAlgorithm::Brotli9 => Self::Brotli9,
            CompressionAlgorithm::Brotli10 => Self::Brotli10,
            CompressionAlgorithm::Brotli11 => Self::Brotli11,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zlib => write!(f, "zlib"),
            Self::Brotli9 => write!(f, "brotli-9"),
            Self::Brotli10 => write!(f, "brotli-10"),
            Self::Brotli11 => write!(f, "brotli-11"),
        }
    }
}

/// Policy deciding when a channel is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CompressorType {
    /// Estimate the output size from a fixed compression ratio.
    Ratio,
    /// Measure the output size with a flushed shadow stream (default).
    #[default]
    Shadow,
    /// Store blocks without compression.
    None,
}

impl From<CompressorType> for CompressorKind {
    fn from(kind: CompressorType) -> Self {
        match kind {
            CompressorType::Ratio => Self::Ratio,
            CompressorType::Shadow => Self::Shadow,
            CompressorType::None => Self::None,
        }
    }
}

impl std::fmt::Display for CompressorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&CompressorKind::from(*self), f)
    }
}
