//! Channel configuration.

use sluice_pipeline::{
    CompressionAlgo,
    constants::{FRAME_OVERHEAD_SIZE, MAX_BLOB_DATA_SIZE},
};
use sluice_txmgr::GasPriceCaps;

use crate::{
    compressor::{CompressorConfig, CompressorKind},
    error::ChannelError,
};

/// Default maximum size of a calldata transaction payload.
pub const DEFAULT_MAX_L1_TX_SIZE: usize = 120_000;

/// Maximum number of blobs in one transaction.
pub const MAX_BLOBS_PER_TX: usize = 6;

/// How channels are built and framed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelConfig {
    /// Sequencing window in L1 blocks.
    pub seq_window_size: u64,
    /// Number of L1 blocks after which a channel's frames must all be included.
    pub channel_timeout: u64,
    /// Maximum number of L1 blocks a channel stays open, 0 to disable.
    pub max_channel_duration: u64,
    /// L1 blocks subtracted from the sequencing window and channel timeout.
    pub sub_safety_margin: u64,
    /// Maximum encoded frame size, header included.
    pub max_frame_size: usize,
    /// Frames per blob transaction and the frame budget of one channel.
    pub target_num_frames: usize,
    /// Compression policy.
    pub compressor: CompressorConfig,
    /// Post frames as blobs instead of calldata.
    pub use_blobs: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ChannelConfig {
    /// Creates a builder with calldata defaults.
    pub fn builder() -> ChannelConfigBuilder {
        ChannelConfigBuilder::default()
    }

    /// Frames carried by one transaction.
    pub const fn max_frames_per_tx(&self) -> usize {
        if self.use_blobs { self.target_num_frames } else { 1 }
    }

    /// Frame payload capacity of one channel.
    pub const fn max_data_size(&self) -> u64 {
        (self.target_num_frames * self.max_frame_size.saturating_sub(FRAME_OVERHEAD_SIZE)) as u64
    }

    /// Validates the config.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] naming the violated rule.
    pub fn check(&self) -> Result<(), ChannelError> {
        if self.channel_timeout < self.sub_safety_margin {
            return Err(ChannelError::InvalidConfig(
                "channel timeout is less than the safety margin",
            ));
        }
        if self.max_frame_size <= FRAME_OVERHEAD_SIZE {
            return Err(ChannelError::FrameSizeTooSmall(self.max_frame_size));
        }
        if self.target_num_frames < 1 {
            return Err(ChannelError::InvalidConfig("target number of frames must be at least 1"));
        }
        if self.use_blobs && self.max_frame_size > MAX_BLOB_DATA_SIZE - 1 {
            return Err(ChannelError::InvalidConfig("max frame size does not fit a blob"));
        }
        if self.use_blobs && self.target_num_frames > MAX_BLOBS_PER_TX {
            return Err(ChannelError::InvalidConfig("too many blobs per transaction"));
        }
        Ok(())
    }
}

/// Builder for [`ChannelConfig`].
///
/// [`build`](Self::build) sizes the compressor target to
/// [`ChannelConfig::max_data_size`].
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfigBuilder {
    config: ChannelConfig,
}

impl Default for ChannelConfigBuilder {
    fn default() -> Self {
        Self {
            config: ChannelConfig {
                seq_window_size: 3600,
                channel_timeout: 50,
                max_channel_duration: 0,
                sub_safety_margin: 10,
                max_frame_size: DEFAULT_MAX_L1_TX_SIZE - 1,
                target_num_frames: 1,
                compressor: CompressorConfig::default(),
                use_blobs: false,
            },
        }
    }
}

impl ChannelConfigBuilder {
    /// Sets the sequencing window size.
    pub const fn seq_window_size(mut self, seq_window_size: u64) -> Self {
        self.config.seq_window_size = seq_window_size;
        self
    }

    /// Sets the channel timeout.
    pub const fn channel_timeout(mut self, channel_timeout: u64) -> Self {
        self.config.channel_timeout = channel_timeout;
        self
    }

    /// Sets the maximum channel duration.
    pub const fn max_channel_duration(mut self, max_channel_duration: u64) -> Self {
        self.config.max_channel_duration = max_channel_duration;
        self
    }

    /// Sets the safety margin.
    pub const fn sub_safety_margin(mut self, sub_safety_margin: u64) -> Self {
        self.config.sub_safety_margin = sub_safety_margin;
        self
    }

    /// Sets the maximum frame size.
    pub const fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.config.max_frame_size = max_frame_size;
        self
    }

    /// Sets the target number of frames.
    pub const fn target_num_frames(mut self, target_num_frames: usize) -> Self {
        self.config.target_num_frames = target_num_frames;
        self
    }

    /// Sets the compression policy.
    pub const fn compressor_kind(mut self, kind: CompressorKind) -> Self {
        self.config.compressor.kind = kind;
        self
    }

    /// Sets the approximate compression ratio.
    pub const fn approx_compr_ratio(mut self, approx_compr_ratio: f64) -> Self {
        self.config.compressor.approx_compr_ratio = approx_compr_ratio;
        self
    }

    /// Sets the compression algorithm.
    pub const fn compression_algo(mut self, algo: CompressionAlgo) -> Self {
        self.config.compressor.algo = algo;
        self
    }

    /// Posts frames as blobs.
    pub const fn use_blobs(mut self, use_blobs: bool) -> Self {
        self.config.use_blobs = use_blobs;
        self
    }

    /// Builds the config.
    pub const fn build(mut self) -> ChannelConfig {
        self.config.compressor.target_output_size = self.config.max_data_size();
        self.config
    }
}

/// Picks the [`ChannelConfig`] for the next channel.
pub trait ChannelConfigProvider: Send + Sync {
    /// Returns the config to build the next channel with.
    fn channel_config(&self, is_pectra: bool, is_throttling: bool) -> ChannelConfig;

    /// Records the latest L1 fee snapshot.
    fn record_gas_price_caps(&self, _caps: GasPriceCaps) {}
}

/// Always returns the same config.
#[derive(Clone, Copy, Debug)]
pub struct StaticChannelConfigProvider {
    config: ChannelConfig,
}

impl StaticChannelConfigProvider {
    /// Creates a provider returning `config`.
    pub const fn new(config: ChannelConfig) -> Self {
        Self { config }
    }
}

impl ChannelConfigProvider for StaticChannelConfigProvider {
    fn channel_config(&self, _is_pectra: bool, _is_throttling: bool) -> ChannelConfig {
        self.config
    }
}
