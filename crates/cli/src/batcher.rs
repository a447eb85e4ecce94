//! Batcher and channel flags.

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, B256};
use clap::{Args, ValueEnum};
use sluice_batcher::{
    BatcherConfig, BlockId, ChannelConfig, ChannelConfigProvider, DynamicEthChannelConfig,
    StaticChannelConfigProvider, ThrottleConfig,
};
use sluice_pipeline::constants::MAX_BLOB_DATA_SIZE;

use crate::{CompressionAlgorithm, CompressorType};

/// Where channel frames are posted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DataAvailabilityType {
    /// Calldata transactions (default).
    #[default]
    Calldata,
    /// Blob transactions.
    Blobs,
    /// Whichever is cheaper under current L1 fees.
    Auto,
}

/// Flags configuring block loading, channel building and submission.
#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Batcher")]
pub struct BatcherArgs {
    /// Address of the batch inbox on L1.
    #[arg(long = "batch-inbox-address", env = "SLUICE_BATCH_INBOX_ADDRESS")]
    pub batch_inbox: Address,

    /// Hash of the L1 origin of the L2 genesis block.
    #[arg(long = "rollup.genesis-l1-hash", env = "SLUICE_GENESIS_L1_HASH", default_value_t = B256::ZERO)]
    pub genesis_l1_hash: B256,

    /// Number of the L1 origin of the L2 genesis block.
    #[arg(long = "rollup.genesis-l1-number", env = "SLUICE_GENESIS_L1_NUMBER", default_value_t = 0)]
    pub genesis_l1_number: u64,

    /// Sequencing window in L1 blocks.
    #[arg(long = "rollup.seq-window-size", env = "SLUICE_SEQ_WINDOW_SIZE", default_value_t = 3600)]
    pub seq_window_size: u64,

    /// Channel timeout in L1 blocks.
    #[arg(long = "rollup.channel-timeout", env = "SLUICE_CHANNEL_TIMEOUT", default_value_t = 50)]
    pub channel_timeout: u64,

    /// Interval between sync status polls.
    #[arg(
        long = "poll-interval",
        env = "SLUICE_POLL_INTERVAL",
        default_value = "6s",
        value_parser = humantime::parse_duration
    )]
    pub poll_interval: Duration,

    /// Timeout of rollup node and L2 RPC calls.
    #[arg(
        long = "rpc-timeout",
        env = "SLUICE_RPC_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub rpc_timeout: Duration,

    /// Maximum batcher transactions in flight, zero for unbounded.
    #[arg(long = "max-pending-tx", env = "SLUICE_MAX_PENDING_TX", default_value_t = 1)]
    pub max_pending_tx: usize,

    /// Maximum L1 blocks a channel stays open, zero to disable.
    #[arg(long = "max-channel-duration", env = "SLUICE_MAX_CHANNEL_DURATION", default_value_t = 0)]
    pub max_channel_duration: u64,

    /// L1 blocks subtracted from the channel timeout and sequencing window.
    #[arg(long = "sub-safety-margin", env = "SLUICE_SUB_SAFETY_MARGIN", default_value_t = 10)]
    pub sub_safety_margin: u64,

    /// Maximum size of a calldata transaction.
    #[arg(long = "max-l1-tx-size-bytes", env = "SLUICE_MAX_L1_TX_SIZE_BYTES", default_value_t = 120_000)]
    pub max_l1_tx_size: usize,

    /// Frames per blob transaction.
    #[arg(long = "target-num-frames", env = "SLUICE_TARGET_NUM_FRAMES", default_value_t = 1)]
    pub target_num_frames: usize,

    /// Expected compression ratio for the ratio compressor.
    #[arg(long = "approx-compr-ratio", env = "SLUICE_APPROX_COMPR_RATIO", default_value_t = 0.6)]
    pub approx_compr_ratio: f64,

    /// Channel fullness policy.
    #[arg(long = "compressor", env = "SLUICE_COMPRESSOR", value_enum, default_value_t = CompressorType::Shadow)]
    pub compressor: CompressorType,

    /// Channel compression algorithm.
    #[arg(long = "compression-algo", env = "SLUICE_COMPRESSION_ALGO", value_enum, default_value_t = CompressionAlgorithm::Zlib)]
    pub compression_algo: CompressionAlgorithm,

    /// Where to post frames.
    #[arg(long = "data-availability-type", env = "SLUICE_DATA_AVAILABILITY_TYPE", value_enum, default_value_t)]
    pub data_availability_type: DataAvailabilityType,

    /// Wait for the rollup node to process the L1 head at startup and after
    /// reorgs.
    #[arg(long = "wait-node-sync", env = "SLUICE_WAIT_NODE_SYNC")]
    pub wait_node_sync: bool,

    /// Alt-DA server URL. Frames go to L1 directly when unset.
    #[arg(long = "altda.da-server", env = "SLUICE_ALTDA_DA_SERVER")]
    pub altda_server: Option<String>,

    /// Maximum concurrent alt-DA uploads, zero for unbounded.
    #[arg(long = "altda.max-concurrent-da-requests", env = "SLUICE_ALTDA_MAX_CONCURRENT_DA_REQUESTS", default_value_t = 1)]
    pub max_concurrent_da_requests: usize,
}

impl BatcherArgs {
    /// Driver config with the given throttling settings.
    pub fn batcher_config(&self, throttle: ThrottleConfig) -> BatcherConfig {
        BatcherConfig::builder()
            .batch_inbox(self.batch_inbox)
            .genesis_l1(BlockId::new(self.genesis_l1_hash, self.genesis_l1_number))
            .poll_interval(self.poll_interval)
            .network_timeout(self.rpc_timeout)
            .max_pending_transactions(self.max_pending_tx)
            .wait_node_sync(self.wait_node_sync)
            .max_concurrent_da_requests(self.max_concurrent_da_requests)
            .throttle(throttle)
            .build()
    }

    fn channel_config(&self, max_frame_size: usize, target_num_frames: usize, use_blobs: bool) -> ChannelConfig {
        ChannelConfig::builder()
            .seq_window_size(self.seq_window_size)
            .channel_timeout(self.channel_timeout)
            .max_channel_duration(self.max_channel_duration)
            .sub_safety_margin(self.sub_safety_margin)
            .max_frame_size(max_frame_size)
            .target_num_frames(target_num_frames)
            .compressor_kind(self.compressor.into())
            .approx_compr_ratio(self.approx_compr_ratio)
            .compression_algo(self.compression_algo.into())
            .use_blobs(use_blobs)
            .build()
    }

    /// Channel config for calldata transactions: one frame per transaction.
    pub fn calldata_channel_config(&self) -> ChannelConfig {
        self.channel_config(self.max_l1_tx_size.saturating_sub(1), 1, false)
    }

    /// Channel config for blob transactions: one frame per blob.
    pub fn blob_channel_config(&self) -> ChannelConfig {
        self.channel_config(MAX_BLOB_DATA_SIZE - 1, self.target_num_frames, true)
    }

    /// Channel config provider for the selected DA type.
    ///
    /// Alt-DA commitments always go out as calldata.
    pub fn channel_config_provider(&self) -> Arc<dyn ChannelConfigProvider> {
        if self.altda_server.is_some() {
            return Arc::new(StaticChannelConfigProvider::new(self.calldata_channel_config()));
        }
        match self.data_availability_type {
            DataAvailabilityType::Calldata => {
                Arc::new(StaticChannelConfigProvider::new(self.calldata_channel_config()))
            }
            DataAvailabilityType::Blobs => {
                Arc::new(StaticChannelConfigProvider::new(self.blob_channel_config()))
            }
            DataAvailabilityType::Auto => Arc::new(DynamicEthChannelConfig::new(
                self.calldata_channel_config(),
                self.blob_channel_config(),
            )),
        }
    }
}
