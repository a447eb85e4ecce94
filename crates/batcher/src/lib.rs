#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/sluice/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod batch;
pub use batch::SingularBatch;

mod block;
pub use block::{BlockId, DEPOSIT_TX_TYPE, L1BlockRef, L2Block, L2BlockRef, SyncStatus};

mod candidate;
pub use candidate::{
    TX_COST_FLOOR_PER_TOKEN, blob_candidate, blob_sidecar, calldata_candidate, floor_data_gas,
};

mod channel;
pub use channel::{Channel, ChannelStatus};

mod channel_builder;
pub use channel_builder::ChannelBuilder;

mod channel_config;
pub use channel_config::{
    ChannelConfig, ChannelConfigBuilder, ChannelConfigProvider, DEFAULT_MAX_L1_TX_SIZE,
    MAX_BLOBS_PER_TX, StaticChannelConfigProvider,
};

mod channel_manager;
pub use channel_manager::ChannelManager;

mod channel_out;
pub use channel_out::ChannelOut;

mod clients;
pub use clients::{AltDaClient, L2Client, RollupClient, ThrottleEndpoint};

mod compressor;
pub use compressor::{
    BatchCompressor, CLOSE_OVERHEAD_ZLIB, CompressorConfig, CompressorConfigBuilder,
    CompressorKind, NonCompressor, RatioCompressor, ShadowCompressor, new_batch_compressor,
    new_compressor,
};

mod config;
pub use config::{BatcherConfig, BatcherConfigBuilder};

mod driver;
pub use driver::{BatchSubmitter, DriverSetup, TxPoolState, TxRef};

mod dynamic_config;
pub use dynamic_config::{DynamicEthChannelConfig, single_blob_tx_cost, single_calldata_tx_cost};

mod error;
pub use error::{BatcherError, ChannelError, FullReason};

mod metrics;
pub use metrics::{BatcherMetrics, Metricer, NoopMetrics};

mod sized_block;
pub use sized_block::{BLOCK_OVERHEAD, SizedBlock};

mod sync_actions;
pub use sync_actions::{InclusiveBlockRange, SyncActions, compute_sync_actions};

mod throttle;
pub use throttle::{
    DEFAULT_BLOCK_SIZE_LOWER_LIMIT, DEFAULT_BLOCK_SIZE_UPPER_LIMIT, DEFAULT_LOWER_THRESHOLD,
    DEFAULT_TX_SIZE_LOWER_LIMIT, DEFAULT_TX_SIZE_UPPER_LIMIT, DEFAULT_UPPER_THRESHOLD,
    LinearStrategy, QuadraticStrategy, StepStrategy, ThrottleConfig, ThrottleConfigBuilder,
    ThrottleController, ThrottleControllerType, ThrottleParams, ThrottleStrategy,
};

mod tx_data;
pub use tx_data::{FrameData, TxData, TxId};

#[cfg(test)]
mod test_utils;
