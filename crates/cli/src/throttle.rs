//! Block builder throttling flags.

use clap::Args;
use sluice_batcher::{
    DEFAULT_BLOCK_SIZE_LOWER_LIMIT, DEFAULT_BLOCK_SIZE_UPPER_LIMIT, DEFAULT_LOWER_THRESHOLD,
    DEFAULT_TX_SIZE_LOWER_LIMIT, DEFAULT_TX_SIZE_UPPER_LIMIT, DEFAULT_UPPER_THRESHOLD,
    ThrottleConfig, ThrottleControllerType,
};

/// Flags configuring DA throttling of the block builders.
#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Throttling")]
pub struct ThrottleArgs {
    /// Block builder RPC URLs to throttle in addition to the L2 node.
    #[arg(
        long = "throttle.additional-endpoints",
        env = "SLUICE_THROTTLE_ADDITIONAL_ENDPOINTS",
        value_delimiter = ','
    )]
    pub additional_endpoints: Vec<String>,

    /// Tx DA size limit at full intensity, zero to never limit transactions.
    #[arg(long = "throttle.tx-size-lower-limit", env = "SLUICE_THROTTLE_TX_SIZE_LOWER_LIMIT", default_value_t = DEFAULT_TX_SIZE_LOWER_LIMIT)]
    pub tx_size_lower_limit: u64,

    /// Tx DA size limit as intensity approaches zero.
    #[arg(long = "throttle.tx-size-upper-limit", env = "SLUICE_THROTTLE_TX_SIZE_UPPER_LIMIT", default_value_t = DEFAULT_TX_SIZE_UPPER_LIMIT)]
    pub tx_size_upper_limit: u64,

    /// Block DA size limit at full intensity, zero to never limit blocks.
    #[arg(long = "throttle.block-size-lower-limit", env = "SLUICE_THROTTLE_BLOCK_SIZE_LOWER_LIMIT", default_value_t = DEFAULT_BLOCK_SIZE_LOWER_LIMIT)]
    pub block_size_lower_limit: u64,

    /// Block DA size limit when not throttling.
    #[arg(long = "throttle.block-size-upper-limit", env = "SLUICE_THROTTLE_BLOCK_SIZE_UPPER_LIMIT", default_value_t = DEFAULT_BLOCK_SIZE_UPPER_LIMIT)]
    pub block_size_upper_limit: u64,

    /// Throttle controller: step, linear or quadratic.
    #[arg(long = "throttle.controller-type", env = "SLUICE_THROTTLE_CONTROLLER_TYPE", default_value_t = ThrottleControllerType::Quadratic)]
    pub controller_type: ThrottleControllerType,

    /// Unsafe DA bytes above which throttling starts, zero to disable.
    #[arg(long = "throttle.unsafe-da-bytes-lower-threshold", env = "SLUICE_THROTTLE_UNSAFE_DA_BYTES_LOWER_THRESHOLD", default_value_t = DEFAULT_LOWER_THRESHOLD)]
    pub lower_threshold: u64,

    /// Unsafe DA bytes at which throttling reaches full intensity.
    #[arg(long = "throttle.unsafe-da-bytes-upper-threshold", env = "SLUICE_THROTTLE_UNSAFE_DA_BYTES_UPPER_THRESHOLD", default_value_t = DEFAULT_UPPER_THRESHOLD)]
    pub upper_threshold: u64,
}

impl From<&ThrottleArgs> for ThrottleConfig {
    fn from(args: &ThrottleArgs) -> Self {
        Self::builder()
            .tx_size_limits(args.tx_size_lower_limit, args.tx_size_upper_limit)
            .block_size_limits(args.block_size_lower_limit, args.block_size_upper_limit)
            .controller_type(args.controller_type)
            .thresholds(args.lower_threshold, args.upper_threshold)
            .build()
    }
}
