//! Driver configuration.

use std::time::Duration;

use alloy::primitives::Address;

use crate::{block::BlockId, error::BatcherError, throttle::ThrottleConfig};

/// Batch submitter configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct BatcherConfig {
    // Addresses
    /// Address batcher transactions are sent to.
    pub batch_inbox: Address,
    /// L1 origin of the L2 genesis block, used while the safe head is genesis.
    pub genesis_l1: BlockId,

    // Timing
    /// Interval between block loading ticks (default: 6s).
    pub poll_interval: Duration,
    /// Timeout for rollup node and L2 RPC calls (default: 10s).
    pub network_timeout: Duration,

    // Submission
    /// Maximum batcher transactions in flight; zero is unbounded (default: 1).
    pub max_pending_transactions: usize,
    /// Wait for the rollup node to process the current L1 head before
    /// starting and after a reorg (default: false).
    pub wait_node_sync: bool,
    /// Maximum concurrent alt-DA uploads; zero is unbounded (default: 1).
    pub max_concurrent_da_requests: usize,

    /// Block builder throttling.
    pub throttle: ThrottleConfig,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_inbox: Address::ZERO,
            genesis_l1: BlockId::default(),
            poll_interval: Duration::from_secs(6),
            network_timeout: Duration::from_secs(10),
            max_pending_transactions: 1,
            wait_node_sync: false,
            max_concurrent_da_requests: 1,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl BatcherConfig {
    /// Creates a new builder.
    pub fn builder() -> BatcherConfigBuilder {
        BatcherConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::InvalidConfig`] naming the first invalid field.
    pub fn check(&self) -> Result<(), BatcherError> {
        if self.poll_interval.is_zero() {
            return Err(BatcherError::InvalidConfig("poll_interval must not be 0"));
        }
        if self.network_timeout.is_zero() {
            return Err(BatcherError::InvalidConfig("network_timeout must not be 0"));
        }
        self.throttle.check()
    }
}

/// Builder for [`BatcherConfig`].
#[derive(Clone, Debug, Default)]
pub struct BatcherConfigBuilder {
    config: BatcherConfig,
}

impl BatcherConfigBuilder {
    /// Sets the batch inbox address.
    pub const fn batch_inbox(mut self, batch_inbox: Address) -> Self {
        self.config.batch_inbox = batch_inbox;
        self
    }

    /// Sets the L1 origin of the L2 genesis block.
    pub const fn genesis_l1(mut self, genesis_l1: BlockId) -> Self {
        self.config.genesis_l1 = genesis_l1;
        self
    }

    /// Sets the block loading interval.
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Sets the RPC timeout.
    pub const fn network_timeout(mut self, network_timeout: Duration) -> Self {
        self.config.network_timeout = network_timeout;
        self
    }

    /// Sets the maximum number of transactions in flight.
    pub const fn max_pending_transactions(mut self, max_pending_transactions: usize) -> Self {
        self.config.max_pending_transactions = max_pending_transactions;
        self
    }

    /// Sets whether to wait for the rollup node to sync.
    pub const fn wait_node_sync(mut self, wait_node_sync: bool) -> Self {
        self.config.wait_node_sync = wait_node_sync;
        self
    }

    /// Sets the maximum concurrent alt-DA uploads.
    pub const fn max_concurrent_da_requests(mut self, max_concurrent_da_requests: usize) -> Self {
        self.config.max_concurrent_da_requests = max_concurrent_da_requests;
        self
    }

    /// Sets the throttling config.
    pub const fn throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.config.throttle = throttle;
        self
    }

    /// Builds the configuration.
    pub const fn build(self) -> BatcherConfig {
        self.config
    }
}
