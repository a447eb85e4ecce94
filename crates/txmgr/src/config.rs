//! Transaction manager configuration.

use std::time::Duration;

use crate::TxError;

/// Wei per gwei.
pub const GWEI: u128 = 1_000_000_000;

/// Converts a gwei amount into wei, truncating sub-wei precision.
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * GWEI as f64) as u128
}

/// Transaction manager configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct TxManagerConfig {
    // Confirmation
    /// Number of confirmations required (default: 10).
    pub num_confirmations: u64,
    /// Receipt polling interval (default: 12s).
    pub receipt_query_interval: Duration,
    /// Network timeout for RPC calls (default: 10s).
    pub network_timeout: Duration,

    // Resubmission
    /// Interval before bumping gas price (default: 48s).
    pub resubmission_timeout: Duration,
    /// Maximum time to wait for mempool inclusion (default: 2m).
    pub not_in_mempool_timeout: Duration,
    /// Overall deadline for a single send; zero disables it (default: 0).
    pub tx_send_timeout: Duration,
    /// "Nonce too low" errors before abort (default: 3).
    pub safe_abort_nonce_too_low_count: u64,

    // Fee limits
    /// Multiplier for fee cap limit (default: 5x).
    pub fee_limit_multiplier: u64,
    /// Bumped fees below this many gwei skip the multiplier limit (default: 100.0).
    pub fee_limit_threshold_gwei: f64,
    /// Minimum base fee in gwei (default: 1.0).
    pub min_base_fee_gwei: f64,
    /// Minimum tip cap in gwei (default: 1.0).
    pub min_tip_cap_gwei: f64,

    // Price bumping
    /// Minimum percentage bump for regular txs (default: 10%).
    pub price_bump_percent: u64,
    /// Minimum percentage bump for blob txs (default: 100%).
    pub blob_price_bump_percent: u64,
}

impl Default for TxManagerConfig {
    fn default() -> Self {
        Self {
            num_confirmations: 10,
            receipt_query_interval: Duration::from_secs(12),
            network_timeout: Duration::from_secs(10),
            resubmission_timeout: Duration::from_secs(48),
            not_in_mempool_timeout: Duration::from_secs(120), // 2 minutes
            tx_send_timeout: Duration::ZERO,
            safe_abort_nonce_too_low_count: 3,
            fee_limit_multiplier: 5,
            fee_limit_threshold_gwei: 100.0,
            min_base_fee_gwei: 1.0,
            min_tip_cap_gwei: 1.0,
            price_bump_percent: 10,
            blob_price_bump_percent: 100,
        }
    }
}

impl TxManagerConfig {
    /// Creates a new builder for configuring a transaction manager.
    pub fn builder() -> TxManagerConfigBuilder {
        TxManagerConfigBuilder::default()
    }

    /// Returns the replacement bump percentage for the transaction kind.
    pub const fn bump_percent(&self, is_blob: bool) -> u64 {
        if is_blob { self.blob_price_bump_percent } else { self.price_bump_percent }
    }

    /// Fee limit threshold in wei.
    pub fn fee_limit_threshold(&self) -> u128 {
        gwei_to_wei(self.fee_limit_threshold_gwei)
    }

    /// Minimum base fee in wei.
    pub fn min_base_fee(&self) -> u128 {
        gwei_to_wei(self.min_base_fee_gwei)
    }

    /// Minimum tip cap in wei.
    pub fn min_tip_cap(&self) -> u128 {
        gwei_to_wei(self.min_tip_cap_gwei)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TxError::InvalidConfig`] naming the first invalid field.
    pub fn check(&self) -> Result<(), TxError> {
        if self.num_confirmations == 0 {
            return Err(TxError::InvalidConfig("num_confirmations must not be 0"));
        }
        if self.network_timeout.is_zero() {
            return Err(TxError::InvalidConfig("network_timeout must not be 0"));
        }
        if self.resubmission_timeout.is_zero() {
            return Err(TxError::InvalidConfig("resubmission_timeout must not be 0"));
        }
        if self.receipt_query_interval.is_zero() {
            return Err(TxError::InvalidConfig("receipt_query_interval must not be 0"));
        }
        if self.not_in_mempool_timeout.is_zero() {
            return Err(TxError::InvalidConfig("not_in_mempool_timeout must not be 0"));
        }
        if self.safe_abort_nonce_too_low_count == 0 {
            return Err(TxError::InvalidConfig("safe_abort_nonce_too_low_count must not be 0"));
        }
        if self.fee_limit_multiplier == 0 {
            return Err(TxError::InvalidConfig("fee_limit_multiplier must not be 0"));
        }
        if self.min_base_fee_gwei < 0.0 || self.min_tip_cap_gwei < 0.0 {
            return Err(TxError::InvalidConfig("minimum fees must not be negative"));
        }
        if self.fee_limit_threshold_gwei < 0.0 {
            return Err(TxError::InvalidConfig("fee_limit_threshold_gwei must not be negative"));
        }
        Ok(())
    }
}

/// Builder for [`TxManagerConfig`].
#[derive(Clone, Debug, Default)]
pub struct TxManagerConfigBuilder {
    config: TxManagerConfig,
}

impl TxManagerConfigBuilder {
    /// Sets the number of confirmations required.
    pub const fn num_confirmations(mut self, num_confirmations: u64) -> Self {
        self.config.num_confirmations = num_confirmations;
        self
    }

    /// Sets the receipt polling interval.
    pub const fn receipt_query_interval(mut self, receipt_query_interval: Duration) -> Self {
        self.config.receipt_query_interval = receipt_query_interval;
        self
    }

    /// Sets the network timeout for RPC calls.
    pub const fn network_timeout(mut self, network_timeout: Duration) -> Self {
        self.config.network_timeout = network_timeout;
        self
    }

    /// Sets the interval before bumping gas price.
    pub const fn resubmission_timeout(mut self, resubmission_timeout: Duration) -> Self {
        self.config.resubmission_timeout = resubmission_timeout;
        self
    }

    /// Sets the maximum time to wait for mempool inclusion.
    pub const fn not_in_mempool_timeout(mut self, not_in_mempool_timeout: Duration) -> Self {
        self.config.not_in_mempool_timeout = not_in_mempool_timeout;
        self
    }

    /// Sets the overall send deadline.
    pub const fn tx_send_timeout(mut self, tx_send_timeout: Duration) -> Self {
        self.config.tx_send_timeout = tx_send_timeout;
        self
    }

    /// Sets the "nonce too low" error count before abort.
    pub const fn safe_abort_nonce_too_low_count(
        mut self,
        safe_abort_nonce_too_low_count: u64,
    ) -> Self {
        self.config.safe_abort_nonce_too_low_count = safe_abort_nonce_too_low_count;
        self
    }

    /// Sets the multiplier for fee cap limit.
    pub const fn fee_limit_multiplier(mut self, fee_limit_multiplier: u64) -> Self {
        self.config.fee_limit_multiplier = fee_limit_multiplier;
        self
    }

    /// Sets the threshold below which fee limits are not enforced.
    pub const fn fee_limit_threshold_gwei(mut self, fee_limit_threshold_gwei: f64) -> Self {
        self.config.fee_limit_threshold_gwei = fee_limit_threshold_gwei;
        self
    }

    /// Sets the minimum base fee in gwei.
    pub const fn min_base_fee_gwei(mut self, min_base_fee_gwei: f64) -> Self {
        self.config.min_base_fee_gwei = min_base_fee_gwei;
        self
    }

    /// Sets the minimum tip cap in gwei.
    pub const fn min_tip_cap_gwei(mut self, min_tip_cap_gwei: f64) -> Self {
        self.config.min_tip_cap_gwei = min_tip_cap_gwei;
        self
    }

    /// Sets the minimum percentage bump for regular transactions.
    pub const fn price_bump_percent(mut self, price_bump_percent: u64) -> Self {
        self.config.price_bump_percent = price_bump_percent;
        self
    }

    /// Sets the minimum percentage bump for blob transactions.
    pub const fn blob_price_bump_percent(mut self, blob_price_bump_percent: u64) -> Self {
        self.config.blob_price_bump_percent = blob_price_bump_percent;
        self
    }

    /// Builds the [`TxManagerConfig`].
    pub const fn build(self) -> TxManagerConfig {
        self.config
    }
}
