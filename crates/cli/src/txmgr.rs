//! Transaction manager flags.

use std::time::Duration;

use clap::Args;
use sluice_txmgr::TxManagerConfig;

/// Flags configuring the L1 transaction manager.
#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Transaction manager")]
pub struct TxMgrArgs {
    /// Confirmations to wait for before a transaction counts as included.
    #[arg(long = "txmgr.num-confirmations", env = "SLUICE_NUM_CONFIRMATIONS", default_value_t = 10)]
    pub num_confirmations: u64,

    /// Interval between receipt queries.
    #[arg(
        long = "txmgr.receipt-query-interval",
        env = "SLUICE_TXMGR_RECEIPT_QUERY_INTERVAL",
        default_value = "12s",
        value_parser = humantime::parse_duration
    )]
    pub receipt_query_interval: Duration,

    /// Timeout of a single L1 RPC call.
    #[arg(
        long = "txmgr.network-timeout",
        env = "SLUICE_NETWORK_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub network_timeout: Duration,

    /// Time to wait before bumping the fees of an unconfirmed transaction.
    #[arg(
        long = "txmgr.resubmission-timeout",
        env = "SLUICE_RESUBMISSION_TIMEOUT",
        default_value = "48s",
        value_parser = humantime::parse_duration
    )]
    pub resubmission_timeout: Duration,

    /// Time to wait for a transaction to show up in the mempool.
    #[arg(
        long = "txmgr.not-in-mempool-timeout",
        env = "SLUICE_TXMGR_NOT_IN_MEMPOOL_TIMEOUT",
        default_value = "2m",
        value_parser = humantime::parse_duration
    )]
    pub not_in_mempool_timeout: Duration,

    /// Deadline of a whole send, zero for none.
    #[arg(
        long = "txmgr.send-timeout",
        env = "SLUICE_TXMGR_TX_SEND_TIMEOUT",
        default_value = "0s",
        value_parser = humantime::parse_duration
    )]
    pub tx_send_timeout: Duration,

    /// "Nonce too low" errors after which a send is aborted.
    #[arg(long = "txmgr.safe-abort-nonce-too-low-count", env = "SLUICE_SAFE_ABORT_NONCE_TOO_LOW_COUNT", default_value_t = 3)]
    pub safe_abort_nonce_too_low_count: u64,

    /// Multiplier of the suggested fees that bumped fees may not exceed.
    #[arg(long = "txmgr.fee-limit-multiplier", env = "SLUICE_TXMGR_FEE_LIMIT_MULTIPLIER", default_value_t = 5)]
    pub fee_limit_multiplier: u64,

    /// Fee in gwei below which the fee limit multiplier is not enforced.
    #[arg(long = "txmgr.fee-limit-threshold", env = "SLUICE_TXMGR_FEE_LIMIT_THRESHOLD", default_value_t = 100.0)]
    pub fee_limit_threshold_gwei: f64,

    /// Minimum base fee in gwei.
    #[arg(long = "txmgr.min-basefee", env = "SLUICE_TXMGR_MIN_BASEFEE", default_value_t = 1.0)]
    pub min_base_fee_gwei: f64,

    /// Minimum tip cap in gwei.
    #[arg(long = "txmgr.min-tip-cap", env = "SLUICE_TXMGR_MIN_TIP_CAP", default_value_t = 1.0)]
    pub min_tip_cap_gwei: f64,
}

impl From<&TxMgrArgs> for TxManagerConfig {
    fn from(args: &TxMgrArgs) -> Self {
        Self::builder()
            .num_confirmations(args.num_confirmations)
            .receipt_query_interval(args.receipt_query_interval)
            .network_timeout(args.network_timeout)
            .resubmission_timeout(args.resubmission_timeout)
            .not_in_mempool_timeout(args.not_in_mempool_timeout)
            .tx_send_timeout(args.tx_send_timeout)
            .safe_abort_nonce_too_low_count(args.safe_abort_nonce_too_low_count)
            .fee_limit_multiplier(args.fee_limit_multiplier)
            .fee_limit_threshold_gwei(args.fee_limit_threshold_gwei)
            .min_base_fee_gwei(args.min_base_fee_gwei)
            .min_tip_cap_gwei(args.min_tip_cap_gwei)
            .build()
    }
}
