//! Fee suggestion, replacement bumping and fee limits.

use crate::{
    config::{GWEI, TxManagerConfig},
    error::TxError,
};

/// Minimum blob gas price in wei.
pub const MIN_BLOB_GASPRICE: u128 = 1;

/// Blob base fee update fraction.
pub const BLOB_GASPRICE_UPDATE_FRACTION: u64 = 3_338_477;

/// Floor for the blob fee cap of a fresh blob transaction.
pub const MIN_BLOB_TX_FEE: u128 = GWEI;

/// Current fee market conditions as seen by the transaction manager.
///
/// Minimum tip and base fee from the config are already applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasPriceCaps {
    /// Suggested priority fee.
    pub tip_cap: u128,
    /// Base fee of the latest block.
    pub base_fee: u128,
    /// Blob base fee of the latest block, if the chain reports one.
    pub blob_base_fee: Option<u128>,
}

/// Fee caps attached to one signed transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasCaps {
    /// Maximum priority fee per gas (tip).
    pub gas_tip_cap: u128,
    /// Maximum fee per gas.
    pub gas_fee_cap: u128,
    /// Maximum fee per blob gas, for blob transactions.
    pub blob_fee_cap: Option<u128>,
}

impl GasCaps {
    /// Initial caps for a fresh transaction under `suggested` conditions.
    ///
    /// # Errors
    ///
    /// Returns [`TxError::MissingBlobBaseFee`] for a blob transaction when the
    /// chain does not report a blob base fee.
    pub fn initial(suggested: &GasPriceCaps, is_blob: bool) -> Result<Self, TxError> {
        let blob_fee_cap = if is_blob {
            Some(calc_blob_fee_cap(suggested.blob_base_fee.ok_or(TxError::MissingBlobBaseFee)?))
        } else {
            None
        };
        Ok(Self {
            gas_tip_cap: suggested.tip_cap,
            gas_fee_cap: calc_gas_fee_cap(suggested.base_fee, suggested.tip_cap),
            blob_fee_cap,
        })
    }
}

/// `tip + 2 * base_fee`.
pub const fn calc_gas_fee_cap(base_fee: u128, tip_cap: u128) -> u128 {
    tip_cap.saturating_add(base_fee.saturating_mul(2))
}

/// `max(2 * blob_base_fee, 1 gwei)`.
pub const fn calc_blob_fee_cap(blob_base_fee: u128) -> u128 {
    let cap = blob_base_fee.saturating_mul(2);
    if cap < MIN_BLOB_TX_FEE { MIN_BLOB_TX_FEE } else { cap }
}

/// Smallest value a replacement must carry for a field currently at `x`.
///
/// `ceil(x * (100 + bump_percent) / 100)`.
pub const fn calc_threshold_value(x: u128, bump_percent: u64) -> u128 {
    x.saturating_mul(100 + bump_percent as u128).saturating_add(99) / 100
}

/// Computes replacement `(tip, fee_cap)` from the old caps and the current market.
///
/// Each value is raised at least to its replacement threshold. If the market
/// tip is below the threshold, the fee cap is recomputed from the threshold
/// tip so it still covers twice the new base fee.
pub const fn update_fees(
    old_tip: u128,
    old_fee_cap: u128,
    new_tip: u128,
    new_base_fee: u128,
    bump_percent: u64,
) -> (u128, u128) {
    let new_fee_cap = calc_gas_fee_cap(new_base_fee, new_tip);
    let threshold_tip = calc_threshold_value(old_tip, bump_percent);
    let threshold_fee_cap = calc_threshold_value(old_fee_cap, bump_percent);

    match (new_tip >= threshold_tip, new_fee_cap >= threshold_fee_cap) {
        (true, true) => (new_tip, new_fee_cap),
        // Tip went up, base fee flat or down.
        (true, false) => (new_tip, threshold_fee_cap),
        // Tip went down, base fee went up.
        (false, true) => (threshold_tip, calc_gas_fee_cap(new_base_fee, threshold_tip)),
        (false, false) => (threshold_tip, threshold_fee_cap),
    }
}

/// Rejects bumped execution fees above `fee_limit_multiplier` times the market.
///
/// Not enforced while the bumped fee cap is below the configured threshold.
///
/// # Errors
///
/// Returns [`TxError::FeeLimitExceeded`] naming the offending field.
pub fn check_limits(
    config: &TxManagerConfig,
    suggested: &GasPriceCaps,
    bumped_tip: u128,
    bumped_fee_cap: u128,
) -> Result<(), TxError> {
    if config.fee_limit_threshold() > bumped_fee_cap {
        return Ok(());
    }
    let multiplier = config.fee_limit_multiplier;
    let max_tip = suggested.tip_cap.saturating_mul(multiplier as u128);
    let max_fee_cap =
        calc_gas_fee_cap(suggested.base_fee.saturating_mul(multiplier as u128), max_tip);
    if bumped_tip > max_tip {
        return Err(TxError::FeeLimitExceeded { name: "tip cap", bumped: bumped_tip, multiplier });
    }
    if bumped_fee_cap > max_fee_cap {
        return Err(TxError::FeeLimitExceeded {
            name: "fee cap",
            bumped: bumped_fee_cap,
            multiplier,
        });
    }
    Ok(())
}

/// Rejects a bumped blob fee cap above `fee_limit_multiplier` times the fresh cap.
///
/// Not enforced while the bumped value is below the configured threshold.
///
/// # Errors
///
/// Returns [`TxError::BlobFeeLimitExceeded`].
pub fn check_blob_fee_limits(
    config: &TxManagerConfig,
    blob_base_fee: u128,
    bumped_blob_fee: u128,
) -> Result<(), TxError> {
    if config.fee_limit_threshold() > bumped_blob_fee {
        return Ok(());
    }
    let multiplier = config.fee_limit_multiplier;
    let max_blob_fee = calc_blob_fee_cap(blob_base_fee).saturating_mul(multiplier as u128);
    if bumped_blob_fee > max_blob_fee {
        return Err(TxError::BlobFeeLimitExceeded { bumped: bumped_blob_fee, multiplier });
    }
    Ok(())
}

/// Blob base fee for a block with the given excess blob gas.
pub const fn calc_blob_fee(excess_blob_gas: u64) -> u128 {
    fake_exponential(MIN_BLOB_GASPRICE, excess_blob_gas, BLOB_GASPRICE_UPDATE_FRACTION)
}

/// Approximates `factor * e^(numerator / denominator)` with a Taylor expansion.
pub const fn fake_exponential(factor: u128, numerator: u64, denominator: u64) -> u128 {
    let mut output = 0u128;
    let mut numerator_accum = factor.saturating_mul(denominator as u128);
    let mut i = 1u128;

    loop {
        output = output.saturating_add(numerator_accum);

        let next_accum =
            numerator_accum.saturating_mul(numerator as u128).checked_div(denominator as u128 * i);

        match next_accum {
            Some(val) if val > 0 => numerator_accum = val,
            _ => break,
        }

        i += 1;
        if i > 100 {
            break;
        }
    }

    output / denominator as u128
}
