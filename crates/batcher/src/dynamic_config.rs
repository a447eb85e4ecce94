//! Blob or calldata, whichever is cheaper per byte.

use std::sync::{Mutex, MutexGuard, PoisonError};

use sluice_pipeline::constants::{BLOB_GAS_PER_BLOB, MAX_BLOB_DATA_SIZE, TX_GAS};
use sluice_txmgr::GasPriceCaps;
use tracing::{info, warn};

use crate::channel_config::{ChannelConfig, ChannelConfigProvider};

/// Calldata tokens per byte, counting every byte as non-zero.
const TOKENS_PER_NON_ZERO_BYTE: u64 = 4;

/// Gas per calldata token before Pectra.
const STANDARD_TOKEN_COST: u64 = 4;

/// Gas per calldata token under the EIP-7623 floor.
const TOTAL_COST_FLOOR_PER_TOKEN: u64 = 10;

#[derive(Debug)]
struct State {
    caps: Option<GasPriceCaps>,
    last_config: ChannelConfig,
}

/// Chooses between a calldata and a blob [`ChannelConfig`] by comparing the
/// cost per byte of a full transaction of each kind under the latest fees.
#[derive(Debug)]
pub struct DynamicEthChannelConfig {
    calldata_config: ChannelConfig,
    blob_config: ChannelConfig,
    state: Mutex<State>,
}

impl DynamicEthChannelConfig {
    /// Creates an oracle that starts with the blob config.
    pub const fn new(calldata_config: ChannelConfig, blob_config: ChannelConfig) -> Self {
        Self {
            calldata_config,
            blob_config,
            state: Mutex::new(State { caps: None, last_config: blob_config }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The config chosen by the last assessment.
    pub fn last_config(&self) -> ChannelConfig {
        self.state().last_config
    }

    fn choose(&self, caps: &GasPriceCaps, is_pectra: bool) -> ChannelConfig {
        let calldata_bytes = self.calldata_config.max_frame_size as u128 + 1;
        let tokens = calldata_bytes as u64 * TOKENS_PER_NON_ZERO_BYTE;
        let num_blobs = self.blob_config.target_num_frames as u64;

        let calldata_cost = single_calldata_tx_cost(tokens, caps, is_pectra);
        let blob_cost = single_blob_tx_cost(num_blobs, caps);
        let blob_bytes = MAX_BLOB_DATA_SIZE as u128 * num_blobs as u128;

        // blob_cost / blob_bytes > calldata_cost / calldata_bytes
        let blob_weighted = blob_cost.saturating_mul(calldata_bytes);
        let calldata_weighted = calldata_cost.saturating_mul(blob_bytes);
        let cost_ratio = if calldata_cost == 0 {
            0.0
        } else {
            blob_weighted as f64 / calldata_weighted as f64
        };

        if blob_weighted > calldata_weighted {
            info!(
                calldata_cost = %calldata_cost,
                blob_cost = %blob_cost,
                cost_ratio,
                is_pectra,
                "Using calldata channel config"
            );
            self.calldata_config
        } else {
            info!(
                calldata_cost = %calldata_cost,
                blob_cost = %blob_cost,
                cost_ratio,
                is_pectra,
                "Using blob channel config"
            );
            self.blob_config
        }
    }
}

impl ChannelConfigProvider for DynamicEthChannelConfig {
    fn channel_config(&self, is_pectra: bool, is_throttling: bool) -> ChannelConfig {
        let mut state = self.state();
        if is_throttling {
            info!("Using blob channel config while throttling");
            state.last_config = self.blob_config;
            return self.blob_config;
        }
        let Some(caps) = state.caps else {
            warn!("No gas prices recorded, returning last config");
            return state.last_config;
        };
        let config = self.choose(&caps, is_pectra);
        state.last_config = config;
        config
    }

    fn record_gas_price_caps(&self, caps: GasPriceCaps) {
        self.state().caps = Some(caps);
    }
}

/// Cost of one calldata transaction carrying `tokens` calldata tokens.
pub const fn single_calldata_tx_cost(tokens: u64, caps: &GasPriceCaps, is_pectra: bool) -> u128 {
    let per_token = if is_pectra { TOTAL_COST_FLOOR_PER_TOKEN } else { STANDARD_TOKEN_COST };
    let gas = TX_GAS + tokens * per_token;
    gas as u128 * (caps.base_fee + caps.tip_cap)
}

/// Cost of one blob transaction carrying `num_blobs` blobs.
pub const fn single_blob_tx_cost(num_blobs: u64, caps: &GasPriceCaps) -> u128 {
    let exec_cost = TX_GAS as u128 * (caps.base_fee + caps.tip_cap);
    let blob_base_fee = match caps.blob_base_fee {
        Some(fee) => fee,
        None => 0,
    };
    let blob_cost = (BLOB_GAS_PER_BLOB * num_blobs) as u128 * blob_base_fee;
    exec_cost + blob_cost
}
