//! Building transaction candidates from channel data.

use alloy::{
    consensus::BlobTransactionSidecar,
    eips::eip4844::builder::{SidecarBuilder, SimpleCoder},
    primitives::{Address, Bytes},
};
use sluice_pipeline::constants::{MAX_BLOB_DATA_SIZE, TX_GAS};
use sluice_txmgr::TxCandidate;

use crate::{error::BatcherError, tx_data::TxData};

/// EIP-7623 floor cost per calldata token.
pub const TX_COST_FLOOR_PER_TOKEN: u64 = 10;

/// EIP-7623 minimum gas of a transaction carrying `data`.
///
/// Zero bytes count as one token, non-zero bytes as four.
pub fn floor_data_gas(data: &[u8]) -> u64 {
    let zeros = data.iter().filter(|byte| **byte == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;
    let tokens = zeros + non_zeros * 4;
    TX_GAS + tokens * TX_COST_FLOOR_PER_TOKEN
}

/// Builds a sidecar with one blob per payload.
///
/// # Errors
///
/// Returns [`BatcherError::Blob`] if a payload does not fit one blob or the
/// KZG computation fails.
pub fn blob_sidecar(payloads: &[Bytes]) -> Result<BlobTransactionSidecar, BatcherError> {
    let mut sidecar = BlobTransactionSidecar::default();
    for payload in payloads {
        if payload.len() > MAX_BLOB_DATA_SIZE {
            return Err(BatcherError::Blob(format!(
                "payload of {} bytes exceeds blob capacity {MAX_BLOB_DATA_SIZE}",
                payload.len()
            )));
        }
        let single = SidecarBuilder::<SimpleCoder>::from_slice(payload)
            .build()
            .map_err(|e| BatcherError::Blob(format!("failed to build blob sidecar: {e}")))?;
        if single.blobs.len() != 1 {
            return Err(BatcherError::Blob(format!(
                "payload encoded into {} blobs",
                single.blobs.len()
            )));
        }
        sidecar.blobs.extend(single.blobs);
        sidecar.commitments.extend(single.commitments);
        sidecar.proofs.extend(single.proofs);
    }
    Ok(sidecar)
}

/// Calldata candidate for `tx_data`.
pub fn calldata_candidate(batch_inbox: Address, tx_data: &TxData) -> TxCandidate {
    TxCandidate::calldata(batch_inbox, tx_data.call_data())
}

/// Blob candidate for `tx_data`. Builds the sidecar on the blocking pool.
///
/// # Errors
///
/// Returns [`BatcherError::Blob`] if the sidecar cannot be built.
pub async fn blob_candidate(
    batch_inbox: Address,
    tx_data: &TxData,
) -> Result<TxCandidate, BatcherError> {
    let payloads = tx_data.blobs();
    let sidecar = tokio::task::spawn_blocking(move || blob_sidecar(&payloads))
        .await
        .map_err(|e| BatcherError::Blob(format!("sidecar task failed: {e}")))??;
    Ok(TxCandidate::blob(batch_inbox, sidecar))
}
