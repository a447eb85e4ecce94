//! Transaction candidates and receipts.

use alloy::{
    consensus::BlobTransactionSidecar,
    primitives::{Address, B256, Bytes, U256},
};

/// A transaction the caller wants included; fees and nonce are filled in by
/// the manager.
#[derive(Clone, Debug)]
pub struct TxCandidate {
    /// Recipient address (batch inbox).
    pub to: Address,
    /// Transaction value.
    pub value: U256,
    /// Calldata payload.
    pub data: Bytes,
    /// Blob sidecar, present for blob transactions.
    pub blob_sidecar: Option<BlobTransactionSidecar>,
    /// Fixed gas limit; estimated when `None`.
    pub gas_limit: Option<u64>,
}

impl TxCandidate {
    /// Creates a calldata candidate with zero value.
    pub fn calldata(to: Address, data: impl Into<Bytes>) -> Self {
        Self { to, value: U256::ZERO, data: data.into(), blob_sidecar: None, gas_limit: None }
    }

    /// Creates a blob candidate with zero value and empty calldata.
    pub const fn blob(to: Address, sidecar: BlobTransactionSidecar) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: Bytes::new(),
            blob_sidecar: Some(sidecar),
            gas_limit: None,
        }
    }

    /// Returns `true` if this is a blob transaction.
    #[must_use]
    pub const fn is_blob(&self) -> bool {
        self.blob_sidecar.is_some()
    }

    /// Number of blobs carried.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blob_sidecar.as_ref().map_or(0, |sidecar| sidecar.blobs.len())
    }

    /// Sets the transaction value.
    #[must_use]
    pub const fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Sets a fixed gas limit.
    #[must_use]
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Receipt of an included transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Whether execution succeeded.
    pub status: bool,
    /// Inclusion block number.
    pub block_number: u64,
    /// Inclusion block hash.
    pub block_hash: B256,
    /// Gas used by the transaction.
    pub gas_used: u64,
    /// Effective gas price paid.
    pub effective_gas_price: u128,
    /// Blob gas used (for EIP-4844).
    pub blob_gas_used: Option<u64>,
    /// Blob gas price (for EIP-4844).
    pub blob_gas_price: Option<u128>,
}

impl TxReceipt {
    /// Total fee paid in wei, execution plus blob gas.
    #[must_use]
    pub const fn total_cost(&self) -> u128 {
        let base_cost = self.gas_used as u128 * self.effective_gas_price;
        let blob_cost = match (self.blob_gas_used, self.blob_gas_price) {
            (Some(blob_gas_used), Some(blob_gas_price)) => blob_gas_used as u128 * blob_gas_price,
            _ => 0,
        };
        base_cost + blob_cost
    }
}
