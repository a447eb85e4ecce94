//! Collaborators the driver talks to.

use alloy::primitives::Bytes;
use async_trait::async_trait;

use crate::{
    block::{L2Block, SyncStatus},
    error::BatcherError,
};

/// Fetches L2 blocks from the sequencer's execution client.
#[async_trait]
pub trait L2Client: Send + Sync {
    /// The block at `number`, with full transactions and its L1 origin.
    async fn block_by_number(&self, number: u64) -> Result<L2Block, BatcherError>;
}

/// Reads the rollup node's sync status.
#[async_trait]
pub trait RollupClient: Send + Sync {
    /// The current sync status.
    async fn sync_status(&self) -> Result<SyncStatus, BatcherError>;
}

/// A block builder that accepts DA size limits.
#[async_trait]
pub trait ThrottleEndpoint: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> String;

    /// Sets the max DA size of transactions and blocks, zero meaning no
    /// limit.
    ///
    /// Returns `false` if the builder did not apply the limits.
    async fn set_max_da_size(&self, max_tx_size: u64, max_block_size: u64)
    -> Result<bool, BatcherError>;
}

/// An alt-DA server storing channel data off L1.
#[async_trait]
pub trait AltDaClient: Send + Sync {
    /// Stores `data` and returns the commitment to post on L1.
    async fn set_input(&self, data: Bytes) -> Result<Bytes, BatcherError>;
}
