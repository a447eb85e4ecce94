//! Block references, sync status and L2 blocks.

use alloy::primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};

/// First byte of an EIP-2718 encoded deposit transaction.
pub const DEPOSIT_TX_TYPE: u8 = 0x7e;

/// A block number and hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    /// Block hash.
    pub hash: B256,
    /// Block number.
    pub number: u64,
}

impl BlockId {
    /// Creates a block id.
    pub const fn new(hash: B256, number: u64) -> Self {
        Self { hash, number }
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hash, self.number)
    }
}

/// Reference to an L1 block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1BlockRef {
    /// Block hash.
    pub hash: B256,
    /// Block number.
    pub number: u64,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block timestamp.
    pub timestamp: u64,
}

impl L1BlockRef {
    /// The block's id.
    pub const fn id(&self) -> BlockId {
        BlockId { hash: self.hash, number: self.number }
    }

    /// Returns `true` if every field is zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Reference to an L2 block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2BlockRef {
    /// Block hash.
    pub hash: B256,
    /// Block number.
    pub number: u64,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block timestamp.
    pub timestamp: u64,
    /// L1 origin of the block.
    #[serde(rename = "l1origin")]
    pub l1_origin: BlockId,
    /// Position of the block within its epoch.
    pub sequence_number: u64,
}

impl L2BlockRef {
    /// The block's id.
    pub const fn id(&self) -> BlockId {
        BlockId { hash: self.hash, number: self.number }
    }

    /// Returns `true` if every field is zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// The rollup node's view of the L1 and L2 chains, as returned by
/// `optimism_syncStatus`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncStatus {
    /// L1 block the derivation pipeline is currently processing.
    pub current_l1: L1BlockRef,
    /// Latest L1 block.
    pub head_l1: L1BlockRef,
    /// Latest safe L1 block.
    pub safe_l1: L1BlockRef,
    /// Latest finalized L1 block.
    pub finalized_l1: L1BlockRef,
    /// Latest unsafe L2 block.
    pub unsafe_l2: L2BlockRef,
    /// Latest cross-safe L2 block.
    pub safe_l2: L2BlockRef,
    /// Latest L2 block derived from L1 by this node alone.
    pub local_safe_l2: L2BlockRef,
    /// Latest finalized L2 block.
    pub finalized_l2: L2BlockRef,
}

/// An L2 block as seen by the batcher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct L2Block {
    /// Block hash.
    pub hash: B256,
    /// Block number.
    pub number: u64,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block timestamp.
    pub timestamp: u64,
    /// L1 origin of the block.
    pub l1_origin: BlockId,
    /// Position of the block within its epoch.
    pub sequence_number: u64,
    /// EIP-2718 encoded transactions, the L1 info deposit first.
    pub transactions: Vec<Bytes>,
}

impl L2Block {
    /// The block's id.
    pub const fn id(&self) -> BlockId {
        BlockId { hash: self.hash, number: self.number }
    }

    /// Returns `true` if `tx` is a deposit transaction.
    pub fn is_deposit(tx: &[u8]) -> bool {
        tx.first() == Some(&DEPOSIT_TX_TYPE)
    }

    /// Transactions that originate on L2.
    pub fn non_deposit_transactions(&self) -> impl Iterator<Item = &Bytes> {
        self.transactions.iter().filter(|tx| !Self::is_deposit(tx))
    }
}
