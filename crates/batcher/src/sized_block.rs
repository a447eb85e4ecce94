//! L2 blocks with memoized size estimates.

use std::ops::Deref;

use op_revm::transaction::estimate_tx_compressed_size;

use crate::block::L2Block;

/// Fixed per-block cost added to both size estimates.
pub const BLOCK_OVERHEAD: u64 = 70;

/// Scale of the value returned by the FastLZ estimator.
const ESTIMATE_SCALE: u64 = 1_000_000;

/// An [`L2Block`] together with its raw and estimated DA size.
///
/// Both sizes are computed once at construction. Deposit transactions are
/// excluded because they are not posted to L1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizedBlock {
    block: L2Block,
    raw_size: u64,
    estimated_da_bytes: u64,
}

impl SizedBlock {
    /// Wraps `block` and computes its sizes.
    pub fn new(block: L2Block) -> Self {
        let mut raw_size = BLOCK_OVERHEAD;
        let mut estimated_da_bytes = BLOCK_OVERHEAD;
        for tx in block.non_deposit_transactions() {
            raw_size += tx.len() as u64;
            estimated_da_bytes += estimate_tx_compressed_size(tx) / ESTIMATE_SCALE;
        }
        Self { block, raw_size, estimated_da_bytes }
    }

    /// The wrapped block.
    pub const fn block(&self) -> &L2Block {
        &self.block
    }

    /// Encoded size of the block's L2 transactions plus a fixed overhead.
    pub const fn raw_size(&self) -> u64 {
        self.raw_size
    }

    /// Estimated compressed size of the block on L1.
    pub const fn estimated_da_bytes(&self) -> u64 {
        self.estimated_da_bytes
    }

    /// Unwraps the block.
    pub fn into_block(self) -> L2Block {
        self.block
    }
}

impl Deref for SizedBlock {
    type Target = L2Block;

    fn deref(&self) -> &Self::Target {
        &self.block
    }
}

impl From<L2Block> for SizedBlock {
    fn from(block: L2Block) -> Self {
        Self::new(block)
    }
}
