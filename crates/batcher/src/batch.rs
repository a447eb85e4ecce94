//! Singular batch encoding.

use alloy::primitives::{B256, Bytes};
use alloy_rlp::{Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use sluice_pipeline::constants::SINGULAR_BATCH_TYPE;

use crate::block::L2Block;

/// The L2 transactions of one block plus its epoch, as posted to L1.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct SingularBatch {
    /// Hash of the parent L2 block.
    pub parent_hash: B256,
    /// L1 origin number.
    pub epoch_num: u64,
    /// L1 origin hash.
    pub epoch_hash: B256,
    /// L2 block timestamp.
    pub timestamp: u64,
    /// Non-deposit transactions.
    pub transactions: Vec<Bytes>,
}

impl SingularBatch {
    /// Builds the batch for `block`, dropping deposits.
    pub fn from_block(block: &L2Block) -> Self {
        Self {
            parent_hash: block.parent_hash,
            epoch_num: block.l1_origin.number,
            epoch_hash: block.l1_origin.hash,
            timestamp: block.timestamp,
            transactions: block.non_deposit_transactions().cloned().collect(),
        }
    }

    /// Encodes the batch as typed batch data wrapped in an RLP string, the
    /// form in which batches enter a channel.
    pub fn encode_envelope(&self) -> Vec<u8> {
        let mut typed = Vec::with_capacity(1 + self.length());
        typed.push(SINGULAR_BATCH_TYPE);
        self.encode(&mut typed);

        let mut out = Vec::with_capacity(typed.len() + 9);
        typed.as_slice().encode(&mut out);
        out
    }

    /// Decodes one envelope from the front of `buf`, advancing it.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed RLP or an unknown batch type.
    pub fn decode_envelope(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let mut typed = Header::decode_bytes(buf, false)?;
        match typed.split_first() {
            Some((&SINGULAR_BATCH_TYPE, rest)) => {
                typed = rest;
                Self::decode(&mut typed)
            }
            Some(_) => Err(alloy_rlp::Error::Custom("unknown batch type")),
            None => Err(alloy_rlp::Error::InputTooShort),
        }
    }
}
