//! JSON-RPC adapters for the rollup node, the L2 execution client and the
//! block builders.

use std::fmt;

use alloy::{
    consensus::Transaction as _,
    eips::{
        BlockNumberOrTag,
        eip2718::{Decodable2718, Encodable2718},
    },
    primitives::{B256, Bytes, U64},
    providers::Provider,
};
use async_trait::async_trait;
use op_alloy::{consensus::OpTxEnvelope, network::Optimism};
use sluice_batcher::{
    BatcherError, L2Block, L2Client, RollupClient, SyncStatus, ThrottleEndpoint,
};

use crate::l1_info::L1Info;

fn rpc_err(context: &str, err: impl fmt::Display) -> BatcherError {
    BatcherError::Rpc(format!("{context}: {err}"))
}

/// Reads `optimism_syncStatus` from the rollup node.
pub(crate) struct RpcRollupClient<P> {
    provider: P,
}

impl<P> RpcRollupClient<P> {
    pub(crate) const fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P> fmt::Debug for RpcRollupClient<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcRollupClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl<P> RollupClient for RpcRollupClient<P>
where
    P: Provider + Send + Sync + 'static,
{
    async fn sync_status(&self) -> Result<SyncStatus, BatcherError> {
        self.provider
            .raw_request::<(), SyncStatus>("optimism_syncStatus".into(), ())
            .await
            .map_err(|e| rpc_err("Failed to fetch sync status", e))
    }
}

/// Fetches full L2 blocks from the sequencer's execution client.
pub(crate) struct RpcL2Client<P> {
    provider: P,
}

impl<P> RpcL2Client<P> {
    pub(crate) const fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P> fmt::Debug for RpcL2Client<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcL2Client").finish_non_exhaustive()
    }
}

#[async_trait]
impl<P> L2Client for RpcL2Client<P>
where
    P: Provider<Optimism> + Send + Sync + 'static,
{
    async fn block_by_number(&self, number: u64) -> Result<L2Block, BatcherError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full()
            .await
            .map_err(|e| rpc_err(&format!("Failed to fetch L2 block {number}"), e))?
            .ok_or_else(|| BatcherError::Rpc(format!("L2 block {number} not found")))?;

        let transactions =
            block.transactions.txns().map(|tx| tx.inner.inner.inner().encoded_2718().into()).collect();
        let header = BlockHeader {
            hash: block.header.hash,
            number: block.header.number,
            parent_hash: block.header.parent_hash,
            timestamp: block.header.timestamp,
        };
        header.into_l2_block(transactions).map_err(BatcherError::Rpc)
    }
}

/// Header fields kept by the batcher.
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    hash: B256,
    number: u64,
    parent_hash: B256,
    timestamp: u64,
}

impl BlockHeader {
    /// Attaches the EIP-2718 encoded transactions, reading the L1 origin from
    /// the leading L1 info deposit.
    fn into_l2_block(self, transactions: Vec<Bytes>) -> Result<L2Block, String> {
        let first = transactions
            .first()
            .ok_or_else(|| format!("L2 block {} has no transactions", self.number))?;
        let envelope = OpTxEnvelope::decode_2718(&mut first.as_ref())
            .map_err(|e| format!("L2 block {}: undecodable first transaction: {e}", self.number))?;
        if !envelope.is_deposit() {
            return Err(format!("L2 block {}: first transaction is not a deposit", self.number));
        }
        let info = L1Info::decode(envelope.input())
            .map_err(|e| format!("L2 block {}: {e}", self.number))?;

        Ok(L2Block {
            hash: self.hash,
            number: self.number,
            parent_hash: self.parent_hash,
            timestamp: self.timestamp,
            l1_origin: info.origin,
            sequence_number: info.sequence_number,
            transactions,
        })
    }
}

/// Sets DA size limits through `miner_setMaxDASize`.
pub(crate) struct RpcThrottleEndpoint<P> {
    url: String,
    provider: P,
}

impl<P> RpcThrottleEndpoint<P> {
    pub(crate) const fn new(url: String, provider: P) -> Self {
        Self { url, provider }
    }
}

impl<P> fmt::Debug for RpcThrottleEndpoint<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcThrottleEndpoint").field("url", &self.url).finish_non_exhaustive()
    }
}

#[async_trait]
impl<P> ThrottleEndpoint for RpcThrottleEndpoint<P>
where
    P: Provider + Send + Sync + 'static,
{
    fn name(&self) -> String {
        self.url.clone()
    }

    async fn set_max_da_size(
        &self,
        max_tx_size: u64,
        max_block_size: u64,
    ) -> Result<bool, BatcherError> {
        self.provider
            .raw_request::<_, bool>(
                "miner_setMaxDASize".into(),
                (U64::from(max_tx_size), U64::from(max_block_size)),
            )
            .await
            .map_err(|e| rpc_err(&format!("Failed to set max DA size on {}", self.url), e))
    }
}
