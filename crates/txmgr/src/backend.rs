//! The L1 node seam used by the transaction manager.

use std::{fmt, sync::Arc};

use alloy::{
    primitives::{Address, B256},
    providers::Provider,
    rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest},
};
use async_trait::async_trait;

use crate::{
    candidate::TxReceipt,
    error::{SendError, TxError},
    signer::SignedTx,
};

/// The fields of an L1 header the manager and batcher care about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Base fee per gas, absent before London.
    pub base_fee: Option<u64>,
    /// Excess blob gas, absent before Cancun.
    pub excess_blob_gas: Option<u64>,
    /// Whether the header carries a requests hash (Prague and later).
    pub has_requests_hash: bool,
}

/// Read and write access to an L1 execution node.
#[async_trait]
pub trait EthBackend: Send + Sync + 'static {
    /// Latest block number.
    async fn block_number(&self) -> Result<u64, TxError>;

    /// Header of the latest block.
    async fn latest_header(&self) -> Result<HeaderInfo, TxError>;

    /// Suggested priority fee.
    async fn suggest_gas_tip_cap(&self) -> Result<u128, TxError>;

    /// Account nonce at the latest block.
    async fn nonce_at(&self, address: Address) -> Result<u64, TxError>;

    /// Gas estimate for a request.
    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, TxError>;

    /// Publishes a signed transaction.
    async fn send_transaction(&self, tx: &SignedTx) -> Result<(), SendError>;

    /// Receipt of a transaction, `None` if it is not included.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, TxError>;
}

/// [`EthBackend`] over an alloy [`Provider`].
pub struct ProviderBackend<P> {
    provider: Arc<P>,
}

impl<P> ProviderBackend<P> {
    /// Wraps a provider.
    pub const fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl<P> fmt::Debug for ProviderBackend<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBackend").finish_non_exhaustive()
    }
}

fn rpc_err(context: &str, err: impl fmt::Display) -> TxError {
    TxError::Rpc(format!("{context}: {err}"))
}

fn convert_receipt(receipt: TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        status: receipt.status(),
        block_number: receipt.block_number.unwrap_or_default(),
        block_hash: receipt.block_hash.unwrap_or_default(),
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        blob_gas_used: receipt.blob_gas_used,
        blob_gas_price: receipt.blob_gas_price,
    }
}

#[async_trait]
impl<P> EthBackend for ProviderBackend<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn block_number(&self) -> Result<u64, TxError> {
        self.provider.get_block_number().await.map_err(|e| rpc_err("Failed to get block number", e))
    }

    async fn latest_header(&self) -> Result<HeaderInfo, TxError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| rpc_err("Failed to fetch latest block", e))?
            .ok_or_else(|| TxError::Rpc("Latest block not found".to_string()))?;
        let header = block.header;
        Ok(HeaderInfo {
            number: header.number,
            hash: header.hash,
            base_fee: header.base_fee_per_gas,
            excess_blob_gas: header.excess_blob_gas,
            has_requests_hash: header.requests_hash.is_some(),
        })
    }

    async fn suggest_gas_tip_cap(&self) -> Result<u128, TxError> {
        self.provider
            .get_max_priority_fee_per_gas()
            .await
            .map_err(|e| rpc_err("Failed to get gas tip cap", e))
    }

    async fn nonce_at(&self, address: Address) -> Result<u64, TxError> {
        self.provider
            .get_transaction_count(address)
            .latest()
            .await
            .map_err(|e| rpc_err("Failed to fetch nonce", e))
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, TxError> {
        self.provider.estimate_gas(request).await.map_err(|e| TxError::GasEstimation(e.to_string()))
    }

    async fn send_transaction(&self, tx: &SignedTx) -> Result<(), SendError> {
        self.provider
            .send_raw_transaction(&tx.raw)
            .await
            .map(|_| ())
            .map_err(|e| SendError::from_message(e.to_string()))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, TxError> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map(|receipt| receipt.map(convert_receipt))
            .map_err(|e| rpc_err("Failed to get receipt", e))
    }
}
