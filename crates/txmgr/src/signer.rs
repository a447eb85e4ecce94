//! Transaction signing.

use std::fmt;

use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, B256, Bytes},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use crate::error::TxError;

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    /// Transaction hash.
    pub hash: B256,
    /// Network encoding, including the blob sidecar for blob transactions.
    pub raw: Bytes,
}

/// Signs fully populated transaction requests for a single sender.
#[async_trait]
pub trait TxSigner: Send + Sync + 'static {
    /// The sender address.
    fn address(&self) -> Address;

    /// Signs a request that already carries nonce, gas and fee fields.
    async fn sign(&self, request: TransactionRequest) -> Result<SignedTx, TxError>;
}

/// Local private key signer.
pub struct WalletSigner {
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
}

impl WalletSigner {
    /// Creates a signer for `chain_id`.
    pub fn new(signer: PrivateKeySigner, chain_id: u64) -> Self {
        let address = signer.address();
        Self { wallet: EthereumWallet::from(signer), address, chain_id }
    }
}

impl fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSigner")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TxSigner for WalletSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, request: TransactionRequest) -> Result<SignedTx, TxError> {
        let envelope = request
            .with_from(self.address)
            .with_chain_id(self.chain_id)
            .build(&self.wallet)
            .await
            .map_err(|e| TxError::Signing(e.to_string()))?;
        Ok(SignedTx { hash: *envelope.tx_hash(), raw: envelope.encoded_2718().into() })
    }
}
