//! In-memory backend and signer for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy::{
    primitives::{Address, B256, Bytes, keccak256},
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;

use crate::{
    backend::{EthBackend, HeaderInfo},
    candidate::TxReceipt,
    config::GWEI,
    error::{SendError, SendErrorKind, TxError},
    signer::{SignedTx, TxSigner},
};

const RAW_LEN: usize = 8 + 16 + 16 + 16 + 8 + 1;

/// A transaction accepted by [`MockBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTx {
    /// Transaction hash.
    pub hash: B256,
    /// Nonce.
    pub nonce: u64,
    /// Tip cap.
    pub tip_cap: u128,
    /// Fee cap.
    pub fee_cap: u128,
    /// Blob fee cap, zero for calldata transactions.
    pub blob_fee_cap: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Whether this was a blob transaction.
    pub is_blob: bool,
}

impl SentTx {
    fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() != RAW_LEN {
            return None;
        }
        let u64_at = |at: usize| u64::from_be_bytes(raw[at..at + 8].try_into().unwrap_or_default());
        let u128_at =
            |at: usize| u128::from_be_bytes(raw[at..at + 16].try_into().unwrap_or_default());
        Some(Self {
            hash: keccak256(raw),
            nonce: u64_at(0),
            tip_cap: u128_at(8),
            fee_cap: u128_at(24),
            blob_fee_cap: u128_at(40),
            gas_limit: u64_at(56),
            is_blob: raw[64] == 1,
        })
    }
}

#[derive(Debug)]
struct MockState {
    block_number: u64,
    base_fee: u64,
    tip_cap: u128,
    excess_blob_gas: Option<u64>,
    chain_nonce: u64,
    nonce_fetches: usize,
    gas_estimate: u64,
    estimate_failures: usize,
    send_errors: VecDeque<SendError>,
    sent: Vec<SentTx>,
    receipts: HashMap<B256, TxReceipt>,
    auto_mine: bool,
    fail_receipts: bool,
}

/// Deterministic in-memory L1.
///
/// Accepted transactions are recorded in order. With auto-mining enabled
/// accepted transactions are included at the current head as soon as their
/// nonce is next in line.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates a backend at block 100 with 1 gwei base fee and tip.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                block_number: 100,
                base_fee: GWEI as u64,
                tip_cap: GWEI,
                excess_blob_gas: None,
                chain_nonce: 0,
                nonce_fetches: 0,
                gas_estimate: 50_000,
                estimate_failures: 0,
                send_errors: VecDeque::new(),
                sent: Vec::new(),
                receipts: HashMap::new(),
                auto_mine: false,
                fail_receipts: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mine(state: &mut MockState, tx: &SentTx) {
        let receipt = TxReceipt {
            tx_hash: tx.hash,
            status: !state.fail_receipts,
            block_number: state.block_number,
            block_hash: B256::from(alloy::primitives::U256::from(state.block_number)),
            gas_used: tx.gas_limit,
            effective_gas_price: tx.fee_cap,
            blob_gas_used: tx.is_blob.then_some(131_072),
            blob_gas_price: tx.is_blob.then_some(1),
        };
        state.receipts.insert(tx.hash, receipt);
        state.chain_nonce = state.chain_nonce.max(tx.nonce + 1);
    }

    /// Sets the account nonce reported by `nonce_at`.
    pub fn set_chain_nonce(&self, nonce: u64) {
        self.state().chain_nonce = nonce;
    }

    /// Number of `nonce_at` calls.
    pub fn nonce_fetches(&self) -> usize {
        self.state().nonce_fetches
    }

    /// Includes every accepted transaction immediately.
    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.state().auto_mine = auto_mine;
    }

    /// Makes future receipts report failed execution.
    pub fn set_fail_receipts(&self, fail: bool) {
        self.state().fail_receipts = fail;
    }

    /// Sets the suggested priority fee.
    pub fn set_tip_cap(&self, tip_cap: u128) {
        self.state().tip_cap = tip_cap;
    }

    /// Sets the head base fee.
    pub fn set_base_fee(&self, base_fee: u64) {
        self.state().base_fee = base_fee;
    }

    /// Sets the head excess blob gas; `None` disables blob pricing.
    pub fn set_excess_blob_gas(&self, excess: Option<u64>) {
        self.state().excess_blob_gas = excess;
    }

    /// Fails the next `count` gas estimations.
    pub fn fail_next_estimates(&self, count: usize) {
        self.state().estimate_failures = count;
    }

    /// Rejects the next `send_transaction` call with `err`.
    pub fn push_send_error(&self, err: SendError) {
        self.state().send_errors.push_back(err);
    }

    /// Advances the head.
    pub fn advance_blocks(&self, blocks: u64) {
        self.state().block_number += blocks;
    }

    /// The current head number.
    pub fn block_number_now(&self) -> u64 {
        self.state().block_number
    }

    /// Includes accepted transactions in nonce order, starting at the account
    /// nonce, using the latest attempt for each nonce.
    pub fn mine_pending(&self) {
        Self::mine_ready(&mut self.state());
    }

    fn mine_ready(state: &mut MockState) {
        while let Some(tx) = state.sent.iter().rev().find(|tx| tx.nonce == state.chain_nonce).cloned()
        {
            Self::mine(state, &tx);
        }
    }

    /// All accepted transactions in acceptance order.
    pub fn sent(&self) -> Vec<SentTx> {
        self.state().sent.clone()
    }

    /// Number of accepted transactions.
    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }

    /// Nonces of accepted transactions in acceptance order.
    pub fn sent_nonces(&self) -> Vec<u64> {
        self.state().sent.iter().map(|tx| tx.nonce).collect()
    }

    /// Tip caps of accepted transactions in acceptance order.
    pub fn sent_tip_caps(&self) -> Vec<u128> {
        self.state().sent.iter().map(|tx| tx.tip_cap).collect()
    }
}

#[async_trait]
impl EthBackend for MockBackend {
    async fn block_number(&self) -> Result<u64, TxError> {
        Ok(self.state().block_number)
    }

    async fn latest_header(&self) -> Result<HeaderInfo, TxError> {
        let state = self.state();
        Ok(HeaderInfo {
            number: state.block_number,
            hash: B256::from(alloy::primitives::U256::from(state.block_number)),
            base_fee: Some(state.base_fee),
            excess_blob_gas: state.excess_blob_gas,
            has_requests_hash: false,
        })
    }

    async fn suggest_gas_tip_cap(&self) -> Result<u128, TxError> {
        Ok(self.state().tip_cap)
    }

    async fn nonce_at(&self, _address: Address) -> Result<u64, TxError> {
        let mut state = self.state();
        state.nonce_fetches += 1;
        Ok(state.chain_nonce)
    }

    async fn estimate_gas(&self, _request: TransactionRequest) -> Result<u64, TxError> {
        let mut state = self.state();
        if state.estimate_failures > 0 {
            state.estimate_failures -= 1;
            return Err(TxError::GasEstimation("execution reverted".to_string()));
        }
        Ok(state.gas_estimate)
    }

    async fn send_transaction(&self, tx: &SignedTx) -> Result<(), SendError> {
        let mut state = self.state();
        if let Some(err) = state.send_errors.pop_front() {
            return Err(err);
        }
        let sent = SentTx::decode(&tx.raw)
            .ok_or_else(|| SendError::new(SendErrorKind::Other, "invalid raw transaction"))?;
        if sent.nonce < state.chain_nonce {
            return Err(SendError::new(SendErrorKind::NonceTooLow, "nonce too low"));
        }
        if state.sent.iter().any(|known| known.hash == sent.hash) {
            return Err(SendError::new(SendErrorKind::AlreadyKnown, "already known"));
        }
        state.sent.push(sent);
        if state.auto_mine {
            Self::mine_ready(&mut state);
        }
        Ok(())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, TxError> {
        Ok(self.state().receipts.get(&hash).cloned())
    }
}

/// Signer producing a compact, decodable encoding of the signed fields.
#[derive(Debug, Clone, Copy)]
pub struct MockSigner {
    address: Address,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self { address: Address::repeat_byte(0x42) }
    }
}

#[async_trait]
impl TxSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, request: TransactionRequest) -> Result<SignedTx, TxError> {
        let mut raw = Vec::with_capacity(RAW_LEN);
        raw.extend_from_slice(&request.nonce.unwrap_or_default().to_be_bytes());
        raw.extend_from_slice(&request.max_priority_fee_per_gas.unwrap_or_default().to_be_bytes());
        raw.extend_from_slice(&request.max_fee_per_gas.unwrap_or_default().to_be_bytes());
        raw.extend_from_slice(&request.max_fee_per_blob_gas.unwrap_or_default().to_be_bytes());
        raw.extend_from_slice(&request.gas.unwrap_or_default().to_be_bytes());
        raw.push(u8::from(request.max_fee_per_blob_gas.is_some()));
        Ok(SignedTx { hash: keccak256(&raw), raw: Bytes::from(raw) })
    }
}
