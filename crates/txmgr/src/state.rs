//! Per-send state machine.

use std::{collections::HashSet, time::Duration};

use alloy::primitives::B256;
use tokio::time::Instant;

use crate::error::{SendErrorKind, TxError};

/// Tracks the outcome of every publish attempt for a single logical send.
///
/// One send may put several replacement transactions on the wire; all of
/// them share the same nonce and are tracked here together.
#[derive(Debug)]
pub struct SendState {
    /// Transaction hashes that have been mined (may reorg).
    mined_txs: HashSet<B256>,
    /// Number of successful publishes to mempool.
    successful_publish_count: u64,
    /// Count of "nonce too low" errors.
    nonce_too_low_count: u64,
    /// Abort once `nonce_too_low_count` reaches this.
    safe_abort_nonce_too_low_count: u64,
    /// Another transaction type holds this account's pool slot.
    already_reserved: bool,
    /// Abort if nothing has reached the mempool by then.
    mempool_deadline: Instant,
    /// Total number of fee bumps performed.
    bump_count: u64,
}

impl SendState {
    /// Creates a new send state.
    #[must_use]
    pub fn new(safe_abort_nonce_too_low_count: u64, not_in_mempool_timeout: Duration) -> Self {
        Self {
            mined_txs: HashSet::new(),
            successful_publish_count: 0,
            nonce_too_low_count: 0,
            safe_abort_nonce_too_low_count,
            already_reserved: false,
            mempool_deadline: Instant::now() + not_in_mempool_timeout,
            bump_count: 0,
        }
    }

    /// Records the outcome of one `send_transaction` call.
    pub const fn process_send_error(&mut self, kind: Option<SendErrorKind>) {
        match kind {
            None => self.successful_publish_count += 1,
            Some(SendErrorKind::NonceTooLow) => self.nonce_too_low_count += 1,
            Some(SendErrorKind::AlreadyReserved) => self.already_reserved = true,
            Some(_) => {}
        }
    }

    /// Records that a transaction hash has been mined.
    pub fn tx_mined(&mut self, hash: B256) {
        self.mined_txs.insert(hash);
    }

    /// Records that a transaction hash was not mined or has been reorged.
    ///
    /// If no transactions remain mined, resets the nonce too low count.
    pub fn tx_not_mined(&mut self, hash: &B256) {
        self.mined_txs.remove(hash);
        if self.mined_txs.is_empty() {
            self.nonce_too_low_count = 0;
        }
    }

    /// Records a fee bump.
    pub const fn bumped(&mut self) {
        self.bump_count += 1;
    }

    /// Returns the total number of fee bumps performed.
    #[must_use]
    pub const fn bump_count(&self) -> u64 {
        self.bump_count
    }

    /// Returns `true` while some attempt is included and waiting for depth.
    #[must_use]
    pub fn is_waiting_for_confirmation(&self) -> bool {
        !self.mined_txs.is_empty()
    }

    /// Returns `true` if the send can no longer succeed.
    ///
    /// Never true while an attempt is mined.
    #[must_use]
    pub fn should_abort_immediately(&self) -> bool {
        self.critical_error().is_some()
    }

    /// The reason to abort, if any.
    #[must_use]
    pub fn critical_error(&self) -> Option<TxError> {
        if !self.mined_txs.is_empty() {
            return None;
        }
        if self.already_reserved {
            return Some(TxError::AlreadyReserved);
        }
        if self.nonce_too_low_count >= self.safe_abort_nonce_too_low_count {
            return Some(TxError::NonceTooLowAbort);
        }
        if self.successful_publish_count == 0 && Instant::now() > self.mempool_deadline {
            return Some(TxError::NotInMempool);
        }
        None
    }
}
