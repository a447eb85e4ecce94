//! The send loop: craft, publish, bump and confirm.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use alloy::{
    network::{TransactionBuilder, TransactionBuilder4844},
    primitives::{Address, B256},
    rpc::types::TransactionRequest,
};
use tokio::{
    sync::oneshot,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::EthBackend,
    candidate::{TxCandidate, TxReceipt},
    config::TxManagerConfig,
    error::{SendErrorKind, TxError},
    gas::{
        GasCaps, GasPriceCaps, calc_blob_fee, calc_threshold_value, check_blob_fee_limits,
        check_limits, update_fees,
    },
    nonce::NonceTracker,
    signer::{SignedTx, TxSigner},
    state::SendState,
};

/// Outcome of a send, delivered once.
pub type SendResponse = Result<TxReceipt, TxError>;

/// Returns `true` once a transaction at `tx_height` has `num_confirmations`
/// blocks on top of it, counting its own block.
pub const fn is_confirmed(tx_height: u64, num_confirmations: u64, tip_height: u64) -> bool {
    tx_height + num_confirmations <= tip_height + 1
}

/// One signed version of a send, with the parameters it was signed with.
#[derive(Clone, Debug)]
struct Attempt {
    tx: SignedTx,
    nonce: u64,
    gas_limit: u64,
    caps: GasCaps,
}

/// Delivers [`TxCandidate`]s to L1 and tracks them to confirmation.
///
/// Cloning is cheap and clones share nonce state.
pub struct TxManager<B, S> {
    config: TxManagerConfig,
    backend: Arc<B>,
    signer: Arc<S>,
    nonce: Arc<NonceTracker<B>>,
    closed: Arc<AtomicBool>,
}

impl<B, S> Clone for TxManager<B, S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            backend: self.backend.clone(),
            signer: self.signer.clone(),
            nonce: self.nonce.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<B, S> TxManager<B, S> {
    /// Stops new sends and makes in-flight sends give up at their next resubmission.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<B, S: TxSigner> fmt::Debug for TxManager<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxManager")
            .field("from", &self.signer.address())
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<B: EthBackend, S: TxSigner> TxManager<B, S> {
    /// Creates a manager sending from the signer's address.
    pub fn new(config: TxManagerConfig, backend: Arc<B>, signer: Arc<S>) -> Self {
        let nonce = Arc::new(NonceTracker::new(backend.clone(), signer.address()));
        Self { config, backend, signer, nonce, closed: Arc::new(AtomicBool::new(false)) }
    }

    /// The sender address.
    pub fn from(&self) -> Address {
        self.signer.address()
    }

    /// The configuration.
    pub const fn config(&self) -> &TxManagerConfig {
        &self.config
    }

    /// The backend this manager publishes through.
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Sends a candidate and waits for its confirmed receipt.
    ///
    /// # Errors
    ///
    /// Returns the [`TxError`] that ended the send.
    pub async fn send(&self, candidate: TxCandidate, cancel: CancellationToken) -> SendResponse {
        self.send_async(candidate, cancel).await.await.unwrap_or(Err(TxError::Cancelled))
    }

    /// Assigns a nonce and signs the candidate, then continues the send in the
    /// background.
    ///
    /// When this returns, the nonce has been fixed; the receiver yields the
    /// final outcome.
    pub async fn send_async(
        &self,
        candidate: TxCandidate,
        cancel: CancellationToken,
    ) -> oneshot::Receiver<SendResponse> {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() {
            let _ = tx.send(Err(TxError::Closed));
            return rx;
        }

        let attempt = match self.craft_tx(&candidate).await {
            Ok(attempt) => attempt,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to create transaction");
                self.nonce.reset().await;
                let _ = tx.send(Err(err));
                return rx;
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            let timeout = this.config.tx_send_timeout;
            let result = if timeout.is_zero() {
                this.send_tx(candidate, attempt, cancel).await
            } else {
                tokio::time::timeout(timeout, this.send_tx(candidate, attempt, cancel))
                    .await
                    .unwrap_or(Err(TxError::Timeout))
            };
            if result.is_err() {
                this.nonce.reset().await;
            }
            let _ = tx.send(result);
        });
        rx
    }

    /// Current fee market, with configured minimums applied.
    ///
    /// # Errors
    ///
    /// Returns an RPC error or [`TxError::MissingBaseFee`].
    pub async fn suggest_gas_price_caps(&self) -> Result<GasPriceCaps, TxError> {
        let tip = self.backend.suggest_gas_tip_cap().await?;
        let head = self.backend.latest_header().await?;
        let base_fee = head.base_fee.ok_or(TxError::MissingBaseFee)? as u128;
        Ok(GasPriceCaps {
            tip_cap: tip.max(self.config.min_tip_cap()),
            base_fee: base_fee.max(self.config.min_base_fee()),
            blob_base_fee: head.excess_blob_gas.map(calc_blob_fee),
        })
    }

    fn build_request(
        &self,
        candidate: &TxCandidate,
        caps: &GasCaps,
        gas_limit: Option<u64>,
        nonce: Option<u64>,
    ) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .with_from(self.from())
            .with_to(candidate.to)
            .with_value(candidate.value)
            .with_input(candidate.data.clone())
            .with_max_fee_per_gas(caps.gas_fee_cap)
            .with_max_priority_fee_per_gas(caps.gas_tip_cap);
        if let Some(gas_limit) = gas_limit {
            request = request.with_gas_limit(gas_limit);
        }
        if let Some(nonce) = nonce {
            request = request.with_nonce(nonce);
        }
        if let Some(sidecar) = &candidate.blob_sidecar {
            request = request.with_blob_sidecar(sidecar.clone());
            if let Some(blob_fee_cap) = caps.blob_fee_cap {
                request = request.with_max_fee_per_blob_gas(blob_fee_cap);
            }
        }
        request
    }

    async fn estimate_gas(&self, candidate: &TxCandidate, caps: &GasCaps) -> Result<u64, TxError> {
        self.backend.estimate_gas(self.build_request(candidate, caps, None, None)).await
    }

    async fn sign(
        &self,
        candidate: &TxCandidate,
        caps: GasCaps,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<Attempt, TxError> {
        let request = self.build_request(candidate, &caps, Some(gas_limit), Some(nonce));
        let tx = self.signer.sign(request).await?;
        Ok(Attempt { tx, nonce, gas_limit, caps })
    }

    async fn craft_tx(&self, candidate: &TxCandidate) -> Result<Attempt, TxError> {
        let suggested = self.suggest_gas_price_caps().await?;
        let caps = GasCaps::initial(&suggested, candidate.is_blob())?;
        let gas_limit = match candidate.gas_limit {
            Some(gas_limit) => gas_limit,
            None => self.estimate_gas(candidate, &caps).await?,
        };
        self.nonce.with_next_nonce(|nonce| self.sign(candidate, caps, gas_limit, nonce)).await
    }

    async fn increase_gas_price(
        &self,
        candidate: &TxCandidate,
        attempt: &Attempt,
    ) -> Result<Attempt, TxError> {
        let suggested = self.suggest_gas_price_caps().await?;
        let is_blob = candidate.is_blob();
        let (tip, fee_cap) = update_fees(
            attempt.caps.gas_tip_cap,
            attempt.caps.gas_fee_cap,
            suggested.tip_cap,
            suggested.base_fee,
            self.config.bump_percent(is_blob),
        );
        check_limits(&self.config, &suggested, tip, fee_cap)?;

        let blob_fee_cap = if is_blob {
            let blob_base_fee = suggested.blob_base_fee.ok_or(TxError::MissingBlobBaseFee)?;
            let bumped = calc_threshold_value(
                attempt.caps.blob_fee_cap.unwrap_or_default(),
                self.config.blob_price_bump_percent,
            )
            .max(blob_base_fee);
            check_blob_fee_limits(&self.config, blob_base_fee, bumped)?;
            Some(bumped)
        } else {
            None
        };
        let caps = GasCaps { gas_tip_cap: tip, gas_fee_cap: fee_cap, blob_fee_cap };

        let gas_limit = match self.estimate_gas(candidate, &caps).await {
            Ok(gas_limit) => gas_limit,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    tip,
                    fee_cap,
                    gas_limit = attempt.gas_limit,
                    "Failed to re-estimate gas"
                );
                return Err(err);
            }
        };
        if gas_limit != attempt.gas_limit {
            tracing::info!(old = attempt.gas_limit, new = gas_limit, "Re-estimated gas differs");
        }

        self.sign(candidate, caps, gas_limit, attempt.nonce).await
    }

    /// Publishes `attempt`, bumping first if requested, and retrying right away
    /// with higher fees while the node reports the transaction underpriced.
    ///
    /// Returns the attempt now on the wire. Only fee limit violations are
    /// returned as errors; everything else is left for the next resubmission.
    async fn publish(
        &self,
        candidate: &TxCandidate,
        mut attempt: Attempt,
        mut bump: bool,
        state: &mut SendState,
        published: &mut Vec<B256>,
    ) -> Result<Attempt, TxError> {
        loop {
            let mut bump_failed = false;
            if bump {
                match self.increase_gas_price(candidate, &attempt).await {
                    Ok(bumped) => attempt = bumped,
                    Err(err) if err.is_fee_limit() => {
                        tracing::warn!(error = %err, nonce = attempt.nonce, "Fee limit reached");
                        return Err(err);
                    }
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "Unable to increase gas, will try to re-publish the tx"
                        );
                        bump_failed = true;
                    }
                }
                state.bumped();
            }

            let hash = attempt.tx.hash;
            let result = self.backend.send_transaction(&attempt.tx).await;
            state.process_send_error(result.as_ref().err().map(|err| err.kind));

            let Err(err) = result else {
                tracing::info!(
                    %hash,
                    nonce = attempt.nonce,
                    tip = attempt.caps.gas_tip_cap,
                    fee_cap = attempt.caps.gas_fee_cap,
                    blob_fee_cap = ?attempt.caps.blob_fee_cap,
                    "Transaction successfully published"
                );
                if !published.contains(&hash) {
                    published.push(hash);
                }
                return Ok(attempt);
            };

            match err.kind {
                SendErrorKind::AlreadyKnown => {
                    tracing::warn!(%hash, "Resubmitted already known transaction");
                    if !published.contains(&hash) {
                        published.push(hash);
                    }
                }
                SendErrorKind::NonceTooLow => {
                    tracing::warn!(%hash, error = %err, "Nonce too low");
                }
                SendErrorKind::AlreadyReserved => {
                    tracing::warn!(%hash, error = %err, "Transaction type already reserved");
                }
                kind if kind.needs_fee_bump() && !bump_failed => {
                    tracing::warn!(%hash, error = %err, "Transaction is underpriced");
                    bump = true;
                    continue;
                }
                _ => tracing::error!(%hash, error = %err, "Unable to publish transaction"),
            }
            return Ok(attempt);
        }
    }

    async fn query_receipt(&self, hash: B256, state: &mut SendState) -> Option<TxReceipt> {
        let receipt = match self.backend.transaction_receipt(hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                state.tx_not_mined(&hash);
                return None;
            }
            Err(err) => {
                tracing::info!(%hash, error = %err, "Receipt retrieval failed");
                return None;
            }
        };
        state.tx_mined(hash);

        let tip = match self.backend.block_number().await {
            Ok(tip) => tip,
            Err(err) => {
                tracing::warn!(error = %err, "Unable to fetch tip");
                return None;
            }
        };
        let confirmations = self.config.num_confirmations;
        if is_confirmed(receipt.block_number, confirmations, tip) {
            tracing::info!(
                %hash,
                block = receipt.block_number,
                tip,
                "Transaction confirmed"
            );
            return Some(receipt);
        }
        tracing::debug!(
            %hash,
            remaining = (receipt.block_number + confirmations) - (tip + 1),
            "Transaction not yet confirmed"
        );
        None
    }

    async fn send_tx(
        &self,
        candidate: TxCandidate,
        attempt: Attempt,
        cancel: CancellationToken,
    ) -> SendResponse {
        let mut state = SendState::new(
            self.config.safe_abort_nonce_too_low_count,
            self.config.not_in_mempool_timeout,
        );
        let mut published = Vec::new();
        let mut attempt = self.publish(&candidate, attempt, false, &mut state, &mut published).await?;

        let resubmission = self.config.resubmission_timeout;
        let mut resubmit = interval_at(Instant::now() + resubmission, resubmission);
        resubmit.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let query = self.config.receipt_query_interval;
        let mut receipts = interval_at(Instant::now() + query, query);
        receipts.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TxError::Cancelled),
                _ = receipts.tick() => {
                    for hash in published.clone().into_iter().rev() {
                        if let Some(receipt) = self.query_receipt(hash, &mut state).await {
                            return Ok(receipt);
                        }
                    }
                }
                _ = resubmit.tick() => {
                    if state.is_waiting_for_confirmation() {
                        tracing::trace!(nonce = attempt.nonce, "Mined, waiting for confirmations");
                    } else if self.is_closed() {
                        tracing::warn!(nonce = attempt.nonce, "Manager closed, aborting send");
                        return Err(TxError::Closed);
                    } else if let Some(err) = state.critical_error() {
                        tracing::warn!(nonce = attempt.nonce, error = %err, "Aborting send");
                        return Err(err);
                    } else {
                        attempt = self
                            .publish(&candidate, attempt, true, &mut state, &mut published)
                            .await?;
                    }
                }
            }
        }
    }
}
