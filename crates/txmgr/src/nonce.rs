//! Nonce tracking and management.

use std::{fmt, future::Future, sync::Arc};

use alloy::primitives::Address;
use tokio::sync::Mutex;

use crate::{backend::EthBackend, error::TxError};

/// Hands out strictly increasing nonces for one sender.
///
/// The cache holds the next nonce to use. It is filled from the chain on
/// first use and after every [`reset`](Self::reset). Assignment and signing
/// happen under one lock, so nonce order equals call order.
pub struct NonceTracker<B> {
    /// The backend used to fetch nonces from the chain.
    backend: Arc<B>,
    /// The address being tracked.
    address: Address,
    /// The next nonce. None indicates the nonce needs to be fetched.
    nonce: Mutex<Option<u64>>,
}

impl<B: EthBackend> NonceTracker<B> {
    /// Creates a new nonce tracker for the given address.
    ///
    /// The nonce is fetched lazily on first use.
    pub fn new(backend: Arc<B>, address: Address) -> Self {
        Self { backend, address, nonce: Mutex::new(None) }
    }

    /// Runs `f` with the next nonce while holding the nonce lock.
    ///
    /// The nonce is consumed only if `f` succeeds; on error it is handed to
    /// the next caller again.
    ///
    /// # Errors
    ///
    /// Returns [`TxError::Rpc`] if the nonce has to be fetched and the fetch
    /// fails, or the error returned by `f`.
    pub async fn with_next_nonce<F, Fut, T>(&self, f: F) -> Result<T, TxError>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<T, TxError>>,
    {
        let mut cached = self.nonce.lock().await;
        let nonce = match *cached {
            Some(nonce) => nonce,
            None => self.backend.nonce_at(self.address).await?,
        };
        let result = f(nonce).await;
        *cached = Some(if result.is_ok() { nonce + 1 } else { nonce });
        result
    }

    /// Forgets the cached nonce; the next use refetches it from the chain.
    pub async fn reset(&self) {
        *self.nonce.lock().await = None;
    }

    /// Returns the next nonce without consuming it, `None` if not yet fetched.
    pub async fn current(&self) -> Option<u64> {
        *self.nonce.lock().await
    }

    /// Returns the address being tracked.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }
}

impl<B> fmt::Debug for NonceTracker<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceTracker")
            .field("address", &self.address)
            .field("nonce", &"<locked>")
            .finish()
    }
}
