//! Bounded queue of concurrent sends.

use std::{fmt, sync::Arc};

use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::EthBackend,
    candidate::TxCandidate,
    manager::{SendResponse, TxManager},
    signer::TxSigner,
};

/// Outcome of a queued send, tagged with the caller's id.
#[derive(Debug)]
pub struct SendResult<T> {
    /// Caller-provided id.
    pub id: T,
    /// The receipt, or why the send failed.
    pub result: SendResponse,
}

/// Runs sends concurrently with at most `max_pending` in flight.
///
/// [`send`](Self::send) fixes the nonce before returning, so nonce order
/// follows call order even though sends complete in any order.
pub struct Queue<T, B, S> {
    manager: TxManager<B, S>,
    slots: Option<Arc<Semaphore>>,
    tasks: Mutex<JoinSet<()>>,
    cancel: CancellationToken,
    _id: std::marker::PhantomData<fn() -> T>,
}

impl<T, B, S> fmt::Debug for Queue<T, B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("available", &self.slots.as_ref().map(|s| s.available_permits()))
            .finish_non_exhaustive()
    }
}

impl<T, B, S> Queue<T, B, S>
where
    T: Send + 'static,
    B: EthBackend,
    S: TxSigner,
{
    /// Creates a queue. `max_pending == 0` means unbounded.
    pub fn new(manager: TxManager<B, S>, max_pending: usize, cancel: CancellationToken) -> Self {
        let slots = (max_pending > 0).then(|| Arc::new(Semaphore::new(max_pending)));
        Self {
            manager,
            slots,
            tasks: Mutex::new(JoinSet::new()),
            cancel,
            _id: std::marker::PhantomData,
        }
    }

    /// Number of sends that can start right now, `None` if unbounded.
    pub fn available(&self) -> Option<usize> {
        self.slots.as_ref().map(|slots| slots.available_permits())
    }

    /// Waits for a free slot, then starts the send. The outcome is delivered
    /// on `results` tagged with `id`.
    pub async fn send(&self, id: T, candidate: TxCandidate, results: &mpsc::Sender<SendResult<T>>) {
        let permit = match &self.slots {
            Some(slots) => slots.clone().acquire_owned().await.ok(),
            None => None,
        };
        self.start(id, candidate, results.clone(), permit).await;
    }

    /// Starts the send only if a slot is free.
    ///
    /// Returns `false`, without sending, when the queue is full.
    pub async fn try_send(
        &self,
        id: T,
        candidate: TxCandidate,
        results: &mpsc::Sender<SendResult<T>>,
    ) -> bool {
        let permit = match &self.slots {
            Some(slots) => match slots.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => return false,
            },
            None => None,
        };
        self.start(id, candidate, results.clone(), permit).await;
        true
    }

    async fn start(
        &self,
        id: T,
        candidate: TxCandidate,
        results: mpsc::Sender<SendResult<T>>,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let response = self.manager.send_async(candidate, self.cancel.child_token()).await;
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let result = response.await.unwrap_or(Err(crate::TxError::Cancelled));
            let _ = results.send(SendResult { id, result }).await;
            drop(permit);
        });
    }

    /// Waits until every started send has delivered its result.
    pub async fn wait(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while tasks.join_next().await.is_some() {}
    }
}
