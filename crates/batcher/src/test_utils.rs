//! Log capture and in-memory clients for tests.

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy::primitives::{B256, Bytes, U256, keccak256};
use async_trait::async_trait;
use tracing_subscriber::fmt::MakeWriter;

use crate::{
    block::{BlockId, L1BlockRef, L2Block, L2BlockRef, SyncStatus},
    clients::{AltDaClient, L2Client, RollupClient, ThrottleEndpoint},
    error::BatcherError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared buffer the capturing subscriber writes into.
#[derive(Clone, Debug, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn subscriber(buffer: LogBuffer) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_writer(buffer)
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish()
}

/// Runs `f` with a subscriber recording every event and returns its output
/// alongside the formatted logs.
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let out = tracing::subscriber::with_default(subscriber(buffer.clone()), f);
    (out, buffer.contents())
}

/// Installs a recording subscriber on the current thread until the guard
/// drops. Suits current-thread async tests.
pub(crate) fn capture_logs_scoped() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let guard = tracing::subscriber::set_default(subscriber(buffer.clone()));
    (guard, buffer)
}

/// Hash of L2 block `number` on fork `fork`; fork 0 is the canonical chain.
pub(crate) fn l2_hash(number: u64, fork: u8) -> B256 {
    let mut hash = B256::from(U256::from(number));
    hash.0[0] = fork;
    hash
}

/// Hash of L1 block `number`.
pub(crate) fn l1_hash(number: u64) -> B256 {
    let mut hash = B256::from(U256::from(number));
    hash.0[0] = 0x11;
    hash
}

/// L1 block ref at `number`.
pub(crate) fn l1_ref(number: u64) -> L1BlockRef {
    L1BlockRef {
        hash: l1_hash(number),
        number,
        parent_hash: l1_hash(number.saturating_sub(1)),
        timestamp: number * 12,
    }
}

/// L1 block id at `number`.
pub(crate) fn l1_id(number: u64) -> BlockId {
    BlockId::new(l1_hash(number), number)
}

/// Canonical L2 block `number` with L1 origin `l1_origin` and one user
/// transaction of `tx_len` bytes after the L1 info deposit.
pub(crate) fn l2_block(number: u64, l1_origin: u64, tx_len: usize) -> L2Block {
    let user_tx: Vec<u8> = (0..tx_len as u32)
        .map(|i| (i.wrapping_add(number as u32).wrapping_mul(2_654_435_761) >> 11) as u8)
        .collect();
    L2Block {
        hash: l2_hash(number, 0),
        number,
        parent_hash: l2_hash(number.wrapping_sub(1), 0),
        timestamp: number * 2,
        l1_origin: l1_id(l1_origin),
        sequence_number: 0,
        transactions: vec![Bytes::from_static(&[0x7e, 0x01]), user_tx.into()],
    }
}

/// Ref to canonical L2 block `number`.
pub(crate) fn l2_ref(number: u64, l1_origin: u64) -> L2BlockRef {
    L2BlockRef {
        hash: l2_hash(number, 0),
        number,
        parent_hash: l2_hash(number.wrapping_sub(1), 0),
        timestamp: number * 2,
        l1_origin: l1_id(l1_origin),
        sequence_number: 0,
    }
}

/// Sync status with `head_l1 == current_l1 == l1`, unsafe head `unsafe_l2`
/// and both safe heads at `safe_l2`.
pub(crate) fn sync_status(l1: u64, safe_l2: u64, unsafe_l2: u64) -> SyncStatus {
    SyncStatus {
        current_l1: l1_ref(l1),
        head_l1: l1_ref(l1),
        safe_l1: l1_ref(l1),
        finalized_l1: l1_ref(l1),
        unsafe_l2: l2_ref(unsafe_l2, 1),
        safe_l2: l2_ref(safe_l2, 1),
        local_safe_l2: l2_ref(safe_l2, 1),
        finalized_l2: l2_ref(safe_l2, 1),
    }
}

/// In-memory L2 chain.
#[derive(Debug, Default)]
pub(crate) struct MockL2Client {
    blocks: Mutex<HashMap<u64, L2Block>>,
    fetched: Mutex<Vec<u64>>,
}

impl MockL2Client {
    /// Chain of canonical blocks `0..=tip`, all with L1 origin 1.
    pub(crate) fn with_chain(tip: u64) -> Self {
        let client = Self::default();
        client.extend(0, tip);
        client
    }

    /// Adds canonical blocks `from..=to`.
    pub(crate) fn extend(&self, from: u64, to: u64) {
        let mut blocks = lock(&self.blocks);
        for number in from..=to {
            blocks.insert(number, l2_block(number, 1, 200));
        }
    }

    /// Replaces block `number`.
    pub(crate) fn set_block(&self, block: L2Block) {
        lock(&self.blocks).insert(block.number, block);
    }

    /// Block numbers fetched so far, in order.
    pub(crate) fn fetched(&self) -> Vec<u64> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl L2Client for MockL2Client {
    async fn block_by_number(&self, number: u64) -> Result<L2Block, BatcherError> {
        lock(&self.fetched).push(number);
        lock(&self.blocks)
            .get(&number)
            .cloned()
            .ok_or_else(|| BatcherError::Rpc(format!("block {number} not found")))
    }
}

/// Rollup node returning a settable sync status.
#[derive(Debug, Default)]
pub(crate) struct MockRollupClient {
    status: Mutex<SyncStatus>,
    queued: Mutex<VecDeque<SyncStatus>>,
    failing: Mutex<bool>,
    calls: Mutex<usize>,
}

impl MockRollupClient {
    /// Creates a client reporting `status`.
    pub(crate) fn new(status: SyncStatus) -> Self {
        let client = Self::default();
        client.set_status(status);
        client
    }

    /// Sets the status returned once the queue is drained.
    pub(crate) fn set_status(&self, status: SyncStatus) {
        *lock(&self.status) = status;
    }

    /// Queues a status returned once before falling back.
    pub(crate) fn push_status(&self, status: SyncStatus) {
        lock(&self.queued).push_back(status);
    }

    /// Makes every call fail.
    pub(crate) fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// Number of `sync_status` calls.
    pub(crate) fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl RollupClient for MockRollupClient {
    async fn sync_status(&self) -> Result<SyncStatus, BatcherError> {
        *lock(&self.calls) += 1;
        if *lock(&self.failing) {
            return Err(BatcherError::Rpc("connection refused".to_string()));
        }
        if let Some(status) = lock(&self.queued).pop_front() {
            return Ok(status);
        }
        Ok(*lock(&self.status))
    }
}

/// Block builder recording the DA limits it receives.
#[derive(Debug)]
pub(crate) struct MockThrottleEndpoint {
    name: String,
    calls: Mutex<Vec<(u64, u64)>>,
    results: Mutex<VecDeque<Result<bool, BatcherError>>>,
}

impl MockThrottleEndpoint {
    /// Creates an endpoint that accepts every update.
    pub(crate) fn new(name: &str) -> Self {
        Self { name: name.to_string(), calls: Mutex::default(), results: Mutex::default() }
    }

    /// Queues the result of the next call.
    pub(crate) fn push_result(&self, result: Result<bool, BatcherError>) {
        lock(&self.results).push_back(result);
    }

    /// `(max_tx_size, max_block_size)` of every call.
    pub(crate) fn calls(&self) -> Vec<(u64, u64)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ThrottleEndpoint for MockThrottleEndpoint {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn set_max_da_size(
        &self,
        max_tx_size: u64,
        max_block_size: u64,
    ) -> Result<bool, BatcherError> {
        lock(&self.calls).push((max_tx_size, max_block_size));
        lock(&self.results).pop_front().unwrap_or(Ok(true))
    }
}

/// Alt-DA server keeping inputs in memory.
#[derive(Debug, Default)]
pub(crate) struct MockAltDa {
    inputs: Mutex<Vec<Bytes>>,
    failing: Mutex<bool>,
}

impl MockAltDa {
    /// Makes every call fail.
    pub(crate) fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// Stored inputs, in order.
    pub(crate) fn inputs(&self) -> Vec<Bytes> {
        lock(&self.inputs).clone()
    }
}

#[async_trait]
impl AltDaClient for MockAltDa {
    async fn set_input(&self, data: Bytes) -> Result<Bytes, BatcherError> {
        if *lock(&self.failing) {
            return Err(BatcherError::AltDa("service unavailable".to_string()));
        }
        let commitment = keccak256(&data);
        lock(&self.inputs).push(data);
        let mut out = vec![0x00];
        out.extend_from_slice(commitment.as_slice());
        Ok(out.into())
    }
}
