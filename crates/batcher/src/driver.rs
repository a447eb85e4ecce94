//! The batch submitter.
//!
//! Four tasks share one [`ChannelManager`]:
//! - the block loading loop polls the rollup node, reconciles the manager
//!   with its sync status and loads new unsafe blocks,
//! - the publishing loop turns channel frames into transactions and hands
//!   them to the send queue,
//! - the receipts loop feeds send outcomes back into the manager,
//! - the throttling loop pushes DA limits to the block builders.
//!
//! The loops only hold the manager lock for synchronous calls.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use alloy::primitives::Bytes;
use sluice_pipeline::FrameId;
use sluice_txmgr::{
    EthBackend, Queue, SendResponse, SendResult, TxCandidate, TxError, TxManager, TxSigner,
};
use tokio::{
    sync::{Mutex as AsyncMutex, Semaphore, mpsc},
    task::JoinSet,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    block::{BlockId, L1BlockRef, SyncStatus},
    candidate::{blob_candidate, calldata_candidate, floor_data_gas},
    channel_config::ChannelConfigProvider,
    channel_manager::ChannelManager,
    clients::{AltDaClient, L2Client, RollupClient, ThrottleEndpoint},
    config::BatcherConfig,
    error::BatcherError,
    metrics::Metricer,
    sync_actions::{InclusiveBlockRange, compute_sync_actions},
    throttle::{ThrottleController, ThrottleParams},
    tx_data::{FrameData, TxData, TxId},
};

const CLEAR_STATE_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const NODE_SYNC_POLL_INTERVAL: Duration = Duration::from_secs(12);
const SYNC_STATUS_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const SYNC_STATUS_MAX_BACKOFF: Duration = Duration::from_secs(30);
const ENDPOINT_RETRY_INTERVAL: Duration = Duration::from_secs(10);
/// Blocks loaded between intermediate publish signals.
const BLOCKS_PER_PUBLISH_SIGNAL: u64 = 100;

/// Whether the L1 txpool accepts our transactions.
///
/// A pool holding a transaction of the other type for our account rejects
/// new sends with "already reserved" until that transaction is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxPoolState {
    /// Sends go through.
    #[default]
    Good,
    /// A send was rejected as already reserved.
    Blocked,
    /// A cancellation transaction is in flight.
    CancelPending,
}

#[derive(Debug, Default)]
struct TxPoolStatus {
    state: TxPoolState,
    blocked_blob: bool,
}

/// Identifies a queued send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRef {
    /// Frames carried by the transaction, empty for cancellations.
    pub id: TxId,
    /// The transaction only replaces a stuck transaction.
    pub is_cancel: bool,
    /// The transaction carries blobs.
    pub is_blob: bool,
}

impl TxRef {
    /// A reference to a batch transaction.
    pub const fn new(id: TxId, is_blob: bool) -> Self {
        Self { id, is_cancel: false, is_blob }
    }

    /// A reference to a cancellation transaction.
    pub const fn cancellation(is_blob: bool) -> Self {
        Self { id: TxId::new(Vec::new()), is_cancel: true, is_blob }
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_cancel, self.is_blob) {
            (true, true) => write!(f, "blob-cancellation"),
            (true, false) => write!(f, "calldata-cancellation"),
            (false, _) => write!(f, "{}", self.id),
        }
    }
}

/// Everything a [`BatchSubmitter`] needs.
pub struct DriverSetup<B, S> {
    /// Driver configuration.
    pub config: BatcherConfig,
    /// Transaction manager publishing to L1.
    pub tx_manager: TxManager<B, S>,
    /// Source of L2 blocks.
    pub l2: Arc<dyn L2Client>,
    /// Source of the sync status.
    pub rollup: Arc<dyn RollupClient>,
    /// Channel config and DA type selection.
    pub channel_config: Arc<dyn ChannelConfigProvider>,
    /// Metrics sink.
    pub metrics: Arc<dyn Metricer>,
    /// Alt-DA server; frames go to L1 directly when `None`.
    pub alt_da: Option<Arc<dyn AltDaClient>>,
    /// Block builders to throttle.
    pub throttle_endpoints: Vec<Arc<dyn ThrottleEndpoint>>,
}

impl<B, S: TxSigner> fmt::Debug for DriverSetup<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSetup")
            .field("config", &self.config)
            .field("tx_manager", &self.tx_manager)
            .field("alt_da", &self.alt_da.is_some())
            .field("throttle_endpoints", &self.throttle_endpoints.len())
            .finish_non_exhaustive()
    }
}

struct SubmitterState {
    manager: ChannelManager,
    prev_current_l1: L1BlockRef,
}

struct Inner<B, S> {
    config: BatcherConfig,
    tx_manager: TxManager<B, S>,
    l2: Arc<dyn L2Client>,
    rollup: Arc<dyn RollupClient>,
    channel_config: Arc<dyn ChannelConfigProvider>,
    metrics: Arc<dyn Metricer>,
    alt_da: Option<Arc<dyn AltDaClient>>,
    throttle_endpoints: Vec<Arc<dyn ThrottleEndpoint>>,
    throttle: ThrottleController,
    state: Mutex<SubmitterState>,
    txpool: Mutex<TxPoolStatus>,
}

struct Running {
    shutdown: CancellationToken,
    kill: CancellationToken,
    publish: mpsc::Sender<bool>,
    tasks: JoinSet<()>,
}

/// Loads L2 blocks and publishes them to L1 as channel frames.
pub struct BatchSubmitter<B, S> {
    inner: Arc<Inner<B, S>>,
    running: AsyncMutex<Option<Running>>,
}

impl<B, S: TxSigner> fmt::Debug for BatchSubmitter<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSubmitter")
            .field("config", &self.inner.config)
            .field("tx_manager", &self.inner.tx_manager)
            .field("txpool", &self.inner.txpool().state)
            .finish_non_exhaustive()
    }
}

impl<B: EthBackend, S: TxSigner> BatchSubmitter<B, S> {
    /// Creates a stopped submitter.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::InvalidConfig`] if the config fails its check.
    pub fn new(setup: DriverSetup<B, S>) -> Result<Self, BatcherError> {
        setup.config.check()?;
        let throttle = ThrottleController::new(setup.config.throttle)?;
        let manager = ChannelManager::new(setup.metrics.clone(), setup.channel_config.clone());
        let inner = Inner {
            config: setup.config,
            tx_manager: setup.tx_manager,
            l2: setup.l2,
            rollup: setup.rollup,
            channel_config: setup.channel_config,
            metrics: setup.metrics,
            alt_da: setup.alt_da,
            throttle_endpoints: setup.throttle_endpoints,
            throttle,
            state: Mutex::new(SubmitterState {
                manager,
                prev_current_l1: L1BlockRef::default(),
            }),
            txpool: Mutex::new(TxPoolStatus::default()),
        };
        Ok(Self { inner: Arc::new(inner), running: AsyncMutex::new(None) })
    }

    /// Clears state, optionally waits for the rollup node to sync, and
    /// spawns the driver loops.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::AlreadyRunning`] if already started, or the
    /// error that ended the node sync wait.
    pub async fn start(&self) -> Result<(), BatcherError> {
        info!("Starting batch submitter");
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(BatcherError::AlreadyRunning);
        }

        let shutdown = CancellationToken::new();
        let kill = CancellationToken::new();
        let inner = &self.inner;
        inner.clear_state(&shutdown).await;
        if inner.config.wait_node_sync {
            inner.wait_node_sync(&shutdown).await?;
        }
        inner.set_txpool(TxPoolState::Good, false);

        let (publish_tx, publish_rx) = mpsc::channel(1);
        let (results_tx, results_rx) = mpsc::channel(1);
        let mut tasks = JoinSet::new();

        let unsafe_bytes_tx = if inner.config.throttle.is_enabled() {
            let (tx, rx) = mpsc::channel(1);
            tasks.spawn(inner.clone().throttling_loop(rx, shutdown.clone()));
            Some(tx)
        } else {
            warn!("Throttling loop is disabled due to a zero lower threshold");
            None
        };
        tasks.spawn(inner.clone().receipts_loop(results_rx));
        tasks.spawn(inner.clone().publishing_loop(
            publish_rx,
            results_tx,
            kill.clone(),
            shutdown.clone(),
        ));
        tasks.spawn(inner.clone().block_loading_loop(
            publish_tx.clone(),
            unsafe_bytes_tx,
            shutdown.clone(),
        ));

        *running = Some(Running { shutdown, kill, publish: publish_tx, tasks });
        info!("Batch submitter started");
        Ok(())
    }

    /// Stops the loops and waits for in-flight sends.
    ///
    /// Sends still pending after `kill_after` are abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::NotRunning`] if not started.
    pub async fn stop(&self, kill_after: Duration) -> Result<(), BatcherError> {
        info!("Stopping batch submitter");
        let mut running = self.running.lock().await;
        let Some(Running { shutdown, kill, publish, mut tasks }) = running.take() else {
            return Err(BatcherError::NotRunning);
        };

        let watchdog = {
            let kill = kill.clone();
            tokio::spawn(async move {
                tokio::time::sleep(kill_after).await;
                kill.cancel();
            })
        };

        shutdown.cancel();
        drop(publish);
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(%err, "Driver task failed");
            }
        }
        watchdog.abort();
        kill.cancel();
        info!("Batch submitter stopped");
        Ok(())
    }

    /// Like [`stop`](Self::stop), but a stopped submitter is not an error.
    pub async fn stop_if_running(&self, kill_after: Duration) -> Result<(), BatcherError> {
        match self.stop(kill_after).await {
            Err(BatcherError::NotRunning) => Ok(()),
            other => other,
        }
    }

    /// Asks the publishing loop to close the current channel and publish it.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::NotRunning`] if not started.
    pub async fn flush(&self) -> Result<(), BatcherError> {
        let running = self.running.lock().await;
        let running = running.as_ref().ok_or(BatcherError::NotRunning)?;
        info!("Flushing batch submitter");
        let _ = running.publish.try_send(true);
        Ok(())
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// The current txpool state.
    pub fn txpool_state(&self) -> TxPoolState {
        self.inner.txpool().state
    }

    /// The latest throttle limits.
    pub fn throttle_params(&self) -> ThrottleParams {
        self.inner.throttle.load()
    }

    /// DA bytes of blocks and frames not yet confirmed on L1.
    pub fn unsafe_da_bytes(&self) -> u64 {
        self.inner.state().manager.unsafe_da_bytes()
    }
}

impl<B, S> Inner<B, S> {
    fn state(&self) -> MutexGuard<'_, SubmitterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn txpool(&self) -> MutexGuard<'_, TxPoolStatus> {
        self.txpool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_txpool(&self, state: TxPoolState, blocked_blob: bool) {
        let mut txpool = self.txpool();
        txpool.state = state;
        txpool.blocked_blob = blocked_blob;
    }
}

impl<B: EthBackend, S: TxSigner> Inner<B, S> {
    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, BatcherError>>,
    ) -> Result<T, BatcherError> {
        tokio::time::timeout(self.config.network_timeout, fut)
            .await
            .map_err(|_| BatcherError::Rpc("request timed out".to_string()))?
    }

    async fn l1_tip(&self) -> Result<(BlockId, bool), BatcherError> {
        let head = self
            .with_timeout(async { Ok(self.tx_manager.backend().latest_header().await?) })
            .await?;
        Ok((BlockId::new(head.hash, head.number), head.has_requests_hash))
    }

    /// L1 origin of the local safe head, or the genesis L1 block while the
    /// safe head is genesis.
    async fn safe_l1_origin(&self) -> Result<BlockId, BatcherError> {
        let status = self.with_timeout(self.rollup.sync_status()).await?;
        if status.local_safe_l2.l1_origin.number == 0 {
            return Ok(self.config.genesis_l1);
        }
        Ok(status.local_safe_l2.l1_origin)
    }

    async fn clear_state(&self, shutdown: &CancellationToken) {
        info!("Clearing state");
        let mut retry = tokio::time::interval(CLEAR_STATE_RETRY_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!("Clearing state cancelled");
                    self.state().manager.clear(BlockId::default());
                    break;
                }
                _ = retry.tick() => {
                    match self.safe_l1_origin().await {
                        Ok(origin) => {
                            info!(%origin, "Clearing state with safe L1 origin");
                            self.state().manager.clear(origin);
                            break;
                        }
                        Err(err) => warn!(%err, "Failed to query L1 safe origin, will retry"),
                    }
                }
            }
        }
        info!("State cleared");
    }

    /// Waits until the rollup node has processed the current L1 head.
    async fn wait_node_sync(&self, shutdown: &CancellationToken) -> Result<(), BatcherError> {
        let (l1_tip, _) = self.l1_tip().await?;
        let target = l1_tip.number;
        loop {
            let status = self.with_timeout(self.rollup.sync_status()).await?;
            if status.current_l1.number >= target {
                info!(current_l1 = %status.current_l1.id(), target_l1 = target, "Rollup current L1 block target reached");
                return Ok(());
            }
            info!(
                current_l1 = %status.current_l1.id(),
                target_l1 = target,
                "Rollup current L1 block still behind target, retrying"
            );
            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!("Waiting for rollup sync cancelled");
                    return Err(BatcherError::Cancelled);
                }
                _ = tokio::time::sleep(NODE_SYNC_POLL_INTERVAL) => {}
            }
        }
    }

    async fn wait_node_sync_and_clear_state(&self, shutdown: &CancellationToken) {
        if let Err(err) = self.wait_node_sync(shutdown).await {
            warn!(%err, "Error waiting for node sync");
        }
        self.clear_state(shutdown).await;
    }

    /// Fetches the sync status, backing off while the node reports no L1
    /// head.
    async fn get_sync_status(&self, shutdown: &CancellationToken) -> Result<SyncStatus, BatcherError> {
        let mut backoff = SYNC_STATUS_INITIAL_BACKOFF;
        loop {
            let status = self.with_timeout(self.rollup.sync_status()).await?;
            if !status.head_l1.is_zero() {
                return Ok(status);
            }
            info!(?backoff, "Received empty sync status, backing off");
            tokio::select! {
                _ = shutdown.cancelled() => return Err(BatcherError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(SYNC_STATUS_MAX_BACKOFF);
        }
    }

    /// Applies the sync actions for `status` and returns the blocks to load.
    fn sync_and_prune(&self, status: &SyncStatus) -> Option<InclusiveBlockRange> {
        let mut state = self.state();
        let (actions, out_of_sync) = compute_sync_actions(
            status,
            &state.prev_current_l1,
            state.manager.blocks(),
            state.manager.channels(),
        );
        if out_of_sync {
            warn!("Sequencer is out of sync, retrying next tick");
            return actions.blocks_to_load;
        }

        state.prev_current_l1 = status.current_l1;
        if let Some(origin) = actions.clear_state {
            state.manager.clear(origin);
        } else {
            state.manager.prune_safe_blocks(actions.blocks_to_prune);
            state.manager.prune_channels(actions.channels_to_prune);
        }
        actions.blocks_to_load
    }

    fn send_to_throttling_loop(&self, unsafe_bytes: Option<&mpsc::Sender<u64>>) {
        if let Some(tx) = unsafe_bytes {
            let bytes = self.state().manager.unsafe_da_bytes();
            let _ = tx.try_send(bytes);
        }
    }

    async fn load_block(&self, number: u64) -> Result<BlockId, BatcherError> {
        let block = self.with_timeout(self.l2.block_by_number(number)).await?;
        let (id, tx_count, time) = (block.id(), block.transactions.len(), block.timestamp);
        self.state().manager.add_block(block)?;
        info!(block = %id, tx_count, time, "Added L2 block to local state");
        Ok(id)
    }

    /// Loads the blocks in `range` into the channel manager.
    async fn load_blocks(
        &self,
        range: InclusiveBlockRange,
        publish: &mpsc::Sender<bool>,
        unsafe_bytes: Option<&mpsc::Sender<u64>>,
    ) -> Result<(), BatcherError> {
        if range.end < range.start {
            return Err(BatcherError::InvalidBlockRange { start: range.start, end: range.end });
        }
        if range.end > range.start {
            info!(start = range.start, end = range.end, "Loading range of multiple blocks into state");
        }

        let mut latest = None;
        for number in range.start..=range.end {
            match self.load_block(number).await {
                Ok(id) => latest = Some(id),
                Err(err) if err.is_reorg() => {
                    warn!(block_number = number, "Found L2 reorg");
                    return Err(err);
                }
                Err(err) => {
                    warn!(%err, "Failed to load block into state");
                    return Err(err);
                }
            }
            if (number - range.start + 1) % BLOCKS_PER_PUBLISH_SIGNAL == 0 {
                self.send_to_throttling_loop(unsafe_bytes);
                let _ = publish.try_send(false);
            }
        }
        if let Some(latest) = latest {
            self.metrics.record_l2_blocks_loaded(latest);
        }
        Ok(())
    }

    async fn block_loading_loop(
        self: Arc<Self>,
        publish: mpsc::Sender<bool>,
        unsafe_bytes: Option<mpsc::Sender<u64>>,
        shutdown: CancellationToken,
    ) {
        let poll = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let status = match self.get_sync_status(&shutdown).await {
                Ok(status) => status,
                Err(err) => {
                    warn!(%err, "Could not get sync status, retrying on next tick");
                    continue;
                }
            };

            if let Some(range) = self.sync_and_prune(&status) {
                match self.load_blocks(range, &publish, unsafe_bytes.as_ref()).await {
                    Err(err) if err.is_reorg() => {
                        warn!(%err, "Error loading blocks, clearing state and waiting for node sync");
                        self.wait_node_sync_and_clear_state(&shutdown).await;
                        continue;
                    }
                    Err(err) => {
                        warn!(%err, "Error loading blocks, retrying on next tick");
                        continue;
                    }
                    Ok(()) => self.send_to_throttling_loop(unsafe_bytes.as_ref()),
                }
            }
            let _ = publish.try_send(false);
        }
        info!("Block loading loop returning");
    }

    async fn publishing_loop(
        self: Arc<Self>,
        mut signals: mpsc::Receiver<bool>,
        results: mpsc::Sender<SendResult<TxRef>>,
        kill: CancellationToken,
        shutdown: CancellationToken,
    ) {
        let queue = Arc::new(Queue::new(
            self.tx_manager.clone(),
            self.config.max_pending_transactions,
            kill.clone(),
        ));
        let da_limit = (self.config.max_concurrent_da_requests > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_concurrent_da_requests)));
        let mut publisher = Publisher {
            queue: &queue,
            results: &results,
            da_tasks: JoinSet::new(),
            da_limit,
            kill: &kill,
            shutdown: &shutdown,
        };

        while let Some(force_publish) = signals.recv().await {
            debug!(force_publish, "Publishing loop received signal");
            self.publish_state_to_l1(&mut publisher, force_publish).await;
            while publisher.da_tasks.try_join_next().is_some() {}
        }

        while publisher.da_tasks.join_next().await.is_some() {}
        queue.wait().await;
        info!("Publishing loop returning");
    }

    /// Queues transactions until there is no more data to publish or queuing
    /// fails.
    async fn publish_state_to_l1(self: &Arc<Self>, publisher: &mut Publisher<'_, B, S>, force_publish: bool) {
        loop {
            if publisher.kill.is_cancelled() {
                return;
            }
            if self.tx_manager.is_closed() {
                info!("Transaction manager is closed, aborting state publishing");
                return;
            }
            if !self.check_txpool(publisher).await {
                info!("Txpool state is not good, aborting state publishing");
                return;
            }
            match self.publish_tx_to_l1(publisher, force_publish).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => {
                    error!(%err, "Error publishing tx to L1");
                    return;
                }
            }
        }
    }

    /// Queues one transaction. Returns `false` when there is nothing to send.
    async fn publish_tx_to_l1(
        self: &Arc<Self>,
        publisher: &mut Publisher<'_, B, S>,
        force_publish: bool,
    ) -> Result<bool, BatcherError> {
        let (l1_tip, is_pectra) = self
            .l1_tip()
            .await
            .inspect_err(|err| error!(%err, "Failed to query L1 tip"))?;
        self.metrics.record_latest_l1_block(l1_tip);

        match self.tx_manager.suggest_gas_price_caps().await {
            Ok(caps) => self.channel_config.record_gas_price_caps(caps),
            Err(err) => warn!(%err, "Failed to fetch gas price caps for DA type selection"),
        }

        let is_throttling = self.throttle.load().is_throttling();
        let next = self.state().manager.next_tx_data(l1_tip, is_pectra, is_throttling, force_publish);
        let tx_data = match next {
            Ok(Some(tx_data)) => tx_data,
            Ok(None) => {
                trace!("No transaction data available");
                return Ok(false);
            }
            Err(err) => {
                error!(%err, "Unable to get tx data");
                return Err(err.into());
            }
        };

        self.send_transaction(publisher, tx_data).await?;
        Ok(true)
    }

    /// Queues a transaction for `tx_data`, through the alt-DA server when one
    /// is configured. Blocks while the queue is full.
    async fn send_transaction(
        self: &Arc<Self>,
        publisher: &mut Publisher<'_, B, S>,
        tx_data: TxData,
    ) -> Result<(), BatcherError> {
        if let Some(alt_da) = &self.alt_da {
            self.publish_to_alt_da_and_l1(publisher, alt_da.clone(), tx_data);
            return Ok(());
        }

        let id = tx_data.id();
        let candidate = if tx_data.as_blob() {
            match blob_candidate(self.config.batch_inbox, &tx_data).await {
                Ok(candidate) => {
                    let last_size = tx_data.frames().last().map_or(0, |frame| frame.data.len());
                    info!(
                        size = tx_data.len(),
                        last_size,
                        num_blobs = candidate.blob_count(),
                        "Building blob transaction candidate"
                    );
                    self.metrics.record_blob_used_bytes(last_size);
                    candidate
                }
                Err(err) => {
                    self.state().manager.tx_failed(&id);
                    return Err(err);
                }
            }
        } else {
            if tx_data.frames().len() != 1 {
                error!(num_frames = tx_data.frames().len(), "Unexpected number of frames in calldata tx");
            }
            info!(size = tx_data.len(), "Building calldata transaction candidate");
            calldata_candidate(self.config.batch_inbox, &tx_data)
        };

        send_tx(publisher.queue, publisher.results, TxRef::new(id, tx_data.as_blob()), candidate)
            .await;
        Ok(())
    }

    /// Posts the frame to the alt-DA server in the background, then queues
    /// the commitment as calldata. The frame is requeued if no upload slot
    /// is free or the upload fails.
    fn publish_to_alt_da_and_l1(
        self: &Arc<Self>,
        publisher: &mut Publisher<'_, B, S>,
        alt_da: Arc<dyn AltDaClient>,
        tx_data: TxData,
    ) {
        if tx_data.frames().len() != 1 {
            error!(num_frames = tx_data.frames().len(), "Unexpected number of frames in calldata tx");
        }
        if tx_data.as_blob() {
            error!("Unexpected blob txdata with alt-DA enabled");
        }

        let permit = match &publisher.da_limit {
            Some(limit) => match limit.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.record_failed_da_request(&tx_data.id(), None);
                    return;
                }
            },
            None => None,
        };

        let this = self.clone();
        let queue = publisher.queue.clone();
        let results = publisher.results.clone();
        let shutdown = publisher.shutdown.clone();
        publisher.da_tasks.spawn(async move {
            let _permit = permit;
            let id = tx_data.id();
            let stored = tokio::select! {
                _ = shutdown.cancelled() => {
                    this.record_failed_da_request(&id, None);
                    return;
                }
                stored = alt_da.set_input(tx_data.call_data()) => stored,
            };
            match stored {
                Ok(commitment) => {
                    info!(%commitment, tx = %id, "Set alt-DA input");
                    let candidate = TxCandidate::calldata(this.config.batch_inbox, commitment);
                    send_tx(&queue, &results, TxRef::new(id, false), candidate).await;
                }
                Err(err) => {
                    error!(%err, "Failed to post input to alt-DA");
                    this.record_failed_da_request(&id, Some(&err));
                }
            }
        });
    }

    fn record_failed_da_request(&self, id: &TxId, err: Option<&BatcherError>) {
        if let Some(err) = err {
            warn!(tx = %id, %err, "DA request failed");
        }
        self.state().manager.tx_failed(id);
    }

    /// Returns `true` if sends may proceed. A blocked pool gets a
    /// cancellation transaction of the other type.
    async fn check_txpool(&self, publisher: &Publisher<'_, B, S>) -> bool {
        let blocked_blob = {
            let mut txpool = self.txpool();
            if txpool.state != TxPoolState::Blocked {
                return txpool.state == TxPoolState::Good;
            }
            txpool.state = TxPoolState::CancelPending;
            txpool.blocked_blob
        };
        self.cancel_blocking_tx(publisher, blocked_blob).await;
        false
    }

    /// Sends an empty transaction of the type opposite to the stuck one.
    async fn cancel_blocking_tx(&self, publisher: &Publisher<'_, B, S>, blocked_blob: bool) {
        let candidate = if blocked_blob {
            TxCandidate::calldata(self.config.batch_inbox, Bytes::new())
        } else {
            let empty = TxData::new(
                vec![FrameData { id: FrameId::default(), data: Bytes::new() }],
                true,
            );
            match blob_candidate(self.config.batch_inbox, &empty).await {
                Ok(candidate) => candidate,
                Err(err) => {
                    error!(%err, "Failed to build cancellation transaction");
                    self.set_txpool(TxPoolState::Blocked, blocked_blob);
                    return;
                }
            }
        };
        warn!(blocked_blob, "Sending a cancellation transaction to unblock txpool");
        send_tx(publisher.queue, publisher.results, TxRef::cancellation(!blocked_blob), candidate)
            .await;
    }

    async fn receipts_loop(self: Arc<Self>, mut results: mpsc::Receiver<SendResult<TxRef>>) {
        info!("Starting receipts processing loop");
        while let Some(SendResult { id, result }) = results.recv().await {
            self.update_txpool_state(&id, &result);
            info!(id = %id, "Handling receipt");
            self.handle_receipt(&id, result);
        }
        info!("Receipts loop returning");
    }

    fn update_txpool_state(&self, id: &TxRef, result: &SendResponse) {
        let mut txpool = self.txpool();
        if matches!(result, Err(TxError::AlreadyReserved)) && txpool.state == TxPoolState::Good {
            txpool.state = TxPoolState::Blocked;
            txpool.blocked_blob = id.is_blob;
            warn!(id = %id, is_blob = id.is_blob, "Incompatible tx in txpool");
        } else if id.is_cancel && txpool.state == TxPoolState::CancelPending {
            // The stuck transaction may have cleared even if the cancellation failed.
            txpool.state = TxPoolState::Good;
            info!(err = ?result.as_ref().err(), "Txpool may no longer be blocked");
        }
    }

    fn handle_receipt(&self, id: &TxRef, result: SendResponse) {
        if id.is_cancel {
            return;
        }
        match result {
            Ok(receipt) => {
                let block = BlockId::new(receipt.block_hash, receipt.block_number);
                info!(tx = %id, tx_hash = %receipt.tx_hash, block = %block, "Transaction confirmed");
                self.state().manager.tx_confirmed(&id.id, block);
            }
            Err(err) => {
                warn!(tx = %id, %err, "Transaction failed to send");
                self.state().manager.tx_failed(&id.id);
            }
        }
    }

    /// Maps unsafe DA bytes to throttle limits and fans them out to one task
    /// per endpoint.
    async fn throttling_loop(
        self: Arc<Self>,
        mut unsafe_bytes: mpsc::Receiver<u64>,
        shutdown: CancellationToken,
    ) {
        info!(
            controller_type = %self.throttle.controller_type(),
            lower_threshold = self.config.throttle.lower_threshold,
            upper_threshold = self.config.throttle.upper_threshold,
            "Starting DA throttling loop"
        );
        let mut signals = Vec::with_capacity(self.throttle_endpoints.len());
        let mut endpoints = JoinSet::new();
        for endpoint in &self.throttle_endpoints {
            let (tx, rx) = mpsc::channel(1);
            signals.push((endpoint.name(), tx));
            endpoints.spawn(self.clone().endpoint_throttler(endpoint.clone(), rx, shutdown.clone()));
        }

        while let Some(bytes) = unsafe_bytes.recv().await {
            self.metrics.record_unsafe_da_bytes(bytes);
            let params = self.throttle.update(bytes);
            self.metrics.record_throttle_params(&params);
            if params.is_throttling() {
                warn!(
                    unsafe_bytes = bytes,
                    intensity = params.intensity,
                    max_tx_size = params.max_tx_size,
                    max_block_size = params.max_block_size,
                    controller_type = %self.throttle.controller_type(),
                    "Unsafe bytes above threshold, throttling block builders"
                );
            }
            for (name, signal) in &signals {
                if signal.try_send(()).is_err() {
                    debug!(endpoint = %name, "Throttle signal pending, skipping update");
                }
            }
        }

        drop(signals);
        while endpoints.join_next().await.is_some() {}
        info!("Throttling loop returning");
    }

    async fn endpoint_throttler(
        self: Arc<Self>,
        endpoint: Arc<dyn ThrottleEndpoint>,
        mut signal: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) {
        let name = endpoint.name();
        info!(endpoint = %name, "Starting endpoint throttling loop");
        let mut retry_at = None;
        loop {
            tokio::select! {
                received = signal.recv() => {
                    if received.is_none() {
                        info!(endpoint = %name, "Endpoint throttling loop shutting down");
                        return;
                    }
                }
                _ = sleep_until(retry_at) => {}
            }
            retry_at = None;
            if !self.update_endpoint(endpoint.as_ref(), &name, &shutdown).await {
                retry_at = Some(Instant::now() + ENDPOINT_RETRY_INTERVAL);
            }
        }
    }

    /// Pushes the current limits to `endpoint`. Returns `false` if the update
    /// should be retried.
    async fn update_endpoint(
        &self,
        endpoint: &dyn ThrottleEndpoint,
        name: &str,
        shutdown: &CancellationToken,
    ) -> bool {
        let params = self.throttle.load();
        debug!(
            endpoint = %name,
            max_tx_size = params.max_tx_size,
            max_block_size = params.max_block_size,
            "Setting max DA size on endpoint"
        );
        let call = endpoint.set_max_da_size(params.max_tx_size, params.max_block_size);
        let result = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(endpoint = %name, "DA throttling cancelled for endpoint");
                return true;
            }
            result = self.with_timeout(call) => result,
        };
        match result {
            Ok(true) => {
                debug!(
                    endpoint = %name,
                    max_tx_size = params.max_tx_size,
                    max_block_size = params.max_block_size,
                    intensity = params.intensity,
                    "Successfully set max DA size on endpoint"
                );
                true
            }
            Ok(false) => {
                warn!(endpoint = %name, "Result of setting max DA size was false, retrying");
                false
            }
            Err(err) => {
                warn!(endpoint = %name, %err, "Setting max DA size failed, retrying");
                false
            }
        }
    }
}

/// Handles the publishing loop passes to its helpers.
struct Publisher<'a, B, S> {
    queue: &'a Arc<Queue<TxRef, B, S>>,
    results: &'a mpsc::Sender<SendResult<TxRef>>,
    da_tasks: JoinSet<()>,
    da_limit: Option<Arc<Semaphore>>,
    kill: &'a CancellationToken,
    shutdown: &'a CancellationToken,
}

/// Sets the EIP-7623 floor as gas limit and queues the candidate.
async fn send_tx<B: EthBackend, S: TxSigner>(
    queue: &Queue<TxRef, B, S>,
    results: &mpsc::Sender<SendResult<TxRef>>,
    tx_ref: TxRef,
    mut candidate: TxCandidate,
) {
    candidate.gas_limit = Some(floor_data_gas(&candidate.data));
    queue.send(tx_ref, candidate, results).await;
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rstest::rstest;
    use sluice_pipeline::constants::TX_GAS;
    use sluice_txmgr::{
        TxManagerConfig,
        test_utils::{MockBackend, MockSigner},
    };

    use super::*;
    use crate::{
        channel_config::{ChannelConfig, StaticChannelConfigProvider},
        compressor::CompressorKind,
        metrics::BatcherMetrics,
        test_utils::{
            MockAltDa, MockL2Client, MockRollupClient, MockThrottleEndpoint, capture_logs, l1_id,
            l2_block, l2_hash, sync_status,
        },
        throttle::{ThrottleConfig, ThrottleControllerType},
    };

    struct Harness {
        backend: Arc<MockBackend>,
        l2: Arc<MockL2Client>,
        rollup: Arc<MockRollupClient>,
        metrics: Arc<BatcherMetrics>,
        submitter: BatchSubmitter<MockBackend, MockSigner>,
    }

    fn test_config() -> BatcherConfig {
        BatcherConfig::builder()
            .batch_inbox(alloy::primitives::Address::repeat_byte(0xff))
            .genesis_l1(l1_id(7))
            .poll_interval(Duration::from_secs(1))
            .throttle(ThrottleConfig::builder().thresholds(0, 0).build())
            .build()
    }

    fn harness(
        config: BatcherConfig,
        alt_da: Option<Arc<dyn AltDaClient>>,
        throttle_endpoints: Vec<Arc<dyn ThrottleEndpoint>>,
    ) -> Harness {
        let backend = Arc::new(MockBackend::new());
        backend.set_auto_mine(true);
        let tx_config = TxManagerConfig::builder()
            .num_confirmations(1)
            .receipt_query_interval(Duration::from_millis(20))
            .resubmission_timeout(Duration::from_secs(1))
            .build();
        let tx_manager = TxManager::new(tx_config, backend.clone(), Arc::new(MockSigner::default()));
        let l2 = Arc::new(MockL2Client::with_chain(10));
        let rollup = Arc::new(MockRollupClient::new(sync_status(100, 1, 10)));
        let metrics = Arc::new(BatcherMetrics::new());
        let channel_config = ChannelConfig::builder()
            .max_frame_size(10_000)
            .max_channel_duration(1)
            .compressor_kind(CompressorKind::None)
            .build();
        let submitter = BatchSubmitter::new(DriverSetup {
            config,
            tx_manager,
            l2: l2.clone(),
            rollup: rollup.clone(),
            channel_config: Arc::new(StaticChannelConfigProvider::new(channel_config)),
            metrics: metrics.clone(),
            alt_da,
            throttle_endpoints,
        })
        .unwrap();
        Harness { backend, l2, rollup, metrics, submitter }
    }

    /// Advances time one L1 block at a time until `done` holds.
    async fn wait_until(h: &Harness, done: impl Fn() -> bool) -> bool {
        for _ in 0..120 {
            if done() {
                return true;
            }
            h.backend.advance_blocks(1);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        done()
    }

    fn publisher<'a>(
        queue: &'a Arc<Queue<TxRef, MockBackend, MockSigner>>,
        results: &'a mpsc::Sender<SendResult<TxRef>>,
        token: &'a CancellationToken,
    ) -> Publisher<'a, MockBackend, MockSigner> {
        Publisher {
            queue,
            results,
            da_tasks: JoinSet::new(),
            da_limit: None,
            kill: token,
            shutdown: token,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_loaded_blocks_as_calldata() {
        let h = harness(test_config(), None, Vec::new());
        h.submitter.start().await.unwrap();
        assert!(h.submitter.is_running().await);

        let metrics = h.metrics.clone();
        assert!(wait_until(&h, || metrics.txs_submitted.load(Ordering::Relaxed) >= 1).await);

        assert_eq!(h.l2.fetched(), (2..=10).collect::<Vec<_>>());
        let sent = h.backend.sent();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].is_blob);
        assert!(sent[0].gas_limit > TX_GAS);
        assert_eq!(h.metrics.txs_failed.load(Ordering::Relaxed), 0);
        assert_eq!(h.submitter.txpool_state(), TxPoolState::Good);

        h.submitter.stop(Duration::from_secs(5)).await.unwrap();
        assert!(!h.submitter.is_running().await);
        assert!(matches!(
            h.submitter.stop(Duration::from_secs(5)).await,
            Err(BatcherError::NotRunning)
        ));
    }

    #[rstest]
    #[case(false, "alt-DA accepts the frame")]
    #[case(true, "alt-DA rejects the frame")]
    #[tokio::test(start_paused = true)]
    async fn test_alt_da_publishing(#[case] failing: bool, #[case] _description: &str) {
        let alt_da = Arc::new(MockAltDa::default());
        alt_da.set_failing(failing);
        let h = harness(test_config(), Some(alt_da.clone() as Arc<dyn AltDaClient>), Vec::new());
        h.submitter.start().await.unwrap();

        let metrics = h.metrics.clone();
        let done = wait_until(&h, || {
            let counter = if failing { &metrics.txs_failed } else { &metrics.txs_submitted };
            counter.load(Ordering::Relaxed) >= 1
        })
        .await;
        assert!(done);
        h.submitter.stop(Duration::from_secs(5)).await.unwrap();

        if failing {
            assert!(alt_da.inputs().is_empty());
            assert_eq!(h.backend.sent_count(), 0);
        } else {
            let inputs = alt_da.inputs();
            assert_eq!(inputs.len(), 1);
            assert_eq!(inputs[0][0], 0, "frames carry the derivation version byte");
            assert_eq!(h.backend.sent_count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_errors() {
        let h = harness(test_config(), None, Vec::new());
        assert!(matches!(h.submitter.flush().await, Err(BatcherError::NotRunning)));

        h.submitter.start().await.unwrap();
        assert!(matches!(h.submitter.start().await, Err(BatcherError::AlreadyRunning)));
        h.submitter.flush().await.unwrap();

        h.submitter.stop(Duration::from_secs(5)).await.unwrap();
        h.submitter.stop_if_running(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(h.submitter.flush().await, Err(BatcherError::NotRunning)));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let backend = Arc::new(MockBackend::new());
        let tx_manager = TxManager::new(
            TxManagerConfig::builder().build(),
            backend,
            Arc::new(MockSigner::default()),
        );
        let config = BatcherConfig::builder().poll_interval(Duration::ZERO).build();
        let result = BatchSubmitter::new(DriverSetup {
            config,
            tx_manager,
            l2: Arc::new(MockL2Client::default()),
            rollup: Arc::new(MockRollupClient::default()),
            channel_config: Arc::new(StaticChannelConfigProvider::new(ChannelConfig::default())),
            metrics: Arc::new(BatcherMetrics::new()),
            alt_da: None,
            throttle_endpoints: Vec::new(),
        });
        assert!(matches!(result, Err(BatcherError::InvalidConfig(_))));
    }

    #[test]
    fn test_out_of_sync_keeps_previous_l1() {
        let h = harness(test_config(), None, Vec::new());
        let inner = &h.submitter.inner;

        let range = inner.sync_and_prune(&sync_status(100, 1, 10));
        assert_eq!(range, Some(InclusiveBlockRange { start: 2, end: 10 }));
        assert_eq!(inner.state().prev_current_l1.number, 100);

        let (range, logs) = capture_logs(|| inner.sync_and_prune(&sync_status(90, 1, 10)));
        assert_eq!(range, None);
        assert!(logs.contains("Sequencer is out of sync"), "{logs}");
        assert_eq!(inner.state().prev_current_l1.number, 100);
    }

    #[tokio::test]
    async fn test_load_blocks_rejects_inverted_range() {
        let h = harness(test_config(), None, Vec::new());
        let (publish, _rx) = mpsc::channel(1);
        let err = h
            .submitter
            .inner
            .load_blocks(InclusiveBlockRange { start: 5, end: 4 }, &publish, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatcherError::InvalidBlockRange { start: 5, end: 4 }));
        assert!(h.l2.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_load_blocks_detects_reorg() {
        let h = harness(test_config(), None, Vec::new());
        let inner = &h.submitter.inner;
        let (publish, _rx) = mpsc::channel(1);

        inner.load_blocks(InclusiveBlockRange { start: 2, end: 5 }, &publish, None).await.unwrap();
        assert_eq!(inner.state().manager.blocks().len(), 4);
        assert_eq!(h.metrics.latest_l2_block.load(Ordering::Relaxed), 5);

        let mut forked = l2_block(6, 1, 200);
        forked.parent_hash = l2_hash(5, 1);
        h.l2.set_block(forked);
        let err = inner
            .load_blocks(InclusiveBlockRange { start: 6, end: 8 }, &publish, None)
            .await
            .unwrap_err();
        assert!(err.is_reorg());
        assert_eq!(h.l2.fetched(), vec![2, 3, 4, 5, 6]);
        assert_eq!(inner.state().manager.blocks().len(), 4);
    }

    #[rstest]
    #[case(Some(5), Some(l1_id(5)), "safe head origin")]
    #[case(Some(0), Some(l1_id(7)), "genesis safe head uses configured L1 origin")]
    #[case(None, None, "rollup node unreachable")]
    #[tokio::test]
    async fn test_safe_l1_origin(
        #[case] origin: Option<u64>,
        #[case] expected: Option<BlockId>,
        #[case] _description: &str,
    ) {
        let h = harness(test_config(), None, Vec::new());
        match origin {
            Some(origin) => {
                let mut status = sync_status(100, 1, 10);
                status.local_safe_l2.l1_origin = l1_id(origin);
                h.rollup.set_status(status);
            }
            None => h.rollup.set_failing(true),
        }
        let result = h.submitter.inner.safe_l1_origin().await;
        assert_eq!(result.ok(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_node_sync_polls_until_target() {
        let h = harness(test_config(), None, Vec::new());
        h.rollup.push_status(sync_status(98, 1, 10));
        h.rollup.push_status(sync_status(99, 1, 10));
        h.submitter.inner.wait_node_sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(h.rollup.calls(), 3);

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        h.rollup.push_status(sync_status(50, 1, 10));
        let err = h.submitter.inner.wait_node_sync(&cancelled).await.unwrap_err();
        assert!(matches!(err, BatcherError::Cancelled));
    }

    fn throttle_config() -> BatcherConfig {
        let throttle = ThrottleConfig::builder()
            .controller_type(ThrottleControllerType::Linear)
            .thresholds(1_000, 2_000)
            .tx_size_limits(100, 1_000)
            .block_size_limits(1_000, 10_000)
            .build();
        BatcherConfig { throttle, ..test_config() }
    }

    async fn wait_for_calls(endpoint: &MockThrottleEndpoint, n: usize) {
        while endpoint.calls().len() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_loop_updates_endpoints() {
        let first = Arc::new(MockThrottleEndpoint::new("builder-a"));
        let second = Arc::new(MockThrottleEndpoint::new("builder-b"));
        let endpoints: Vec<Arc<dyn ThrottleEndpoint>> = vec![first.clone(), second.clone()];
        let h = harness(throttle_config(), None, endpoints);
        let (tx, rx) = mpsc::channel(1);
        let handle =
            tokio::spawn(h.submitter.inner.clone().throttling_loop(rx, CancellationToken::new()));

        tx.send(1_500).await.unwrap();
        wait_for_calls(&first, 1).await;
        wait_for_calls(&second, 1).await;
        assert_eq!(first.calls(), vec![(550, 5_500)]);
        assert_eq!(second.calls(), vec![(550, 5_500)]);
        assert!(h.submitter.throttle_params().is_throttling());
        assert_eq!(h.metrics.unsafe_da_bytes.load(Ordering::Relaxed), 1_500);

        tx.send(500).await.unwrap();
        wait_for_calls(&first, 2).await;
        assert_eq!(first.calls()[1], (0, 10_000));

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_endpoint_update_is_retried() {
        let endpoint = Arc::new(MockThrottleEndpoint::new("builder"));
        endpoint.push_result(Err(BatcherError::Rpc("connection refused".to_string())));
        let h = harness(throttle_config(), None, vec![endpoint.clone() as Arc<dyn ThrottleEndpoint>]);
        let (tx, rx) = mpsc::channel(1);
        let handle =
            tokio::spawn(h.submitter.inner.clone().throttling_loop(rx, CancellationToken::new()));

        tx.send(1_500).await.unwrap();
        wait_for_calls(&endpoint, 1).await;
        tokio::time::sleep(ENDPOINT_RETRY_INTERVAL / 2).await;
        assert_eq!(endpoint.calls().len(), 1);

        tokio::time::sleep(ENDPOINT_RETRY_INTERVAL).await;
        assert_eq!(endpoint.calls(), vec![(550, 5_500), (550, 5_500)]);

        drop(tx);
        handle.await.unwrap();
    }

    #[rstest]
    #[case(true, "stuck blob tx is replaced by calldata")]
    #[case(false, "stuck calldata tx is replaced by a blob")]
    #[tokio::test(start_paused = true)]
    async fn test_blocked_txpool_sends_cancellation(
        #[case] blocked_blob: bool,
        #[case] _description: &str,
    ) {
        let h = harness(test_config(), None, Vec::new());
        h.backend.set_excess_blob_gas(Some(0));
        let inner = &h.submitter.inner;
        let queue = Arc::new(Queue::new(inner.tx_manager.clone(), 0, CancellationToken::new()));
        let (results, mut rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let publisher = publisher(&queue, &results, &token);

        let stuck = TxRef::new(TxId::default(), blocked_blob);
        inner.update_txpool_state(&stuck, &Err(TxError::AlreadyReserved));
        assert_eq!(h.submitter.txpool_state(), TxPoolState::Blocked);

        assert!(!inner.check_txpool(&publisher).await);
        assert_eq!(h.submitter.txpool_state(), TxPoolState::CancelPending);
        assert!(!inner.check_txpool(&publisher).await);

        let SendResult { id, result } = rx.recv().await.unwrap();
        assert!(id.is_cancel);
        assert_eq!(id.is_blob, !blocked_blob);
        assert!(result.is_ok());
        let sent = h.backend.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].is_blob, !blocked_blob);
        assert_eq!(sent[0].gas_limit, TX_GAS);

        inner.update_txpool_state(&id, &result);
        assert_eq!(h.submitter.txpool_state(), TxPoolState::Good);
        assert!(inner.check_txpool(&publisher).await);
    }

    #[test]
    fn test_cancellation_result_ignored_while_good() {
        let h = harness(test_config(), None, Vec::new());
        let inner = &h.submitter.inner;
        inner.update_txpool_state(&TxRef::cancellation(true), &Err(TxError::Cancelled));
        assert_eq!(h.submitter.txpool_state(), TxPoolState::Good);

        inner.set_txpool(TxPoolState::CancelPending, false);
        inner.update_txpool_state(&TxRef::new(TxId::default(), false), &Err(TxError::AlreadyReserved));
        assert_eq!(h.submitter.txpool_state(), TxPoolState::CancelPending);
    }

    #[rstest]
    #[case(TxRef::cancellation(true), "blob-cancellation")]
    #[case(TxRef::cancellation(false), "calldata-cancellation")]
    fn test_tx_ref_display(#[case] tx_ref: TxRef, #[case] expected: &str) {
        assert_eq!(tx_ref.to_string(), expected);
    }
}
