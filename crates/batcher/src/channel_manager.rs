//! Turns a contiguous run of unsafe L2 blocks into channels and hands their
//! frames out as transaction data.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use alloy::primitives::B256;
use sluice_pipeline::ChannelId;
use tracing::{debug, info, trace, warn};

use crate::{
    block::{BlockId, L2Block},
    channel::{Channel, ChannelStatus},
    channel_builder::ChannelBuilder,
    channel_config::{ChannelConfig, ChannelConfigProvider},
    error::ChannelError,
    metrics::Metricer,
    sized_block::SizedBlock,
    tx_data::{TxData, TxId},
};

/// Stores unsafe blocks and builds channels out of them.
///
/// Blocks stay queued until they are safe. The block cursor points at the
/// next block to put into a channel, so blocks before it are in a channel
/// already. Only one channel takes blocks at a time. Channels stay queued
/// until sync reconciliation prunes them.
pub struct ChannelManager {
    metrics: Arc<dyn Metricer>,
    config_provider: Arc<dyn ChannelConfigProvider>,
    blocks: VecDeque<SizedBlock>,
    block_cursor: usize,
    l1_origin_last_submitted_channel: BlockId,
    default_config: ChannelConfig,
    tip: B256,
    current_channel: Option<ChannelId>,
    channels: Vec<Channel>,
    tx_channels: HashMap<TxId, ChannelId>,
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("blocks", &self.blocks.len())
            .field("block_cursor", &self.block_cursor)
            .field("l1_origin_last_submitted_channel", &self.l1_origin_last_submitted_channel)
            .field("tip", &self.tip)
            .field("current_channel", &self.current_channel)
            .field("channels", &self.channels.len())
            .field("tx_channels", &self.tx_channels.len())
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Creates an empty manager. The first channel uses the provider's config
    /// for a non-Pectra, non-throttled chain.
    pub fn new(metrics: Arc<dyn Metricer>, config_provider: Arc<dyn ChannelConfigProvider>) -> Self {
        let default_config = config_provider.channel_config(false, false);
        Self {
            metrics,
            config_provider,
            blocks: VecDeque::new(),
            block_cursor: 0,
            l1_origin_last_submitted_channel: BlockId::default(),
            default_config,
            tip: B256::ZERO,
            current_channel: None,
            channels: Vec::new(),
            tx_channels: HashMap::new(),
        }
    }

    /// Drops all state. The next channel's duration timeout counts from
    /// `l1_origin_last_submitted_channel`.
    pub fn clear(&mut self, l1_origin_last_submitted_channel: BlockId) {
        trace!("clearing channel manager state");
        self.blocks.clear();
        self.block_cursor = 0;
        self.l1_origin_last_submitted_channel = l1_origin_last_submitted_channel;
        self.tip = B256::ZERO;
        self.current_channel = None;
        self.channels.clear();
        self.tx_channels.clear();
        self.metrics.clear_all_state_metrics();
    }

    /// Queued blocks, oldest first.
    pub const fn blocks(&self) -> &VecDeque<SizedBlock> {
        &self.blocks
    }

    /// Queued channels, oldest first.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The channel currently taking blocks.
    pub fn current_channel(&self) -> Option<&Channel> {
        self.current_index().map(|idx| &self.channels[idx])
    }

    /// Config used for the next channel.
    pub const fn default_config(&self) -> &ChannelConfig {
        &self.default_config
    }

    /// Blocks not yet in a channel.
    pub fn pending_blocks(&self) -> usize {
        self.blocks.len() - self.block_cursor
    }

    /// The newest queued block, zero-valued when empty.
    pub fn last_stored_block(&self) -> BlockId {
        self.blocks.back().map(|block| block.id()).unwrap_or_default()
    }

    fn current_index(&self) -> Option<usize> {
        let id = self.current_channel?;
        self.channels.iter().position(|channel| channel.id() == id)
    }

    fn channel_index(&self, id: ChannelId) -> Option<usize> {
        self.channels.iter().position(|channel| channel.id() == id)
    }

    /// Queues `block`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Reorg`] if the block does not build on the last
    /// queued block. The parent check is skipped while the tip is unset.
    pub fn add_block(&mut self, block: L2Block) -> Result<(), ChannelError> {
        if self.tip != B256::ZERO && self.tip != block.parent_hash {
            return Err(ChannelError::Reorg);
        }
        let block = SizedBlock::new(block);
        self.metrics.record_l2_block_in_pending_queue(block.raw_size(), block.estimated_da_bytes());
        self.tip = block.hash;
        self.blocks.push_back(block);
        Ok(())
    }

    /// Requeues the frames of a failed transaction.
    pub fn tx_failed(&mut self, id: &TxId) {
        let channel = self.tx_channels.remove(id).and_then(|ch| self.channel_index(ch));
        match channel {
            Some(idx) => self.channels[idx].tx_failed(id),
            None => warn!(id = %id, "transaction from unknown channel marked as failed"),
        }
    }

    /// Records the inclusion of a transaction. Invalidates the channel if it
    /// timed out on L1.
    pub fn tx_confirmed(&mut self, id: &TxId, inclusion_block: BlockId) {
        let channel = self.tx_channels.remove(id).and_then(|ch| self.channel_index(ch));
        match channel {
            Some(idx) => {
                if self.channels[idx].tx_confirmed(id, inclusion_block) {
                    warn!(
                        channel_id = %self.channels[idx].id(),
                        tx_id = %id,
                        "channel timed out on chain"
                    );
                    self.handle_channel_invalidated(idx);
                }
            }
            None => warn!(id = %id, "transaction from unknown channel marked as confirmed"),
        }
        debug!(id = %id, block = %inclusion_block, "marked transaction as confirmed");
    }

    /// Moves the block cursor back to `block`.
    ///
    /// # Panics
    ///
    /// Panics unless `block` is queued before the cursor.
    fn rewind_to_block(&mut self, block: BlockId) {
        let initial_cursor = self.block_cursor;
        let idx = self
            .blocks
            .front()
            .and_then(|first| block.number.checked_sub(first.number))
            .and_then(|idx| usize::try_from(idx).ok());
        match idx {
            Some(idx)
                if idx < self.block_cursor
                    && self.blocks.get(idx).is_some_and(|b| b.hash == block.hash) =>
            {
                self.block_cursor = idx;
            }
            _ => panic!("tried to rewind to nonexistent block {block}"),
        }
        for block in self.blocks.range(self.block_cursor..initial_cursor) {
            self.metrics
                .record_l2_block_in_pending_queue(block.raw_size(), block.estimated_da_bytes());
        }
    }

    /// Requeues the blocks of the channel at `idx` and drops it together with
    /// every newer channel.
    fn handle_channel_invalidated(&mut self, idx: usize) {
        match self.channels[idx].builder().blocks().first().map(|block| block.id()) {
            Some(first) => self.rewind_to_block(first),
            None => debug!("invalidated channel had no blocks"),
        }

        for channel in &self.channels[idx..] {
            warn!(
                id = %channel.id(),
                none_submitted = channel.none_submitted(),
                fully_submitted = channel.is_fully_submitted(),
                timed_out = channel.is_timed_out(),
                full_reason = ?channel.builder().full_reason(),
                oldest_l2 = %channel.builder().oldest_l2(),
                newest_l2 = %channel.latest_l2(),
                "Dropped channel"
            );
            let id = channel.id();
            self.tx_channels.retain(|_, ch| *ch != id);
        }
        self.channels.truncate(idx);
        self.metrics.record_channel_queue_length(self.channels.len());
        self.current_channel = None;
    }

    fn take_tx_data(&mut self, idx: Option<usize>) -> Option<TxData> {
        let idx = idx.filter(|&idx| self.channels[idx].has_tx_data());
        let Some(idx) = idx else {
            trace!("no next tx data");
            return None;
        };
        let channel = &mut self.channels[idx];
        let tx = channel.next_tx_data();
        let latest_l1_origin = channel.builder().latest_l1_origin();
        if latest_l1_origin.number > self.l1_origin_last_submitted_channel.number {
            self.l1_origin_last_submitted_channel = latest_l1_origin;
        }
        self.tx_channels.insert(tx.id(), channel.id());
        Some(tx)
    }

    /// Returns the next transaction to submit, or `None` when nothing is
    /// ready.
    ///
    /// Before the first transaction of a channel goes out, the DA type is
    /// re-assessed. If the provider now prefers the other DA type, the channel
    /// is invalidated and rebuilt with the new config. `force_publish` closes
    /// the current channel if it has not produced any frames.
    ///
    /// # Errors
    ///
    /// Returns an error if building the channel fails.
    pub fn next_tx_data(
        &mut self,
        l1_head: BlockId,
        is_pectra: bool,
        is_throttling: bool,
        force_publish: bool,
    ) -> Result<Option<TxData>, ChannelError> {
        let Some(idx) = self.get_ready_channel(l1_head, force_publish)? else {
            return Ok(None);
        };
        if !self.channels[idx].none_submitted() {
            return Ok(self.take_tx_data(Some(idx)));
        }

        let new_config = self.config_provider.channel_config(is_pectra, is_throttling);
        if new_config.use_blobs == self.default_config.use_blobs {
            debug!(
                use_blobs = self.default_config.use_blobs,
                "Recomputing optimal ChannelConfig: no need to switch DA type"
            );
            return Ok(self.take_tx_data(Some(idx)));
        }

        info!(
            use_blobs_before = self.default_config.use_blobs,
            use_blobs_after = new_config.use_blobs,
            "Recomputing optimal ChannelConfig: changing DA type and requeing blocks"
        );
        self.handle_channel_invalidated(idx);
        self.default_config = new_config;

        let idx = self.get_ready_channel(l1_head, force_publish)?;
        Ok(self.take_tx_data(idx))
    }

    /// Finds the first channel with data to send, building the current
    /// channel further if there is none.
    fn get_ready_channel(
        &mut self,
        l1_head: BlockId,
        force_publish: bool,
    ) -> Result<Option<usize>, ChannelError> {
        if force_publish {
            if let Some(idx) = self.current_index() {
                let channel = &mut self.channels[idx];
                if channel.builder().total_frames() == 0 {
                    info!(channel_id = %channel.id(), "Force-closing channel and creating frames");
                    channel.builder_mut().close();
                    channel.builder_mut().output_frames()?;
                }
            }
        }

        let ready = self.channels.iter().position(Channel::has_tx_data);
        debug!(
            l1_head = %l1_head,
            txdata_pending = ready.is_some(),
            blocks_pending = self.pending_blocks(),
            "Requested tx data"
        );
        if ready.is_some() {
            return Ok(ready);
        }
        if self.pending_blocks() == 0 {
            return Ok(None);
        }

        let idx = self.ensure_channel_with_space(l1_head)?;
        self.process_blocks(idx)?;
        self.register_l1_block(idx, l1_head);
        self.output_frames(idx)?;

        Ok(self.channels[idx].has_tx_data().then_some(idx))
    }

    /// Returns the index of a current channel that takes blocks, opening a
    /// new one if needed.
    fn ensure_channel_with_space(&mut self, l1_head: BlockId) -> Result<usize, ChannelError> {
        if let Some(idx) = self.current_index() {
            if !self.channels[idx].builder().is_full() {
                return Ok(idx);
            }
        }

        let config = self.default_config;
        let builder = ChannelBuilder::new(config, self.l1_origin_last_submitted_channel.number)?;
        let channel = Channel::new(builder, Arc::clone(&self.metrics));
        info!(
            id = %channel.id(),
            l1_head = %l1_head,
            blocks_pending = self.pending_blocks(),
            l1_origin_last_submitted_channel = %self.l1_origin_last_submitted_channel,
            compressor = %config.compressor.kind,
            compression_algo = %config.compressor.algo,
            target_num_frames = config.target_num_frames,
            max_frame_size = config.max_frame_size,
            use_blobs = config.use_blobs,
            "Created channel"
        );
        self.metrics.record_channel_opened(channel.id(), self.pending_blocks());

        self.current_channel = Some(channel.id());
        self.channels.push(channel);
        self.metrics.record_channel_queue_length(self.channels.len());
        debug!(length = self.channels.len(), "Channel queue length");
        Ok(self.channels.len() - 1)
    }

    fn register_l1_block(&mut self, idx: usize, l1_head: BlockId) {
        let builder = self.channels[idx].builder_mut();
        builder.check_timeout(l1_head.number);
        debug!(
            l1_head = %l1_head,
            channel_full = builder.is_full(),
            full_reason = ?builder.full_reason(),
            "new L1-block registered at channel builder"
        );
    }

    /// Adds pending blocks to the channel at `idx` until it is full or the
    /// queue is drained.
    fn process_blocks(&mut self, idx: usize) -> Result<(), ChannelError> {
        let mut blocks_added = 0;
        let mut latest = BlockId::default();
        let mut result = Ok(());

        let builder = self.channels[idx].builder_mut();
        for (i, block) in self.blocks.iter().enumerate().skip(self.block_cursor) {
            match builder.add_block(block.clone()) {
                Ok(()) => {}
                Err(ChannelError::Full(_)) => break,
                Err(err) => {
                    warn!(index = i, error = %err, "failed to add block to channel builder");
                    result = Err(err);
                    break;
                }
            }
            debug!(id = %builder.id(), block = %block.id(), "Added block to channel");
            blocks_added += 1;
            latest = block.id();
            self.metrics.record_l2_block_in_channel(block.raw_size(), block.estimated_da_bytes());
            if builder.is_full() {
                break;
            }
        }

        self.block_cursor += blocks_added;
        let builder = self.channels[idx].builder();
        self.metrics.record_l2_blocks_added(
            latest,
            blocks_added,
            self.pending_blocks(),
            builder.input_bytes(),
            builder.ready_bytes(),
        );
        debug!(
            blocks_added,
            blocks_pending = self.pending_blocks(),
            channel_full = builder.is_full(),
            input_bytes = builder.input_bytes(),
            ready_bytes = builder.ready_bytes(),
            "Added blocks to channel"
        );
        result
    }

    /// Produces frames for the channel at `idx` and reports it once closed.
    fn output_frames(&mut self, idx: usize) -> Result<(), ChannelError> {
        let pending_blocks = self.pending_blocks();
        let builder = self.channels[idx].builder_mut();
        builder.output_frames()?;
        if !builder.is_full() {
            return Ok(());
        }

        let (input_bytes, output_bytes) = (builder.input_bytes(), builder.output_bytes());
        self.metrics.record_channel_closed(
            builder.id(),
            pending_blocks,
            builder.total_frames(),
            input_bytes,
            output_bytes,
            builder.full_reason(),
        );
        let compr_ratio =
            if input_bytes > 0 { output_bytes as f64 / input_bytes as f64 } else { 0.0 };
        info!(
            id = %builder.id(),
            blocks_pending = pending_blocks,
            num_frames = builder.total_frames(),
            input_bytes,
            output_bytes,
            oldest_l1_origin = %builder.oldest_l1_origin(),
            l1_origin = %builder.latest_l1_origin(),
            oldest_l2 = %builder.oldest_l2(),
            latest_l2 = %builder.latest_l2(),
            full_reason = ?builder.full_reason(),
            compr_ratio,
            "Channel closed"
        );
        Ok(())
    }

    /// Drops the `n` oldest blocks once they are safe.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` blocks are queued.
    pub fn prune_safe_blocks(&mut self, n: usize) {
        assert!(n <= self.blocks.len(), "tried to prune more blocks than available");
        let discarded: Vec<_> = self.blocks.drain(..n).collect();
        if self.block_cursor < n {
            // Blocks that became safe before they made it into a channel.
            for block in &discarded[self.block_cursor..] {
                self.metrics
                    .record_pending_block_pruned(block.raw_size(), block.estimated_da_bytes());
            }
            self.block_cursor = 0;
        } else {
            self.block_cursor -= n;
        }
    }

    /// Drops the `n` oldest channels.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` channels are queued.
    pub fn prune_channels(&mut self, n: usize) {
        assert!(n <= self.channels.len(), "tried to prune more channels than available");
        let clears_current = self.current_channel.is_some_and(|current| {
            self.channels[..n].iter().any(|channel| channel.id() == current)
        });
        self.channels.drain(..n);
        self.metrics.record_channel_queue_length(self.channels.len());
        if clears_current {
            self.current_channel = None;
        }
    }

    /// Estimated DA bytes not yet confirmed on L1.
    pub fn unsafe_da_bytes(&self) -> u64 {
        self.pending_da_bytes_in_blocks()
            + self.unsafe_bytes_in_open_channels()
            + self.unsafe_bytes_in_closed_channels()
    }

    /// Estimated DA bytes of blocks not yet in a channel.
    pub fn pending_da_bytes_in_blocks(&self) -> u64 {
        self.blocks.range(self.block_cursor..).map(SizedBlock::estimated_da_bytes).sum()
    }

    /// Estimated DA bytes of channels that have not produced frames.
    pub fn unsafe_bytes_in_open_channels(&self) -> u64 {
        self.channels
            .iter()
            .filter(|channel| channel.builder().total_frames() == 0)
            .flat_map(|channel| channel.builder().blocks())
            .map(SizedBlock::estimated_da_bytes)
            .sum()
    }

    /// Frame bytes of channels that produced frames.
    pub fn unsafe_bytes_in_closed_channels(&self) -> u64 {
        self.channels
            .iter()
            .map(Channel::builder)
            .filter(|builder| builder.total_frames() > 0)
            .map(|builder| builder.output_bytes() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use alloy::primitives::U256;
    use rstest::rstest;
    use sluice_pipeline::{constants::MAX_BLOB_DATA_SIZE, parse_frames};

    use super::*;
    use crate::{
        channel_builder::tests::test_block,
        channel_config::StaticChannelConfigProvider,
        compressor::CompressorKind,
        error::FullReason,
        metrics::{BatcherMetrics, NoopMetrics},
    };

    /// Returns the calldata or blob config depending on a switch, counting
    /// assessments.
    struct FakeDynamicConfig {
        calldata: ChannelConfig,
        blobs: ChannelConfig,
        choose_blobs: AtomicBool,
        assessments: AtomicUsize,
    }

    impl FakeDynamicConfig {
        fn new(choose_blobs: bool) -> Self {
            let calldata = ChannelConfig::builder()
                .max_frame_size(120_000 - 1)
                .compressor_kind(CompressorKind::None)
                .build();
            let blobs = ChannelConfig::builder()
                .max_frame_size(MAX_BLOB_DATA_SIZE - 1)
                .target_num_frames(3)
                .use_blobs(true)
                .compressor_kind(CompressorKind::None)
                .build();
            Self {
                calldata,
                blobs,
                choose_blobs: AtomicBool::new(choose_blobs),
                assessments: AtomicUsize::new(0),
            }
        }
    }

    impl ChannelConfigProvider for FakeDynamicConfig {
        fn channel_config(&self, _is_pectra: bool, _is_throttling: bool) -> ChannelConfig {
            self.assessments.fetch_add(1, Ordering::SeqCst);
            if self.choose_blobs.load(Ordering::SeqCst) { self.blobs } else { self.calldata }
        }
    }

    /// Counts how often a channel is closed.
    #[derive(Default)]
    struct ClosedChannels(Mutex<Vec<Option<FullReason>>>);

    impl Metricer for ClosedChannels {
        fn record_channel_closed(
            &self,
            _id: ChannelId,
            _num_pending_blocks: usize,
            _num_frames: usize,
            _input_bytes: usize,
            _output_bytes: usize,
            reason: Option<FullReason>,
        ) {
            self.0.lock().unwrap().push(reason);
        }
    }

    fn ratio_config(max_frame_size: usize) -> ChannelConfig {
        ChannelConfig::builder()
            .max_frame_size(max_frame_size)
            .compressor_kind(CompressorKind::Ratio)
            .approx_compr_ratio(1.0)
            .build()
    }

    fn manager(config: ChannelConfig) -> ChannelManager {
        manager_with_metrics(config, Arc::new(NoopMetrics))
    }

    fn manager_with_metrics(config: ChannelConfig, metrics: Arc<dyn Metricer>) -> ChannelManager {
        ChannelManager::new(metrics, Arc::new(StaticChannelConfigProvider::new(config)))
    }

    fn chain(len: u64, tx_len: usize) -> Vec<L2Block> {
        (0..len).map(|n| test_block(n, 1, tx_len).into_block()).collect()
    }

    fn l1_head() -> BlockId {
        BlockId::default()
    }

    /// Block `number` of a hash-linked chain starting at genesis.
    fn linked_block(number: u64, tx_len: usize) -> L2Block {
        let mut block = test_block(number, 1, tx_len).into_block();
        block.hash = B256::from(U256::from(number + 1));
        block.parent_hash = B256::from(U256::from(number));
        block
    }

    fn assert_unsafe_parts_add_up(m: &ChannelManager) {
        assert_eq!(
            m.unsafe_da_bytes(),
            m.pending_da_bytes_in_blocks()
                + m.unsafe_bytes_in_open_channels()
                + m.unsafe_bytes_in_closed_channels()
        );
    }

    #[test]
    fn test_returns_reorg() {
        let mut m = manager(ChannelConfig::default());
        let blocks = chain(3, 10);
        for block in &blocks {
            m.add_block(block.clone()).unwrap();
        }
        let mut x = test_block(2, 1, 10).into_block();
        x.parent_hash = B256::repeat_byte(0xff);

        assert_eq!(m.add_block(x).unwrap_err(), ChannelError::Reorg);
        assert_eq!(m.blocks().len(), 3);
        assert_eq!(m.last_stored_block(), blocks[2].id());
    }

    #[test]
    fn test_returns_reorg_when_drained() {
        let mut cfg = ratio_config(120_000);
        cfg.compressor.target_output_size = 1;
        let mut m = manager(cfg);

        m.add_block(test_block(0, 1, 10).into_block()).unwrap();
        assert!(m.next_tx_data(l1_head(), false, false, false).unwrap().is_some());
        assert!(m.next_tx_data(l1_head(), false, false, false).unwrap().is_none());

        let mut x = test_block(1, 1, 10).into_block();
        x.parent_hash = B256::repeat_byte(0xff);
        assert_eq!(m.add_block(x).unwrap_err(), ChannelError::Reorg);
    }

    #[test]
    fn test_clear() {
        let mut cfg = ratio_config(24);
        cfg.channel_timeout = 10;
        let metrics = Arc::new(BatcherMetrics::new());
        let mut m = manager_with_metrics(cfg, metrics.clone());
        assert!(m.blocks().is_empty());
        assert!(m.channels().is_empty());
        assert!(m.current_channel().is_none());

        let a = test_block(0, 4, 10).into_block();
        m.add_block(a.clone()).unwrap();
        let idx = m.ensure_channel_with_space(a.id()).unwrap();
        assert!(m.current_channel().is_some());
        m.process_blocks(idx).unwrap();
        m.channels[idx].builder_mut().close();
        m.output_frames(idx).unwrap();
        assert!(m.take_tx_data(Some(idx)).is_some());
        assert_eq!(m.block_cursor, m.blocks().len());
        assert_eq!(m.tip, a.hash);
        assert_eq!(m.channels[idx].pending_transactions(), 1);

        let mut b = test_block(1, 4, 10).into_block();
        b.parent_hash = a.hash;
        m.add_block(b.clone()).unwrap();
        assert_eq!(m.block_cursor, m.blocks().len() - 1);
        assert_eq!(m.tip, b.hash);
        assert_ne!(metrics.pending_raw_bytes.load(Ordering::Relaxed), 0);

        m.clear(BlockId::new(B256::ZERO, 123));

        assert!(m.blocks().is_empty());
        assert_eq!(m.l1_origin_last_submitted_channel.number, 123);
        assert_eq!(m.tip, B256::ZERO);
        assert!(m.current_channel().is_none());
        assert!(m.channels().is_empty());
        assert!(m.tx_channels.is_empty());
        assert_eq!(metrics.pending_raw_bytes.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_tx_resend() {
        let mut cfg = ratio_config(120_000);
        cfg.compressor.target_output_size = 1;
        let mut m = manager(cfg);
        m.add_block(test_block(0, 1, 100).into_block()).unwrap();

        let tx0 = m.next_tx_data(l1_head(), false, false, false).unwrap().unwrap();
        let data0 = tx0.call_data();
        assert!(m.next_tx_data(l1_head(), false, false, false).unwrap().is_none());

        m.tx_failed(&tx0.id());
        let tx1 = m.next_tx_data(l1_head(), false, false, false).unwrap().unwrap();
        let data1 = tx1.call_data();
        assert_eq!(data1, data0);
        assert_eq!(parse_frames(&data1).unwrap().len(), 1);
    }

    #[rstest]
    #[case(123, 138, "counts from the last submitted origin")]
    #[case(0, 15, "counts from zero without an origin")]
    fn test_channel_creation_duration_timeout(
        #[case] l1_origin: u64,
        #[case] expected_timeout: u64,
        #[case] _description: &str,
    ) {
        let mut cfg = ratio_config(1000);
        cfg.max_channel_duration = 15;
        cfg.compressor.kind = CompressorKind::None;
        let mut m = manager(cfg);
        m.l1_origin_last_submitted_channel = BlockId::new(B256::ZERO, l1_origin);

        let idx = m.ensure_channel_with_space(l1_head()).unwrap();
        assert_eq!(m.channels[idx].builder().timeout(), expected_timeout);
    }

    #[rstest]
    #[case(true, true, 2, "blobs to blobs")]
    #[case(false, false, 2, "calldata to calldata")]
    #[case(true, false, 2, "blobs to calldata")]
    #[case(false, true, 3, "calldata to blobs")]
    fn test_da_type_reassessed_at_submission(
        #[case] blobs_when_created: bool,
        #[case] blobs_when_submitted: bool,
        #[case] expected_assessments: usize,
        #[case] _description: &str,
    ) {
        let provider = Arc::new(FakeDynamicConfig::new(blobs_when_created));
        let mut m = ChannelManager::new(Arc::new(NoopMetrics), provider.clone());
        assert_eq!(m.default_config().use_blobs, blobs_when_created);

        let block = test_block(1, 1, 30_000);
        m.blocks.push_back(block.clone());
        assert!(m.next_tx_data(l1_head(), false, false, false).unwrap().is_none());
        assert!(!m.channels().is_empty());
        assert!(!m.channels()[0].builder().is_full());

        provider.choose_blobs.store(blobs_when_submitted, Ordering::SeqCst);
        let data = loop {
            m.blocks.push_back(block.clone());
            if let Some(data) = m.next_tx_data(l1_head(), false, false, false).unwrap() {
                if !data.is_empty() {
                    break data;
                }
            }
        };

        assert_eq!(provider.assessments.load(Ordering::SeqCst), expected_assessments);
        assert_eq!(data.as_blob(), blobs_when_submitted);
        assert_eq!(m.default_config().use_blobs, blobs_when_submitted);
    }

    #[rstest]
    #[case(false, true, "calldata to blobs")]
    #[case(true, false, "blobs to calldata")]
    fn test_da_switch_keeps_unsafe_bytes(
        #[case] blobs_when_created: bool,
        #[case] blobs_when_submitted: bool,
        #[case] _description: &str,
    ) {
        let provider = Arc::new(FakeDynamicConfig::new(blobs_when_created));
        let mut m = ChannelManager::new(Arc::new(NoopMetrics), provider.clone());
        m.add_block(linked_block(0, 30_000)).unwrap();
        let queued = m.unsafe_da_bytes();
        assert_eq!(queued, m.pending_da_bytes_in_blocks());

        assert!(m.next_tx_data(l1_head(), false, false, false).unwrap().is_none());
        assert_eq!(m.unsafe_da_bytes(), queued);
        assert_eq!(m.pending_da_bytes_in_blocks(), 0);
        assert_eq!(m.unsafe_bytes_in_open_channels(), queued);
        assert_eq!(m.unsafe_bytes_in_closed_channels(), 0);

        // Forcing the channel out triggers the DA reassessment, which drops the
        // sealed channel and rebuilds it under the other config.
        provider.choose_blobs.store(blobs_when_submitted, Ordering::SeqCst);
        assert!(m.next_tx_data(l1_head(), false, false, true).unwrap().is_none());

        assert_eq!(m.default_config().use_blobs, blobs_when_submitted);
        assert_eq!(m.channels().len(), 1);
        assert_eq!(m.channels()[0].builder().total_frames(), 0);
        assert_eq!(m.unsafe_da_bytes(), queued);
        assert_eq!(m.pending_da_bytes_in_blocks(), 0);
        assert_eq!(m.unsafe_bytes_in_open_channels(), queued);
        assert_eq!(m.unsafe_bytes_in_closed_channels(), 0);
        assert_unsafe_parts_add_up(&m);
    }

    #[test]
    fn test_handle_channel_invalidated() {
        let metrics = Arc::new(BatcherMetrics::new());
        let mut m = manager_with_metrics(ratio_config(100), metrics.clone());

        let a = test_block(0, 1, 100);
        let b = test_block(1, 1, 100);
        let snapshot = VecDeque::from([a.clone(), b.clone()]);
        m.blocks = snapshot.clone();

        // An older channel that a later invalidation must not touch.
        let old = m.ensure_channel_with_space(l1_head()).unwrap();
        m.channels[old].builder_mut().close();
        let old_id = m.channels[old].id();
        assert_eq!(m.channels().len(), 1);

        metrics.record_l2_block_in_pending_queue(a.raw_size(), a.estimated_da_bytes());
        metrics.record_l2_block_in_pending_queue(b.raw_size(), b.estimated_da_bytes());
        let pending_before = metrics.pending_raw_bytes.load(Ordering::Relaxed);

        let invalid = m.ensure_channel_with_space(l1_head()).unwrap();
        assert_eq!(m.channels().len(), 2);
        m.process_blocks(invalid).unwrap();
        assert_eq!(m.block_cursor, 1);
        assert!(metrics.pending_raw_bytes.load(Ordering::Relaxed) < pending_before);

        let l1_origin_before = m.l1_origin_last_submitted_channel;
        m.channels[invalid].builder_mut().close();
        let invalid_id = m.channels[invalid].id();
        let newer = m.ensure_channel_with_space(l1_head()).unwrap();
        let newer_id = m.channels[newer].id();
        assert_eq!(m.channels().len(), 3);
        m.process_blocks(newer).unwrap();
        assert_eq!(m.block_cursor, 2);

        m.handle_channel_invalidated(invalid);

        assert_eq!(m.blocks, snapshot);
        assert_eq!(m.block_cursor, 0);
        let ids: Vec<_> = m.channels().iter().map(Channel::id).collect();
        assert_eq!(ids, vec![old_id]);
        assert!(!ids.contains(&invalid_id) && !ids.contains(&newer_id));
        assert_eq!(metrics.channel_queue_length.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.pending_raw_bytes.load(Ordering::Relaxed), pending_before);
        assert_eq!(m.l1_origin_last_submitted_channel, l1_origin_before);

        let idx = m.ensure_channel_with_space(l1_head()).unwrap();
        m.process_blocks(idx).unwrap();
        assert_eq!(m.block_cursor, 1);
    }

    #[test]
    fn test_timed_out_channel_requeues_blocks() {
        let mut cfg = ratio_config(1_000);
        cfg.compressor.target_output_size = 1;
        cfg.channel_timeout = 2;
        cfg.sub_safety_margin = 0;
        let mut m = manager(cfg);
        m.add_block(test_block(0, 1, 30_000).into_block()).unwrap();
        let queued = m.unsafe_da_bytes();
        assert_eq!(queued, m.pending_da_bytes_in_blocks());

        let first = m.next_tx_data(l1_head(), false, false, false).unwrap().unwrap();
        let second = m.next_tx_data(l1_head(), false, false, false).unwrap().unwrap();
        assert_eq!(m.block_cursor, 1);
        let sealed = m.channels()[0].builder().output_bytes() as u64;
        assert_eq!(m.unsafe_da_bytes(), sealed);
        assert_eq!(m.unsafe_bytes_in_closed_channels(), sealed);
        assert_unsafe_parts_add_up(&m);

        m.tx_confirmed(&first.id(), BlockId::new(B256::repeat_byte(1), 10));
        assert_eq!(m.channels().len(), 1);
        assert_eq!(m.unsafe_da_bytes(), sealed);
        m.tx_confirmed(&second.id(), BlockId::new(B256::repeat_byte(2), 12));

        assert!(m.channels().is_empty());
        assert_eq!(m.block_cursor, 0);
        assert_eq!(m.pending_blocks(), 1);
        assert!(m.tx_channels.is_empty());
        // The whole channel is requeued, including its confirmed frames.
        assert_eq!(m.unsafe_da_bytes(), queued);
        assert_eq!(m.pending_da_bytes_in_blocks(), queued);
        assert_eq!(m.unsafe_bytes_in_open_channels(), 0);
        assert_eq!(m.unsafe_bytes_in_closed_channels(), 0);
    }

    #[test]
    fn test_unknown_tx_is_ignored() {
        let mut m = manager(ChannelConfig::default());
        m.tx_failed(&TxId::default());
        m.tx_confirmed(&TxId::default(), BlockId::default());
        assert!(m.channels().is_empty());
    }

    #[rstest]
    #[case(3, 1, 2, 2, 0, "cursor past the end, prune one")]
    #[case(2, 1, 2, 1, 0, "cursor on the last block, prune one")]
    #[case(3, 2, 1, 1, 0, "cursor past the end, prune two")]
    #[case(2, 2, 1, 0, 0, "cursor on the last block, prune two")]
    #[case(0, 1, 2, 0, 1, "cursor on the first block, prune one")]
    #[case(3, 3, 0, 0, 0, "prune all")]
    #[case(2, 3, 0, 0, 1, "prune past the cursor")]
    fn test_prune_safe_blocks(
        #[case] cursor: usize,
        #[case] prune: usize,
        #[case] expected_len: usize,
        #[case] expected_cursor: usize,
        #[case] expected_pending_pruned: u64,
        #[case] _description: &str,
    ) {
        let metrics = Arc::new(BatcherMetrics::new());
        let mut m = manager_with_metrics(ratio_config(100), metrics.clone());
        m.blocks = chain(3, 0).into_iter().map(SizedBlock::new).collect();
        m.block_cursor = cursor;

        m.prune_safe_blocks(prune);

        assert_eq!(m.blocks().len(), expected_len);
        assert_eq!(m.block_cursor, expected_cursor);
        if let Some(front) = m.blocks().front() {
            assert_eq!(front.number, (3 - expected_len) as u64);
        }
        assert_eq!(metrics.blocks_pruned.load(Ordering::Relaxed), expected_pending_pruned);
    }

    #[rstest]
    #[case(&[(3, 1), (2, 2), (4, 0), (0, 6)], "prune everything in steps")]
    #[case(&[(5, 0), (0, 5), (3, 1)], "refill after a full prune")]
    #[case(&[(1, 1), (1, 1), (1, 1)], "prune each block as it arrives")]
    #[case(&[(6, 2), (1, 3), (2, 0)], "grow while pruning")]
    fn test_prune_keeps_linked_chain(
        #[case] steps: &[(u64, usize)],
        #[case] _description: &str,
    ) {
        let mut cfg = ratio_config(120_000);
        cfg.compressor.target_output_size = 1;
        let mut m = manager(cfg);
        let (mut added, mut pruned) = (0u64, 0usize);

        for &(add, prune) in steps {
            for _ in 0..add {
                m.add_block(linked_block(added, 100)).unwrap();
                added += 1;
            }
            // Move some blocks into channels so pruning crosses the cursor.
            m.next_tx_data(l1_head(), false, false, false).unwrap();
            m.prune_safe_blocks(prune);
            pruned += prune;

            assert_eq!(m.blocks().len() as u64, added - pruned as u64);
            assert!(m.block_cursor <= m.blocks().len());
            assert_eq!(m.pending_blocks(), m.blocks().len() - m.block_cursor);
            if let Some(front) = m.blocks().front() {
                assert_eq!(front.number, pruned as u64);
            }
            for (parent, child) in m.blocks().iter().zip(m.blocks().iter().skip(1)) {
                assert_eq!(child.number, parent.number + 1);
                assert_eq!(child.parent_hash, parent.hash);
            }
            assert_unsafe_parts_add_up(&m);
        }
        assert_eq!(m.tip, B256::from(U256::from(added)));
    }

    #[test]
    #[should_panic(expected = "tried to prune more blocks than available")]
    fn test_prune_too_many_blocks_panics() {
        let mut m = manager(ratio_config(100));
        m.blocks = chain(3, 0).into_iter().map(SizedBlock::new).collect();
        m.block_cursor = 3;
        m.prune_safe_blocks(4);
    }

    fn seed_channels(m: &mut ChannelManager) -> Vec<ChannelId> {
        (0..3)
            .map(|_| {
                let idx = m.ensure_channel_with_space(l1_head()).unwrap();
                m.channels[idx].builder_mut().close();
                m.channels[idx].id()
            })
            .collect()
    }

    #[rstest]
    #[case(1, false, 1, "prune the oldest")]
    #[case(3, true, 3, "prune all including the current channel")]
    #[case(2, false, 2, "prune two")]
    #[case(3, false, 3, "prune all")]
    fn test_prune_channels(
        #[case] prune: usize,
        #[case] current_is_last: bool,
        #[case] expected_first_remaining: usize,
        #[case] _description: &str,
    ) {
        let mut m = manager(ratio_config(100));
        let ids = seed_channels(&mut m);
        m.current_channel = current_is_last.then(|| ids[2]);

        m.prune_channels(prune);

        let remaining: Vec<_> = m.channels().iter().map(Channel::id).collect();
        assert_eq!(remaining, ids[expected_first_remaining..].to_vec());
        if current_is_last {
            assert!(m.current_channel.is_none());
        }
    }

    #[test]
    #[should_panic(expected = "tried to prune more channels than available")]
    fn test_prune_too_many_channels_panics() {
        let mut m = manager(ratio_config(100));
        seed_channels(&mut m);
        m.prune_channels(4);
    }

    #[test]
    fn test_force_publish() {
        let provider = Arc::new(FakeDynamicConfig::new(false));
        let mut m = ChannelManager::new(Arc::new(NoopMetrics), provider);
        m.blocks.push_back(test_block(1, 1, 30_000));

        assert!(m.next_tx_data(l1_head(), false, false, false).unwrap().is_none());
        assert!(!m.channels()[0].builder().is_full());

        let data = m.next_tx_data(l1_head(), false, false, true).unwrap().unwrap();
        assert!(!data.is_empty());
        assert_eq!(m.channels().len(), 1);
        assert_eq!(m.channels()[0].builder().full_reason(), Some(FullReason::Terminated));
    }

    #[test]
    fn test_channel_closed_reported_once_full() {
        let metrics = Arc::new(ClosedChannels::default());
        let mut cfg = ratio_config(120_000);
        cfg.compressor.target_output_size = 1;
        let mut m = manager_with_metrics(cfg, metrics.clone());
        m.add_block(test_block(0, 1, 10).into_block()).unwrap();
        m.next_tx_data(l1_head(), false, false, false).unwrap();
        assert_eq!(*metrics.0.lock().unwrap(), vec![Some(FullReason::CompressorFull)]);
    }

    #[rstest]
    #[case(1, 3_000, "one block")]
    #[case(3, 3_000, "three blocks")]
    #[case(3, 0, "empty blocks")]
    #[case(20, 5_000, "twenty blocks")]
    fn test_unsafe_da_bytes_move_through_pipeline(
        #[case] num_blocks: u64,
        #[case] tx_len: usize,
        #[case] _description: &str,
    ) {
        let cfg = ChannelConfig::builder()
            .max_frame_size(120_000 - 1)
            .target_num_frames(5)
            .compressor_kind(CompressorKind::Shadow)
            .build();
        let mut m = manager(cfg);
        let mut parent = B256::ZERO;
        for mut block in chain(num_blocks, tx_len) {
            block.parent_hash = parent;
            block.hash = B256::from(U256::from(block.number + 1));
            parent = block.hash;
            m.add_block(block).unwrap();
        }

        let queued = m.unsafe_da_bytes();
        assert_eq!(queued, m.pending_da_bytes_in_blocks());
        assert!(queued >= num_blocks * 70);
        assert_eq!(m.unsafe_bytes_in_open_channels(), 0);
        assert_eq!(m.unsafe_bytes_in_closed_channels(), 0);

        while m.next_tx_data(l1_head(), true, false, false).unwrap().is_some() {}
        assert_eq!(m.unsafe_da_bytes(), queued);
        assert_eq!(m.pending_da_bytes_in_blocks(), 0);
        assert_eq!(m.unsafe_bytes_in_open_channels(), queued);
        assert_eq!(m.unsafe_bytes_in_closed_channels(), 0);

        let idx = m.current_index().unwrap();
        m.channels[idx].builder_mut().close();
        m.channels[idx].builder_mut().output_frames().unwrap();
        let sealed = m.channels[idx].builder().output_bytes() as u64;
        assert_eq!(m.unsafe_da_bytes(), sealed);
        assert_eq!(m.pending_da_bytes_in_blocks(), 0);
        assert_eq!(m.unsafe_bytes_in_open_channels(), 0);
        assert_eq!(m.unsafe_bytes_in_closed_channels(), sealed);
    }
}
