//! Batcher metrics hooks.
//!
//! [`Metricer`] is the hook surface the channel manager and driver report to.
//! Every method defaults to a no-op. [`BatcherMetrics`] keeps plain atomic
//! counters and gauges that the binary logs periodically.

use std::sync::atomic::{AtomicU64, Ordering};

use sluice_pipeline::ChannelId;

use crate::{block::BlockId, error::FullReason, throttle::ThrottleParams};

/// Receives batcher events.
pub trait Metricer: Send + Sync {
    /// A block entered the pending queue.
    fn record_l2_block_in_pending_queue(&self, _raw_size: u64, _da_size: u64) {}
    /// A block was added to a channel.
    fn record_l2_block_in_channel(&self, _raw_size: u64, _da_size: u64) {}
    /// A block left the pending queue after reaching the safe chain.
    fn record_pending_block_pruned(&self, _raw_size: u64, _da_size: u64) {}
    /// Blocks were added to the current channel.
    fn record_l2_blocks_added(
        &self,
        _latest: BlockId,
        _num_blocks_added: usize,
        _num_pending_blocks: usize,
        _input_bytes: usize,
        _output_bytes: usize,
    ) {
    }
    /// Blocks were fetched from the L2 node.
    fn record_l2_blocks_loaded(&self, _latest: BlockId) {}
    /// A channel was opened.
    fn record_channel_opened(&self, _id: ChannelId, _num_pending_blocks: usize) {}
    /// A channel was closed.
    fn record_channel_closed(
        &self,
        _id: ChannelId,
        _num_pending_blocks: usize,
        _num_frames: usize,
        _input_bytes: usize,
        _output_bytes: usize,
        _reason: Option<FullReason>,
    ) {
    }
    /// Every frame of a channel was confirmed.
    fn record_channel_fully_submitted(&self, _id: ChannelId) {}
    /// A channel timed out on L1.
    fn record_channel_timed_out(&self, _id: ChannelId) {}
    /// The number of channels in the queue changed.
    fn record_channel_queue_length(&self, _len: usize) {}
    /// A batcher transaction was included.
    fn record_batch_tx_submitted(&self) {}
    /// A batcher transaction failed.
    fn record_batch_tx_failed(&self) {}
    /// Bytes used in one blob.
    fn record_blob_used_bytes(&self, _bytes: usize) {}
    /// Latest L1 block seen by the driver.
    fn record_latest_l1_block(&self, _block: BlockId) {}
    /// DA bytes not yet on L1.
    fn record_unsafe_da_bytes(&self, _bytes: u64) {}
    /// Throttle output after an update.
    fn record_throttle_params(&self, _params: &ThrottleParams) {}
    /// All state was cleared.
    fn clear_all_state_metrics(&self) {}
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl Metricer for NoopMetrics {}

/// Atomic counters and gauges.
#[derive(Debug, Default)]
pub struct BatcherMetrics {
    /// Blocks that entered the pending queue.
    pub blocks_queued: AtomicU64,
    /// Blocks added to channels.
    pub blocks_in_channels: AtomicU64,
    /// Blocks pruned after reaching the safe chain.
    pub blocks_pruned: AtomicU64,
    /// Raw bytes of pending blocks.
    pub pending_raw_bytes: AtomicU64,
    /// Highest loaded L2 block.
    pub latest_l2_block: AtomicU64,
    /// Channels opened.
    pub channels_opened: AtomicU64,
    /// Channels closed.
    pub channels_closed: AtomicU64,
    /// Channels fully submitted.
    pub channels_submitted: AtomicU64,
    /// Channels that timed out.
    pub channels_timed_out: AtomicU64,
    /// Channels in the queue.
    pub channel_queue_length: AtomicU64,
    /// Encoded batch bytes of closed channels.
    pub channel_input_bytes: AtomicU64,
    /// Frame bytes of closed channels.
    pub channel_output_bytes: AtomicU64,
    /// Included batcher transactions.
    pub txs_submitted: AtomicU64,
    /// Failed batcher transactions.
    pub txs_failed: AtomicU64,
    /// Bytes posted in blobs.
    pub blob_used_bytes: AtomicU64,
    /// Latest L1 block number.
    pub latest_l1_block: AtomicU64,
    /// DA bytes not yet on L1.
    pub unsafe_da_bytes: AtomicU64,
    /// Throttle intensity in parts per million.
    pub throttle_intensity_ppm: AtomicU64,
}

impl BatcherMetrics {
    /// Creates zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Input over output bytes of closed channels, 1.0 before any closes.
    pub fn compression_ratio(&self) -> f64 {
        let input = self.channel_input_bytes.load(Ordering::Relaxed);
        if input == 0 {
            return 1.0;
        }
        let output = self.channel_output_bytes.load(Ordering::Relaxed);
        input as f64 / output.max(1) as f64
    }
}

impl Metricer for BatcherMetrics {
    fn record_l2_block_in_pending_queue(&self, raw_size: u64, _da_size: u64) {
        self.blocks_queued.fetch_add(1, Ordering::Relaxed);
        self.pending_raw_bytes.fetch_add(raw_size, Ordering::Relaxed);
    }

    fn record_l2_block_in_channel(&self, raw_size: u64, _da_size: u64) {
        self.blocks_in_channels.fetch_add(1, Ordering::Relaxed);
        let _ = self.pending_raw_bytes.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(raw_size))
        });
    }

    fn record_pending_block_pruned(&self, _raw_size: u64, _da_size: u64) {
        self.blocks_pruned.fetch_add(1, Ordering::Relaxed);
    }

    fn record_l2_blocks_loaded(&self, latest: BlockId) {
        self.latest_l2_block.store(latest.number, Ordering::Relaxed);
    }

    fn record_channel_opened(&self, _id: ChannelId, _num_pending_blocks: usize) {
        self.channels_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn record_channel_closed(
        &self,
        _id: ChannelId,
        _num_pending_blocks: usize,
        _num_frames: usize,
        input_bytes: usize,
        output_bytes: usize,
        _reason: Option<FullReason>,
    ) {
        self.channels_closed.fetch_add(1, Ordering::Relaxed);
        self.channel_input_bytes.fetch_add(input_bytes as u64, Ordering::Relaxed);
        self.channel_output_bytes.fetch_add(output_bytes as u64, Ordering::Relaxed);
    }

    fn record_channel_fully_submitted(&self, _id: ChannelId) {
        self.channels_submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_channel_timed_out(&self, _id: ChannelId) {
        self.channels_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    fn record_channel_queue_length(&self, len: usize) {
        self.channel_queue_length.store(len as u64, Ordering::Relaxed);
    }

    fn record_batch_tx_submitted(&self) {
        self.txs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_batch_tx_failed(&self) {
        self.txs_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_blob_used_bytes(&self, bytes: usize) {
        self.blob_used_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_latest_l1_block(&self, block: BlockId) {
        self.latest_l1_block.store(block.number, Ordering::Relaxed);
    }

    fn record_unsafe_da_bytes(&self, bytes: u64) {
        self.unsafe_da_bytes.store(bytes, Ordering::Relaxed);
    }

    fn record_throttle_params(&self, params: &ThrottleParams) {
        let ppm = (params.intensity * 1_000_000.0) as u64;
        self.throttle_intensity_ppm.store(ppm, Ordering::Relaxed);
    }

    fn clear_all_state_metrics(&self) {
        self.pending_raw_bytes.store(0, Ordering::Relaxed);
        self.channel_queue_length.store(0, Ordering::Relaxed);
        self.unsafe_da_bytes.store(0, Ordering::Relaxed);
    }
}
