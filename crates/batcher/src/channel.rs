//! A channel and the transactions carrying its frames.

use std::{collections::HashMap, sync::Arc};

use sluice_pipeline::ChannelId;
use tracing::{info, warn};

use crate::{
    block::BlockId,
    channel_builder::ChannelBuilder,
    channel_config::ChannelConfig,
    metrics::Metricer,
    tx_data::{TxData, TxId},
};

/// The view of a channel that sync reconciliation needs.
pub trait ChannelStatus {
    /// Highest L2 block in the channel.
    fn latest_l2(&self) -> BlockId;
    /// Highest L1 block a transaction of the channel was included in.
    fn max_inclusion_block(&self) -> u64;
    /// Returns `true` once every frame is confirmed and the channel is full.
    fn is_fully_submitted(&self) -> bool;
    /// Returns `true` if the inclusion span reached the channel timeout.
    fn is_timed_out(&self) -> bool;
}

/// A [`ChannelBuilder`] plus the transactions submitted for it.
pub struct Channel {
    builder: ChannelBuilder,
    metrics: Arc<dyn Metricer>,
    pending_transactions: HashMap<TxId, TxData>,
    confirmed_transactions: HashMap<TxId, BlockId>,
    min_inclusion_block: u64,
    max_inclusion_block: u64,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id())
            .field("pending_transactions", &self.pending_transactions.len())
            .field("confirmed_transactions", &self.confirmed_transactions.len())
            .field("min_inclusion_block", &self.min_inclusion_block)
            .field("max_inclusion_block", &self.max_inclusion_block)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Wraps a builder.
    pub fn new(builder: ChannelBuilder, metrics: Arc<dyn Metricer>) -> Self {
        Self {
            builder,
            metrics,
            pending_transactions: HashMap::new(),
            confirmed_transactions: HashMap::new(),
            min_inclusion_block: u64::MAX,
            max_inclusion_block: 0,
        }
    }

    /// The channel id.
    pub const fn id(&self) -> ChannelId {
        self.builder.id()
    }

    /// The config the channel is built with.
    pub const fn config(&self) -> &ChannelConfig {
        self.builder.config()
    }

    /// The underlying builder.
    pub const fn builder(&self) -> &ChannelBuilder {
        &self.builder
    }

    /// The underlying builder, mutably.
    pub const fn builder_mut(&mut self) -> &mut ChannelBuilder {
        &mut self.builder
    }

    /// Transactions sent and not yet confirmed or failed.
    pub fn pending_transactions(&self) -> usize {
        self.pending_transactions.len()
    }

    /// Confirmed transactions and their inclusion blocks.
    pub const fn confirmed_transactions(&self) -> &HashMap<TxId, BlockId> {
        &self.confirmed_transactions
    }

    /// Lowest inclusion block, `u64::MAX` before the first confirmation.
    pub const fn min_inclusion_block(&self) -> u64 {
        self.min_inclusion_block
    }

    /// Returns `true` if the channel owns the pending transaction `id`.
    pub fn has_pending_tx(&self, id: &TxId) -> bool {
        self.pending_transactions.contains_key(id)
    }

    /// Returns `true` if the channel owns the confirmed transaction `id`.
    pub fn has_confirmed_tx(&self, id: &TxId) -> bool {
        self.confirmed_transactions.contains_key(id)
    }

    /// Puts the frames of a failed transaction back in line.
    pub fn tx_failed(&mut self, id: &TxId) {
        if let Some(data) = self.pending_transactions.remove(id) {
            if let Some(first) = data.frames().first() {
                self.builder.rewind_frame_cursor(first);
            }
        } else {
            warn!(channel_id = %self.id(), tx_id = %id, "unknown transaction marked as failed");
        }
        self.metrics.record_batch_tx_failed();
    }

    /// Records that transaction `id` was included in `inclusion_block`.
    ///
    /// Returns `true` if the channel has now timed out and must be
    /// resubmitted.
    pub fn tx_confirmed(&mut self, id: &TxId, inclusion_block: BlockId) -> bool {
        self.metrics.record_batch_tx_submitted();
        if self.pending_transactions.remove(id).is_none() {
            warn!(
                channel_id = %self.id(),
                tx_id = %id,
                "unknown transaction marked as confirmed"
            );
            return false;
        }
        self.confirmed_transactions.insert(id.clone(), inclusion_block);
        self.builder.frame_published(inclusion_block.number);
        self.min_inclusion_block = self.min_inclusion_block.min(inclusion_block.number);
        self.max_inclusion_block = self.max_inclusion_block.max(inclusion_block.number);

        if self.is_fully_submitted() {
            self.metrics.record_channel_fully_submitted(self.id());
            info!(
                id = %self.id(),
                min_inclusion_block = self.min_inclusion_block,
                max_inclusion_block = self.max_inclusion_block,
                "Channel is fully submitted"
            );
        }
        if self.is_timed_out() {
            self.metrics.record_channel_timed_out(self.id());
            warn!(
                id = %self.id(),
                min_inclusion_block = self.min_inclusion_block,
                max_inclusion_block = self.max_inclusion_block,
                "Channel timed out"
            );
            return true;
        }
        false
    }

    /// Returns `true` if no transaction was ever sent for the channel.
    pub fn none_submitted(&self) -> bool {
        self.confirmed_transactions.is_empty() && self.pending_transactions.is_empty()
    }

    /// Returns `true` if a transaction's worth of frames is ready.
    ///
    /// Calldata channels and full channels need one frame. Open blob
    /// channels wait for a full transaction.
    pub const fn has_tx_data(&self) -> bool {
        if self.builder.is_full() || !self.config().use_blobs {
            return self.builder.has_pending_frame();
        }
        self.builder.pending_frames() >= self.config().max_frames_per_tx()
    }

    /// Takes the next transaction's frames and marks it pending.
    pub fn next_tx_data(&mut self) -> TxData {
        let max = self.config().max_frames_per_tx();
        let mut frames = Vec::with_capacity(max);
        while frames.len() < max && self.builder.has_pending_frame() {
            frames.push(self.builder.next_frame());
        }
        let data = TxData::new(frames, self.config().use_blobs);
        self.pending_transactions.insert(data.id(), data.clone());
        data
    }
}

impl ChannelStatus for Channel {
    fn latest_l2(&self) -> BlockId {
        self.builder.latest_l2()
    }

    fn max_inclusion_block(&self) -> u64 {
        self.max_inclusion_block
    }

    fn is_fully_submitted(&self) -> bool {
        self.builder.is_full()
            && self.pending_transactions.len() + self.builder.pending_frames() == 0
    }

    fn is_timed_out(&self) -> bool {
        !self.confirmed_transactions.is_empty()
            && self.max_inclusion_block - self.min_inclusion_block >= self.config().channel_timeout
    }
}
