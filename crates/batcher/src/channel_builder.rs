//! Builds one channel: packs blocks, tracks timeouts and queues frames.

use alloy::primitives::Bytes;
use sluice_pipeline::{
    ChannelId,
    constants::{FRAME_OVERHEAD_SIZE, MAX_FRAME_NUMBER},
};

use crate::{
    block::BlockId,
    channel_config::ChannelConfig,
    channel_out::ChannelOut,
    error::{ChannelError, FullReason},
    sized_block::SizedBlock,
    tx_data::FrameData,
};

/// Packs blocks into a [`ChannelOut`] until it is full or times out, then
/// queues its frames for submission.
///
/// Three L1 timeouts apply and the earliest wins:
/// - duration: `opened_at + max_channel_duration`, when enabled,
/// - sequencing window: `l1_origin + seq_window_size - sub_safety_margin`
///   for every added block,
/// - consensus: `inclusion + channel_timeout - sub_safety_margin` for every
///   published frame.
#[derive(Debug)]
pub struct ChannelBuilder {
    config: ChannelConfig,
    channel_out: ChannelOut,
    blocks: Vec<SizedBlock>,
    latest_l1_origin: BlockId,
    oldest_l1_origin: BlockId,
    oldest_l2: BlockId,
    latest_l2: BlockId,
    timeout: u64,
    timeout_reason: Option<FullReason>,
    full_reason: Option<FullReason>,
    frames: Vec<FrameData>,
    frame_cursor: usize,
    num_frames: usize,
    output_bytes: usize,
}

impl ChannelBuilder {
    /// Creates a builder for a fresh channel. `l1_origin_number` is the L1
    /// origin of the last submitted block and starts the duration timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the compressor config is invalid.
    pub fn new(config: ChannelConfig, l1_origin_number: u64) -> Result<Self, ChannelError> {
        Ok(Self::with_channel_out(config, l1_origin_number, ChannelOut::new(&config.compressor)?))
    }

    /// Creates a builder around an existing channel out.
    pub fn with_channel_out(
        config: ChannelConfig,
        l1_origin_number: u64,
        channel_out: ChannelOut,
    ) -> Self {
        let mut builder = Self {
            config,
            channel_out,
            blocks: Vec::new(),
            latest_l1_origin: BlockId::default(),
            oldest_l1_origin: BlockId::default(),
            oldest_l2: BlockId::default(),
            latest_l2: BlockId::default(),
            timeout: 0,
            timeout_reason: None,
            full_reason: None,
            frames: Vec::new(),
            frame_cursor: 0,
            num_frames: 0,
            output_bytes: 0,
        };
        builder.update_duration_timeout(l1_origin_number);
        builder
    }

    /// The channel id.
    pub const fn id(&self) -> ChannelId {
        self.channel_out.id()
    }

    /// The config the channel is built with.
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Blocks added so far.
    pub fn blocks(&self) -> &[SizedBlock] {
        &self.blocks
    }

    /// Highest L1 origin of the added blocks.
    pub const fn latest_l1_origin(&self) -> BlockId {
        self.latest_l1_origin
    }

    /// Lowest L1 origin of the added blocks.
    pub const fn oldest_l1_origin(&self) -> BlockId {
        self.oldest_l1_origin
    }

    /// Lowest added L2 block.
    pub const fn oldest_l2(&self) -> BlockId {
        self.oldest_l2
    }

    /// Highest added L2 block.
    pub const fn latest_l2(&self) -> BlockId {
        self.latest_l2
    }

    /// L1 block number at which the channel times out, 0 if unset.
    pub const fn timeout(&self) -> u64 {
        self.timeout
    }

    /// Encoded batch bytes added.
    pub const fn input_bytes(&self) -> usize {
        self.channel_out.input_bytes()
    }

    /// Compressed bytes not yet framed.
    pub fn ready_bytes(&self) -> usize {
        self.channel_out.ready_bytes()
    }

    /// Encoded bytes of all frames produced.
    pub const fn output_bytes(&self) -> usize {
        self.output_bytes
    }

    /// Why the channel is full, if it is.
    pub const fn full_reason(&self) -> Option<FullReason> {
        self.full_reason
    }

    /// Returns `true` once the channel takes no more blocks.
    pub const fn is_full(&self) -> bool {
        self.full_reason.is_some()
    }

    fn set_full(&mut self, reason: FullReason) {
        self.full_reason = Some(reason);
    }

    /// Adds a block.
    ///
    /// A block that fills the compressor is still added and marks the
    /// channel full.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Full`] if the channel was already full or the
    /// block does not fit. Any other error comes from encoding or
    /// compression.
    pub fn add_block(&mut self, block: SizedBlock) -> Result<(), ChannelError> {
        if let Some(reason) = self.full_reason {
            return Err(ChannelError::Full(reason));
        }
        if let Err(err) = self.channel_out.add_block(&block) {
            if let Some(reason) = err.full_reason() {
                self.set_full(reason);
            }
            return Err(err);
        }

        let l1_origin = block.l1_origin;
        self.update_sw_timeout(l1_origin.number);
        if l1_origin.number > self.latest_l1_origin.number {
            self.latest_l1_origin = l1_origin;
        }
        if self.oldest_l1_origin.number == 0 || l1_origin.number < self.oldest_l1_origin.number {
            self.oldest_l1_origin = l1_origin;
        }
        let id = block.id();
        if id.number > self.latest_l2.number {
            self.latest_l2 = id;
        }
        if self.oldest_l2.number == 0 || id.number < self.oldest_l2.number {
            self.oldest_l2 = id;
        }
        self.blocks.push(block);

        if self.channel_out.is_full() {
            self.set_full(FullReason::CompressorFull);
        }
        Ok(())
    }

    /// Starts the consensus timeout for a frame included at `l1_block_num`.
    pub fn frame_published(&mut self, l1_block_num: u64) {
        let timeout =
            (l1_block_num + self.config.channel_timeout).saturating_sub(self.config.sub_safety_margin);
        self.update_timeout(timeout, FullReason::ChannelTimeoutClose);
    }

    fn update_duration_timeout(&mut self, l1_block_num: u64) {
        if self.config.max_channel_duration == 0 {
            return;
        }
        let timeout = l1_block_num + self.config.max_channel_duration;
        self.update_timeout(timeout, FullReason::MaxDurationReached);
    }

    fn update_sw_timeout(&mut self, l1_origin_number: u64) {
        let timeout = (l1_origin_number + self.config.seq_window_size)
            .saturating_sub(self.config.sub_safety_margin);
        self.update_timeout(timeout, FullReason::SeqWindowClose);
    }

    fn update_timeout(&mut self, timeout: u64, reason: FullReason) {
        if self.timeout == 0 || self.timeout > timeout {
            self.timeout = timeout;
            self.timeout_reason = Some(reason);
        }
    }

    /// Marks the channel full if `l1_head` reached the timeout.
    pub fn check_timeout(&mut self, l1_head: u64) {
        if self.timeout != 0 && l1_head >= self.timeout {
            if let Some(reason) = self.timeout_reason {
                self.set_full(reason);
            }
        }
    }

    /// Marks the channel full with [`FullReason::Terminated`] unless it is
    /// already full.
    pub fn close(&mut self) {
        if !self.is_full() {
            self.set_full(FullReason::Terminated);
        }
    }

    /// Produces frames. A full channel is closed and all its data framed;
    /// otherwise only frames of the maximum size are produced.
    ///
    /// # Errors
    ///
    /// Returns an error if framing or closing the compressor fails.
    pub fn output_frames(&mut self) -> Result<(), ChannelError> {
        if self.is_full() { self.close_and_output_all_frames() } else { self.output_ready_frames() }
    }

    fn output_ready_frames(&mut self) -> Result<(), ChannelError> {
        while self.channel_out.ready_bytes() + FRAME_OVERHEAD_SIZE >= self.config.max_frame_size {
            if self.output_frame()? || self.is_full() {
                break;
            }
        }
        Ok(())
    }

    fn close_and_output_all_frames(&mut self) -> Result<(), ChannelError> {
        match self.channel_out.close() {
            Ok(()) | Err(ChannelError::AlreadyClosed) => {}
            Err(err) => return Err(err),
        }
        while !self.output_frame()? {}
        Ok(())
    }

    /// Cuts one frame and queues it. Returns `true` for the last frame.
    fn output_frame(&mut self) -> Result<bool, ChannelError> {
        let frame = self.channel_out.output_frame(self.config.max_frame_size)?;
        if frame.number == MAX_FRAME_NUMBER {
            self.set_full(FullReason::MaxFrameIndex);
        }
        let data = Bytes::from(frame.encode());
        self.output_bytes += data.len();
        self.num_frames += 1;
        self.frames.push(FrameData { id: frame.frame_id(), data });
        Ok(frame.is_last)
    }

    /// Frames produced so far.
    pub const fn total_frames(&self) -> usize {
        self.num_frames
    }

    /// Returns `true` if a produced frame has not been handed out.
    pub const fn has_pending_frame(&self) -> bool {
        self.frame_cursor < self.frames.len()
    }

    /// Number of produced frames not yet handed out.
    pub const fn pending_frames(&self) -> usize {
        self.frames.len() - self.frame_cursor
    }

    /// Hands out the next frame.
    ///
    /// # Panics
    ///
    /// Panics if there is no pending frame.
    pub fn next_frame(&mut self) -> FrameData {
        let Some(frame) = self.frames.get(self.frame_cursor) else {
            panic!("no next frame");
        };
        self.frame_cursor += 1;
        frame.clone()
    }

    /// Moves the cursor back so `frame` is handed out again next.
    ///
    /// # Panics
    ///
    /// Panics if `frame` was never produced by this builder.
    pub fn rewind_frame_cursor(&mut self, frame: &FrameData) {
        let number = frame.id.frame_number as usize;
        assert!(
            frame.id.channel_id == self.id() && number < self.frames.len(),
            "cannot rewind to unknown frame"
        );
        self.frame_cursor = number;
    }
}
