//! Compressed batch stream of one channel.

use std::fmt;

use sluice_pipeline::{
    ChannelId, Frame,
    constants::{FRAME_OVERHEAD_SIZE, MAX_FRAME_NUMBER, MAX_RLP_BYTES_PER_CHANNEL},
};

use crate::{
    batch::SingularBatch,
    block::L2Block,
    compressor::{BatchCompressor, CompressorConfig, new_batch_compressor},
    error::{ChannelError, FullReason},
};

/// Encodes blocks as singular batches into a compression stream and cuts the
/// compressed output into frames.
pub struct ChannelOut {
    id: ChannelId,
    compressor: Box<dyn BatchCompressor>,
    rlp_length: usize,
    closed: bool,
    next_frame: u32,
}

impl fmt::Debug for ChannelOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOut")
            .field("id", &self.id)
            .field("rlp_length", &self.rlp_length)
            .field("ready_bytes", &self.compressor.len())
            .field("closed", &self.closed)
            .field("next_frame", &self.next_frame)
            .finish_non_exhaustive()
    }
}

impl ChannelOut {
    /// Creates a channel with a random id.
    ///
    /// # Errors
    ///
    /// Returns an error if the compressor config is invalid.
    pub fn new(config: &CompressorConfig) -> Result<Self, ChannelError> {
        Ok(Self::with_compressor(ChannelId::random(), new_batch_compressor(config)?))
    }

    /// Creates a channel with the given id and compressor.
    pub fn with_compressor(id: ChannelId, compressor: Box<dyn BatchCompressor>) -> Self {
        Self { id, compressor, rlp_length: 0, closed: false, next_frame: 0 }
    }

    /// The channel id.
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Encoded batch bytes written so far.
    pub const fn input_bytes(&self) -> usize {
        self.rlp_length
    }

    /// Compressed bytes waiting to be framed.
    pub fn ready_bytes(&self) -> usize {
        self.compressor.len()
    }

    /// Returns `true` once the compressor takes no more data.
    pub fn is_full(&self) -> bool {
        self.compressor.is_full()
    }

    /// Returns `true` once the stream is closed.
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Appends `block` as a singular batch.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::AlreadyClosed`] after [`close`](Self::close).
    /// - [`ChannelError::Full`] with [`FullReason::TooManyRlpBytes`] if the
    ///   batch would exceed the per channel RLP limit.
    /// - [`ChannelError::Full`] with [`FullReason::CompressorFull`] if the
    ///   compressor rejects the batch.
    pub fn add_block(&mut self, block: &L2Block) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::AlreadyClosed);
        }
        let encoded = SingularBatch::from_block(block).encode_envelope();
        if self.rlp_length + encoded.len() > MAX_RLP_BYTES_PER_CHANNEL {
            return Err(ChannelError::Full(FullReason::TooManyRlpBytes));
        }
        self.compressor.write(&encoded)?;
        self.rlp_length += encoded.len();
        Ok(())
    }

    /// Flushes the compressor so all written data is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the compressor fails.
    pub fn flush(&mut self) -> Result<(), ChannelError> {
        self.compressor.flush()
    }

    /// Closes the stream.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::AlreadyClosed`] on a second call.
    pub fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::AlreadyClosed);
        }
        self.closed = true;
        self.compressor.close()
    }

    /// Cuts the next frame of at most `max_size` encoded bytes.
    ///
    /// The frame is the last one when the channel is closed and all ready
    /// data fits.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::FrameSizeTooSmall`] if `max_size` cannot hold data.
    /// - [`ChannelError::Full`] with [`FullReason::MaxFrameIndex`] when the
    ///   frame numbers are exhausted.
    pub fn output_frame(&mut self, max_size: usize) -> Result<Frame, ChannelError> {
        if max_size <= FRAME_OVERHEAD_SIZE {
            return Err(ChannelError::FrameSizeTooSmall(max_size));
        }
        let number = u16::try_from(self.next_frame)
            .map_err(|_| ChannelError::Full(FullReason::MaxFrameIndex))?;

        let ready = self.compressor.len();
        let mut data_len = max_size - FRAME_OVERHEAD_SIZE;
        let mut is_last = false;
        if data_len >= ready {
            data_len = ready;
            is_last = self.closed;
        }
        let mut data = vec![0u8; data_len];
        let read = self.compressor.read(&mut data);
        data.truncate(read);

        self.next_frame += 1;
        Ok(Frame { id: self.id, number, data, is_last })
    }

    /// Returns `true` once the last frame number was handed out.
    pub const fn frames_exhausted(&self) -> bool {
        self.next_frame > MAX_FRAME_NUMBER as u32
    }
}
