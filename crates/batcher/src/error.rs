//! Batcher error types.

use std::fmt;

use sluice_pipeline::CompressionError;
use sluice_txmgr::TxError;
use thiserror::Error;

/// Why a channel stopped accepting blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FullReason {
    /// The compressor reached its target output size.
    CompressorFull,
    /// The channel reached the RLP byte limit.
    TooManyRlpBytes,
    /// The channel ran out of frame numbers.
    MaxFrameIndex,
    /// The channel was open for `max_channel_duration` L1 blocks.
    MaxDurationReached,
    /// A published frame would not be included before the channel timeout.
    ChannelTimeoutClose,
    /// A block would fall out of the sequencing window.
    SeqWindowClose,
    /// The channel was closed on request.
    Terminated,
}

impl FullReason {
    /// Returns `true` when the channel filled up rather than timing out.
    pub const fn is_capacity(&self) -> bool {
        matches!(self, Self::CompressorFull | Self::TooManyRlpBytes | Self::MaxFrameIndex)
    }

    /// Returns `true` for the L1 block number based timeouts.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::MaxDurationReached | Self::ChannelTimeoutClose | Self::SeqWindowClose)
    }
}

impl fmt::Display for FullReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompressorFull => write!(f, "compressor is full"),
            Self::TooManyRlpBytes => write!(f, "batch would cause RLP bytes to go over limit"),
            Self::MaxFrameIndex => write!(f, "max frame index reached"),
            Self::MaxDurationReached => write!(f, "max channel duration reached"),
            Self::ChannelTimeoutClose => write!(f, "close to channel timeout"),
            Self::SeqWindowClose => write!(f, "close to sequencer window timeout"),
            Self::Terminated => write!(f, "channel terminated"),
        }
    }
}

/// Channel building errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The block's parent does not match the current tip.
    #[error("block does not extend existing chain")]
    Reorg,

    /// The channel does not accept more blocks.
    #[error("channel full: {0}")]
    Full(FullReason),

    /// Data was written to a closed channel.
    #[error("channel out already closed")]
    AlreadyClosed,

    /// The configured frame size cannot hold the frame header.
    #[error("max frame size {0} is smaller than the frame overhead")]
    FrameSizeTooSmall(usize),

    /// The compression stream failed.
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// A channel configuration is invalid.
    #[error("invalid channel config: {0}")]
    InvalidConfig(&'static str),
}

impl ChannelError {
    /// Returns the full reason if this is a [`ChannelError::Full`].
    pub const fn full_reason(&self) -> Option<FullReason> {
        match self {
            Self::Full(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Batcher driver errors.
#[derive(Debug, Clone, Error)]
pub enum BatcherError {
    /// An RPC collaborator failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Channel building failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The transaction manager failed.
    #[error("transaction manager error: {0}")]
    TxManager(#[from] TxError),

    /// The alt-DA server failed.
    #[error("alt-DA error: {0}")]
    AltDa(String),

    /// A blob sidecar could not be built.
    #[error("blob error: {0}")]
    Blob(String),

    /// A block range to load ends before it starts.
    #[error("invalid block range: start {start} > end {end}")]
    InvalidBlockRange {
        /// First block of the range.
        start: u64,
        /// Last block of the range.
        end: u64,
    },

    /// The sync status reported no L1 head.
    #[error("empty sync status")]
    EmptySyncStatus,

    /// `start` was called on a running batcher.
    #[error("batcher is already running")]
    AlreadyRunning,

    /// `stop` or `flush` was called on a stopped batcher.
    #[error("batcher is not running")]
    NotRunning,

    /// A configuration value is invalid.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl BatcherError {
    /// Classifies whether an error is retryable on the next tick.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::AltDa(_) | Self::EmptySyncStatus)
    }

    /// Classifies whether an error is fatal for the driver.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::InvalidBlockRange { .. })
    }

    /// Returns `true` if this wraps a [`ChannelError::Reorg`].
    pub const fn is_reorg(&self) -> bool {
        matches!(self, Self::Channel(ChannelError::Reorg))
    }
}
