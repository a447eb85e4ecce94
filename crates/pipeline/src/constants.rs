//! Protocol constants.

/// Version byte prefixed to every batcher transaction payload.
pub const DERIVATION_VERSION: u8 = 0x00;

/// Length of a channel identifier in bytes.
pub const CHANNEL_ID_LENGTH: usize = 16;

/// Fixed per-frame overhead: id (16) + frame number (2) + data length (4) + is_last (1).
pub const FRAME_OVERHEAD_SIZE: usize = CHANNEL_ID_LENGTH + 2 + 4 + 1;

/// Largest frame data length accepted by the decoder.
pub const MAX_FRAME_DATA_LENGTH: usize = 1_000_000;

/// Highest frame number a channel may emit.
pub const MAX_FRAME_NUMBER: u16 = u16::MAX;

/// Upper bound on the RLP-encoded batch bytes a single channel may hold.
pub const MAX_RLP_BYTES_PER_CHANNEL: usize = 100_000_000;

/// Usable bytes of one blob when encoded with the simple blob coder.
///
/// The first field element carries the payload length, every other field
/// element carries 31 bytes of data.
pub const MAX_BLOB_DATA_SIZE: usize = (4096 - 1) * 31;

/// Channel version byte that prefixes a brotli compressed channel.
pub const CHANNEL_VERSION_BROTLI: u8 = 0x01;

/// Blob gas consumed per blob.
pub const BLOB_GAS_PER_BLOB: u64 = 131_072;

/// Intrinsic gas of a plain transaction.
pub const TX_GAS: u64 = 21_000;

/// Batch type byte of a singular batch.
pub const SINGULAR_BATCH_TYPE: u8 = 0x00;
