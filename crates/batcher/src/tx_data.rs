//! Transaction payloads built from channel frames.

use std::fmt;

use alloy::primitives::Bytes;
use sluice_pipeline::{ChannelId, FrameId, constants::DERIVATION_VERSION};

/// One encoded frame and its address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameData {
    /// Channel and frame number.
    pub id: FrameId,
    /// The encoded frame.
    pub data: Bytes,
}

/// Identifies a transaction by the frames it carries.
///
/// Renders as `chid:0+1+2`, with `|` separating frames of different channels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(Vec<FrameId>);

impl TxId {
    /// Creates an id from frame ids.
    pub const fn new(frames: Vec<FrameId>) -> Self {
        Self(frames)
    }

    /// The frame ids.
    pub fn frames(&self) -> &[FrameId] {
        &self.0
    }

    /// Returns `true` if the id carries no frames.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut current: Option<ChannelId> = None;
        for frame in &self.0 {
            if current == Some(frame.channel_id) {
                write!(f, "+{}", frame.frame_number)?;
            } else {
                if current.is_some() {
                    write!(f, "|")?;
                }
                current = Some(frame.channel_id);
                write!(f, "{}:{}", frame.channel_id, frame.frame_number)?;
            }
        }
        Ok(())
    }
}

/// The frames of one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxData {
    frames: Vec<FrameData>,
    as_blob: bool,
}

impl TxData {
    /// Bundles `frames` into one transaction.
    pub const fn new(frames: Vec<FrameData>, as_blob: bool) -> Self {
        Self { frames, as_blob }
    }

    /// The transaction id.
    pub fn id(&self) -> TxId {
        TxId(self.frames.iter().map(|frame| frame.id).collect())
    }

    /// The frames, in order.
    pub fn frames(&self) -> &[FrameData] {
        &self.frames
    }

    /// Whether the frames go out as blobs.
    pub const fn as_blob(&self) -> bool {
        self.as_blob
    }

    /// Total encoded frame bytes.
    pub fn len(&self) -> usize {
        self.frames.iter().map(|frame| frame.data.len()).sum()
    }

    /// Returns `true` if there are no frame bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calldata payload: the version byte followed by every frame.
    pub fn call_data(&self) -> Bytes {
        let mut data = Vec::with_capacity(1 + self.len());
        data.push(DERIVATION_VERSION);
        for frame in &self.frames {
            data.extend_from_slice(&frame.data);
        }
        data.into()
    }

    /// Blob payloads: one version-prefixed frame per blob.
    pub fn blobs(&self) -> Vec<Bytes> {
        self.frames
            .iter()
            .map(|frame| {
                let mut data = Vec::with_capacity(1 + frame.data.len());
                data.push(DERIVATION_VERSION);
                data.extend_from_slice(&frame.data);
                Bytes::from(data)
            })
            .collect()
    }
}
