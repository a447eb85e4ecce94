//! Channel frames and their binary encoding.

use std::fmt;

use alloy::hex;

use crate::{
    CodecError,
    constants::{CHANNEL_ID_LENGTH, DERIVATION_VERSION, FRAME_OVERHEAD_SIZE, MAX_FRAME_DATA_LENGTH},
};

/// Opaque 16 byte channel identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub [u8; CHANNEL_ID_LENGTH]);

impl ChannelId {
    /// Generates a new random channel id.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Returns the raw id bytes.
    pub const fn as_bytes(&self) -> &[u8; CHANNEL_ID_LENGTH] {
        &self.0
    }
}

impl From<[u8; CHANNEL_ID_LENGTH]> for ChannelId {
    fn from(bytes: [u8; CHANNEL_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({self})")
    }
}

/// Address of a frame: the owning channel and the frame's position in it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId {
    /// Channel the frame belongs to.
    pub channel_id: ChannelId,
    /// Zero based frame index within the channel.
    pub frame_number: u16,
}

impl FrameId {
    /// Creates a new frame id.
    pub const fn new(channel_id: ChannelId, frame_number: u16) -> Self {
        Self { channel_id, frame_number }
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.frame_number)
    }
}

/// A bounded slice of a channel's compressed byte stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    /// Owning channel.
    pub id: ChannelId,
    /// Frame number within the channel.
    pub number: u16,
    /// Compressed channel bytes carried by this frame.
    pub data: Vec<u8>,
    /// Whether this is the final frame of the channel.
    pub is_last: bool,
}

impl Frame {
    /// Returns the [`FrameId`] of this frame.
    pub const fn frame_id(&self) -> FrameId {
        FrameId::new(self.id, self.number)
    }

    /// Returns the encoded length of the frame.
    pub const fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD_SIZE + self.data.len()
    }

    /// Appends the binary encoding of the frame to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(&self.number.to_be_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out.push(self.is_last as u8);
    }

    /// Returns the binary encoding of the frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decodes a single frame from the front of `data`.
    ///
    /// Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the input is truncated, declares an
    /// oversized data section, or carries an invalid `is_last` byte.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), CodecError> {
        if data.len() < FRAME_OVERHEAD_SIZE {
            return Err(CodecError::Truncated(data.len()));
        }

        let mut id = [0u8; CHANNEL_ID_LENGTH];
        id.copy_from_slice(&data[..CHANNEL_ID_LENGTH]);
        let mut offset = CHANNEL_ID_LENGTH;

        let number = u16::from_be_bytes([data[offset], data[offset + 1]]);
        offset += 2;

        let data_len = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;

        if data_len > MAX_FRAME_DATA_LENGTH {
            return Err(CodecError::FrameTooLarge { size: data_len, max: MAX_FRAME_DATA_LENGTH });
        }
        if data.len() < offset + data_len + 1 {
            return Err(CodecError::Truncated(data.len()));
        }

        let frame_data = data[offset..offset + data_len].to_vec();
        offset += data_len;

        let is_last = match data[offset] {
            0 => false,
            1 => true,
            other => return Err(CodecError::InvalidIsLast(other)),
        };
        offset += 1;

        Ok((Self { id: ChannelId(id), number, data: frame_data, is_last }, offset))
    }
}

/// Parses a transaction payload (`version || frame*`) into its frames.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for an empty payload or one without frames,
/// [`CodecError::InvalidVersion`] for an unknown version byte, and any error
/// from [`Frame::decode`].
pub fn parse_frames(payload: &[u8]) -> Result<Vec<Frame>, CodecError> {
    let (&version, mut rest) = payload.split_first().ok_or(CodecError::Empty)?;
    if version != DERIVATION_VERSION {
        return Err(CodecError::InvalidVersion(version));
    }

    let mut frames = Vec::new();
    while !rest.is_empty() {
        let (frame, consumed) = Frame::decode(rest)?;
        frames.push(frame);
        rest = &rest[consumed..];
    }

    if frames.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn sample_frame(is_last: bool) -> Frame {
        Frame { id: ChannelId([0xaa; 16]), number: 0x0102, data: vec![1, 2, 3], is_last }
    }

    #[test]
    fn frame_encoding_layout() {
        let encoded = sample_frame(true).encode();
        let mut expected = vec![0xaa; 16];
        expected.extend_from_slice(&[0x01, 0x02]);
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x03]);
        expected.extend_from_slice(&[1, 2, 3]);
        expected.push(1);
        assert_eq!(encoded, expected);
        assert_eq!(encoded.len(), sample_frame(true).encoded_len());
    }

    #[test]
    fn frame_decode_fixture() {
        let mut fixture = vec![0x11; 16];
        fixture.extend_from_slice(&[0x00, 0x05, 0x00, 0x00, 0x00, 0x02, 0xde, 0xad, 0x00]);
        let (frame, consumed) = Frame::decode(&fixture).unwrap();
        assert_eq!(consumed, fixture.len());
        assert_eq!(frame.id, ChannelId([0x11; 16]));
        assert_eq!(frame.number, 5);
        assert_eq!(frame.data, vec![0xde, 0xad]);
        assert!(!frame.is_last);
    }

    #[rstest]
    #[case(vec![0u8; 10], CodecError::Truncated(10), "shorter than overhead")]
    #[case(
        {
            let mut d = vec![0u8; 18];
            d.extend_from_slice(&[0, 0, 0, 9]);
            d.push(0);
            d
        },
        CodecError::Truncated(23),
        "declared data missing"
    )]
    #[case(
        {
            let mut d = vec![0u8; 18];
            d.extend_from_slice(&[0, 0, 0, 0]);
            d.push(2);
            d
        },
        CodecError::InvalidIsLast(2),
        "bad is_last byte"
    )]
    #[case(
        {
            let mut d = vec![0u8; 18];
            d.extend_from_slice(&(2_000_000u32).to_be_bytes());
            d.push(0);
            d
        },
        CodecError::FrameTooLarge { size: 2_000_000, max: MAX_FRAME_DATA_LENGTH },
        "oversized data"
    )]
    fn frame_decode_errors(
        #[case] input: Vec<u8>,
        #[case] expected: CodecError,
        #[case] _description: &str,
    ) {
        assert_eq!(Frame::decode(&input).unwrap_err(), expected);
    }

    #[test]
    fn parse_frames_reads_multiple_frames() {
        let first = sample_frame(false);
        let second = Frame { number: 0x0103, is_last: true, ..sample_frame(true) };
        let mut payload = vec![DERIVATION_VERSION];
        first.encode_into(&mut payload);
        second.encode_into(&mut payload);

        let frames = parse_frames(&payload).unwrap();
        assert_eq!(frames, vec![first, second]);
    }

    #[rstest]
    #[case(vec![], CodecError::Empty, "empty payload")]
    #[case(vec![DERIVATION_VERSION], CodecError::Empty, "version only")]
    #[case(vec![0x01, 0x00], CodecError::InvalidVersion(1), "unknown version")]
    fn parse_frames_errors(
        #[case] payload: Vec<u8>,
        #[case] expected: CodecError,
        #[case] _description: &str,
    ) {
        assert_eq!(parse_frames(&payload).unwrap_err(), expected);
    }

    #[test]
    fn frame_id_display() {
        let id = FrameId::new(ChannelId([0x01; 16]), 7);
        assert_eq!(id.to_string(), format!("{}:7", "01".repeat(16)));
    }

    #[test]
    fn random_channel_ids_differ() {
        assert_ne!(ChannelId::random(), ChannelId::random());
    }
}
