#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/sluice/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod compressor;
pub use compressor::{ChannelCompressor, CompressionAlgo, CompressionConfig, CompressionError};

mod error;
pub use error::CodecError;

mod frame;
pub use frame::{ChannelId, Frame, FrameId, parse_frames};

pub mod constants;
