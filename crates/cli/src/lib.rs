#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/sluice/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod batcher;
pub use batcher::{BatcherArgs, DataAvailabilityType};

mod compression;
pub use compression::{CompressionAlgorithm, CompressorType};

mod signal;
pub use signal::shutdown_signal;

mod throttle;
pub use throttle::ThrottleArgs;

mod tracing;
pub use tracing::{init_tracing, verbosity_level};

mod txmgr;
pub use txmgr::TxMgrArgs;
