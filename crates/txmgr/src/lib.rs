#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/sluice/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod backend;
pub use backend::{EthBackend, HeaderInfo, ProviderBackend};

pub mod candidate;
pub use candidate::{TxCandidate, TxReceipt};

pub mod config;
pub use config::{GWEI, TxManagerConfig, TxManagerConfigBuilder, gwei_to_wei};

pub mod error;
pub use error::{Retryable, SendError, SendErrorKind, TxError};

pub mod gas;
pub use gas::{GasCaps, GasPriceCaps};

pub mod manager;
pub use manager::{SendResponse, TxManager, is_confirmed};

pub mod nonce;
pub use nonce::NonceTracker;

pub mod queue;
pub use queue::{Queue, SendResult};

pub mod signer;
pub use signer::{SignedTx, TxSigner, WalletSigner};

pub mod state;
pub use state::SendState;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
