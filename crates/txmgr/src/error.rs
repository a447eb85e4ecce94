//! Transaction manager error types.

use thiserror::Error;

/// Classification of a failed `send_transaction` call.
///
/// Produced once at the backend boundary from the node's error message; the
/// send loop only ever switches on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendErrorKind {
    /// The account nonce has already been used.
    NonceTooLow,
    /// The exact transaction is already in the pool.
    AlreadyKnown,
    /// The pool holds a transaction of a different type for this account.
    AlreadyReserved,
    /// A replacement did not bump fees enough.
    ReplacementUnderpriced,
    /// The transaction fees are below the pool minimum.
    Underpriced,
    /// The account cannot pay for the transaction.
    InsufficientFunds,
    /// The request was cancelled before completion.
    Cancelled,
    /// Anything else.
    Other,
}

impl SendErrorKind {
    /// Classifies a node error message.
    pub fn classify(msg: &str) -> Self {
        let lower = msg.to_lowercase();

        if lower.contains("replacement transaction underpriced") {
            Self::ReplacementUnderpriced
        } else if lower.contains("underpriced") {
            Self::Underpriced
        } else if lower.contains("nonce too low") {
            Self::NonceTooLow
        } else if lower.contains("already reserved") {
            Self::AlreadyReserved
        } else if lower.contains("already known") {
            Self::AlreadyKnown
        } else if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
            Self::InsufficientFunds
        } else if lower.contains("context canceled") || lower.contains("cancelled") {
            Self::Cancelled
        } else {
            Self::Other
        }
    }

    /// Returns `true` if the send should be retried immediately with bumped fees.
    pub const fn needs_fee_bump(&self) -> bool {
        matches!(self, Self::ReplacementUnderpriced | Self::Underpriced)
    }
}

/// A rejected `send_transaction` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SendError {
    /// What went wrong.
    pub kind: SendErrorKind,
    /// The node's error message.
    pub message: String,
}

impl SendError {
    /// Creates a send error with an explicit kind.
    pub fn new(kind: SendErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Classifies a node error message into a send error.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { kind: SendErrorKind::classify(&message), message }
    }
}

/// Transaction manager errors.
#[derive(Debug, Clone, Error)]
pub enum TxError {
    /// RPC error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Publishing the transaction failed.
    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    /// Nonce too low count exceeded threshold.
    #[error("Nonce too low count exceeded threshold")]
    NonceTooLowAbort,

    /// Transaction not in mempool after timeout.
    #[error("Transaction not in mempool after timeout")]
    NotInMempool,

    /// Transaction type conflict: already reserved.
    #[error("Transaction type conflict: already reserved")]
    AlreadyReserved,

    /// A bumped execution fee exceeds the configured multiple of the suggestion.
    #[error("Bumped {name} {bumped} is over {multiplier}x multiple of the suggested value")]
    FeeLimitExceeded {
        /// Which fee was exceeded.
        name: &'static str,
        /// The bumped value.
        bumped: u128,
        /// The configured multiplier.
        multiplier: u64,
    },

    /// A bumped blob fee cap exceeds the configured multiple of the suggestion.
    #[error("Blob fee cap {bumped} is over {multiplier}x multiple of the suggested value")]
    BlobFeeLimitExceeded {
        /// The bumped blob fee cap.
        bumped: u128,
        /// The configured multiplier.
        multiplier: u64,
    },

    /// The node did not report a blob base fee.
    #[error("Blob base fee unavailable")]
    MissingBlobBaseFee,

    /// The node did not report a base fee.
    #[error("Pre-london blocks without a base fee are not supported")]
    MissingBaseFee,

    /// Signing error.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Gas estimation failed.
    #[error("Gas estimation failed: {0}")]
    GasEstimation(String),

    /// The send was cancelled.
    #[error("Send cancelled")]
    Cancelled,

    /// The overall send deadline elapsed.
    #[error("Send timed out")]
    Timeout,

    /// The manager has been closed.
    #[error("Transaction manager closed")]
    Closed,

    /// Invalid configuration.
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),
}

impl TxError {
    /// Returns `true` if this error came from a fee limit check.
    pub const fn is_fee_limit(&self) -> bool {
        matches!(self, Self::FeeLimitExceeded { .. } | Self::BlobFeeLimitExceeded { .. })
    }
}

/// Trait for determining if an error is retryable.
pub trait Retryable {
    /// Returns true if the error is retryable.
    fn is_retryable(&self) -> bool;
}

impl Retryable for TxError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(_) | Self::GasEstimation(_) | Self::Timeout => true,
            Self::Send(err) => err.kind.needs_fee_bump() || err.kind == SendErrorKind::Other,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("transaction underpriced", SendErrorKind::Underpriced)]
    #[case("replacement transaction underpriced", SendErrorKind::ReplacementUnderpriced)]
    #[case(
        "failed to send transaction: replacement transaction underpriced",
        SendErrorKind::ReplacementUnderpriced
    )]
    #[case("NONCE TOO LOW", SendErrorKind::NonceTooLow)]
    #[case("address already reserved", SendErrorKind::AlreadyReserved)]
    #[case("already known", SendErrorKind::AlreadyKnown)]
    #[case("insufficient funds for gas * price + value", SendErrorKind::InsufficientFunds)]
    #[case("context canceled", SendErrorKind::Cancelled)]
    #[case("connection refused", SendErrorKind::Other)]
    #[case("", SendErrorKind::Other)]
    fn send_error_kind_classify(#[case] msg: &str, #[case] expected: SendErrorKind) {
        assert_eq!(SendErrorKind::classify(msg), expected);
    }

    #[test]
    fn send_error_keeps_message() {
        let err = SendError::from_message("nonce too low: next nonce 5");
        assert_eq!(err.kind, SendErrorKind::NonceTooLow);
        assert_eq!(err.to_string(), "nonce too low: next nonce 5");
        assert_eq!(
            TxError::from(err).to_string(),
            "Send failed: nonce too low: next nonce 5"
        );
    }

    #[rstest]
    #[case(TxError::Rpc("test error".to_string()), true)]
    #[case(TxError::Send(SendError::new(SendErrorKind::Underpriced, "x")), true)]
    #[case(TxError::Send(SendError::new(SendErrorKind::Other, "x")), true)]
    #[case(TxError::Send(SendError::new(SendErrorKind::NonceTooLow, "x")), false)]
    #[case(TxError::NonceTooLowAbort, false)]
    #[case(TxError::NotInMempool, false)]
    #[case(TxError::AlreadyReserved, false)]
    #[case(TxError::BlobFeeLimitExceeded { bumped: 100, multiplier: 5 }, false)]
    #[case(TxError::Timeout, true)]
    #[case(TxError::Closed, false)]
    #[case(TxError::Signing("test".to_string()), false)]
    fn tx_error_is_retryable(#[case] error: TxError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }

    #[rstest]
    #[case(TxError::Rpc("connection timeout".to_string()), "RPC error: connection timeout")]
    #[case(TxError::NonceTooLowAbort, "Nonce too low count exceeded threshold")]
    #[case(TxError::NotInMempool, "Transaction not in mempool after timeout")]
    #[case(
        TxError::FeeLimitExceeded { name: "tip cap", bumped: 60, multiplier: 5 },
        "Bumped tip cap 60 is over 5x multiple of the suggested value"
    )]
    #[case(
        TxError::BlobFeeLimitExceeded { bumped: 100, multiplier: 5 },
        "Blob fee cap 100 is over 5x multiple of the suggested value"
    )]
    #[case(TxError::Closed, "Transaction manager closed")]
    #[case(TxError::InvalidConfig("x must not be 0"), "Invalid config: x must not be 0")]
    fn tx_error_display(#[case] error: TxError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn fee_limit_errors() {
        assert!(TxError::FeeLimitExceeded { name: "fee cap", bumped: 1, multiplier: 1 }
            .is_fee_limit());
        assert!(TxError::BlobFeeLimitExceeded { bumped: 1, multiplier: 1 }.is_fee_limit());
        assert!(!TxError::Timeout.is_fee_limit());
    }
}
