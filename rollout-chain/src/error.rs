//! Error types for rollout-chain.

use thiserror::Error;

use rollout_core::error::AbiError;
use rollout_core::H256;

/// Raw failure reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never reached a node, or it is safe to repeat.
    /// The only retryable kind.
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),

    /// A transaction submission failed after the node may have accepted it.
    /// Resending could submit it twice.
    #[error("submission outcome unknown: {0}")]
    Indeterminate(String),

    /// The node refused the transaction because execution reverted.
    #[error("rejected: {message}")]
    Rejected { message: String },

    /// Any other protocol-level error.
    #[error("{0}")]
    Rpc(String),
}

/// All errors that can arise from sequencing transactions.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The transaction was mined with a failed status or refused by the node.
    #[error("{method} on {target} reverted: {reason}")]
    ExecutionReverted {
        target: String,
        method: String,
        reason: String,
    },

    /// No log in the receipt carries the rule's signature topic.
    #[error("event {event} not found in receipt")]
    EventNotFound { event: String },

    /// A log matched the signature topic but not the declared layout.
    #[error("malformed {event} log: {reason}")]
    MalformedLog { event: String, reason: String },

    #[error("transport to {endpoint} unavailable after {attempts} attempts: {message}")]
    TransportUnavailable {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    #[error("RPC error from {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    /// Not retried: check the chain for the transaction before rerunning.
    #[error("{method} on {target} may have been submitted to {endpoint}: {message}")]
    SubmissionUnknown {
        endpoint: String,
        target: String,
        method: String,
        message: String,
    },

    #[error("transaction {tx} not confirmed in time")]
    ConfirmationTimeout { tx: H256 },

    #[error("endpoint reports chain {actual}, environment expects {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    /// Arguments did not match the method or constructor inputs.
    #[error("{0}")]
    Abi(#[from] AbiError),
}
