use std::time::Duration;

use blockstore_types::TransactionId;

use crate::config::Phase;
use crate::contract::OperationName;

/// Why a remote transaction did not become durable.
///
/// Always surfaced to the caller as the outcome of the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitFailure {
    /// The backend's endorsement policy rejected the proposal.
    #[error("endorsement failed: {reason}")]
    EndorsementFailed { reason: String },

    /// The endorsed transaction could not be handed to the ordering service.
    #[error("submission failed: {reason}")]
    SubmissionFailed { reason: String },

    /// A phase did not finish within its deadline.
    #[error("{phase} did not complete within {}ms", deadline.as_millis())]
    CommitTimeout { phase: Phase, deadline: Duration },
}

impl CommitFailure {
    /// Endorsement rejections are policy decisions; resubmitting the same
    /// proposal cannot change them.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::EndorsementFailed { .. })
    }
}

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("commit failed: {0}")]
    Commit(#[from] CommitFailure),

    #[error("transaction {0} has no operations")]
    EmptyTransaction(TransactionId),

    #[error("{operation} expects {expected} arguments, got {got}")]
    InvalidArguments {
        operation: OperationName,
        expected: usize,
        got: usize,
    },

    #[error("malformed {operation} response: {reason}")]
    MalformedResponse {
        operation: OperationName,
        reason: String,
    },

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("integrity violation at block {number}: {reason}")]
    IntegrityViolation { number: u64, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger state lock poisoned")]
    StatePoisoned,
}

/// Convenience alias used throughout the ledger crate.
pub type LedgerResult<T> = Result<T, LedgerError>;
