use thiserror::Error;

use blockstore_ledger::{CommitFailure, LedgerError};
use blockstore_types::{DocPath, Revision};

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("datastore {0} is not initialized")]
    NotInitialized(String),

    #[error("datastore {0} is already initialized")]
    AlreadyInitialized(String),

    #[error("datastore {0} has no schema context; supply one before init")]
    SchemaContextMissing(String),

    #[error("datastore {0} is closed")]
    Closed(String),

    #[error("change trees rooted at {root} are not supported; only the document root is")]
    UnsupportedRootShape { root: DocPath },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("validation failed at {path}: {reason}")]
    Validation { path: DocPath, reason: String },

    #[error("commit failed: {0}")]
    CommitFailed(CommitFailure),

    #[error("cannot apply confirmed change {revision}: {reason}")]
    FeedApply { revision: Revision, reason: String },

    #[error("revision {revision} not reached within {timeout_ms}ms (mirror at {applied})")]
    SyncTimeout {
        revision: Revision,
        applied: Revision,
        timeout_ms: u64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tree error: {0}")]
    Tree(#[from] blockstore_tree::TreeError),

    #[error("feed error: {0}")]
    Feed(#[from] blockstore_feed::FeedError),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for DatastoreError {
    /// Transaction outcomes surface as `CommitFailed`; everything else the
    /// backend reports stays a ledger error.
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Commit(failure) => Self::CommitFailed(failure),
            other => Self::Ledger(other),
        }
    }
}

pub type DatastoreResult<T> = Result<T, DatastoreError>;
