use async_trait::async_trait;

use blockstore_types::{EncodedValue, Revision};

use crate::contract::{Endorsement, Proposal, SubmittedTx};
use crate::error::LedgerResult;
use crate::transaction::{CommitReceipt, RemoteTransaction};

/// Commit boundary of the external transactional store.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Open an empty batch on behalf of the store named `origin`.
    fn begin(&self, origin: &str) -> RemoteTransaction {
        RemoteTransaction::new(origin)
    }

    /// Submit every queued write and wait for confirmation.
    ///
    /// On success all writes are durable and will reach the feed; on
    /// failure the caller must assume none did.
    async fn commit(&self, txn: RemoteTransaction) -> LedgerResult<CommitReceipt>;

    /// Read the current value of one key straight from the backend on
    /// behalf of `origin`.
    async fn read_entry(&self, origin: &str, key: &str) -> LedgerResult<Option<EncodedValue>>;
}

/// Wire-client capability of a permissioned ledger.
///
/// A named operation with positional string arguments moves through
/// endorsement, submission to ordering, and confirmation. Read-only
/// operations are only evaluated.
#[async_trait]
pub trait LedgerContract: Send + Sync {
    /// Run a read-only proposal on a peer and return its response bytes.
    async fn evaluate(&self, proposal: &Proposal) -> LedgerResult<Vec<u8>>;

    async fn endorse(&self, proposal: &Proposal) -> LedgerResult<Endorsement>;

    async fn submit(&self, endorsement: Endorsement) -> LedgerResult<SubmittedTx>;

    /// Wait until the submitted transaction is confirmed in a block.
    async fn commit_status(&self, submitted: &SubmittedTx) -> LedgerResult<Revision>;
}
