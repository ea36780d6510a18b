use blockstore_feed::LedgerWrite;
use blockstore_types::{EncodedValue, Revision, TransactionId};

/// One batch of ledger writes, built locally and committed as a unit.
///
/// Queuing a put or delete has no remote effect; nothing leaves the process
/// until the batch is handed to [`TransactionalStore::commit`]. Dropping an
/// uncommitted transaction abandons it.
///
/// [`TransactionalStore::commit`]: crate::TransactionalStore::commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTransaction {
    id: TransactionId,
    origin: String,
    writes: Vec<LedgerWrite>,
}

impl RemoteTransaction {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            id: TransactionId::new(),
            origin: origin.into(),
            writes: Vec::new(),
        }
    }

    pub fn put(&mut self, key: impl Into<String>, value: EncodedValue) {
        self.writes.push(LedgerWrite::put(key, value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.push(LedgerWrite::delete(key));
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    /// Name of the store that opened the transaction.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Queued writes, in submission order.
    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_parts(self) -> (TransactionId, String, Vec<LedgerWrite>) {
        (self.id, self.origin, self.writes)
    }
}

/// Acknowledgement of a committed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    pub tx_id: TransactionId,
    /// Revision at which the last write of the batch was confirmed. The
    /// change becomes visible locally once the feed delivers this revision.
    pub revision: Revision,
    pub operations: usize,
}
