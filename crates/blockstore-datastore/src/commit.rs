use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use blockstore_ledger::TransactionalStore;
use blockstore_tree::ChangeTree;
use blockstore_types::{Revision, TransactionId};

use crate::codec::{KeyCodec, ValueCodec};
use crate::error::DatastoreResult;
use crate::translate::CommitTranslator;

/// Result of committing one write transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    /// `None` when there was nothing to send.
    pub tx_id: Option<TransactionId>,
    /// Ledger revision that confirms the transaction. Wait for it with
    /// `sync` to read the result locally.
    pub revision: Option<Revision>,
    pub operations: usize,
}

impl CommitOutcome {
    pub fn noop() -> Self {
        Self {
            tx_id: None,
            revision: None,
            operations: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.tx_id.is_none()
    }
}

/// The commit path of one store: translate, then submit one remote
/// transaction. It produces outbound transactions only; the mirror changes
/// when the feed confirms them.
pub struct CommitPipeline {
    name: String,
    keys: KeyCodec,
    values: ValueCodec,
    backend: Arc<dyn TransactionalStore>,
    gate: Arc<Mutex<()>>,
}

impl CommitPipeline {
    pub fn new(
        name: impl Into<String>,
        keys: KeyCodec,
        values: ValueCodec,
        backend: Arc<dyn TransactionalStore>,
        gate: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            name: name.into(),
            keys,
            values,
            backend,
            gate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &KeyCodec {
        &self.keys
    }

    pub fn values(&self) -> &ValueCodec {
        &self.values
    }

    pub fn backend(&self) -> &Arc<dyn TransactionalStore> {
        &self.backend
    }

    /// Commit `tree` as one remote transaction.
    ///
    /// Translation completes before the backend is contacted, so a tree that
    /// cannot be translated costs no remote call. Commits sharing a gate run
    /// one at a time.
    pub async fn commit(&self, tree: &ChangeTree) -> DatastoreResult<CommitOutcome> {
        debug!(store = %self.name, "committing change tree\n{tree}");

        let ops = CommitTranslator::new(&self.values).translate(tree)?;
        if ops.is_empty() {
            debug!(store = %self.name, "change tree has no operations; nothing to commit");
            return Ok(CommitOutcome::noop());
        }

        let _gate = self.gate.lock().await;
        let mut txn = self.backend.begin(&self.name);
        for op in ops {
            let key = self.keys.encode(&op.path);
            match op.value {
                Some(value) => {
                    info!(store = %self.name, tx = %txn.id().short_id(), %key, bytes = value.len(), "put");
                    txn.put(key, value);
                }
                None => {
                    info!(store = %self.name, tx = %txn.id().short_id(), %key, "delete");
                    txn.delete(key);
                }
            }
        }

        let receipt = self.backend.commit(txn).await?;
        info!(
            store = %self.name,
            tx = %receipt.tx_id.short_id(),
            revision = receipt.revision,
            operations = receipt.operations,
            "transaction committed"
        );
        Ok(CommitOutcome {
            tx_id: Some(receipt.tx_id),
            revision: Some(receipt.revision),
            operations: receipt.operations,
        })
    }
}
