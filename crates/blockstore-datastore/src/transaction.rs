use std::sync::Arc;

use tracing::debug;

use blockstore_tree::{prepare, ChangeTree, TreeModification, TreeSnapshot};
use blockstore_types::{DocPath, NodeValue, Revision};

use crate::commit::{CommitOutcome, CommitPipeline};
use crate::error::DatastoreResult;
use crate::lifecycle::Lifecycle;
use crate::schema::SchemaContext;

/// A consistent read view of a store's mirror.
///
/// Never blocks on remote I/O.
#[derive(Clone, Debug)]
pub struct ReadTransaction {
    snapshot: TreeSnapshot,
}

impl ReadTransaction {
    pub(crate) fn new(snapshot: TreeSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn read(&self, path: &DocPath) -> Option<NodeValue> {
        self.snapshot.read(path).cloned()
    }

    pub fn exists(&self, path: &DocPath) -> bool {
        self.snapshot.tree().contains(path)
    }

    /// The confirmed revision this view reflects.
    pub fn revision(&self) -> Revision {
        self.snapshot.revision()
    }
}

/// Staged changes against a snapshot of the mirror.
///
/// Reads see the transaction's own writes. Dropping or cancelling the
/// transaction before `commit` discards them without any remote effect.
pub struct WriteTransaction {
    modification: TreeModification,
    schema: Arc<dyn SchemaContext>,
    pipeline: Arc<CommitPipeline>,
    lifecycle: Arc<Lifecycle>,
}

impl WriteTransaction {
    pub(crate) fn new(
        snapshot: TreeSnapshot,
        schema: Arc<dyn SchemaContext>,
        pipeline: Arc<CommitPipeline>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            modification: TreeModification::new(snapshot),
            schema,
            pipeline,
            lifecycle,
        }
    }

    pub fn read(&self, path: &DocPath) -> Option<NodeValue> {
        self.modification.read(path).cloned()
    }

    pub fn exists(&self, path: &DocPath) -> bool {
        self.modification.read(path).is_some()
    }

    /// Replace the subtree at `path`.
    pub fn write(&mut self, path: DocPath, value: NodeValue) -> DatastoreResult<()> {
        self.schema.validate(&path, Some(&value))?;
        self.modification.write(path, value)?;
        Ok(())
    }

    /// Merge `value` into the subtree at `path`.
    pub fn merge(&mut self, path: DocPath, value: NodeValue) -> DatastoreResult<()> {
        self.schema.validate(&path, Some(&value))?;
        self.modification.merge(path, value)?;
        Ok(())
    }

    pub fn delete(&mut self, path: DocPath) -> DatastoreResult<()> {
        self.schema.validate(&path, None)?;
        self.modification.delete(path);
        Ok(())
    }

    /// Revision of the snapshot the transaction was opened against.
    pub fn base_revision(&self) -> Revision {
        self.modification.base().revision()
    }

    /// The change tree this transaction would commit.
    pub fn change_tree(&self) -> ChangeTree {
        prepare(&self.modification)
    }

    /// Submit the staged changes as one remote transaction.
    ///
    /// Returns once the backend confirms; the local mirror catches up when
    /// the feed delivers `CommitOutcome::revision`. Fails without any
    /// remote effect once the store is closed.
    pub async fn commit(self) -> DatastoreResult<CommitOutcome> {
        self.lifecycle.running()?;
        let tree = self.change_tree();
        self.pipeline.commit(&tree).await
    }

    pub fn cancel(self) {
        debug!(
            store = %self.pipeline.name(),
            staged = self.modification.ops().len(),
            "write transaction cancelled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    use blockstore_ledger::InMemoryLedger;
    use blockstore_tree::{DataTree, ModificationKind};

    use crate::codec::{KeyCodec, ValueCodec};
    use crate::error::DatastoreError;
    use crate::schema::PermissiveSchema;

    /// Refuses anything under `/locked`.
    #[derive(Debug)]
    struct LockedSubtree;

    impl SchemaContext for LockedSubtree {
        fn name(&self) -> &str {
            "locked-subtree"
        }

        fn validate(&self, path: &DocPath, _value: Option<&NodeValue>) -> DatastoreResult<()> {
            if path.starts_with(&"/locked".parse().unwrap()) {
                return Err(DatastoreError::Validation {
                    path: path.clone(),
                    reason: "subtree is read-only".into(),
                });
            }
            Ok(())
        }
    }

    fn path(s: &str) -> DocPath {
        s.parse().unwrap()
    }

    fn base() -> TreeSnapshot {
        let mut tree = DataTree::new();
        tree.put(&path("/a"), NodeValue::container().with_leaf("x", 1_i64))
            .unwrap();
        TreeSnapshot::new(4, tree)
    }

    fn write_txn(schema: Arc<dyn SchemaContext>) -> WriteTransaction {
        let pipeline = CommitPipeline::new(
            "node-C",
            KeyCodec::new("C"),
            ValueCodec::new(1024),
            Arc::new(InMemoryLedger::default()),
            Arc::new(Mutex::new(())),
        );
        WriteTransaction::new(
            base(),
            schema,
            Arc::new(pipeline),
            Arc::new(Lifecycle::new("node-C")),
        )
    }

    #[test]
    fn reads_see_own_writes_only() {
        let snapshot = base();
        let read = ReadTransaction::new(snapshot.clone());
        let mut txn = write_txn(Arc::new(PermissiveSchema));

        txn.merge(path("/a"), NodeValue::container().with_leaf("y", 2_i64))
            .unwrap();
        txn.delete(path("/a/x")).unwrap();

        assert_eq!(txn.read(&path("/a/y")), Some(NodeValue::leaf(2_i64)));
        assert!(!txn.exists(&path("/a/x")));
        assert_eq!(txn.base_revision(), 4);

        assert!(read.exists(&path("/a/x")));
        assert!(read.read(&path("/a/y")).is_none());
        assert_eq!(read.revision(), 4);
    }

    #[test]
    fn schema_rejections_stage_nothing() {
        let mut txn = write_txn(Arc::new(LockedSubtree));

        let err = txn
            .write(path("/locked/k"), NodeValue::leaf("v"))
            .unwrap_err();
        assert!(matches!(err, DatastoreError::Validation { .. }));
        assert!(matches!(
            txn.delete(path("/locked")),
            Err(DatastoreError::Validation { .. })
        ));
        assert!(txn.change_tree().is_noop());

        txn.write(path("/open"), NodeValue::leaf("v")).unwrap();
        let tree = txn.change_tree();
        assert_eq!(tree.root().children().len(), 1);
        assert_eq!(tree.root().children()[0].kind(), ModificationKind::Write);
    }

    #[tokio::test]
    async fn commit_requires_a_running_store() {
        let mut txn = write_txn(Arc::new(PermissiveSchema));
        txn.write(path("/b"), NodeValue::leaf("v")).unwrap();
        assert!(matches!(
            txn.commit().await,
            Err(DatastoreError::NotInitialized(_))
        ));
    }

    #[test]
    fn writes_below_leaves_fail() {
        let mut txn = write_txn(Arc::new(PermissiveSchema));
        assert!(matches!(
            txn.write(path("/a/x/deeper"), NodeValue::leaf("v")),
            Err(DatastoreError::Tree(_))
        ));
    }
}
