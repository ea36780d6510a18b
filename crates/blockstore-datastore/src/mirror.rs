//! The local mirror of confirmed ledger state.
//!
//! A single actor task owns the tree. Confirmed changes reach it over a
//! bounded channel through the one [`MirrorWriter`]; every applied change is
//! published as a new [`TreeSnapshot`] that any number of [`MirrorReader`]s
//! observe without blocking the writer. A change is applied to a copy of the
//! tree and published only if every operation in it succeeds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use blockstore_tree::TreeSnapshot;
use blockstore_types::{DocPath, NodeValue, Revision};

use crate::error::{DatastoreError, DatastoreResult};

/// A decoded operation from a confirmed change.
#[derive(Clone, Debug, PartialEq)]
pub enum MirrorOp {
    Put { path: DocPath, value: NodeValue },
    Delete { path: DocPath },
}

impl MirrorOp {
    pub fn path(&self) -> &DocPath {
        match self {
            Self::Put { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Read access to a store's confirmed state.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// The latest published snapshot.
    fn snapshot(&self) -> TreeSnapshot;

    /// Number of confirmed changes applied since the mirror started.
    fn applied_changes(&self) -> u64;

    /// Wait until the mirror reflects `revision` or later.
    async fn wait_for_revision(
        &self,
        revision: Revision,
        timeout: Duration,
    ) -> DatastoreResult<TreeSnapshot>;
}

enum MirrorCmd {
    Apply {
        revision: Revision,
        ops: Vec<MirrorOp>,
        resp: oneshot::Sender<DatastoreResult<Revision>>,
    },
}

/// Start a mirror actor seeded with `initial`.
///
/// Must be called inside a tokio runtime.
pub fn spawn_mirror(
    name: impl Into<String>,
    initial: TreeSnapshot,
    queue_depth: usize,
) -> (MirrorReader, MirrorWriter) {
    let name: Arc<str> = Arc::from(name.into());
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let (snapshots_tx, snapshots_rx) = watch::channel(initial.clone());
    let applied = Arc::new(AtomicU64::new(0));

    let actor = MirrorActor {
        name: Arc::clone(&name),
        current: initial,
        snapshots: snapshots_tx,
        applied: Arc::clone(&applied),
    };
    let task = tokio::spawn(actor.run(rx));

    let reader = MirrorReader {
        name: Arc::clone(&name),
        snapshots: snapshots_rx,
        applied,
    };
    let writer = MirrorWriter { name, tx, task };
    (reader, writer)
}

struct MirrorActor {
    name: Arc<str>,
    current: TreeSnapshot,
    snapshots: watch::Sender<TreeSnapshot>,
    applied: Arc<AtomicU64>,
}

impl MirrorActor {
    async fn run(mut self, mut rx: mpsc::Receiver<MirrorCmd>) {
        debug!(store = %self.name, revision = self.current.revision(), "mirror started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                MirrorCmd::Apply {
                    revision,
                    ops,
                    resp,
                } => {
                    let result = self.apply(revision, ops);
                    let _ = resp.send(result);
                }
            }
        }
        debug!(store = %self.name, revision = self.current.revision(), "mirror stopped");
    }

    fn apply(&mut self, revision: Revision, ops: Vec<MirrorOp>) -> DatastoreResult<Revision> {
        let at = self.current.revision();
        if revision <= at {
            return Err(DatastoreError::FeedApply {
                revision,
                reason: format!("mirror is already at revision {at}"),
            });
        }
        if revision != at + 1 {
            warn!(store = %self.name, expected = at + 1, revision, "revision gap in confirmed changes");
        }

        let mut next = self.current.tree().clone();
        let op_count = ops.len();
        for op in ops {
            match op {
                MirrorOp::Put { path, value } => {
                    next.put(&path, value)
                        .map_err(|e| DatastoreError::FeedApply {
                            revision,
                            reason: format!("put {path}: {e}"),
                        })?;
                }
                MirrorOp::Delete { path } => {
                    next.remove(&path);
                }
            }
        }

        self.current = TreeSnapshot::new(revision, next);
        // Count first: a reader woken by the snapshot must see the count.
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.snapshots.send_replace(self.current.clone());
        if op_count > 0 {
            info!(store = %self.name, revision, ops = op_count, "applied confirmed change");
        } else {
            debug!(store = %self.name, revision, "advanced past foreign change");
        }
        Ok(revision)
    }
}

/// Cheap, cloneable read handle on a mirror.
#[derive(Clone, Debug)]
pub struct MirrorReader {
    name: Arc<str>,
    snapshots: watch::Receiver<TreeSnapshot>,
    applied: Arc<AtomicU64>,
}

impl MirrorReader {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> Revision {
        self.snapshots.borrow().revision()
    }
}

#[async_trait]
impl MirrorStore for MirrorReader {
    fn snapshot(&self) -> TreeSnapshot {
        self.snapshots.borrow().clone()
    }

    fn applied_changes(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    async fn wait_for_revision(
        &self,
        revision: Revision,
        timeout: Duration,
    ) -> DatastoreResult<TreeSnapshot> {
        let mut rx = self.snapshots.clone();
        let reached = async {
            rx.wait_for(|s| s.revision() >= revision)
                .await
                .map(|snapshot| snapshot.clone())
        };
        match tokio::time::timeout(timeout, reached).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(DatastoreError::Closed(self.name.to_string())),
            Err(_) => Err(DatastoreError::SyncTimeout {
                revision,
                applied: self.revision(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// The single write handle on a mirror. Not cloneable.
#[derive(Debug)]
pub struct MirrorWriter {
    name: Arc<str>,
    tx: mpsc::Sender<MirrorCmd>,
    task: JoinHandle<()>,
}

impl MirrorWriter {
    /// Apply the confirmed change at `revision`, waiting for the outcome.
    ///
    /// On error the mirror is left exactly as it was.
    pub async fn apply(&mut self, revision: Revision, ops: Vec<MirrorOp>) -> DatastoreResult<Revision> {
        let (resp, resp_rx) = oneshot::channel();
        self.tx
            .send(MirrorCmd::Apply { revision, ops, resp })
            .await
            .map_err(|_| DatastoreError::Closed(self.name.to_string()))?;
        resp_rx
            .await
            .map_err(|_| DatastoreError::Closed(self.name.to_string()))?
    }

    /// Stop the actor once queued changes are applied.
    pub async fn shutdown(self) {
        let Self { name, tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            warn!(store = %name, error = %e, "mirror task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstore_tree::DataTree;

    fn path(s: &str) -> DocPath {
        s.parse().unwrap()
    }

    fn put(p: &str, value: NodeValue) -> MirrorOp {
        MirrorOp::Put {
            path: path(p),
            value,
        }
    }

    #[tokio::test]
    async fn applies_in_order_and_publishes_snapshots() {
        let (reader, mut writer) = spawn_mirror("t", TreeSnapshot::empty(), 4);

        writer
            .apply(1, vec![put("/a/b", NodeValue::leaf("v1"))])
            .await
            .unwrap();
        let before = reader.snapshot();
        writer
            .apply(2, vec![MirrorOp::Delete { path: path("/a/b") }])
            .await
            .unwrap();

        let after = reader.snapshot();
        assert_eq!(after.revision(), 2);
        assert!(after.read(&path("/a/b")).is_none());
        assert!(after.read(&path("/a")).is_some());
        // Earlier snapshots are unaffected by later changes.
        assert_eq!(before.read(&path("/a/b")), Some(&NodeValue::leaf("v1")));
        assert_eq!(reader.applied_changes(), 2);
    }

    #[tokio::test]
    async fn failed_change_publishes_nothing() {
        let (reader, mut writer) = spawn_mirror("t", TreeSnapshot::empty(), 4);
        writer
            .apply(1, vec![put("/a", NodeValue::leaf("leaf"))])
            .await
            .unwrap();

        let err = writer
            .apply(
                2,
                vec![
                    put("/b", NodeValue::leaf("fine")),
                    put("/a/c", NodeValue::leaf("below a leaf")),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::FeedApply { revision: 2, .. }));

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.revision(), 1);
        assert!(snapshot.read(&path("/b")).is_none());
        assert_eq!(reader.applied_changes(), 1);

        // The revision was not consumed; a corrected change can still land.
        writer
            .apply(2, vec![put("/b", NodeValue::leaf("fine"))])
            .await
            .unwrap();
        assert_eq!(reader.revision(), 2);
    }

    #[tokio::test]
    async fn non_container_root_put_is_rejected() {
        let (reader, mut writer) = spawn_mirror("t", TreeSnapshot::empty(), 4);
        let err = writer
            .apply(1, vec![put("/", NodeValue::leaf(1_i64))])
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::FeedApply { .. }));
        assert_eq!(reader.revision(), 0);
    }

    #[tokio::test]
    async fn stale_revisions_are_rejected() {
        let initial = TreeSnapshot::new(5, DataTree::new());
        let (reader, mut writer) = spawn_mirror("t", initial, 4);

        for revision in [3, 5] {
            let err = writer
                .apply(revision, vec![put("/x", NodeValue::leaf("late"))])
                .await
                .unwrap_err();
            assert!(matches!(err, DatastoreError::FeedApply { .. }));
        }
        assert!(reader.snapshot().read(&path("/x")).is_none());

        // Gaps are tolerated.
        writer.apply(9, Vec::new()).await.unwrap();
        assert_eq!(reader.revision(), 9);
    }

    #[tokio::test]
    async fn deleting_missing_nodes_is_a_noop() {
        let (reader, mut writer) = spawn_mirror("t", TreeSnapshot::empty(), 4);
        writer
            .apply(1, vec![MirrorOp::Delete { path: path("/ghost/x") }])
            .await
            .unwrap();
        assert_eq!(reader.revision(), 1);
        assert_eq!(reader.snapshot().tree(), &DataTree::new());
    }

    #[tokio::test]
    async fn wait_for_revision_resolves_once_applied() {
        let (reader, mut writer) = spawn_mirror("t", TreeSnapshot::empty(), 4);

        let waiter = {
            let reader = reader.clone();
            tokio::spawn(async move {
                reader
                    .wait_for_revision(2, Duration::from_secs(5))
                    .await
            })
        };

        writer.apply(1, Vec::new()).await.unwrap();
        writer
            .apply(2, vec![put("/k", NodeValue::leaf(7_i64))])
            .await
            .unwrap();

        let snapshot = waiter.await.unwrap().unwrap();
        assert!(snapshot.revision() >= 2);
        assert_eq!(snapshot.read(&path("/k")), Some(&NodeValue::leaf(7_i64)));
    }

    #[tokio::test]
    async fn wait_for_revision_times_out() {
        let (reader, _writer) = spawn_mirror("t", TreeSnapshot::empty(), 4);
        let err = reader
            .wait_for_revision(1, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatastoreError::SyncTimeout {
                revision: 1,
                applied: 0,
                timeout_ms: 20
            }
        ));
    }

    #[tokio::test]
    async fn shutdown_closes_waiters() {
        let (reader, writer) = spawn_mirror("t", TreeSnapshot::empty(), 4);
        writer.shutdown().await;

        let err = reader
            .wait_for_revision(1, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::Closed(_)));
        // The last snapshot stays readable.
        assert_eq!(reader.snapshot().revision(), 0);
    }
}
