//! One document store backed by the external ledger.
//!
//! Writes leave through the commit pipeline as remote transactions. The
//! mirror that serves reads changes only when the feed delivers a
//! confirmed change, whether this store or a peer originated it.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use blockstore_feed::{FeedSource, HistorySource};
use blockstore_ledger::TransactionalStore;
use blockstore_tree::{ChangeTree, DataTree, TreeSnapshot};
use blockstore_types::{DocPath, NodeValue, Revision};

use crate::codec::{KeyCodec, ValueCodec};
use crate::commit::{CommitOutcome, CommitPipeline};
use crate::config::{DatastoreConfig, DatastoreKind};
use crate::error::{DatastoreError, DatastoreResult};
use crate::lifecycle::{Lifecycle, LifecyclePhase, Running};
use crate::listener::FeedListener;
use crate::mirror::{spawn_mirror, MirrorReader, MirrorStore};
use crate::schema::SchemaContext;
use crate::transaction::{ReadTransaction, WriteTransaction};

pub struct StoreCoordinator {
    config: DatastoreConfig,
    lifecycle: Arc<Lifecycle>,
    pipeline: Arc<CommitPipeline>,
    feed: Arc<dyn FeedSource>,
    history: Option<Arc<dyn HistorySource>>,
}

impl StoreCoordinator {
    /// A store with its own commit gate. Call `on_schema_context` and then
    /// `init` before use.
    pub fn new(
        config: DatastoreConfig,
        backend: Arc<dyn TransactionalStore>,
        feed: Arc<dyn FeedSource>,
    ) -> Self {
        let pipeline = Self::pipeline(&config, backend, Arc::new(Mutex::new(())));
        Self {
            lifecycle: Arc::new(Lifecycle::new(config.name.clone())),
            config,
            pipeline: Arc::new(pipeline),
            feed,
            history: None,
        }
    }

    /// Replay confirmed changes from `history` during `init`.
    pub fn with_history(mut self, history: Arc<dyn HistorySource>) -> Self {
        self.history = Some(history);
        self
    }

    /// Serialize commits with every other store holding `gate`.
    pub fn with_commit_gate(mut self, gate: Arc<Mutex<()>>) -> Self {
        let backend = Arc::clone(self.pipeline.backend());
        self.pipeline = Arc::new(Self::pipeline(&self.config, backend, gate));
        self
    }

    fn pipeline(
        config: &DatastoreConfig,
        backend: Arc<dyn TransactionalStore>,
        gate: Arc<Mutex<()>>,
    ) -> CommitPipeline {
        CommitPipeline::new(
            config.name.clone(),
            KeyCodec::new(config.prefix()),
            ValueCodec::new(config.max_value_bytes),
            backend,
            gate,
        )
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn kind(&self) -> DatastoreKind {
        self.config.kind
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == LifecyclePhase::Initialized
    }

    pub fn on_schema_context(&self, schema: Arc<dyn SchemaContext>) -> DatastoreResult<()> {
        self.lifecycle.set_schema(schema)
    }

    /// Start serving from ledger revision `revision`.
    ///
    /// The feed is subscribed before history is read, so no confirmed
    /// change falls between replay and live delivery. Without a history
    /// source the mirror starts empty at `revision`.
    ///
    /// Cancelling the returned future leaves the store uninitialized. If
    /// the store is closed before init completes, init stops what it
    /// started and fails with `Closed`.
    pub async fn init(&self, revision: Revision) -> DatastoreResult<()> {
        let claim = self.lifecycle.begin_init()?;
        let running = self.start(revision).await?;
        match claim.finish(running) {
            Ok(_) => {
                info!(store = %self.config.name, kind = %self.config.kind, revision, "store initialized");
                Ok(())
            }
            Err(running) => {
                running.stop().await;
                warn!(store = %self.config.name, "store closed during initialization");
                Err(DatastoreError::Closed(self.config.name.clone()))
            }
        }
    }

    async fn start(&self, revision: Revision) -> DatastoreResult<Running> {
        let subscription = self.feed.subscribe();
        let backlog = match &self.history {
            Some(history) => history.history_since(revision).await?,
            None => Vec::new(),
        };
        let skip_through = backlog
            .last()
            .map_or(revision, |change| change.revision.max(revision));

        let (reader, writer) = spawn_mirror(
            self.config.name.clone(),
            TreeSnapshot::new(revision, DataTree::new()),
            self.config.mirror_queue_depth,
        );
        let listener = FeedListener::new(
            self.config.name.clone(),
            self.pipeline.keys().clone(),
            self.pipeline.values().clone(),
            writer,
            skip_through,
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(listener.run(subscription, backlog, shutdown_rx));
        Ok(Running::new(reader, shutdown_tx, handle))
    }

    pub fn new_read_transaction(&self) -> DatastoreResult<ReadTransaction> {
        let running = self.lifecycle.running()?;
        Ok(ReadTransaction::new(running.mirror().snapshot()))
    }

    pub fn new_write_transaction(&self) -> DatastoreResult<WriteTransaction> {
        let running = self.lifecycle.running()?;
        let schema = self
            .lifecycle
            .schema()
            .ok_or_else(|| DatastoreError::SchemaContextMissing(self.config.name.clone()))?;
        Ok(WriteTransaction::new(
            running.mirror().snapshot(),
            schema,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.lifecycle),
        ))
    }

    /// Commit a change tree built elsewhere.
    pub async fn commit_change_tree(&self, tree: &ChangeTree) -> DatastoreResult<CommitOutcome> {
        self.lifecycle.running()?;
        self.pipeline.commit(tree).await
    }

    /// Read `path` straight from the backend, bypassing the mirror.
    pub async fn read_remote(&self, path: &DocPath) -> DatastoreResult<Option<NodeValue>> {
        self.lifecycle.running()?;
        let key = self.pipeline.keys().encode(path);
        match self.pipeline.backend().read_entry(&self.config.name, &key).await? {
            Some(encoded) => Ok(Some(self.pipeline.values().decode(&encoded)?)),
            None => Ok(None),
        }
    }

    /// Wait until the mirror reflects `revision`, then read from it.
    pub async fn sync(&self, revision: Revision) -> DatastoreResult<ReadTransaction> {
        let running = self.lifecycle.running()?;
        let snapshot = running
            .mirror()
            .wait_for_revision(revision, self.config.sync_timeout)
            .await?;
        Ok(ReadTransaction::new(snapshot))
    }

    /// Read handle on the mirror, for inspection.
    pub fn mirror(&self) -> DatastoreResult<MirrorReader> {
        Ok(self.lifecycle.running()?.mirror().clone())
    }

    /// Stop the feed listener and the mirror. Terminal.
    pub async fn close(&self) {
        if let Some(running) = self.lifecycle.close() {
            running.stop().await;
        }
        info!(store = %self.config.name, "store closed");
    }
}
