use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use blockstore_feed::{FeedSource, HistorySource};
use blockstore_ledger::TransactionalStore;
use blockstore_types::Revision;

use crate::config::{DatastoreConfig, DatastoreKind};
use crate::coordinator::StoreCoordinator;
use crate::error::{DatastoreError, DatastoreResult};
use crate::schema::SchemaContext;

/// A node's configuration and operational stores over one ledger.
///
/// Both stores share the backend, the feed, and a single commit gate, so
/// at most one remote transaction from this node is in flight at a time.
pub struct DataBroker {
    node: String,
    configuration: StoreCoordinator,
    operational: StoreCoordinator,
}

impl DataBroker {
    /// Both stores with default settings, named after `node`.
    pub fn new(
        node: impl Into<String>,
        backend: Arc<dyn TransactionalStore>,
        feed: Arc<dyn FeedSource>,
    ) -> DatastoreResult<Self> {
        let node = node.into();
        Self::from_configs(
            node.clone(),
            DatastoreConfig::for_node(&node, DatastoreKind::Configuration),
            DatastoreConfig::for_node(&node, DatastoreKind::Operational),
            backend,
            feed,
        )
    }

    pub fn from_configs(
        node: impl Into<String>,
        configuration: DatastoreConfig,
        operational: DatastoreConfig,
        backend: Arc<dyn TransactionalStore>,
        feed: Arc<dyn FeedSource>,
    ) -> DatastoreResult<Self> {
        configuration.validate()?;
        operational.validate()?;
        if configuration.kind != DatastoreKind::Configuration
            || operational.kind != DatastoreKind::Operational
        {
            return Err(DatastoreError::Config(
                "broker needs one configuration and one operational store".into(),
            ));
        }

        let gate = Arc::new(Mutex::new(()));
        Ok(Self {
            node: node.into(),
            configuration: StoreCoordinator::new(configuration, Arc::clone(&backend), Arc::clone(&feed))
                .with_commit_gate(Arc::clone(&gate)),
            operational: StoreCoordinator::new(operational, backend, feed).with_commit_gate(gate),
        })
    }

    /// Replay history into both stores during `init`.
    pub fn with_history(self, history: Arc<dyn HistorySource>) -> Self {
        Self {
            node: self.node,
            configuration: self.configuration.with_history(Arc::clone(&history)),
            operational: self.operational.with_history(history),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn on_schema_context(&self, schema: Arc<dyn SchemaContext>) -> DatastoreResult<()> {
        self.configuration.on_schema_context(Arc::clone(&schema))?;
        self.operational.on_schema_context(schema)
    }

    /// Initialize both stores at `revision`. If the operational store fails
    /// to start, the configuration store is closed again.
    pub async fn init(&self, revision: Revision) -> DatastoreResult<()> {
        self.configuration.init(revision).await?;
        if let Err(e) = self.operational.init(revision).await {
            self.configuration.close().await;
            return Err(e);
        }
        info!(node = %self.node, revision, "data broker initialized");
        Ok(())
    }

    pub fn configuration(&self) -> &StoreCoordinator {
        &self.configuration
    }

    pub fn operational(&self) -> &StoreCoordinator {
        &self.operational
    }

    pub fn store(&self, kind: DatastoreKind) -> &StoreCoordinator {
        match kind {
            DatastoreKind::Configuration => &self.configuration,
            DatastoreKind::Operational => &self.operational,
        }
    }

    pub async fn close(&self) {
        self.configuration.close().await;
        self.operational.close().await;
        info!(node = %self.node, "data broker closed");
    }
}
