//! Ledger-backed document datastore.
//!
//! Makes a hierarchical document tree durable in an external transactional
//! ledger while serving every read from an in-memory mirror.
//!
//! A write transaction stages changes against a mirror snapshot. Committing
//! it turns the resulting change tree into ordered puts and deletes
//! ([`CommitTranslator`]) and submits them as one remote transaction. The
//! commit never touches the mirror: every node, the originating one
//! included, applies the change when the feed confirms it ([`FeedListener`]),
//! through the mirror actor's single writer.
//!
//! # Key Types
//!
//! - [`StoreCoordinator`] — one store: init guard, transactions, commit, sync
//! - [`DataBroker`] — a node's configuration and operational stores
//! - [`ReadTransaction`] / [`WriteTransaction`] — the caller-facing API
//! - [`MirrorStore`] — read access to confirmed state
//! - [`SchemaContext`] — validation capability supplied before `init`

pub mod broker;
pub mod codec;
pub mod commit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod listener;
pub mod mirror;
pub mod schema;
pub mod transaction;
pub mod translate;

pub use broker::DataBroker;
pub use codec::{KeyCodec, ValueCodec};
pub use commit::{CommitOutcome, CommitPipeline};
pub use config::{DatastoreConfig, DatastoreKind};
pub use coordinator::StoreCoordinator;
pub use error::{DatastoreError, DatastoreResult};
pub use lifecycle::{Lifecycle, LifecyclePhase};
pub use listener::FeedListener;
pub use mirror::{spawn_mirror, MirrorOp, MirrorReader, MirrorStore, MirrorWriter};
pub use schema::{PermissiveSchema, SchemaContext};
pub use transaction::{ReadTransaction, WriteTransaction};
pub use translate::CommitTranslator;

// Re-export the types callers build transactions from
pub use blockstore_tree::{ChangeTree, ChangeTreeNode, ModificationKind};
pub use blockstore_types::{DocPath, LeafValue, NodeValue, PathArgument, Revision};

#[cfg(test)]
pub(crate) mod test_support {
    /// Route `tracing` output through the test harness. Safe to call from
    /// every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }
}
