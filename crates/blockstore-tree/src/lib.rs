//! Document tree engine for blockstore.
//!
//! Holds the in-memory hierarchical document tree, records modifications
//! made against a snapshot of it, and turns a modification into a
//! [`ChangeTree`]: the per-node diff that the datastore translates into
//! ledger operations.
//!
//! # Key Types
//!
//! - [`DataTree`] / [`TreeSnapshot`] -- The tree and an immutable, revisioned view of it
//! - [`TreeModification`] -- Writes, merges, and deletes staged against a snapshot
//! - [`ChangeTree`] / [`ChangeTreeNode`] / [`ModificationKind`] -- What changed, per node
//! - [`absolute_path`] -- Path composition while walking a change tree

pub mod candidate;
pub mod data_tree;
pub mod error;
pub mod modification;
pub mod prepare;

pub use candidate::{absolute_path, ChangeTree, ChangeTreeNode, ModificationKind};
pub use data_tree::{DataTree, TreeSnapshot};
pub use error::{TreeError, TreeResult};
pub use modification::{ModificationOp, Touch, TreeModification};
pub use prepare::prepare;
