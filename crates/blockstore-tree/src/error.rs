//! Error types for the tree crate.

use blockstore_types::DocPath;

/// Errors that can occur while reading or modifying a document tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// A path descends through a node that is a leaf.
    #[error("{path} is a leaf and cannot have children")]
    LeafAncestor { path: DocPath },

    /// The root of the tree must always be a container.
    #[error("the root node must be a container")]
    RootNotContainer,
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
