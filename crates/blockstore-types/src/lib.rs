//! Foundation types for blockstore.
//!
//! This crate provides the identity and structural types shared by every
//! other blockstore crate.
//!
//! # Key Types
//!
//! - [`DocPath`] / [`PathArgument`] — Location of a node in the document tree
//! - [`NodeValue`] / [`LeafValue`] — Hierarchical document content
//! - [`Operation`] — A single put or delete against the external store
//! - [`EncodedValue`] — A value in the external store's text encoding
//! - [`TransactionId`] — UUID v7 identifier of one remote transaction

pub mod duration_ms;
pub mod error;
pub mod ids;
pub mod operation;
pub mod path;
pub mod value;

pub use error::{TypeError, TypeResult};
pub use ids::{Revision, TransactionId};
pub use operation::{EncodedValue, Operation, OperationKind};
pub use path::{DocPath, PathArgument};
pub use value::{LeafValue, NodeValue};
