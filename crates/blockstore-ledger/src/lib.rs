//! Transactional backend adapters for blockstore.
//!
//! This crate is the boundary between the datastore and the external ledger.
//! It provides:
//! - [`RemoteTransaction`]: an ordered batch of puts and deletes with no
//!   remote effect until committed
//! - [`TransactionalStore`]: the commit / read capability the datastore
//!   consumes
//! - [`LedgerContract`]: the wire-client capability (endorse, submit,
//!   confirm a named operation with positional string arguments)
//! - [`ContractStore`]: a [`TransactionalStore`] over any contract, one
//!   remote transaction per operation, with phase deadlines and retry
//! - [`InMemoryLedger`]: a hash-linked reference backend that also drives
//!   the confirmed-change feed

pub mod block;
pub mod config;
pub mod contract;
pub mod error;
pub mod memory;
pub mod store;
pub mod transaction;

pub use block::LedgerBlock;
pub use config::{LedgerConfig, Phase, PhaseDeadlines, RetryPolicy};
pub use contract::{ContractStore, Endorsement, OperationName, Proposal, Submitted, SubmittedTx};
pub use error::{CommitFailure, LedgerError, LedgerResult};
pub use memory::{Fault, InMemoryLedger};
pub use store::{LedgerContract, TransactionalStore};
pub use transaction::{CommitReceipt, RemoteTransaction};
