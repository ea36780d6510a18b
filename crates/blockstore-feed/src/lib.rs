//! Confirmed-change feed for blockstore.
//!
//! The external ledger reports every confirmed transaction as a
//! [`ConfirmedChange`]. This crate carries those events from the backend to
//! every interested node, the originating one included, and defines the
//! collaborator seams a backend implements to drive them:
//!
//! - [`ChangeFeed`] fans confirmed changes out to subscribers
//! - [`FeedSource`] hands out live subscriptions
//! - [`HistorySource`] replays changes confirmed after a known revision

pub mod change;
pub mod error;
pub mod feed;
pub mod source;

pub use change::{ChangeDigest, ConfirmedChange, LedgerWrite};
pub use error::{FeedError, FeedResult};
pub use feed::{ChangeFeed, FeedSubscription, DEFAULT_FEED_CAPACITY};
pub use source::{FeedSource, HistorySource};
