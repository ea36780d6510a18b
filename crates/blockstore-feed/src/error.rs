/// Errors produced by the change feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The subscriber fell behind and the hub dropped events for it.
    #[error("subscriber lagged behind; {skipped} confirmed changes were dropped")]
    Lagged { skipped: u64 },

    /// The hub has shut down and no further changes will arrive.
    #[error("change feed is closed")]
    Closed,

    /// Confirmed history could not be read from the backend.
    #[error("history unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the feed crate.
pub type FeedResult<T> = Result<T, FeedError>;
