use async_trait::async_trait;

use blockstore_types::Revision;

use crate::change::ConfirmedChange;
use crate::error::FeedResult;
use crate::feed::FeedSubscription;

/// Anything that can hand out live subscriptions to confirmed changes.
pub trait FeedSource: Send + Sync {
    fn subscribe(&self) -> FeedSubscription;
}

/// Read access to the backend's confirmed history, used for cold-start
/// replay.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Every confirmed change with a revision greater than `after`, in
    /// revision order.
    async fn history_since(&self, after: Revision) -> FeedResult<Vec<ConfirmedChange>>;
}
