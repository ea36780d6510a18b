use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::{debug, info};

use blockstore_types::Revision;

use crate::change::ConfirmedChange;
use crate::error::{FeedError, FeedResult};
use crate::source::FeedSource;

/// Default per-subscriber buffer of the hub.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Broadcast hub for confirmed changes.
///
/// The backend publishes each confirmed transaction exactly once; every live
/// subscription receives it in publication order. Closing the hub ends all
/// subscriptions once they have drained what was already published.
pub struct ChangeFeed {
    sender: RwLock<Option<broadcast::Sender<ConfirmedChange>>>,
    last_published: RwLock<Revision>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: RwLock::new(Some(sender)),
            last_published: RwLock::new(0),
        }
    }

    /// Deliver `change` to every current subscriber.
    ///
    /// Returns the number of subscriptions it reached. Publishing on a closed
    /// hub fails with [`FeedError::Closed`].
    pub fn publish(&self, change: ConfirmedChange) -> FeedResult<usize> {
        let sender = self.sender.read().expect("feed lock poisoned");
        let sender = sender.as_ref().ok_or(FeedError::Closed)?;

        let revision = change.revision;
        let digest = change.digest;
        // No receivers is not an error: nobody is listening yet.
        let reached = sender.send(change).unwrap_or(0);
        *self.last_published.write().expect("feed lock poisoned") = revision;

        debug!(revision, %digest, reached, "confirmed change published");
        Ok(reached)
    }

    /// Open a new subscription. It sees changes published from now on.
    pub fn subscribe(&self) -> FeedSubscription {
        let sender = self.sender.read().expect("feed lock poisoned");
        match sender.as_ref() {
            Some(sender) => FeedSubscription::new(sender.subscribe()),
            None => {
                // A receiver whose sender is already gone reports Closed.
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                FeedSubscription::new(receiver)
            }
        }
    }

    /// Revision of the most recently published change, 0 if none.
    pub fn last_published(&self) -> Revision {
        *self.last_published.read().expect("feed lock poisoned")
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .expect("feed lock poisoned")
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().expect("feed lock poisoned").is_none()
    }

    /// Shut the hub down. Idempotent.
    pub fn close(&self) {
        if self.sender.write().expect("feed lock poisoned").take().is_some() {
            info!(last_revision = self.last_published(), "change feed closed");
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl FeedSource for ChangeFeed {
    fn subscribe(&self) -> FeedSubscription {
        ChangeFeed::subscribe(self)
    }
}

/// One subscriber's view of the feed.
pub struct FeedSubscription {
    receiver: broadcast::Receiver<ConfirmedChange>,
}

impl FeedSubscription {
    fn new(receiver: broadcast::Receiver<ConfirmedChange>) -> Self {
        Self { receiver }
    }

    /// Wait for the next confirmed change.
    ///
    /// After [`FeedError::Lagged`] the subscription stays usable and resumes
    /// with the oldest change still buffered.
    pub async fn recv(&mut self) -> FeedResult<ConfirmedChange> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => FeedError::Lagged { skipped },
            broadcast::error::RecvError::Closed => FeedError::Closed,
        })
    }

    /// Take the next change if one is already buffered.
    pub fn try_recv(&mut self) -> FeedResult<Option<ConfirmedChange>> {
        use broadcast::error::TryRecvError;
        match self.receiver.try_recv() {
            Ok(change) => Ok(Some(change)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(skipped)) => Err(FeedError::Lagged { skipped }),
            Err(TryRecvError::Closed) => Err(FeedError::Closed),
        }
    }
}
