use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use blockstore_feed::{ConfirmedChange, FeedError, FeedSubscription};
use blockstore_types::Revision;

use crate::codec::{KeyCodec, ValueCodec};
use crate::error::{DatastoreError, DatastoreResult};
use crate::mirror::{MirrorOp, MirrorWriter};

/// Feeds confirmed changes into one store's mirror.
///
/// Owns the mirror's only writer, so changes are applied strictly one at a
/// time and in delivery order.
pub struct FeedListener {
    name: String,
    keys: KeyCodec,
    values: ValueCodec,
    writer: MirrorWriter,
    skip_through: Revision,
}

impl FeedListener {
    /// `skip_through` is the highest revision already covered before live
    /// delivery starts; live changes at or below it are dropped.
    pub fn new(
        name: impl Into<String>,
        keys: KeyCodec,
        values: ValueCodec,
        writer: MirrorWriter,
        skip_through: Revision,
    ) -> Self {
        Self {
            name: name.into(),
            keys,
            values,
            writer,
            skip_through,
        }
    }

    /// The mirror operations `change` implies for this store, in the order
    /// the transaction queued them. Writes outside the namespace are ignored.
    pub fn decode(&self, change: &ConfirmedChange) -> DatastoreResult<Vec<MirrorOp>> {
        let revision = change.revision;
        change
            .writes_with_prefix(self.keys.prefix())
            .map(|write| {
                let path = self
                    .keys
                    .decode(&write.key)
                    .map_err(|e| DatastoreError::FeedApply {
                        revision,
                        reason: e.to_string(),
                    })?;
                match &write.value {
                    Some(encoded) => {
                        let value =
                            self.values
                                .decode(encoded)
                                .map_err(|e| DatastoreError::FeedApply {
                                    revision,
                                    reason: format!("{}: {e}", write.key),
                                })?;
                        Ok(MirrorOp::Put { path, value })
                    }
                    None => Ok(MirrorOp::Delete { path }),
                }
            })
            .collect()
    }

    /// Apply one confirmed change.
    ///
    /// Changes that touch nothing in this namespace still advance the
    /// mirror's revision so `sync` can wait on any ledger revision.
    pub async fn handle(&mut self, change: ConfirmedChange) -> DatastoreResult<Revision> {
        if !change.verify_integrity() {
            return Err(DatastoreError::FeedApply {
                revision: change.revision,
                reason: format!("digest {} does not match content", change.digest),
            });
        }
        let ops = self.decode(&change)?;
        self.writer.apply(change.revision, ops).await
    }

    /// Apply `backlog`, then follow `subscription` until the feed closes or
    /// `shutdown` fires. Stops the mirror on the way out.
    pub async fn run(
        mut self,
        mut subscription: FeedSubscription,
        backlog: Vec<ConfirmedChange>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!(store = %self.name, backlog = backlog.len(), skip_through = self.skip_through, "feed listener started");

        for change in backlog {
            if !self.handle_logged(change).await {
                return self.writer.shutdown().await;
            }
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!(store = %self.name, "feed listener shutting down");
                    break;
                }
                received = subscription.recv() => match received {
                    Ok(change) if change.revision <= self.skip_through => {
                        debug!(store = %self.name, revision = change.revision, "skipping replayed change");
                    }
                    Ok(change) => {
                        if !self.handle_logged(change).await {
                            break;
                        }
                    }
                    Err(FeedError::Lagged { skipped }) => {
                        error!(store = %self.name, skipped, "feed subscription lagged; confirmed changes were lost");
                    }
                    Err(FeedError::Closed) => {
                        info!(store = %self.name, "feed closed");
                        break;
                    }
                    Err(e) => {
                        warn!(store = %self.name, error = %e, "feed error");
                    }
                },
            }
        }

        self.writer.shutdown().await;
    }

    /// Returns `false` once the mirror can no longer accept changes.
    async fn handle_logged(&mut self, change: ConfirmedChange) -> bool {
        let revision = change.revision;
        match self.handle(change).await {
            Ok(_) => true,
            Err(DatastoreError::Closed(_)) => {
                warn!(store = %self.name, revision, "mirror stopped; dropping change");
                false
            }
            Err(e) => {
                warn!(store = %self.name, revision, error = %e, "confirmed change not applied");
                true
            }
        }
    }
}
