use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use blockstore_feed::{
    ChangeFeed, ConfirmedChange, FeedError, FeedResult, FeedSource, FeedSubscription,
    HistorySource, LedgerWrite,
};
use blockstore_types::{EncodedValue, Revision, TransactionId};

use crate::block::{validate_chain, LedgerBlock};
use crate::config::{LedgerConfig, Phase};
use crate::contract::{encode_read_response, Endorsement, OperationName, Proposal, SubmittedTx};
use crate::error::{CommitFailure, LedgerError, LedgerResult};
use crate::store::{LedgerContract, TransactionalStore};
use crate::transaction::{CommitReceipt, RemoteTransaction};

/// A one-shot failure the in-memory ledger injects into the next
/// transaction that reaches the matching phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Endorsement policy rejects the proposal.
    RejectEndorsement,
    /// The ordering service is unreachable.
    DropSubmission,
    /// Confirmation is delayed by the given duration. A transaction whose
    /// confirmation is abandoned is never confirmed.
    StallCommit(Duration),
}

/// In-memory ledger for tests, local demos, and embedding.
///
/// Keeps a hash-linked chain of blocks plus the resulting world state, and
/// publishes one [`ConfirmedChange`] per block on its [`ChangeFeed`]. It is
/// both a batching [`TransactionalStore`] (one block per batch) and a
/// [`LedgerContract`] (one block per operation).
pub struct InMemoryLedger {
    config: LedgerConfig,
    feed: ChangeFeed,
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    blocks: Vec<LedgerBlock>,
    world: BTreeMap<String, EncodedValue>,
    pending: HashMap<TransactionId, Proposal>,
    faults: VecDeque<Fault>,
}

impl InMemoryLedger {
    pub fn new(config: LedgerConfig) -> Self {
        let feed = ChangeFeed::new(config.feed_capacity);
        Self {
            config,
            feed,
            inner: RwLock::new(LedgerState::default()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Queue a one-shot fault.
    pub fn inject_fault(&self, fault: Fault) -> LedgerResult<()> {
        self.write_state()?.faults.push_back(fault);
        Ok(())
    }

    pub fn pending_faults(&self) -> LedgerResult<usize> {
        Ok(self.read_state()?.faults.len())
    }

    /// Submitted transactions still waiting for confirmation.
    pub fn pending_transactions(&self) -> LedgerResult<usize> {
        Ok(self.read_state()?.pending.len())
    }

    /// Number of confirmed blocks; also the latest revision.
    pub fn height(&self) -> LedgerResult<Revision> {
        Ok(self.read_state()?.blocks.len() as Revision)
    }

    pub fn block(&self, number: Revision) -> LedgerResult<Option<LedgerBlock>> {
        let state = self.read_state()?;
        Ok(number
            .checked_sub(1)
            .and_then(|i| state.blocks.get(i as usize))
            .cloned())
    }

    /// Current value of `key` in the world state.
    pub fn entry(&self, key: &str) -> LedgerResult<Option<EncodedValue>> {
        Ok(self.read_state()?.world.get(key).cloned())
    }

    /// Every key under `prefix` with its current value.
    pub fn entries_with_prefix(&self, prefix: &str) -> LedgerResult<Vec<(String, EncodedValue)>> {
        let state = self.read_state()?;
        Ok(state
            .world
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    /// Validate numbering and hash links of the whole chain.
    pub fn validate_chain(&self) -> LedgerResult<()> {
        validate_chain(&self.read_state()?.blocks)
    }

    /// Stop publishing confirmed changes. Live subscriptions drain and end.
    pub fn close(&self) {
        self.feed.close();
    }

    fn read_state(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.inner.read().map_err(|_| LedgerError::StatePoisoned)
    }

    fn write_state(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.inner.write().map_err(|_| LedgerError::StatePoisoned)
    }

    /// Remove and return the first queued fault that `applies` accepts.
    fn take_fault(&self, applies: impl Fn(&Fault) -> bool) -> LedgerResult<Option<Fault>> {
        let mut state = self.write_state()?;
        let position = state.faults.iter().position(applies);
        Ok(position.and_then(|i| state.faults.remove(i)))
    }

    /// Seal `writes` into the next block, update the world state, and
    /// announce the block on the feed.
    fn append_block(
        &self,
        state: &mut LedgerState,
        tx_id: TransactionId,
        origin: String,
        writes: Vec<LedgerWrite>,
    ) -> LedgerResult<Revision> {
        let block = LedgerBlock::seal(state.blocks.last(), tx_id, origin, writes)?;

        for write in &block.writes {
            match &write.value {
                Some(value) => {
                    state.world.insert(write.key.clone(), value.clone());
                }
                None => {
                    state.world.remove(&write.key);
                }
            }
        }

        let number = block.number;
        let change = block.to_change();
        info!(
            block = number,
            hash = %block.short_hash(),
            origin = %block.origin,
            writes = block.writes.len(),
            "block confirmed"
        );
        state.blocks.push(block);

        // Publishing under the state lock keeps feed order equal to block order.
        if let Err(e) = self.feed.publish(change) {
            warn!(block = number, error = %e, "confirmed change not published");
        }
        Ok(number)
    }

    async fn stall(duration: Duration) {
        debug!(stall_ms = duration.as_millis() as u64, "confirmation stalled");
        tokio::time::sleep(duration).await;
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[async_trait]
impl TransactionalStore for InMemoryLedger {
    async fn commit(&self, txn: RemoteTransaction) -> LedgerResult<CommitReceipt> {
        if txn.is_empty() {
            return Err(LedgerError::EmptyTransaction(txn.id().clone()));
        }

        match self.take_fault(|_| true)? {
            Some(Fault::RejectEndorsement) => {
                return Err(CommitFailure::EndorsementFailed {
                    reason: "endorsement policy not satisfied".into(),
                }
                .into())
            }
            Some(Fault::DropSubmission) => {
                return Err(CommitFailure::SubmissionFailed {
                    reason: "ordering service unavailable".into(),
                }
                .into())
            }
            Some(Fault::StallCommit(duration)) => {
                let deadline = self.config.deadlines.commit_status;
                if tokio::time::timeout(deadline, Self::stall(duration))
                    .await
                    .is_err()
                {
                    return Err(CommitFailure::CommitTimeout {
                        phase: Phase::CommitStatus,
                        deadline,
                    }
                    .into());
                }
            }
            None => {}
        }

        let operations = txn.len();
        let (tx_id, origin, writes) = txn.into_parts();
        let mut state = self.write_state()?;
        let revision = self.append_block(&mut state, tx_id.clone(), origin, writes)?;

        Ok(CommitReceipt {
            tx_id,
            revision,
            operations,
        })
    }

    async fn read_entry(&self, _origin: &str, key: &str) -> LedgerResult<Option<EncodedValue>> {
        self.entry(key)
    }
}

#[async_trait]
impl LedgerContract for InMemoryLedger {
    async fn evaluate(&self, proposal: &Proposal) -> LedgerResult<Vec<u8>> {
        proposal.operation.check_args(&proposal.args)?;
        match proposal.operation {
            OperationName::ReadEntry => {
                let key = &proposal.args[0];
                let value = self.entry(key)?;
                Ok(encode_read_response(key, value.as_ref()))
            }
            OperationName::PutEntry | OperationName::DeleteEntry => Ok(Vec::new()),
        }
    }

    async fn endorse(&self, proposal: &Proposal) -> LedgerResult<Endorsement> {
        if self
            .take_fault(|f| matches!(f, Fault::RejectEndorsement))?
            .is_some()
        {
            return Err(CommitFailure::EndorsementFailed {
                reason: format!("endorsement policy not satisfied for {}", proposal.operation),
            }
            .into());
        }
        proposal.writes()?;
        let response = self.evaluate(proposal).await?;
        Ok(Endorsement {
            proposal: proposal.clone(),
            response,
        })
    }

    async fn submit(&self, endorsement: Endorsement) -> LedgerResult<SubmittedTx> {
        if self
            .take_fault(|f| matches!(f, Fault::DropSubmission))?
            .is_some()
        {
            return Err(CommitFailure::SubmissionFailed {
                reason: "ordering service unavailable".into(),
            }
            .into());
        }
        let tx_id = endorsement.proposal.tx_id.clone();
        self.write_state()?
            .pending
            .insert(tx_id.clone(), endorsement.proposal);
        Ok(SubmittedTx { tx_id })
    }

    async fn commit_status(&self, submitted: &SubmittedTx) -> LedgerResult<Revision> {
        // Taken before any stall: an abandoned wait must not leave it behind.
        let proposal = self
            .write_state()?
            .pending
            .remove(&submitted.tx_id)
            .ok_or_else(|| CommitFailure::SubmissionFailed {
                reason: format!("transaction {} was never submitted", submitted.tx_id),
            })?;

        if let Some(Fault::StallCommit(duration)) =
            self.take_fault(|f| matches!(f, Fault::StallCommit(_)))?
        {
            Self::stall(duration).await;
        }

        let writes = proposal.writes()?;
        let mut state = self.write_state()?;
        self.append_block(&mut state, proposal.tx_id, proposal.origin, writes)
    }
}

impl FeedSource for InMemoryLedger {
    fn subscribe(&self) -> FeedSubscription {
        self.feed.subscribe()
    }
}

#[async_trait]
impl HistorySource for InMemoryLedger {
    async fn history_since(&self, after: Revision) -> FeedResult<Vec<ConfirmedChange>> {
        let state = self
            .read_state()
            .map_err(|e| FeedError::HistoryUnavailable(e.to_string()))?;
        Ok(state
            .blocks
            .iter()
            .skip(after as usize)
            .map(LedgerBlock::to_change)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhaseDeadlines;

    fn batch(origin: &str, key: &str, value: &str) -> RemoteTransaction {
        let mut txn = RemoteTransaction::new(origin);
        txn.put(key, EncodedValue::new(value));
        txn
    }

    #[tokio::test]
    async fn batch_commit_is_one_block() {
        let ledger = InMemoryLedger::default();
        let mut feed = ledger.subscribe();

        let mut txn = ledger.begin("node-C");
        txn.put("C/a", EncodedValue::new("1"));
        txn.put("C/b", EncodedValue::new("2"));
        txn.delete("C/a");
        let tx_id = txn.id().clone();

        let receipt = ledger.commit(txn).await.unwrap();
        assert_eq!(receipt.revision, 1);
        assert_eq!(receipt.operations, 3);
        assert_eq!(receipt.tx_id, tx_id);

        let change = feed.recv().await.unwrap();
        assert_eq!(change.revision, 1);
        assert_eq!(change.tx_id, tx_id);
        assert_eq!(change.writes.len(), 3);
        assert!(change.verify_integrity());

        assert_eq!(ledger.entry("C/a").unwrap(), None);
        assert_eq!(ledger.entry("C/b").unwrap(), Some(EncodedValue::new("2")));
    }

    #[tokio::test]
    async fn blocks_form_a_valid_chain() {
        let ledger = InMemoryLedger::default();
        for i in 0..3 {
            ledger
                .commit(batch("node-C", &format!("C/k{i}"), "1"))
                .await
                .unwrap();
        }

        assert_eq!(ledger.height().unwrap(), 3);
        ledger.validate_chain().unwrap();

        let second = ledger.block(2).unwrap().unwrap();
        let first = ledger.block(1).unwrap().unwrap();
        assert_eq!(second.prev_hash, Some(first.block_hash));
        assert!(ledger.block(0).unwrap().is_none());
        assert!(ledger.block(4).unwrap().is_none());

        ledger.write_state().unwrap().blocks[1].origin = "forged".into();
        assert!(matches!(
            ledger.validate_chain(),
            Err(LedgerError::IntegrityViolation { number: 2, .. })
        ));
    }

    #[tokio::test]
    async fn failed_batches_leave_no_trace() {
        let ledger = InMemoryLedger::default();
        let mut feed = ledger.subscribe();

        ledger.inject_fault(Fault::RejectEndorsement).unwrap();
        ledger.inject_fault(Fault::DropSubmission).unwrap();

        let first = ledger.commit(batch("node-C", "C/a", "1")).await.unwrap_err();
        assert!(matches!(
            first,
            LedgerError::Commit(CommitFailure::EndorsementFailed { .. })
        ));
        let second = ledger.commit(batch("node-C", "C/a", "1")).await.unwrap_err();
        assert!(matches!(
            second,
            LedgerError::Commit(CommitFailure::SubmissionFailed { .. })
        ));

        assert_eq!(ledger.height().unwrap(), 0);
        assert_eq!(ledger.entry("C/a").unwrap(), None);
        assert_eq!(feed.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn stalled_batch_times_out_unconfirmed() {
        let ledger = InMemoryLedger::new(LedgerConfig {
            deadlines: PhaseDeadlines::uniform(Duration::from_millis(50)),
            ..LedgerConfig::default()
        });
        ledger
            .inject_fault(Fault::StallCommit(Duration::from_secs(5)))
            .unwrap();

        let err = ledger.commit(batch("node-C", "C/a", "1")).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Commit(CommitFailure::CommitTimeout {
                phase: Phase::CommitStatus,
                ..
            })
        ));
        assert_eq!(ledger.height().unwrap(), 0);
    }

    #[tokio::test]
    async fn short_stall_still_confirms() {
        let ledger = InMemoryLedger::default();
        ledger
            .inject_fault(Fault::StallCommit(Duration::from_millis(5)))
            .unwrap();
        let receipt = ledger.commit(batch("node-C", "C/a", "1")).await.unwrap();
        assert_eq!(receipt.revision, 1);
    }

    #[tokio::test]
    async fn history_replays_after_revision() {
        let ledger = InMemoryLedger::default();
        for i in 0..4 {
            ledger
                .commit(batch("node-C", &format!("C/k{i}"), "1"))
                .await
                .unwrap();
        }

        let history = ledger.history_since(2).await.unwrap();
        let revisions: Vec<_> = history.iter().map(|c| c.revision).collect();
        assert_eq!(revisions, vec![3, 4]);
        assert!(ledger.history_since(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prefix_listing() {
        let ledger = InMemoryLedger::default();
        ledger.commit(batch("node-C", "C/a", "1")).await.unwrap();
        ledger.commit(batch("node-O", "O/a", "2")).await.unwrap();

        let entries = ledger.entries_with_prefix("C/").unwrap();
        assert_eq!(entries, vec![("C/a".to_string(), EncodedValue::new("1"))]);
    }

    #[tokio::test]
    async fn contract_phases_confirm_one_write() {
        let ledger = InMemoryLedger::default();
        let proposal = Proposal::new(
            "node-C",
            OperationName::PutEntry,
            vec!["C/a".into(), "1".into()],
        );

        let endorsement = ledger.endorse(&proposal).await.unwrap();
        let submitted = ledger.submit(endorsement).await.unwrap();
        assert_eq!(ledger.height().unwrap(), 0);

        let revision = ledger.commit_status(&submitted).await.unwrap();
        assert_eq!(revision, 1);
        assert_eq!(ledger.entry("C/a").unwrap(), Some(EncodedValue::new("1")));

        // Confirming twice is a submission error, not a second block.
        assert!(ledger.commit_status(&submitted).await.is_err());
        assert_eq!(ledger.height().unwrap(), 1);
    }

    #[tokio::test]
    async fn endorsement_checks_arguments() {
        let ledger = InMemoryLedger::default();
        let proposal = Proposal::new("node-C", OperationName::PutEntry, vec!["C/a".into()]);
        assert!(matches!(
            ledger.endorse(&proposal).await,
            Err(LedgerError::InvalidArguments { expected: 2, got: 1, .. })
        ));
    }

    #[tokio::test]
    async fn closed_ledger_still_commits_without_feed() {
        let ledger = InMemoryLedger::default();
        let mut feed = ledger.subscribe();
        ledger.close();

        ledger.commit(batch("node-C", "C/a", "1")).await.unwrap();
        assert_eq!(feed.recv().await, Err(FeedError::Closed));
        assert_eq!(ledger.height().unwrap(), 1);
    }
}
