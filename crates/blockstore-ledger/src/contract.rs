use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use blockstore_feed::LedgerWrite;
use blockstore_types::{EncodedValue, Revision, TransactionId};

use crate::config::{LedgerConfig, Phase};
use crate::error::{CommitFailure, LedgerError, LedgerResult};
use crate::store::{LedgerContract, TransactionalStore};
use crate::transaction::{CommitReceipt, RemoteTransaction};

/// Operations the ledger's contract exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationName {
    /// `PutEntry(key, value)`
    PutEntry,
    /// `DeleteEntry(key)`
    DeleteEntry,
    /// `ReadEntry(key)`: responds with a JSON object `{ key: value }`.
    ReadEntry,
}

impl OperationName {
    pub fn arity(self) -> usize {
        match self {
            Self::PutEntry => 2,
            Self::DeleteEntry | Self::ReadEntry => 1,
        }
    }

    pub fn check_args(self, args: &[String]) -> LedgerResult<()> {
        if args.len() != self.arity() {
            return Err(LedgerError::InvalidArguments {
                operation: self,
                expected: self.arity(),
                got: args.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PutEntry => "PutEntry",
            Self::DeleteEntry => "DeleteEntry",
            Self::ReadEntry => "ReadEntry",
        };
        f.write_str(s)
    }
}

/// A named operation with positional arguments, as sent to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub tx_id: TransactionId,
    pub origin: String,
    pub operation: OperationName,
    pub args: Vec<String>,
}

impl Proposal {
    pub fn new(origin: impl Into<String>, operation: OperationName, args: Vec<String>) -> Self {
        Self {
            tx_id: TransactionId::new(),
            origin: origin.into(),
            operation,
            args,
        }
    }

    /// The ledger writes this proposal performs once confirmed.
    pub fn writes(&self) -> LedgerResult<Vec<LedgerWrite>> {
        self.operation.check_args(&self.args)?;
        Ok(match self.operation {
            OperationName::PutEntry => vec![LedgerWrite::put(
                self.args[0].clone(),
                EncodedValue::new(self.args[1].clone()),
            )],
            OperationName::DeleteEntry => vec![LedgerWrite::delete(self.args[0].clone())],
            OperationName::ReadEntry => Vec::new(),
        })
    }
}

/// A proposal together with the response its endorsers agreed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endorsement {
    pub proposal: Proposal,
    pub response: Vec<u8>,
}

/// Handle to a transaction the ordering service has accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedTx {
    pub tx_id: TransactionId,
}

/// Outcome of one submitted operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submitted {
    pub response: Vec<u8>,
    pub revision: Revision,
}

/// Encode a `ReadEntry` response document.
pub fn encode_read_response(key: &str, value: Option<&EncodedValue>) -> Vec<u8> {
    let mut document = Map::new();
    if let Some(value) = value {
        document.insert(key.to_string(), Value::String(value.as_str().to_string()));
    }
    Value::Object(document).to_string().into_bytes()
}

/// Parse a `ReadEntry` response document and pick out `key`.
pub fn parse_read_response(key: &str, response: &[u8]) -> LedgerResult<Option<EncodedValue>> {
    let malformed = |reason: String| LedgerError::MalformedResponse {
        operation: OperationName::ReadEntry,
        reason,
    };

    let document: Map<String, Value> =
        serde_json::from_slice(response).map_err(|e| malformed(e.to_string()))?;
    match document.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(EncodedValue::new(value.clone()))),
        Some(other) => Err(malformed(format!(
            "value for {key} is not a string: {other}"
        ))),
    }
}

/// A [`TransactionalStore`] for ledgers whose contract has no batch
/// operation.
///
/// Every queued write becomes its own remote transaction, submitted in
/// order with per-phase deadlines and an at-least-once retry policy. The
/// batch stops at the first write that fails for good; writes confirmed
/// before it stay confirmed and reach the feed.
pub struct ContractStore<C> {
    contract: Arc<C>,
    config: LedgerConfig,
}

impl<C: LedgerContract> ContractStore<C> {
    pub fn new(contract: Arc<C>, config: LedgerConfig) -> Self {
        Self { contract, config }
    }

    pub fn contract(&self) -> &Arc<C> {
        &self.contract
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Submit one named operation: endorse, submit, and wait for
    /// confirmation, retrying transient failures.
    pub async fn submit(
        &self,
        origin: &str,
        operation: OperationName,
        args: Vec<String>,
    ) -> LedgerResult<Submitted> {
        operation.check_args(&args)?;
        let max_attempts = self.config.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let proposal = Proposal::new(origin, operation, args.clone());
            match self.submit_once(&proposal).await {
                Ok(submitted) => return Ok(submitted),
                Err(LedgerError::Commit(failure))
                    if failure.is_retriable() && attempt < max_attempts =>
                {
                    warn!(
                        %operation,
                        tx = %proposal.tx_id,
                        attempt,
                        error = %failure,
                        "ledger submission failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Evaluate a read-only operation within the evaluate deadline.
    pub async fn evaluate(
        &self,
        origin: &str,
        operation: OperationName,
        args: Vec<String>,
    ) -> LedgerResult<Vec<u8>> {
        operation.check_args(&args)?;
        let proposal = Proposal::new(origin, operation, args);
        let deadline = self.config.deadlines.evaluate;
        tokio::time::timeout(deadline, self.contract.evaluate(&proposal))
            .await
            .map_err(|_| {
                LedgerError::ReadFailed(format!(
                    "{operation} not evaluated within {}ms",
                    deadline.as_millis()
                ))
            })?
    }

    async fn submit_once(&self, proposal: &Proposal) -> LedgerResult<Submitted> {
        let endorsement = self
            .within(Phase::Endorse, self.contract.endorse(proposal))
            .await?;
        let response = endorsement.response.clone();
        let submitted = self
            .within(Phase::Submit, self.contract.submit(endorsement))
            .await?;
        let revision = self
            .within(Phase::CommitStatus, self.contract.commit_status(&submitted))
            .await?;

        debug!(
            operation = %proposal.operation,
            tx = %proposal.tx_id,
            revision,
            "ledger transaction confirmed"
        );
        Ok(Submitted { response, revision })
    }

    async fn within<T>(
        &self,
        phase: Phase,
        fut: impl Future<Output = LedgerResult<T>>,
    ) -> LedgerResult<T> {
        let deadline = self.config.deadlines.for_phase(phase);
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(CommitFailure::CommitTimeout { phase, deadline }.into()),
        }
    }
}

#[async_trait]
impl<C: LedgerContract> TransactionalStore for ContractStore<C> {
    async fn commit(&self, txn: RemoteTransaction) -> LedgerResult<CommitReceipt> {
        if txn.is_empty() {
            return Err(LedgerError::EmptyTransaction(txn.id().clone()));
        }

        let (tx_id, origin, writes) = txn.into_parts();
        let operations = writes.len();
        let mut revision = 0;
        for write in writes {
            let submitted = match write.value {
                Some(value) => {
                    self.submit(
                        &origin,
                        OperationName::PutEntry,
                        vec![write.key, value.into_string()],
                    )
                    .await?
                }
                None => {
                    self.submit(&origin, OperationName::DeleteEntry, vec![write.key])
                        .await?
                }
            };
            revision = submitted.revision;
        }

        Ok(CommitReceipt {
            tx_id,
            revision,
            operations,
        })
    }

    async fn read_entry(&self, origin: &str, key: &str) -> LedgerResult<Option<EncodedValue>> {
        let response = self
            .evaluate(origin, OperationName::ReadEntry, vec![key.to_string()])
            .await?;
        parse_read_response(key, &response)
    }
}
