use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use blockstore_feed::DEFAULT_FEED_CAPACITY;
use blockstore_types::duration_ms;

/// The remote phases of one ledger transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Read-only evaluation on a peer (queries).
    Evaluate,
    /// Collecting endorsements for a proposal.
    Endorse,
    /// Handing the endorsed transaction to the ordering service.
    Submit,
    /// Waiting for the transaction to be confirmed in a block.
    CommitStatus,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Evaluate => "evaluate",
            Self::Endorse => "endorse",
            Self::Submit => "submit",
            Self::CommitStatus => "commit-status",
        };
        f.write_str(s)
    }
}

/// Per-phase deadlines. Durations are written as milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDeadlines {
    #[serde(with = "duration_ms")]
    pub evaluate: Duration,
    #[serde(with = "duration_ms")]
    pub endorse: Duration,
    #[serde(with = "duration_ms")]
    pub submit: Duration,
    #[serde(with = "duration_ms")]
    pub commit_status: Duration,
}

impl PhaseDeadlines {
    pub fn for_phase(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Evaluate => self.evaluate,
            Phase::Endorse => self.endorse,
            Phase::Submit => self.submit,
            Phase::CommitStatus => self.commit_status,
        }
    }

    /// The same deadline for every phase.
    pub fn uniform(deadline: Duration) -> Self {
        Self {
            evaluate: deadline,
            endorse: deadline,
            submit: deadline,
            commit_status: deadline,
        }
    }
}

impl Default for PhaseDeadlines {
    fn default() -> Self {
        Self {
            evaluate: Duration::from_secs(5),
            endorse: Duration::from_secs(15),
            submit: Duration::from_secs(5),
            commit_status: Duration::from_secs(60),
        }
    }
}

/// At-least-once resubmission of a single remote operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. `1` disables retry.
    pub max_attempts: u32,
    /// Pause between attempts.
    #[serde(with = "duration_ms")]
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Configuration for a ledger backend adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub deadlines: PhaseDeadlines,
    pub retry: RetryPolicy,
    /// Per-subscriber buffer of the confirmed-change feed.
    pub feed_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            deadlines: PhaseDeadlines::default(),
            retry: RetryPolicy::default(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}
