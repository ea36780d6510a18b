use serde::{Deserialize, Serialize};

use blockstore_feed::{ConfirmedChange, LedgerWrite};
use blockstore_types::{Revision, TransactionId};

use crate::error::{LedgerError, LedgerResult};

/// One confirmed transaction in the in-memory ledger.
///
/// Blocks are numbered from 1 and each one carries the hash of its
/// predecessor; the block number doubles as the feed revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBlock {
    pub number: Revision,
    pub prev_hash: Option<[u8; 32]>,
    pub tx_id: TransactionId,
    pub origin: String,
    pub writes: Vec<LedgerWrite>,
    pub block_hash: [u8; 32],
}

impl LedgerBlock {
    /// Seal a new block on top of `prev`.
    pub fn seal(
        prev: Option<&LedgerBlock>,
        tx_id: TransactionId,
        origin: String,
        writes: Vec<LedgerWrite>,
    ) -> LedgerResult<Self> {
        let mut block = Self {
            number: prev.map_or(1, |p| p.number + 1),
            prev_hash: prev.map(|p| p.block_hash),
            tx_id,
            origin,
            writes,
            block_hash: [0; 32],
        };
        block.block_hash = block.compute_hash()?;
        Ok(block)
    }

    /// Hash of the block with its own hash field zeroed.
    pub fn compute_hash(&self) -> LedgerResult<[u8; 32]> {
        let mut canonical = self.clone();
        canonical.block_hash = [0; 32];

        let encoded = serde_json::to_vec(&canonical)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"blockstore-ledger-block-v1:");
        hasher.update(&encoded);
        Ok(*hasher.finalize().as_bytes())
    }

    pub fn short_hash(&self) -> String {
        hex::encode(&self.block_hash[..4])
    }

    /// The feed event announcing this block.
    pub fn to_change(&self) -> ConfirmedChange {
        ConfirmedChange::new(
            self.number,
            self.tx_id.clone(),
            self.origin.clone(),
            self.writes.clone(),
        )
    }
}

/// Check numbering, hash links, and block hashes of a chain.
pub fn validate_chain(blocks: &[LedgerBlock]) -> LedgerResult<()> {
    for (index, block) in blocks.iter().enumerate() {
        let expected_number = (index + 1) as Revision;
        if block.number != expected_number {
            return Err(LedgerError::IntegrityViolation {
                number: block.number,
                reason: format!("expected block number {expected_number}"),
            });
        }

        let expected_prev = index.checked_sub(1).map(|i| blocks[i].block_hash);
        if block.prev_hash != expected_prev {
            return Err(LedgerError::IntegrityViolation {
                number: block.number,
                reason: "previous hash link mismatch".into(),
            });
        }

        if block.compute_hash()? != block.block_hash {
            return Err(LedgerError::IntegrityViolation {
                number: block.number,
                reason: "block hash mismatch".into(),
            });
        }
    }
    Ok(())
}
