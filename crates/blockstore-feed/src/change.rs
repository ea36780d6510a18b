use serde::{Deserialize, Serialize};

use blockstore_types::{EncodedValue, Revision, TransactionId};

/// Content hash of a confirmed change (BLAKE3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeDigest(#[serde(with = "hex_digest")] [u8; 32]);

impl ChangeDigest {
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex representation (first 8 hex chars).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ChangeDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chg:{}", self.short_hex())
    }
}

/// One key written by a confirmed transaction: a put when `value` is set,
/// a delete otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWrite {
    pub key: String,
    pub value: Option<EncodedValue>,
}

impl LedgerWrite {
    pub fn put(key: impl Into<String>, value: EncodedValue) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.value.is_none()
    }
}

/// A transaction the external ledger has confirmed.
///
/// Every node, including the one that submitted the transaction, learns
/// about it only through one of these. `writes` keeps the order in which the
/// transaction queued its operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedChange {
    /// Ledger position of the transaction; strictly increasing.
    pub revision: Revision,
    pub tx_id: TransactionId,
    /// Name of the store that submitted the transaction.
    pub origin: String,
    pub writes: Vec<LedgerWrite>,
    /// BLAKE3 hash over (revision, tx_id, origin, writes).
    pub digest: ChangeDigest,
}

impl ConfirmedChange {
    /// Build a confirmed change, computing its digest.
    pub fn new(
        revision: Revision,
        tx_id: TransactionId,
        origin: impl Into<String>,
        writes: Vec<LedgerWrite>,
    ) -> Self {
        let origin = origin.into();
        let digest = Self::compute_digest(revision, &tx_id, &origin, &writes);
        Self {
            revision,
            tx_id,
            origin,
            writes,
            digest,
        }
    }

    /// Check the digest against the change's content.
    pub fn verify_integrity(&self) -> bool {
        self.digest == Self::compute_digest(self.revision, &self.tx_id, &self.origin, &self.writes)
    }

    /// Writes whose key lies in the namespace `prefix`.
    pub fn writes_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a LedgerWrite> + 'a {
        self.writes.iter().filter(move |write| {
            write
                .key
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    fn compute_digest(
        revision: Revision,
        tx_id: &TransactionId,
        origin: &str,
        writes: &[LedgerWrite],
    ) -> ChangeDigest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"blockstore-confirmed-change-v1:");
        hasher.update(&revision.to_le_bytes());
        hasher.update(tx_id.as_uuid().as_bytes());
        hasher.update(&(origin.len() as u64).to_le_bytes());
        hasher.update(origin.as_bytes());

        hasher.update(&(writes.len() as u64).to_le_bytes());
        for write in writes {
            hasher.update(&(write.key.len() as u64).to_le_bytes());
            hasher.update(write.key.as_bytes());
            match &write.value {
                Some(value) => {
                    hasher.update(&[1]);
                    hasher.update(&(value.as_bytes().len() as u64).to_le_bytes());
                    hasher.update(value.as_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }

        ChangeDigest::from_hash(*hasher.finalize().as_bytes())
    }
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut hash = [0u8; 32];
        hex::decode_to_slice(s, &mut hash).map_err(serde::de::Error::custom)?;
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(revision: Revision) -> ConfirmedChange {
        ConfirmedChange::new(
            revision,
            TransactionId::new(),
            "node-C",
            vec![
                LedgerWrite::put("C/a", EncodedValue::new(r#"{"leaf":{"type":"string","value":"v1"}}"#)),
                LedgerWrite::delete("C/b"),
            ],
        )
    }

    #[test]
    fn digest_verifies() {
        let change = sample(1);
        assert!(change.verify_integrity());
    }

    #[test]
    fn tampering_breaks_digest() {
        let mut change = sample(1);
        change.writes.pop();
        assert!(!change.verify_integrity());

        let mut change = sample(1);
        change.revision = 2;
        assert!(!change.verify_integrity());
    }

    #[test]
    fn digest_covers_every_write_field() {
        let tx_id = TransactionId::new();
        let digest = |writes: Vec<LedgerWrite>| ConfirmedChange::new(1, tx_id.clone(), "node-C", writes).digest;

        let deleted = digest(vec![LedgerWrite::delete("C/a")]);
        let emptied = digest(vec![LedgerWrite::put("C/a", EncodedValue::new(""))]);
        assert_ne!(deleted, emptied);

        // Moving bytes between key and value must change the digest.
        let split = digest(vec![LedgerWrite::put("C/ab", EncodedValue::new("c"))]);
        let shifted = digest(vec![LedgerWrite::put("C/a", EncodedValue::new("bc"))]);
        assert_ne!(split, shifted);

        let mut change = sample(1);
        change.writes[0].value = Some(EncodedValue::new("{}"));
        assert!(!change.verify_integrity());
    }

    #[test]
    fn digest_display() {
        let digest = ChangeDigest::from_hash([0xab; 32]);
        assert_eq!(digest.to_string(), "chg:abababab");
        assert_eq!(digest.to_hex().len(), 64);
    }

    #[test]
    fn prefix_filter_respects_namespace_boundary() {
        let change = ConfirmedChange::new(
            3,
            TransactionId::new(),
            "node-O",
            vec![
                LedgerWrite::delete("C/a"),
                LedgerWrite::delete("O/a"),
                LedgerWrite::delete("Other/a"),
            ],
        );
        let keys: Vec<_> = change.writes_with_prefix("O").map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec!["O/a"]);
    }

    #[test]
    fn json_roundtrip_keeps_integrity() {
        let change = sample(7);
        let json = serde_json::to_string(&change).unwrap();
        let decoded: ConfirmedChange = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, change);
        assert!(decoded.verify_integrity());
    }
}
