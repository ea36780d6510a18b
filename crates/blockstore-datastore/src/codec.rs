//! Encodings between the document tree and the ledger's flat key space.
//!
//! Keys are the store's prefix followed by the path's string form
//! (`C/interfaces/interface[name=eth0]`); values are the JSON form of
//! [`NodeValue`].

use blockstore_types::{DocPath, EncodedValue, LeafValue, NodeValue};

use crate::error::{DatastoreError, DatastoreResult};

/// Maps document paths to ledger keys within one store's namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: &'static str,
}

impl KeyCodec {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn encode(&self, path: &DocPath) -> String {
        format!("{}{path}", self.prefix)
    }

    /// Returns `true` if `key` lies in this codec's namespace.
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(self.prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn decode(&self, key: &str) -> DatastoreResult<DocPath> {
        let rest = key
            .strip_prefix(self.prefix)
            .filter(|rest| rest.starts_with('/'))
            .ok_or_else(|| {
                DatastoreError::Serialization(format!(
                    "key {key:?} is outside namespace {:?}",
                    self.prefix
                ))
            })?;
        rest.parse()
            .map_err(|e| DatastoreError::Serialization(format!("key {key:?}: {e}")))
    }
}

/// Converts node values to and from the ledger's value encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueCodec {
    max_value_bytes: usize,
}

impl ValueCodec {
    pub fn new(max_value_bytes: usize) -> Self {
        Self { max_value_bytes }
    }

    pub fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    pub fn encode(&self, value: &NodeValue) -> DatastoreResult<EncodedValue> {
        check_finite(value)?;
        let text =
            serde_json::to_string(value).map_err(|e| DatastoreError::Serialization(e.to_string()))?;
        if text.len() > self.max_value_bytes {
            return Err(DatastoreError::Serialization(format!(
                "encoded value is {} bytes, limit is {}",
                text.len(),
                self.max_value_bytes
            )));
        }
        Ok(EncodedValue::new(text))
    }

    pub fn decode(&self, value: &EncodedValue) -> DatastoreResult<NodeValue> {
        serde_json::from_str(value.as_str())
            .map_err(|e| DatastoreError::Serialization(format!("undecodable value: {e}")))
    }
}

/// JSON has no encoding for NaN or infinities.
fn check_finite(value: &NodeValue) -> DatastoreResult<()> {
    match value {
        NodeValue::Leaf(LeafValue::Decimal(d)) if !d.is_finite() => Err(
            DatastoreError::Serialization(format!("decimal {d} has no encoding")),
        ),
        NodeValue::Leaf(_) => Ok(()),
        NodeValue::Container(children) => children.values().try_for_each(check_finite),
    }
}
