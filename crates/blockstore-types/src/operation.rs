use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::DocPath;

/// A value in the external store's text encoding.
///
/// Produced by the datastore's value codec; the ledger only ever sees this
/// opaque form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedValue(String);

impl EncodedValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 48;
        if self.0.len() <= PREVIEW {
            write!(f, "EncodedValue({:?})", self.0)
        } else {
            let cut = (0..=PREVIEW)
                .rev()
                .find(|&i| self.0.is_char_boundary(i))
                .unwrap_or(0);
            write!(f, "EncodedValue({:?}.. {} bytes)", &self.0[..cut], self.0.len())
        }
    }
}

impl fmt::Display for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a point write against the external store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Put,
    Delete,
}

/// One point write or delete inside a remote transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub path: DocPath,
    /// Present for `Put`, absent for `Delete`.
    pub value: Option<EncodedValue>,
}

impl Operation {
    pub fn put(path: DocPath, value: EncodedValue) -> Self {
        Self {
            kind: OperationKind::Put,
            path,
            value: Some(value),
        }
    }

    pub fn delete(path: DocPath) -> Self {
        Self {
            kind: OperationKind::Delete,
            path,
            value: None,
        }
    }

    pub fn is_put(&self) -> bool {
        self.kind == OperationKind::Put
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "put {} ➠ {} bytes", self.path, value.len()),
            None => write!(f, "delete {}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pair_kind_and_value() {
        let path: DocPath = "/a".parse().unwrap();
        let put = Operation::put(path.clone(), EncodedValue::new("{}"));
        assert!(put.is_put());
        assert!(put.value.is_some());

        let delete = Operation::delete(path);
        assert_eq!(delete.kind, OperationKind::Delete);
        assert!(delete.value.is_none());
        assert_eq!(delete.to_string(), "delete /a");
    }

    #[test]
    fn debug_truncates_long_values() {
        let value = EncodedValue::new("x".repeat(500));
        let debug = format!("{value:?}");
        assert!(debug.contains("500 bytes"));
        assert!(debug.len() < 100);
    }
}
