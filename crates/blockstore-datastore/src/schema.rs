use std::fmt;

use blockstore_types::{DocPath, NodeValue};

use crate::error::DatastoreResult;

/// The schema capability a store validates writes against.
///
/// `value` is `None` for deletes.
pub trait SchemaContext: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn validate(&self, path: &DocPath, value: Option<&NodeValue>) -> DatastoreResult<()>;
}

/// Accepts every change.
#[derive(Clone, Debug, Default)]
pub struct PermissiveSchema;

impl SchemaContext for PermissiveSchema {
    fn name(&self) -> &str {
        "permissive"
    }

    fn validate(&self, _path: &DocPath, _value: Option<&NodeValue>) -> DatastoreResult<()> {
        Ok(())
    }
}
