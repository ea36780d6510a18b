use std::collections::BTreeMap;

use blockstore_types::{DocPath, NodeValue};
use tracing::trace;

use crate::data_tree::{DataTree, TreeSnapshot};
use crate::error::TreeResult;

/// The last explicit action taken on a path inside a modification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Touch {
    Written,
    Deleted,
}

/// One staged operation, in the order the caller issued it.
#[derive(Clone, Debug, PartialEq)]
pub enum ModificationOp {
    Write { path: DocPath, value: NodeValue },
    Merge { path: DocPath, value: NodeValue },
    Delete { path: DocPath },
}

impl ModificationOp {
    pub fn path(&self) -> &DocPath {
        match self {
            Self::Write { path, .. } | Self::Merge { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Writes, merges, and deletes staged against a [`TreeSnapshot`].
///
/// The snapshot is never mutated. The modified tree is materialized on the
/// first change, so reads inside the modification see its own writes.
#[derive(Clone, Debug)]
pub struct TreeModification {
    base: TreeSnapshot,
    after: Option<DataTree>,
    touched: BTreeMap<DocPath, Touch>,
    ops: Vec<ModificationOp>,
}

impl TreeModification {
    pub fn new(base: TreeSnapshot) -> Self {
        Self {
            base,
            after: None,
            touched: BTreeMap::new(),
            ops: Vec::new(),
        }
    }

    /// Replace the subtree at `path`.
    pub fn write(&mut self, path: DocPath, value: NodeValue) -> TreeResult<()> {
        self.after_mut().put(&path, value.clone())?;
        trace!(%path, "staged write");
        self.touch(&path, Touch::Written);
        self.ops.push(ModificationOp::Write { path, value });
        Ok(())
    }

    /// Merge `value` into the subtree at `path`.
    pub fn merge(&mut self, path: DocPath, value: NodeValue) -> TreeResult<()> {
        self.after_mut().merge(&path, value.clone())?;
        trace!(%path, "staged merge");
        self.touch(&path, Touch::Written);
        self.ops.push(ModificationOp::Merge { path, value });
        Ok(())
    }

    /// Delete the subtree at `path`. Deleting an absent node is allowed.
    pub fn delete(&mut self, path: DocPath) {
        self.after_mut().remove(&path);
        trace!(%path, "staged delete");
        self.touch(&path, Touch::Deleted);
        self.ops.push(ModificationOp::Delete { path });
    }

    /// Read through the modification: staged changes over the snapshot.
    pub fn read(&self, path: &DocPath) -> Option<&NodeValue> {
        self.after_tree().get(path)
    }

    pub fn base(&self) -> &TreeSnapshot {
        &self.base
    }

    /// The tree as it looks with every staged change applied.
    pub fn after_tree(&self) -> &DataTree {
        self.after.as_ref().unwrap_or_else(|| self.base.tree())
    }

    /// Explicitly touched paths and the last action on each.
    pub fn touched(&self) -> &BTreeMap<DocPath, Touch> {
        &self.touched
    }

    pub fn ops(&self) -> &[ModificationOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn after_mut(&mut self) -> &mut DataTree {
        let base = &self.base;
        self.after.get_or_insert_with(|| base.tree().clone())
    }

    /// Record `touch` on `path`; it supersedes anything staged below it.
    fn touch(&mut self, path: &DocPath, touch: Touch) {
        self.touched
            .retain(|existing, _| existing == path || !existing.starts_with(path));
        self.touched.insert(path.clone(), touch);
    }
}
