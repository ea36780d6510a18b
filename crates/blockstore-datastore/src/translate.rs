use blockstore_tree::{absolute_path, ChangeTree, ChangeTreeNode, ModificationKind};
use blockstore_types::{DocPath, Operation};

use crate::codec::ValueCodec;
use crate::error::{DatastoreError, DatastoreResult};

/// Turns a change tree into the ordered ledger operations that reproduce it.
///
/// Stateless: the output depends only on the tree and the value codec.
#[derive(Clone, Copy, Debug)]
pub struct CommitTranslator<'a> {
    values: &'a ValueCodec,
}

impl<'a> CommitTranslator<'a> {
    pub fn new(values: &'a ValueCodec) -> Self {
        Self { values }
    }

    /// Walk `tree` depth-first in pre-order: a node's own operation comes
    /// before those of its descendants.
    ///
    /// Only trees rooted at the document root are accepted.
    pub fn translate(&self, tree: &ChangeTree) -> DatastoreResult<Vec<Operation>> {
        if !tree.root_path().is_root() {
            return Err(DatastoreError::UnsupportedRootShape {
                root: tree.root_path().clone(),
            });
        }

        let mut ops = Vec::new();
        self.visit(tree.root_path(), tree.root(), true, &mut ops)?;
        Ok(ops)
    }

    fn visit(
        &self,
        base: &DocPath,
        node: &ChangeTreeNode,
        is_root: bool,
        ops: &mut Vec<Operation>,
    ) -> DatastoreResult<()> {
        let path = absolute_path(base, node, is_root);

        match node.kind() {
            ModificationKind::Write | ModificationKind::Appeared => {
                let Some(value) = node.data_after() else {
                    unreachable!("{} node at {path} without data_after", node.kind());
                };
                ops.push(Operation::put(path.clone(), self.values.encode(value)?));
            }
            ModificationKind::Delete | ModificationKind::Disappeared => {
                ops.push(Operation::delete(path.clone()));
            }
            ModificationKind::Unmodified | ModificationKind::SubtreeModified => {}
        }

        for child in node.children() {
            self.visit(&path, child, false, ops)?;
        }
        Ok(())
    }
}
