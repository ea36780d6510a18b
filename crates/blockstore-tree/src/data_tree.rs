use std::sync::Arc;

use blockstore_types::{DocPath, NodeValue, Revision};

use crate::error::{TreeError, TreeResult};

/// The in-memory hierarchical document tree.
///
/// The root is always a container. Writes create missing ancestor
/// containers; a path may never pass through a leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct DataTree {
    root: NodeValue,
}

impl DataTree {
    /// An empty tree: a root container with no children.
    pub fn new() -> Self {
        Self {
            root: NodeValue::container(),
        }
    }

    /// Build a tree from an existing root container.
    pub fn from_root(root: NodeValue) -> TreeResult<Self> {
        if !root.is_container() {
            return Err(TreeError::RootNotContainer);
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &NodeValue {
        &self.root
    }

    /// Read the node at `path`, if present.
    pub fn get(&self, path: &DocPath) -> Option<&NodeValue> {
        path.args()
            .iter()
            .try_fold(&self.root, |node, arg| node.child(arg))
    }

    pub fn contains(&self, path: &DocPath) -> bool {
        self.get(path).is_some()
    }

    /// Replace the subtree at `path` with `value`, creating missing
    /// ancestors as empty containers.
    pub fn put(&mut self, path: &DocPath, value: NodeValue) -> TreeResult<()> {
        let Some((last, parent_args)) = path.args().split_last() else {
            if !value.is_container() {
                return Err(TreeError::RootNotContainer);
            }
            self.root = value;
            return Ok(());
        };

        let parent = self.descend_creating(parent_args)?;
        let children = parent
            .children_mut()
            .ok_or_else(|| TreeError::LeafAncestor {
                path: DocPath::from_args(parent_args.to_vec()),
            })?;
        children.insert(last.clone(), value);
        Ok(())
    }

    /// Merge `value` into the subtree at `path`.
    ///
    /// Containers merge child by child; anything else replaces the
    /// existing node.
    pub fn merge(&mut self, path: &DocPath, value: NodeValue) -> TreeResult<()> {
        let existing_is_container = self.get(path).is_some_and(NodeValue::is_container);
        match value {
            NodeValue::Container(incoming) if existing_is_container => {
                for (arg, child) in incoming {
                    self.merge(&path.node(arg), child)?;
                }
                Ok(())
            }
            other => self.put(path, other),
        }
    }

    /// Remove the subtree at `path`, returning it if it existed.
    ///
    /// Removing the root leaves an empty root container behind.
    pub fn remove(&mut self, path: &DocPath) -> Option<NodeValue> {
        let Some((last, parent_args)) = path.args().split_last() else {
            return Some(std::mem::replace(&mut self.root, NodeValue::container()));
        };

        let mut node = &mut self.root;
        for arg in parent_args {
            node = node.children_mut()?.get_mut(arg)?;
        }
        node.children_mut()?.remove(last)
    }

    fn descend_creating(
        &mut self,
        args: &[blockstore_types::PathArgument],
    ) -> TreeResult<&mut NodeValue> {
        let mut node = &mut self.root;
        for (depth, arg) in args.iter().enumerate() {
            let children = node
                .children_mut()
                .ok_or_else(|| TreeError::LeafAncestor {
                    path: DocPath::from_args(args[..depth].to_vec()),
                })?;
            node = children
                .entry(arg.clone())
                .or_insert_with(NodeValue::container);
        }
        Ok(node)
    }
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable view of a [`DataTree`] at a given revision.
///
/// Cloning a snapshot is cheap; readers hold snapshots without blocking the
/// writer that produces the next one.
#[derive(Clone, Debug)]
pub struct TreeSnapshot {
    revision: Revision,
    tree: Arc<DataTree>,
}

impl TreeSnapshot {
    pub fn new(revision: Revision, tree: DataTree) -> Self {
        Self {
            revision,
            tree: Arc::new(tree),
        }
    }

    /// An empty tree at revision 0.
    pub fn empty() -> Self {
        Self::new(0, DataTree::new())
    }

    /// The last confirmed revision reflected in this snapshot.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn tree(&self) -> &DataTree {
        &self.tree
    }

    pub fn read(&self, path: &DocPath) -> Option<&NodeValue> {
        self.tree.get(path)
    }
}
