//! Change trees: what changed between two versions of the document tree.
//!
//! A [`ChangeTree`] is rooted at a declared path and holds one
//! [`ChangeTreeNode`] per visited node. Nodes are immutable once built and
//! their constructors enforce the structural invariants:
//!
//! - every non-root node carries a local identifier;
//! - `Write` and `Appeared` nodes carry the node's new value;
//! - `Delete` and `Disappeared` nodes carry no value.

use std::fmt;

use blockstore_types::{DocPath, NodeValue, PathArgument};

/// How a single node changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModificationKind {
    /// Explicitly written (created or replaced).
    Write,
    /// Came into existence without being written directly.
    Appeared,
    /// Explicitly deleted.
    Delete,
    /// Ceased to exist without being deleted directly.
    Disappeared,
    /// Touched, but its content is unchanged.
    Unmodified,
    /// Not changed itself; some descendant changed.
    SubtreeModified,
}

impl ModificationKind {
    fn requires_value(self) -> bool {
        matches!(self, Self::Write | Self::Appeared)
    }

    fn forbids_value(self) -> bool {
        matches!(self, Self::Delete | Self::Disappeared)
    }
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Write => "WRITE",
            Self::Appeared => "APPEARED",
            Self::Delete => "DELETE",
            Self::Disappeared => "DISAPPEARED",
            Self::Unmodified => "UNMODIFIED",
            Self::SubtreeModified => "SUBTREE_MODIFIED",
        };
        f.write_str(s)
    }
}

/// One node of a [`ChangeTree`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeTreeNode {
    identifier: Option<PathArgument>,
    kind: ModificationKind,
    data_after: Option<NodeValue>,
    children: Vec<ChangeTreeNode>,
}

impl ChangeTreeNode {
    /// Build a node, checking the structural invariants.
    ///
    /// Panics when they are violated: a malformed change tree is a bug in
    /// whatever produced it, not a runtime condition.
    pub fn new(
        identifier: Option<PathArgument>,
        kind: ModificationKind,
        data_after: Option<NodeValue>,
        children: Vec<ChangeTreeNode>,
    ) -> Self {
        assert!(
            !kind.requires_value() || data_after.is_some(),
            "{kind} change node {identifier:?} must carry data_after"
        );
        assert!(
            !kind.forbids_value() || data_after.is_none(),
            "{kind} change node {identifier:?} cannot carry data_after"
        );
        for child in &children {
            assert!(
                child.identifier.is_some(),
                "child change nodes of {identifier:?} must carry an identifier"
            );
        }
        Self {
            identifier,
            kind,
            data_after,
            children,
        }
    }

    /// A root node. Its identifier, if any, never contributes to paths.
    pub fn root(
        kind: ModificationKind,
        data_after: Option<NodeValue>,
        children: Vec<ChangeTreeNode>,
    ) -> Self {
        Self::new(None, kind, data_after, children)
    }

    pub fn write(arg: PathArgument, value: NodeValue) -> Self {
        Self::new(Some(arg), ModificationKind::Write, Some(value), Vec::new())
    }

    pub fn appeared(arg: PathArgument, value: NodeValue) -> Self {
        Self::new(Some(arg), ModificationKind::Appeared, Some(value), Vec::new())
    }

    pub fn delete(arg: PathArgument) -> Self {
        Self::new(Some(arg), ModificationKind::Delete, None, Vec::new())
    }

    pub fn disappeared(arg: PathArgument) -> Self {
        Self::new(Some(arg), ModificationKind::Disappeared, None, Vec::new())
    }

    pub fn unmodified(arg: PathArgument) -> Self {
        Self::new(Some(arg), ModificationKind::Unmodified, None, Vec::new())
    }

    pub fn subtree_modified(arg: PathArgument, children: Vec<ChangeTreeNode>) -> Self {
        Self::new(Some(arg), ModificationKind::SubtreeModified, None, children)
    }

    /// Replace this node's children.
    pub fn with_children(self, children: Vec<ChangeTreeNode>) -> Self {
        Self::new(self.identifier, self.kind, self.data_after, children)
    }

    pub fn identifier(&self) -> Option<&PathArgument> {
        self.identifier.as_ref()
    }

    pub fn kind(&self) -> ModificationKind {
        self.kind
    }

    pub fn data_after(&self) -> Option<&NodeValue> {
        self.data_after.as_ref()
    }

    pub fn children(&self) -> &[ChangeTreeNode] {
        &self.children
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ChangeTreeNode::node_count)
            .sum::<usize>()
    }
}

/// Compose the absolute path of `node` below `base`.
///
/// The root node of a change tree resolves to `base` unchanged: it stands
/// for the container the change tree is rooted at, not for an entry inside
/// it, so its own identifier is never appended.
pub fn absolute_path(base: &DocPath, node: &ChangeTreeNode, is_root: bool) -> DocPath {
    if is_root {
        return base.clone();
    }
    match node.identifier() {
        Some(arg) => base.node(arg.clone()),
        None => panic!("non-root change node below {base} has no identifier"),
    }
}

/// A diff between two versions of the document tree.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeTree {
    root_path: DocPath,
    root: ChangeTreeNode,
}

impl ChangeTree {
    pub fn new(root_path: DocPath, root: ChangeTreeNode) -> Self {
        Self { root_path, root }
    }

    /// The path the tree is declared to be rooted at.
    pub fn root_path(&self) -> &DocPath {
        &self.root_path
    }

    pub fn root(&self) -> &ChangeTreeNode {
        &self.root
    }

    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Visit every node in pre-order with its absolute path.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&DocPath, &ChangeTreeNode),
    {
        fn go<F>(base: &DocPath, node: &ChangeTreeNode, is_root: bool, visit: &mut F)
        where
            F: FnMut(&DocPath, &ChangeTreeNode),
        {
            let path = absolute_path(base, node, is_root);
            visit(&path, node);
            for child in node.children() {
                go(&path, child, false, visit);
            }
        }

        go(&self.root_path, &self.root, true, &mut visit);
    }

    /// Returns `true` if no node is created, replaced, or removed.
    pub fn is_noop(&self) -> bool {
        let mut noop = true;
        self.walk(|_, node| {
            if !matches!(
                node.kind(),
                ModificationKind::Unmodified | ModificationKind::SubtreeModified
            ) {
                noop = false;
            }
        });
        noop
    }
}

impl fmt::Display for ChangeTree {
    /// One line per node, indented by depth; the root prints as `-ROOT-`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn go(
            f: &mut fmt::Formatter<'_>,
            node: &ChangeTreeNode,
            depth: usize,
            is_root: bool,
        ) -> fmt::Result {
            let indent = "    ".repeat(depth);
            let name = match (is_root, node.identifier()) {
                (false, Some(arg)) => arg.to_string(),
                _ => "-ROOT-".to_string(),
            };
            writeln!(f, "{indent}{name} {}", node.kind())?;
            if let Some(value) = node.data_after() {
                writeln!(f, "{indent}  dataAfter = {value:?}")?;
            }
            for child in node.children() {
                go(f, child, depth + 1, false)?;
            }
            Ok(())
        }

        writeln!(f, "change tree at {}", self.root_path)?;
        go(f, &self.root, 0, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(name: &str) -> PathArgument {
        PathArgument::node(name)
    }

    #[test]
    fn root_path_ignores_root_identifier() {
        let base: DocPath = "/base".parse().unwrap();
        let named_root = ChangeTreeNode::new(
            Some(arg("ignored")),
            ModificationKind::SubtreeModified,
            None,
            Vec::new(),
        );
        let anonymous_root = ChangeTreeNode::root(ModificationKind::Unmodified, None, Vec::new());

        assert_eq!(absolute_path(&base, &named_root, true), base);
        assert_eq!(absolute_path(&base, &anonymous_root, true), base);
        assert_eq!(
            absolute_path(&base, &named_root, false).to_string(),
            "/base/ignored"
        );
    }

    #[test]
    fn walk_is_pre_order_with_absolute_paths() {
        let tree = ChangeTree::new(
            DocPath::root(),
            ChangeTreeNode::root(
                ModificationKind::SubtreeModified,
                None,
                vec![
                    ChangeTreeNode::subtree_modified(
                        arg("a"),
                        vec![ChangeTreeNode::write(arg("b"), NodeValue::leaf("v"))],
                    ),
                    ChangeTreeNode::delete(arg("c")),
                ],
            ),
        );

        let mut seen = Vec::new();
        tree.walk(|path, node| seen.push((path.to_string(), node.kind())));

        assert_eq!(
            seen,
            vec![
                ("/".to_string(), ModificationKind::SubtreeModified),
                ("/a".to_string(), ModificationKind::SubtreeModified),
                ("/a/b".to_string(), ModificationKind::Write),
                ("/c".to_string(), ModificationKind::Delete),
            ]
        );
        assert_eq!(tree.node_count(), 4);
        assert!(!tree.is_noop());
    }

    #[test]
    fn display_marks_the_root() {
        let tree = ChangeTree::new(
            DocPath::root(),
            ChangeTreeNode::root(
                ModificationKind::SubtreeModified,
                None,
                vec![ChangeTreeNode::write(arg("a"), NodeValue::leaf("v"))],
            ),
        );
        let printed = tree.to_string();
        assert!(printed.contains("-ROOT- SUBTREE_MODIFIED"));
        assert!(printed.contains("    a WRITE"));
    }

    #[test]
    #[should_panic(expected = "must carry data_after")]
    fn write_without_value_panics() {
        let _ = ChangeTreeNode::new(Some(arg("a")), ModificationKind::Appeared, None, Vec::new());
    }

    #[test]
    #[should_panic(expected = "must carry an identifier")]
    fn anonymous_child_panics() {
        let child = ChangeTreeNode::root(ModificationKind::Unmodified, None, Vec::new());
        let _ = ChangeTreeNode::subtree_modified(arg("a"), vec![child]);
    }
}
