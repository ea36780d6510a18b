//! Change-tree construction: diff a modification against its snapshot.
//!
//! The diff is guided by the explicitly touched paths. Outside a rewritten
//! subtree only branches leading to a touched path are visited; inside a
//! rewritten container every child that differs is reported, which is where
//! `Appeared` and `Disappeared` nodes come from.

use std::collections::{BTreeMap, BTreeSet};

use blockstore_types::{DocPath, NodeValue, PathArgument};

use crate::candidate::{ChangeTree, ChangeTreeNode, ModificationKind};
use crate::modification::{Touch, TreeModification};

/// Build the change tree for `modification`, rooted at the tree's root.
pub fn prepare(modification: &TreeModification) -> ChangeTree {
    let differ = Differ {
        touched: modification.touched(),
    };
    let before = modification.base().tree().root();
    let after = modification.after_tree().root();

    let root = differ
        .diff(None, &DocPath::root(), Some(before), Some(after), false)
        .unwrap_or_else(|| ChangeTreeNode::root(ModificationKind::Unmodified, None, Vec::new()));

    ChangeTree::new(DocPath::root(), root)
}

struct Differ<'a> {
    touched: &'a BTreeMap<DocPath, Touch>,
}

impl Differ<'_> {
    /// Diff one node. Returns `None` when the node is neither touched nor
    /// changed and so does not belong in the change tree.
    fn diff(
        &self,
        identifier: Option<PathArgument>,
        path: &DocPath,
        before: Option<&NodeValue>,
        after: Option<&NodeValue>,
        in_rewrite: bool,
    ) -> Option<ChangeTreeNode> {
        let touch = self.touched.get(path).copied();

        let (kind, data_after, children) = match (before, after) {
            (None, None) => {
                touch?;
                (ModificationKind::Unmodified, None, Vec::new())
            }
            (None, Some(new)) => {
                let kind = if touch == Some(Touch::Written) {
                    ModificationKind::Write
                } else {
                    ModificationKind::Appeared
                };
                (kind, Some(new.clone()), Vec::new())
            }
            (Some(_), None) => {
                let kind = if touch == Some(Touch::Deleted) {
                    ModificationKind::Delete
                } else {
                    ModificationKind::Disappeared
                };
                (kind, None, Vec::new())
            }
            (Some(old), Some(new)) if old == new => {
                if touch.is_none() && !path.is_root() {
                    return None;
                }
                (ModificationKind::Unmodified, None, Vec::new())
            }
            (Some(old), Some(new)) => {
                let rewritten = touch.is_some();
                let children = match (old.children(), new.children()) {
                    (Some(old_children), Some(new_children)) => self.diff_children(
                        path,
                        old_children,
                        new_children,
                        rewritten || in_rewrite,
                    ),
                    _ => Vec::new(),
                };
                if rewritten || !(old.is_container() && new.is_container()) {
                    (ModificationKind::Write, Some(new.clone()), children)
                } else {
                    (ModificationKind::SubtreeModified, None, children)
                }
            }
        };

        Some(ChangeTreeNode::new(identifier, kind, data_after, children))
    }

    fn diff_children(
        &self,
        path: &DocPath,
        before: &BTreeMap<PathArgument, NodeValue>,
        after: &BTreeMap<PathArgument, NodeValue>,
        in_rewrite: bool,
    ) -> Vec<ChangeTreeNode> {
        let mut names: BTreeSet<&PathArgument> = before.keys().chain(after.keys()).collect();
        // Touched paths that exist on neither side, such as deletes of
        // missing nodes, still get a node.
        names.extend(
            self.touched
                .range(path.clone()..)
                .map(|(touched, _)| touched)
                .take_while(|touched| touched.starts_with(path))
                .filter_map(|touched| touched.args().get(path.depth())),
        );

        names
            .into_iter()
            .filter_map(|arg| {
                let child_path = path.node(arg.clone());
                if !in_rewrite && !self.touches_at_or_below(&child_path) {
                    return None;
                }
                self.diff(
                    Some(arg.clone()),
                    &child_path,
                    before.get(arg),
                    after.get(arg),
                    in_rewrite,
                )
            })
            .collect()
    }

    /// Touched paths sort contiguously after their ancestors, so the first
    /// entry at or after `path` decides.
    fn touches_at_or_below(&self, path: &DocPath) -> bool {
        self.touched
            .range(path.clone()..)
            .next()
            .is_some_and(|(touched, _)| touched.starts_with(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_tree::{DataTree, TreeSnapshot};
    use proptest::prelude::*;

    fn path(s: &str) -> DocPath {
        s.parse().unwrap()
    }

    fn arg(name: &str) -> PathArgument {
        PathArgument::node(name)
    }

    fn snapshot(entries: &[(&str, NodeValue)]) -> TreeSnapshot {
        let mut tree = DataTree::new();
        for (p, v) in entries {
            tree.put(&path(p), v.clone()).unwrap();
        }
        TreeSnapshot::new(1, tree)
    }

    fn kinds(tree: &ChangeTree) -> Vec<(String, ModificationKind)> {
        let mut out = Vec::new();
        tree.walk(|p, node| out.push((p.to_string(), node.kind())));
        out
    }

    #[test]
    fn empty_modification_yields_unmodified_root() {
        let modification = TreeModification::new(snapshot(&[("/a", NodeValue::leaf("v"))]));
        let tree = prepare(&modification);

        assert!(tree.root_path().is_root());
        assert_eq!(tree.root().kind(), ModificationKind::Unmodified);
        assert!(tree.root().children().is_empty());
        assert!(tree.is_noop());
    }

    #[test]
    fn write_to_new_leaf() {
        let mut modification = TreeModification::new(TreeSnapshot::empty());
        modification.write(path("/a"), NodeValue::leaf("v1")).unwrap();

        let tree = prepare(&modification);
        assert_eq!(
            kinds(&tree),
            vec![
                ("/".into(), ModificationKind::SubtreeModified),
                ("/a".into(), ModificationKind::Write),
            ]
        );
        assert_eq!(
            tree.root().children()[0].data_after(),
            Some(&NodeValue::leaf("v1"))
        );
    }

    #[test]
    fn implicit_parents_appear() {
        let mut modification = TreeModification::new(TreeSnapshot::empty());
        modification.write(path("/a/b/c"), NodeValue::leaf("v")).unwrap();

        let tree = prepare(&modification);
        // The new /a carries the whole subtree, so nothing is listed below it.
        assert_eq!(
            kinds(&tree),
            vec![
                ("/".into(), ModificationKind::SubtreeModified),
                ("/a".into(), ModificationKind::Appeared),
            ]
        );
    }

    #[test]
    fn write_below_existing_container() {
        let base = snapshot(&[("/a/x", NodeValue::leaf("keep"))]);
        let mut modification = TreeModification::new(base);
        modification.write(path("/a/y"), NodeValue::leaf("new")).unwrap();

        let tree = prepare(&modification);
        assert_eq!(
            kinds(&tree),
            vec![
                ("/".into(), ModificationKind::SubtreeModified),
                ("/a".into(), ModificationKind::SubtreeModified),
                ("/a/y".into(), ModificationKind::Write),
            ]
        );
    }

    #[test]
    fn delete_existing_and_missing() {
        let base = snapshot(&[("/a", NodeValue::leaf("v"))]);
        let mut modification = TreeModification::new(base);
        modification.delete(path("/a"));
        modification.delete(path("/ghost"));

        let tree = prepare(&modification);
        assert_eq!(
            kinds(&tree),
            vec![
                ("/".into(), ModificationKind::SubtreeModified),
                ("/a".into(), ModificationKind::Delete),
                ("/ghost".into(), ModificationKind::Unmodified),
            ]
        );
    }

    #[test]
    fn rewriting_a_container_reports_child_differences() {
        let base = snapshot(&[(
            "/a",
            NodeValue::container()
                .with_leaf("same", 1_i64)
                .with_leaf("changed", 1_i64)
                .with_leaf("dropped", 1_i64),
        )]);
        let mut modification = TreeModification::new(base);
        modification
            .write(
                path("/a"),
                NodeValue::container()
                    .with_leaf("same", 1_i64)
                    .with_leaf("changed", 2_i64)
                    .with_leaf("added", 3_i64),
            )
            .unwrap();

        let tree = prepare(&modification);
        assert_eq!(
            kinds(&tree),
            vec![
                ("/".into(), ModificationKind::SubtreeModified),
                ("/a".into(), ModificationKind::Write),
                ("/a/added".into(), ModificationKind::Appeared),
                ("/a/changed".into(), ModificationKind::Write),
                ("/a/dropped".into(), ModificationKind::Disappeared),
            ]
        );
    }

    #[test]
    fn rewriting_with_identical_value_is_unmodified() {
        let base = snapshot(&[("/a", NodeValue::leaf("v"))]);
        let mut modification = TreeModification::new(base);
        modification.write(path("/a"), NodeValue::leaf("v")).unwrap();

        let tree = prepare(&modification);
        assert_eq!(tree.root().kind(), ModificationKind::Unmodified);
        assert!(tree.is_noop());
    }

    #[test]
    fn delete_then_recreate_below_is_a_rewrite() {
        let base = snapshot(&[("/a/old", NodeValue::leaf("v"))]);
        let mut modification = TreeModification::new(base);
        modification.delete(path("/a"));
        modification.write(path("/a/new"), NodeValue::leaf("w")).unwrap();

        let tree = prepare(&modification);
        let a = &tree.root().children()[0];
        assert_eq!(a.identifier(), Some(&arg("a")));
        assert_eq!(a.kind(), ModificationKind::Write);
        let child_kinds: Vec<_> = a.children().iter().map(|c| c.kind()).collect();
        assert_eq!(
            child_kinds,
            vec![ModificationKind::Write, ModificationKind::Disappeared]
        );
    }

    #[test]
    fn root_write_is_reported_on_the_root() {
        let base = snapshot(&[("/a", NodeValue::leaf("v"))]);
        let mut modification = TreeModification::new(base);
        modification
            .write(DocPath::root(), NodeValue::container().with_leaf("b", "w"))
            .unwrap();

        let tree = prepare(&modification);
        assert_eq!(tree.root().kind(), ModificationKind::Write);
        assert!(tree.root().data_after().is_some());
        let child_kinds: Vec<_> = tree.root().children().iter().map(|c| c.kind()).collect();
        assert_eq!(
            child_kinds,
            vec![ModificationKind::Disappeared, ModificationKind::Appeared]
        );
    }

    #[derive(Clone, Debug)]
    enum Step {
        Write(DocPath, NodeValue),
        Merge(DocPath, NodeValue),
        Delete(DocPath),
    }

    const NAMES: [&str; 3] = ["a", "b", "c"];

    fn path_strategy() -> impl Strategy<Value = DocPath> {
        prop::collection::vec(prop::sample::select(NAMES.to_vec()), 1..4).prop_map(|names| {
            DocPath::from_args(names.into_iter().map(|name| PathArgument::node(name)).collect())
        })
    }

    fn value_strategy() -> impl Strategy<Value = NodeValue> {
        prop_oneof![
            (0_i64..4).prop_map(|n| NodeValue::leaf(n)),
            prop::collection::btree_map(prop::sample::select(NAMES.to_vec()), 0_i64..4, 0..3)
                .prop_map(|leaves| {
                    leaves
                        .into_iter()
                        .fold(NodeValue::container(), |node, (name, n)| node.with_leaf(name, n))
                }),
        ]
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (path_strategy(), value_strategy()).prop_map(|(p, v)| Step::Write(p, v)),
            (path_strategy(), value_strategy()).prop_map(|(p, v)| Step::Merge(p, v)),
            path_strategy().prop_map(Step::Delete),
        ]
    }

    proptest! {
        #[test]
        fn replaying_the_change_tree_reproduces_the_modification(
            base_steps in prop::collection::vec(step_strategy(), 0..6),
            steps in prop::collection::vec(step_strategy(), 0..8),
        ) {
            let mut base = DataTree::new();
            for step in base_steps {
                let _ = match step {
                    Step::Write(p, v) => base.put(&p, v),
                    Step::Merge(p, v) => base.merge(&p, v),
                    Step::Delete(p) => {
                        base.remove(&p);
                        Ok(())
                    }
                };
            }

            let mut modification = TreeModification::new(TreeSnapshot::new(1, base.clone()));
            for step in steps {
                let _ = match step {
                    Step::Write(p, v) => modification.write(p, v),
                    Step::Merge(p, v) => modification.merge(p, v),
                    Step::Delete(p) => {
                        modification.delete(p);
                        Ok(())
                    }
                };
            }

            let tree = prepare(&modification);
            let mut replayed = base;
            tree.walk(|p, node| match node.kind() {
                ModificationKind::Write | ModificationKind::Appeared => {
                    let value = node.data_after().cloned().unwrap();
                    replayed.put(p, value).unwrap();
                }
                ModificationKind::Delete | ModificationKind::Disappeared => {
                    replayed.remove(p);
                }
                ModificationKind::Unmodified | ModificationKind::SubtreeModified => {}
            });
            prop_assert_eq!(&replayed, modification.after_tree());
        }
    }
}
