use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::PathArgument;

/// Scalar content of a leaf node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LeafValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Binary(#[serde(with = "hex_bytes")] Vec<u8>),
    /// A presence-only leaf with no content.
    Empty,
}

impl From<&str> for LeafValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for LeafValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for LeafValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for LeafValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

/// A node of the hierarchical document tree: a leaf or a container of
/// named children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeValue {
    Leaf(LeafValue),
    Container(BTreeMap<PathArgument, NodeValue>),
}

impl NodeValue {
    /// An empty container.
    pub fn container() -> Self {
        Self::Container(BTreeMap::new())
    }

    pub fn leaf(value: impl Into<LeafValue>) -> Self {
        Self::Leaf(value.into())
    }

    /// Builder: add (or replace) a child of a container.
    ///
    /// Panics when called on a leaf.
    pub fn with_child(mut self, arg: PathArgument, child: NodeValue) -> Self {
        match &mut self {
            Self::Container(children) => {
                children.insert(arg, child);
            }
            Self::Leaf(_) => panic!("cannot add child {arg} to a leaf"),
        }
        self
    }

    /// Builder shorthand for a named leaf child.
    pub fn with_leaf(self, name: &str, value: impl Into<LeafValue>) -> Self {
        self.with_child(PathArgument::node(name), Self::leaf(value))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafValue> {
        match self {
            Self::Leaf(v) => Some(v),
            Self::Container(_) => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<PathArgument, NodeValue>> {
        match self {
            Self::Container(children) => Some(children),
            Self::Leaf(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut BTreeMap<PathArgument, NodeValue>> {
        match self {
            Self::Container(children) => Some(children),
            Self::Leaf(_) => None,
        }
    }

    pub fn child(&self, arg: &PathArgument) -> Option<&NodeValue> {
        self.children()?.get(arg)
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Container(children) => {
                1 + children.values().map(NodeValue::node_count).sum::<usize>()
            }
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_nests_children() {
        let value = NodeValue::container()
            .with_leaf("mtu", 1500_i64)
            .with_child(
                PathArgument::node("ipv4"),
                NodeValue::container().with_leaf("enabled", true),
            );

        assert_eq!(value.node_count(), 4);
        assert_eq!(
            value.child(&PathArgument::node("mtu")),
            Some(&NodeValue::leaf(1500_i64))
        );
    }

    #[test]
    fn json_encoding_keys_children_by_path_argument() {
        let value = NodeValue::container()
            .with_child(
                PathArgument::entry("user", "name", "alice"),
                NodeValue::container().with_leaf("uid", 1000_i64),
            );
        let json = serde_json::to_value(&value).unwrap();
        assert!(json["container"]["user[name=alice]"]["container"]["uid"].is_object());

        let decoded: NodeValue = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn binary_leaves_are_hex_encoded() {
        let value = NodeValue::leaf(LeafValue::Binary(vec![0xde, 0xad]));
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"leaf":{"type":"binary","value":"dead"}}"#);
    }

    #[test]
    #[should_panic(expected = "cannot add child")]
    fn leaf_cannot_take_children() {
        let _ = NodeValue::leaf("x").with_leaf("y", 1_i64);
    }
}
