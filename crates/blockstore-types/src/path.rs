//! Document tree paths.
//!
//! A [`DocPath`] is an ordered sequence of [`PathArgument`]s locating one node
//! in the hierarchical document tree. Its string form is stable and is used
//! verbatim (after the datastore prefix) as the external store's key:
//!
//! ```text
//! /                                  the root
//! /interfaces/interface[name=eth0]   a keyed list entry below a container
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{TypeError, TypeResult};

const RESERVED: &[char] = &['/', '[', ']', '=', ','];

fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty() && !s.contains(RESERVED) && !s.chars().any(char::is_whitespace)
}

/// One step in a [`DocPath`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathArgument {
    /// A named child: a container or a leaf.
    Node(String),
    /// An entry of a keyed list, e.g. `interface[name=eth0]`.
    Entry {
        name: String,
        keys: BTreeMap<String, String>,
    },
}

impl PathArgument {
    /// A named child node.
    ///
    /// Panics if `name` is empty or contains a reserved character; building
    /// a path from an invalid literal is a programming error.
    pub fn node(name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(is_valid_identifier(&name), "invalid node name {name:?}");
        Self::Node(name)
    }

    /// A keyed list entry with a single key.
    pub fn entry(name: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(key.into(), value.into());
        Self::entry_with_keys(name, keys)
    }

    /// A keyed list entry with any number of keys.
    pub fn entry_with_keys(name: impl Into<String>, keys: BTreeMap<String, String>) -> Self {
        let name = name.into();
        assert!(is_valid_identifier(&name), "invalid list name {name:?}");
        assert!(!keys.is_empty(), "list entry {name:?} needs at least one key");
        for (k, v) in &keys {
            assert!(
                is_valid_identifier(k) && is_valid_identifier(v),
                "invalid key predicate {k:?}={v:?} on {name:?}"
            );
        }
        Self::Entry { name, keys }
    }

    /// The node or list name, without key predicates.
    pub fn name(&self) -> &str {
        match self {
            Self::Node(name) | Self::Entry { name, .. } => name,
        }
    }
}

impl fmt::Display for PathArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(name) => f.write_str(name),
            Self::Entry { name, keys } => {
                write!(f, "{name}[")?;
                for (i, (k, v)) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Debug for PathArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathArgument({self})")
    }
}

impl FromStr for PathArgument {
    type Err = TypeError;

    fn from_str(s: &str) -> TypeResult<Self> {
        let invalid = || TypeError::InvalidIdentifier(s.to_string());

        let Some(open) = s.find('[') else {
            return if is_valid_identifier(s) {
                Ok(Self::Node(s.to_string()))
            } else {
                Err(invalid())
            };
        };

        let name = &s[..open];
        let predicates = s[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
        if !is_valid_identifier(name) {
            return Err(invalid());
        }

        let mut keys = BTreeMap::new();
        for predicate in predicates.split(',') {
            let (k, v) = predicate.split_once('=').ok_or_else(invalid)?;
            if !is_valid_identifier(k) || !is_valid_identifier(v) {
                return Err(invalid());
            }
            if keys.insert(k.to_string(), v.to_string()).is_some() {
                return Err(invalid());
            }
        }

        Ok(Self::Entry {
            name: name.to_string(),
            keys,
        })
    }
}

impl Serialize for PathArgument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PathArgument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Absolute location of a node in the document tree.
///
/// The empty path is the tree's root.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    args: Vec<PathArgument>,
}

impl DocPath {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_args(args: Vec<PathArgument>) -> Self {
        Self { args }
    }

    pub fn is_root(&self) -> bool {
        self.args.is_empty()
    }

    /// Number of path arguments (0 for the root).
    pub fn depth(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &[PathArgument] {
        &self.args
    }

    /// A new path with `arg` appended.
    pub fn node(&self, arg: PathArgument) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.extend_from_slice(&self.args);
        args.push(arg);
        Self { args }
    }

    /// Shorthand for appending a named child.
    pub fn child(&self, name: impl Into<String>) -> Self {
        self.node(PathArgument::node(name))
    }

    /// The enclosing path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.args.split_last()?;
        Some(Self {
            args: init.to_vec(),
        })
    }

    /// The final argument, or `None` for the root.
    pub fn last(&self) -> Option<&PathArgument> {
        self.args.last()
    }

    /// Returns `true` if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &DocPath) -> bool {
        self.args.starts_with(&prefix.args)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return f.write_str("/");
        }
        for arg in &self.args {
            write!(f, "/{arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocPath({self})")
    }
}

impl FromStr for DocPath {
    type Err = TypeError;

    fn from_str(s: &str) -> TypeResult<Self> {
        let rest = s.strip_prefix('/').ok_or_else(|| TypeError::InvalidPath {
            input: s.to_string(),
            reason: "must start with '/'".into(),
        })?;
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let args = rest
            .split('/')
            .map(|segment| {
                segment.parse().map_err(|_| TypeError::InvalidPath {
                    input: s.to_string(),
                    reason: format!("bad segment {segment:?}"),
                })
            })
            .collect::<TypeResult<Vec<_>>>()?;
        Ok(Self { args })
    }
}

impl From<Vec<PathArgument>> for DocPath {
    fn from(args: Vec<PathArgument>) -> Self {
        Self { args }
    }
}

impl Serialize for DocPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
