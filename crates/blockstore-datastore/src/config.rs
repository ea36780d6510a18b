use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use blockstore_types::duration_ms;

use crate::error::{DatastoreError, DatastoreResult};

/// Which of a node's two document trees a store holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatastoreKind {
    /// Intended configuration.
    Configuration,
    /// Observed operational state.
    Operational,
}

impl DatastoreKind {
    /// Namespace prefix of this kind's keys in the shared ledger.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Configuration => "C",
            Self::Operational => "O",
        }
    }
}

impl fmt::Display for DatastoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Operational => "operational",
        };
        f.write_str(s)
    }
}

/// Configuration of one store. Durations are written as milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Store name, used as the transaction origin and in logs.
    pub name: String,
    pub kind: DatastoreKind,
    /// Largest encoded value accepted for a single put.
    pub max_value_bytes: usize,
    /// Confirmed changes buffered between the feed listener and the mirror.
    pub mirror_queue_depth: usize,
    /// How long `sync` waits for the mirror to reach a revision.
    #[serde(with = "duration_ms")]
    pub sync_timeout: Duration,
}

impl DatastoreConfig {
    /// Default settings for `kind` on the node called `node`; the store is
    /// named `<node>-<prefix>`.
    pub fn for_node(node: &str, kind: DatastoreKind) -> Self {
        Self {
            name: format!("{node}-{}", kind.prefix()),
            kind,
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> DatastoreResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| DatastoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DatastoreResult<()> {
        if self.name.is_empty() {
            return Err(DatastoreError::Config("store name must not be empty".into()));
        }
        if self.max_value_bytes == 0 {
            return Err(DatastoreError::Config("max_value_bytes must be positive".into()));
        }
        if self.mirror_queue_depth == 0 {
            return Err(DatastoreError::Config(
                "mirror_queue_depth must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn prefix(&self) -> &'static str {
        self.kind.prefix()
    }
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            name: "blockstore-C".into(),
            kind: DatastoreKind::Configuration,
            max_value_bytes: 1024 * 1024,
            mirror_queue_depth: 64,
            sync_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_names_carry_the_prefix() {
        let config = DatastoreConfig::for_node("node1", DatastoreKind::Operational);
        assert_eq!(config.name, "node1-O");
        assert_eq!(config.prefix(), "O");
        assert_eq!(
            DatastoreConfig::for_node("node1", DatastoreKind::Configuration).name,
            "node1-C"
        );
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = DatastoreConfig::from_toml_str(
            r#"
            name = "edge-O"
            kind = "operational"
            sync_timeout = 750
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "edge-O");
        assert_eq!(config.kind, DatastoreKind::Operational);
        assert_eq!(config.sync_timeout, Duration::from_millis(750));
        assert_eq!(config.max_value_bytes, 1024 * 1024);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(matches!(
            DatastoreConfig::from_toml_str("mirror_queue_depth = 0"),
            Err(DatastoreError::Config(_))
        ));
        assert!(matches!(
            DatastoreConfig::from_toml_str("kind = \"archive\""),
            Err(DatastoreError::Config(_))
        ));
    }
}
