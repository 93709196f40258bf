//! The validated, immutable-per-tick scenario definition.
//!
//! A definition is replaced wholesale on any structural edit; the engine
//! never mutates one in place. Construction goes through
//! `validation::validate`, which is the only path that produces one.

use crate::graph::config::{NodeConfig, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Editor-level grouping of nodes (visual only; no execution semantics).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub members: Vec<NodeId>,
}

/// A validated scenario: node configs in declaration order plus
/// grouping/tag metadata.
///
/// Declaration order is the engine's deterministic iteration order within
/// each tick phase, so it is preserved exactly as authored.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphDefinition {
    nodes: Vec<NodeConfig>,
    groups: Vec<NodeGroup>,
    tags: HashMap<NodeId, Vec<String>>,
    /// Rebuilt on construction, never serialized.
    #[serde(skip)]
    index: HashMap<NodeId, usize>,
}

impl GraphDefinition {
    /// Assembles a definition from already-validated parts.
    /// `validation::validate` guarantees id uniqueness before calling this.
    pub(crate) fn from_parts(
        nodes: Vec<NodeConfig>,
        groups: Vec<NodeGroup>,
        tags: HashMap<NodeId, Vec<String>>,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id().clone(), i))
            .collect();
        Self {
            nodes,
            groups,
            tags,
            index,
        }
    }

    pub fn get(&self, id: &str) -> Option<&NodeConfig> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.get(id).map(|n| n.kind())
    }

    /// All configs in declaration order.
    pub fn nodes(&self) -> &[NodeConfig] {
        &self.nodes
    }

    /// Ids of every node of the given kind, in declaration order.
    pub fn ids_of_kind(&self, kind: NodeKind) -> Vec<&NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.kind() == kind)
            .map(|n| n.id())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    pub fn tags(&self) -> &HashMap<NodeId, Vec<String>> {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::config::{SinkConfig, SourceConfig, ValueRange};

    fn source(id: &str) -> NodeConfig {
        NodeConfig::Source(SourceConfig {
            id: id.into(),
            label: String::new(),
            interval: 1,
            range: ValueRange { min: 1.0, max: 1.0 },
            outputs: vec![],
        })
    }

    fn sink(id: &str) -> NodeConfig {
        NodeConfig::Sink(SinkConfig {
            id: id.into(),
            label: String::new(),
            retain_limit: None,
        })
    }

    #[test]
    fn test_declaration_order_preserved() {
        let def = GraphDefinition::from_parts(
            vec![sink("z"), source("a"), source("m")],
            vec![],
            HashMap::new(),
        );
        let ids: Vec<&str> = def.nodes().iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
        let sources = def.ids_of_kind(NodeKind::Source);
        assert_eq!(sources, vec!["a", "m"]);
    }

    #[test]
    fn test_index_lookup() {
        let def =
            GraphDefinition::from_parts(vec![source("s1"), sink("k1")], vec![], HashMap::new());
        assert!(def.contains("s1"));
        assert_eq!(def.kind_of("k1"), Some(NodeKind::Sink));
        assert!(def.get("missing").is_none());
    }
}
