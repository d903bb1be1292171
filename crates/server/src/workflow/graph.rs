use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// A single named step in a workflow graph, bound to a registered handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub name: String,
    pub function_name: String,
    /// Static parameters merged into every invocation of this node.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// One branch of a conditional edge. Branches are evaluated in declared
/// order; the first condition that evaluates true selects the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalEdge {
    pub condition: String,
    pub target: String,
}

/// Immutable description of a workflow: nodes, transitions and start node.
///
/// Created once via [`GraphDefinition::validate`]d input and shared
/// read-only by every run of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub name: String,
    pub nodes: Vec<NodeDefinition>,
    /// Unconditional successor per node, e.g. {"extract": "analyze"}.
    #[serde(default)]
    pub edges: HashMap<String, String>,
    /// Ordered conditional branches per node. Takes precedence over `edges`.
    #[serde(default)]
    pub conditional_edges: HashMap<String, Vec<ConditionalEdge>>,
    pub start_node: String,
}

impl GraphDefinition {
    /// Check creation-time invariants: node names are unique and the start
    /// node exists. Edge targets are intentionally not checked here; a
    /// dangling target surfaces as a fatal `NodeNotFound` when reached.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        if !seen.contains(self.start_node.as_str()) {
            return Err(Error::Validation(format!(
                "start node '{}' is not defined in the graph",
                self.start_node
            )));
        }

        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeDefinition {
        NodeDefinition {
            name: name.to_string(),
            function_name: "noop".to_string(),
            parameters: Map::new(),
        }
    }

    #[test]
    fn valid_graph_passes_validation() {
        let graph = GraphDefinition {
            name: "linear".to_string(),
            nodes: vec![node("a"), node("b")],
            edges: HashMap::from([("a".to_string(), "b".to_string())]),
            conditional_edges: HashMap::new(),
            start_node: "a".to_string(),
        };
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn missing_start_node_is_rejected() {
        let graph = GraphDefinition {
            name: "bad".to_string(),
            nodes: vec![node("a")],
            edges: HashMap::new(),
            conditional_edges: HashMap::new(),
            start_node: "nope".to_string(),
        };
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("start node"));
    }

    #[test]
    fn duplicate_node_names_are_rejected() {
        let graph = GraphDefinition {
            name: "dup".to_string(),
            nodes: vec![node("a"), node("a")],
            edges: HashMap::new(),
            conditional_edges: HashMap::new(),
            start_node: "a".to_string(),
        };
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate node name"));
    }

    #[test]
    fn node_lookup_by_name() {
        let graph = GraphDefinition {
            name: "lookup".to_string(),
            nodes: vec![node("a"), node("b")],
            edges: HashMap::new(),
            conditional_edges: HashMap::new(),
            start_node: "a".to_string(),
        };
        assert_eq!(graph.node("b").map(|n| n.name.as_str()), Some("b"));
        assert!(graph.node("c").is_none());
    }
}
