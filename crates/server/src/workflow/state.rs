use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Status of a node invocation, and of the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Completed => write!(f, "completed"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable state threaded through one run. `data` is read and written by
/// node handlers; `metadata` is auxiliary context visible to condition
/// evaluation but not patched by handler results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowState {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            metadata: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Merge a handler's result patch into `data`, overwriting existing keys.
    pub fn update(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.data.insert(key, value);
        }
    }

    /// Context for condition evaluation: `data` overlaid with `metadata`.
    /// Metadata wins when a key exists in both.
    pub fn evaluation_context(&self) -> Map<String, Value> {
        let mut context = self.data.clone();
        for (key, value) in &self.metadata {
            context.insert(key.clone(), value.clone());
        }
        context
    }
}

/// Immutable log record for one status transition. `state_snapshot` is a
/// deep copy of `state.data` taken at append time; later mutations of the
/// run state never change an appended entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub timestamp: DateTime<Utc>,
    pub node_name: String,
    pub status: NodeStatus,
    pub message: String,
    pub state_snapshot: Map<String, Value>,
}

/// Runtime record of one execution of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub graph_id: String,
    pub status: NodeStatus,
    pub current_node: Option<String>,
    pub state: WorkflowState,
    pub logs: Vec<ExecutionLog>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(graph_id: &str, initial_data: Map<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            graph_id: graph_id.to_string(),
            status: NodeStatus::Pending,
            current_node: None,
            state: WorkflowState::new(initial_data),
            logs: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_merges_patch_into_data() {
        let mut state = WorkflowState::default();
        state.set("a", json!(1));

        let mut patch = Map::new();
        patch.insert("a".to_string(), json!(2));
        patch.insert("b".to_string(), json!("x"));
        state.update(patch);

        assert_eq!(state.get("a"), Some(&json!(2)));
        assert_eq!(state.get("b"), Some(&json!("x")));
    }

    #[test]
    fn metadata_shadows_data_in_evaluation_context() {
        let mut state = WorkflowState::default();
        state.set("key", json!("from_data"));
        state
            .metadata
            .insert("key".to_string(), json!("from_metadata"));
        state.metadata.insert("extra".to_string(), json!(true));

        let context = state.evaluation_context();
        assert_eq!(context.get("key"), Some(&json!("from_metadata")));
        assert_eq!(context.get("extra"), Some(&json!(true)));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(NodeStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn new_run_starts_pending_with_initial_data() {
        let mut data = Map::new();
        data.insert("code".to_string(), json!("print('hi')"));
        let run = WorkflowRun::new("graph_1", data);

        assert_eq!(run.status, NodeStatus::Pending);
        assert_eq!(run.graph_id, "graph_1");
        assert!(run.current_node.is_none());
        assert!(run.completed_at.is_none());
        assert_eq!(run.state.get("code"), Some(&json!("print('hi')")));
    }
}
