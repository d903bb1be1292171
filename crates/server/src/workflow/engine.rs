use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use crate::handlers::HandlerRegistry;
use crate::metrics;
use crate::{Error, Result};

use super::broadcast::{LogBroadcaster, ObserverId, StreamEvent};
use super::condition;
use super::graph::{GraphDefinition, NodeDefinition};
use super::state::{ExecutionLog, NodeStatus, WorkflowRun, WorkflowState};

/// Hard cap on state-machine steps per run. A run that would exceed this
/// fails with [`Error::IterationLimitExceeded`] instead of spinning forever.
pub const MAX_ITERATIONS: u32 = 100;

/// Counts of everything the engine currently holds in memory.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub graphs: usize,
    pub runs: usize,
    pub handlers: usize,
    pub total_log_entries: usize,
    pub active_observers: usize,
}

/// Core workflow execution engine.
///
/// Owns the graph and run stores, resolves node handlers through the
/// registry, and drives each run's state machine: invoke the current node,
/// resolve the next one through conditional then simple edges, and stop on
/// terminal or fatal conditions. Runs execute as independent sequences and
/// share no mutable state with each other.
pub struct WorkflowEngine {
    graphs: RwLock<HashMap<String, Arc<GraphDefinition>>>,
    graph_seq: AtomicU64,
    runs: RwLock<HashMap<String, WorkflowRun>>,
    registry: Arc<HandlerRegistry>,
    broadcaster: LogBroadcaster,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            graphs: RwLock::new(HashMap::new()),
            graph_seq: AtomicU64::new(0),
            runs: RwLock::new(HashMap::new()),
            registry,
            broadcaster: LogBroadcaster::new(),
        }
    }

    /// Validate and store a graph definition, returning its generated id.
    pub async fn create_graph(&self, definition: GraphDefinition) -> Result<String> {
        definition.validate()?;

        let graph_id = format!("graph_{}", self.graph_seq.fetch_add(1, Ordering::SeqCst) + 1);
        let mut graphs = self.graphs.write().await;
        graphs.insert(graph_id.clone(), Arc::new(definition));
        Ok(graph_id)
    }

    pub async fn get_graph(&self, graph_id: &str) -> Option<Arc<GraphDefinition>> {
        let graphs = self.graphs.read().await;
        graphs.get(graph_id).cloned()
    }

    pub async fn list_graphs(&self) -> Vec<(String, Arc<GraphDefinition>)> {
        let graphs = self.graphs.read().await;
        let mut entries: Vec<_> = graphs
            .iter()
            .map(|(id, graph)| (id.clone(), graph.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Execute a graph to completion or failure and return the terminal run
    /// record. Only an unknown `graph_id` is an `Err`; execution failures
    /// come back as a run with `failed` status and an explanatory log trail.
    pub async fn run_workflow(
        &self,
        graph_id: &str,
        initial_data: Map<String, Value>,
    ) -> Result<WorkflowRun> {
        let graph = self
            .get_graph(graph_id)
            .await
            .ok_or_else(|| Error::GraphNotFound(graph_id.to_string()))?;

        let run = WorkflowRun::new(graph_id, initial_data);
        let run_id = run.run_id.clone();
        {
            let mut runs = self.runs.write().await;
            runs.insert(run_id.clone(), run);
        }
        metrics::RUNS_STARTED_TOTAL.inc();

        match self.execute(&run_id, &graph).await {
            Ok(()) => {
                self.update_run(&run_id, |run| {
                    run.status = NodeStatus::Completed;
                    run.completed_at = Some(Utc::now());
                })
                .await;
                metrics::RUNS_COMPLETED_TOTAL.inc();
                info!("workflow run {} completed", run_id);
            }
            Err(e) => {
                self.update_run(&run_id, |run| {
                    run.status = NodeStatus::Failed;
                    run.completed_at = Some(Utc::now());
                })
                .await;
                self.add_log(
                    &run_id,
                    "ERROR",
                    NodeStatus::Failed,
                    format!("Workflow failed: {e}"),
                )
                .await;
                metrics::RUNS_FAILED_TOTAL.inc();
                error!("workflow run {} failed: {}", run_id, e);
            }
        }

        // Tell live observers the run reached a terminal state.
        let run = self
            .get_run(&run_id)
            .await
            .ok_or_else(|| Error::Internal(format!("run {run_id} vanished from the store")))?;
        self.broadcaster
            .broadcast(
                &run_id,
                StreamEvent::Status {
                    run_id: run_id.clone(),
                    status: run.status,
                    current_node: run.current_node.clone(),
                },
            )
            .await;

        Ok(run)
    }

    pub async fn get_run(&self, run_id: &str) -> Option<WorkflowRun> {
        let runs = self.runs.read().await;
        runs.get(run_id).cloned()
    }

    pub async fn get_run_state(&self, run_id: &str) -> Option<WorkflowState> {
        let runs = self.runs.read().await;
        runs.get(run_id).map(|run| run.state.clone())
    }

    /// Register a live observer for a run's log stream.
    pub async fn subscribe(
        &self,
        run_id: &str,
    ) -> (ObserverId, mpsc::UnboundedReceiver<StreamEvent>) {
        self.broadcaster.subscribe(run_id).await
    }

    pub async fn unsubscribe(&self, run_id: &str, observer_id: ObserverId) {
        self.broadcaster.unsubscribe(run_id, observer_id).await;
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        let graphs = self.graphs.read().await.len();
        let (runs, total_log_entries) = {
            let runs = self.runs.read().await;
            let logs = runs.values().map(|run| run.logs.len()).sum();
            (runs.len(), logs)
        };

        MemoryStats {
            graphs,
            runs,
            handlers: self.registry.len(),
            total_log_entries,
            active_observers: self.broadcaster.active_observers().await,
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    async fn execute(&self, run_id: &str, graph: &GraphDefinition) -> Result<()> {
        self.update_run(run_id, |run| run.status = NodeStatus::Running)
            .await;

        let mut current = Some(graph.start_node.clone());
        let mut visited: HashSet<String> = HashSet::new();
        let mut iteration_count = 0u32;

        while let Some(node_name) = current {
            if iteration_count >= MAX_ITERATIONS {
                return Err(Error::IterationLimitExceeded(MAX_ITERATIONS));
            }
            iteration_count += 1;

            let node = graph
                .node(&node_name)
                .ok_or_else(|| Error::NodeNotFound(node_name.clone()))?;

            self.update_run(run_id, |run| run.current_node = Some(node_name.clone()))
                .await;
            self.add_log(
                run_id,
                &node_name,
                NodeStatus::Running,
                format!("Executing node {node_name}"),
            )
            .await;

            match self.invoke_node(run_id, node).await {
                Ok(()) => {
                    self.add_log(
                        run_id,
                        &node_name,
                        NodeStatus::Completed,
                        format!("Node {node_name} completed"),
                    )
                    .await;
                }
                Err(e) => {
                    self.add_log(
                        run_id,
                        &node_name,
                        NodeStatus::Failed,
                        format!("Node {node_name} failed: {e}"),
                    )
                    .await;
                    return Err(e);
                }
            }

            let state = self.get_run_state(run_id).await.unwrap_or_default();
            let next = resolve_next_node(graph, &node_name, &state);

            // Loop/terminate policy: revisiting a node is only allowed while
            // some conditional branch on the current node still fires.
            if let Some(next_name) = &next {
                if visited.contains(next_name) && !has_live_branch(graph, &node_name, &state) {
                    break;
                }
            }

            visited.insert(node_name);
            current = next;
        }

        Ok(())
    }

    /// Invoke a node's handler against a working copy of the run state and
    /// write the result back. A handler that fails leaves the run state as
    /// the previous node left it.
    async fn invoke_node(&self, run_id: &str, node: &NodeDefinition) -> Result<()> {
        let handler = self
            .registry
            .lookup(&node.function_name)
            .ok_or_else(|| Error::HandlerNotRegistered(node.function_name.clone()))?;

        let mut state = self.get_run_state(run_id).await.unwrap_or_default();

        let patch = handler
            .call(&node.parameters, &mut state)
            .await
            .map_err(|e| Error::HandlerExecution {
                node: node.name.clone(),
                message: e.to_string(),
            })?;
        metrics::NODES_EXECUTED_TOTAL.inc();

        if let Some(patch) = patch {
            state.update(patch);
        }

        self.update_run(run_id, move |run| run.state = state).await;
        Ok(())
    }

    /// Append a log entry with a snapshot of the current state data, then
    /// hand it to the broadcaster. The append is synchronous and never
    /// skipped; fan-out is best-effort.
    async fn add_log(&self, run_id: &str, node_name: &str, status: NodeStatus, message: String) {
        let entry = {
            let mut runs = self.runs.write().await;
            let Some(run) = runs.get_mut(run_id) else {
                return;
            };
            let entry = ExecutionLog {
                timestamp: Utc::now(),
                node_name: node_name.to_string(),
                status,
                message: message.clone(),
                state_snapshot: run.state.data.clone(),
            };
            run.logs.push(entry.clone());
            entry
        };

        info!("[{}] {}: {}", run_id, node_name, message);
        self.broadcaster
            .broadcast(run_id, StreamEvent::from_log(&entry))
            .await;
    }

    async fn update_run<F>(&self, run_id: &str, mutate: F)
    where
        F: FnOnce(&mut WorkflowRun),
    {
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(run_id) {
            mutate(run);
        }
    }
}

/// Resolve the successor of `node_name`: conditional branches in declared
/// order first (first true condition wins), then the simple edge, then none.
fn resolve_next_node(
    graph: &GraphDefinition,
    node_name: &str,
    state: &WorkflowState,
) -> Option<String> {
    if let Some(branches) = graph.conditional_edges.get(node_name) {
        for branch in branches {
            if check_condition(&branch.condition, state) {
                return Some(branch.target.clone());
            }
        }
    }
    graph.edges.get(node_name).cloned()
}

/// True when any conditional branch on `node_name` currently fires,
/// regardless of which successor it names.
fn has_live_branch(graph: &GraphDefinition, node_name: &str, state: &WorkflowState) -> bool {
    graph
        .conditional_edges
        .get(node_name)
        .map(|branches| {
            branches
                .iter()
                .any(|branch| check_condition(&branch.condition, state))
        })
        .unwrap_or(false)
}

/// Evaluate a condition against the run state. Evaluation failures degrade
/// to false so a bad predicate can never abort a run.
fn check_condition(condition: &str, state: &WorkflowState) -> bool {
    match condition::evaluate(condition, &state.evaluation_context()) {
        Ok(result) => result,
        Err(e) => {
            warn!("failed to evaluate condition '{}': {}", condition, e);
            false
        }
    }
}
