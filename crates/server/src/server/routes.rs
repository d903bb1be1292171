use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::error;

use crate::handlers::SAMPLE_CODE;
use crate::workflow::{ExecutionLog, GraphDefinition, NodeStatus};
use crate::Error;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct CreateGraphResponse {
    pub graph_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RunWorkflowRequest {
    pub graph_id: String,
    #[serde(default)]
    pub initial_state: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct RunWorkflowResponse {
    pub run_id: String,
    pub status: NodeStatus,
    pub final_state: Map<String, Value>,
    pub logs: Vec<ExecutionLog>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub run_id: String,
    pub status: NodeStatus,
    pub current_node: Option<String>,
    pub state: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct DemoRequest {
    pub code: Option<String>,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> String {
    crate::metrics::gather_metrics()
}

/// Create a new workflow graph definition and return its id.
pub async fn create_graph(
    State(state): State<Arc<AppState>>,
    Json(definition): Json<GraphDefinition>,
) -> Response {
    let name = definition.name.clone();
    match state.engine.create_graph(definition).await {
        Ok(graph_id) => (
            StatusCode::CREATED,
            Json(CreateGraphResponse {
                graph_id,
                message: format!("Graph '{name}' created successfully"),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": e.to_string() })),
        )
            .into_response(),
    }
}

/// Execute a workflow to completion or failure and return the terminal run.
pub async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunWorkflowRequest>,
) -> Response {
    match state
        .engine
        .run_workflow(&request.graph_id, request.initial_state)
        .await
    {
        Ok(run) => Json(RunWorkflowResponse {
            run_id: run.run_id,
            status: run.status,
            final_state: run.state.data,
            logs: run.logs,
        })
        .into_response(),
        Err(e @ Error::GraphNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": e.to_string() })),
        )
            .into_response(),
    }
}

/// Current status, active node and state data for a run.
pub async fn get_workflow_state(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    match state.engine.get_run(&run_id).await {
        Some(run) => Json(StateResponse {
            run_id: run.run_id,
            status: run.status,
            current_node: run.current_node,
            state: run.state.data,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Workflow run not found" })),
        )
            .into_response(),
    }
}

pub async fn list_graphs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let graphs: Vec<Value> = state
        .engine
        .list_graphs()
        .await
        .into_iter()
        .map(|(graph_id, graph)| {
            json!({
                "graph_id": graph_id,
                "name": graph.name,
                "node_count": graph.nodes.len(),
                "edge_count": graph.edges.len(),
            })
        })
        .collect();

    Json(json!({ "graphs": graphs }))
}

pub async fn list_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "tools": state.engine.handler_names() }))
}

pub async fn memory_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.memory_stats().await)
}

/// Run the builtin code-review workflow against the provided or sample code.
pub async fn demo_code_review(
    State(state): State<Arc<AppState>>,
    request: Option<Json<DemoRequest>>,
) -> Response {
    let code = request
        .and_then(|Json(r)| r.code)
        .unwrap_or_else(|| SAMPLE_CODE.to_string());

    let mut initial_state = Map::new();
    initial_state.insert("code".to_string(), Value::String(code));

    match state
        .engine
        .run_workflow(&state.code_review_graph_id, initial_state)
        .await
    {
        Ok(run) => Json(json!({
            "run_id": run.run_id,
            "status": run.status,
            "results": {
                "quality_score": run.state.get("quality_score"),
                "quality_level": run.state.get("quality_level"),
                "function_count": run.state.get("function_count"),
                "issue_count": run.state.get("issue_count"),
                "suggestions": run.state.get("suggestions").cloned().unwrap_or(json!([])),
                "complexity_scores": run.state.get("complexity_scores").cloned().unwrap_or(json!([])),
            },
            "execution_log": run.logs.iter().map(|log| json!({
                "timestamp": log.timestamp,
                "node": log.node_name,
                "status": log.status,
                "message": log.message,
            })).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => {
            error!("demo code review failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}
