use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};

use graphflow_server::{
    handlers::{self, HandlerRegistry},
    server::Server,
    workflow::WorkflowEngine,
};

async fn test_server() -> axum_test::TestServer {
    let mut registry = HandlerRegistry::new();
    handlers::register_builtin(&mut registry);

    let engine = Arc::new(WorkflowEngine::new(Arc::new(registry)));
    let code_review_graph_id = engine
        .create_graph(handlers::code_review_graph())
        .await
        .expect("demo graph is valid");

    let server = Server::new(engine, code_review_graph_id);
    axum_test::TestServer::new(server.build_router()).expect("router builds")
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let client = test_server().await;

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn create_run_and_inspect_a_workflow() {
    let client = test_server().await;

    // Create a one-node graph backed by a builtin handler.
    let response = client
        .post("/graph/create")
        .json(&json!({
            "name": "scan-only",
            "nodes": [
                { "name": "scan", "function_name": "extract_functions" }
            ],
            "edges": {},
            "conditional_edges": {},
            "start_node": "scan"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    let graph_id = body["graph_id"].as_str().unwrap().to_string();
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("created successfully"));

    // Run it.
    let response = client
        .post("/graph/run")
        .json(&json!({
            "graph_id": graph_id,
            "initial_state": { "code": "def foo():\n    pass\n" }
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["final_state"]["function_count"], 1);
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    // Inspect the terminal run state.
    let response = client.get(&format!("/graph/state/{run_id}")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["run_id"], run_id.as_str());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["current_node"], "scan");
}

#[tokio::test]
async fn invalid_graph_is_rejected() {
    let client = test_server().await;

    let response = client
        .post("/graph/create")
        .json(&json!({
            "name": "broken",
            "nodes": [{ "name": "a", "function_name": "noop" }],
            "edges": {},
            "conditional_edges": {},
            "start_node": "missing"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["detail"].as_str().unwrap().contains("start node"));
}

#[tokio::test]
async fn running_an_unknown_graph_is_not_found() {
    let client = test_server().await;

    let response = client
        .post("/graph/run")
        .json(&json!({ "graph_id": "graph_42", "initial_state": {} }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_run_state_is_not_found() {
    let client = test_server().await;

    let response = client.get("/graph/state/not-a-run").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Workflow run not found");
}

#[tokio::test]
async fn graphs_and_tools_are_listed() {
    let client = test_server().await;

    let response = client.get("/graphs").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let graphs = body["graphs"].as_array().unwrap();
    assert_eq!(graphs.len(), 1);
    assert_eq!(graphs[0]["name"], "Code Review Mini-Agent");
    assert_eq!(graphs[0]["node_count"], 6);

    let response = client.get("/tools").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let tools = body["tools"].as_array().unwrap();
    assert!(tools.contains(&json!("extract_functions")));
    assert_eq!(tools.len(), 5);
}

#[tokio::test]
async fn memory_stats_count_engine_contents() {
    let client = test_server().await;

    let response = client.get("/memory/stats").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["graphs"], 1);
    assert_eq!(body["runs"], 0);
    assert_eq!(body["handlers"], 5);
    assert_eq!(body["total_log_entries"], 0);
    assert_eq!(body["active_observers"], 0);
}

#[tokio::test]
async fn demo_code_review_runs_the_sample() {
    let client = test_server().await;

    let response = client.post("/demo/code-review").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["results"]["function_count"], 3);
    assert_eq!(body["results"]["quality_score"], 7.5);
    assert_eq!(body["results"]["quality_level"], "good");
    assert!(!body["execution_log"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn metrics_endpoint_is_exposed() {
    let client = test_server().await;

    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
