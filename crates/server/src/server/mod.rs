mod routes;
mod websocket;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::workflow::WorkflowEngine;
use crate::Result;

pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    /// Graph id of the builtin code-review workflow, used by the demo route.
    pub code_review_graph_id: String,
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(engine: Arc<WorkflowEngine>, code_review_graph_id: String) -> Self {
        Self {
            state: Arc::new(AppState {
                engine,
                code_review_graph_id,
            }),
        }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/graph/create", post(routes::create_graph))
            .route("/graph/run", post(routes::run_workflow))
            .route("/graph/state/{run_id}", get(routes::get_workflow_state))
            .route("/graphs", get(routes::list_graphs))
            .route("/tools", get(routes::list_tools))
            .route("/memory/stats", get(routes::memory_stats))
            .route("/demo/code-review", post(routes::demo_code_review))
            .route("/ws/workflow/{run_id}", get(websocket::ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state)
    }

    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.build_router())
            .await
            .map_err(crate::Error::Io)?;
        Ok(())
    }
}
