use std::sync::Arc;

use tracing::info;

use graphflow_server::{
    config::Config,
    handlers::{self, HandlerRegistry},
    metrics,
    server::Server,
    workflow::WorkflowEngine,
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration: {:?}", config);

    metrics::register_metrics();

    // Build the handler registry with the default code-review tools
    let mut registry = HandlerRegistry::new();
    handlers::register_builtin(&mut registry);
    info!("Registered handlers: {:?}", registry.names());

    // Initialize the engine and the builtin demo graph
    let engine = Arc::new(WorkflowEngine::new(Arc::new(registry)));
    let code_review_graph_id = engine.create_graph(handlers::code_review_graph()).await?;
    info!("Created code review graph: {}", code_review_graph_id);

    // Start server
    let server = Server::new(engine, code_review_graph_id);
    info!("Starting server on {}", config.server.addr);
    server.start(&config.server.addr).await?;

    Ok(())
}
