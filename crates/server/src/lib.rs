pub mod config;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod workflow;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("graph '{0}' not found")]
    GraphNotFound(String),
    #[error("node '{0}' not found in graph")]
    NodeNotFound(String),
    #[error("handler '{0}' is not registered")]
    HandlerNotRegistered(String),
    #[error("node '{node}' failed: {message}")]
    HandlerExecution { node: String, message: String },
    #[error("maximum iterations ({0}) reached - possible infinite loop")]
    IterationLimitExceeded(u32),
    #[error("invalid graph: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
