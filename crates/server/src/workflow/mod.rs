pub mod broadcast;
pub mod condition;
pub mod engine;
pub mod graph;
pub mod state;

pub use broadcast::{LogBroadcaster, ObserverId, StreamEvent};
pub use condition::ConditionError;
pub use engine::{MemoryStats, WorkflowEngine, MAX_ITERATIONS};
pub use graph::{ConditionalEdge, GraphDefinition, NodeDefinition};
pub use state::{ExecutionLog, NodeStatus, WorkflowRun, WorkflowState};
