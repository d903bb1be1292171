pub mod code_review;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::workflow::WorkflowState;

pub use code_review::{code_review_graph, register_builtin, SAMPLE_CODE};

/// The invocation contract between the engine and a node implementation.
///
/// A handler receives the node's static parameters and the run's mutable
/// state. It may mutate the state in place, return a patch to merge into
/// `state.data`, or both. Returning `None` leaves the state untouched.
/// Blocking and suspendable handlers conform to the same interface; the
/// engine awaits either uniformly.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(
        &self,
        parameters: &Map<String, Value>,
        state: &mut WorkflowState,
    ) -> anyhow::Result<Option<Map<String, Value>>>;
}

/// Adapter lifting a plain synchronous function into the [`Handler`] seam.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&Map<String, Value>, &mut WorkflowState) -> anyhow::Result<Option<Map<String, Value>>>
        + Send
        + Sync,
{
    async fn call(
        &self,
        parameters: &Map<String, Value>,
        state: &mut WorkflowState,
    ) -> anyhow::Result<Option<Map<String, Value>>> {
        (self.0)(parameters, state)
    }
}

/// Registration table mapping handler names to implementations.
///
/// Populated once at startup (construct → populate → hand to the engine);
/// nodes reference handlers by `function_name` and the engine resolves them
/// through [`HandlerRegistry::lookup`].
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn Handler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Register a plain synchronous function as a handler.
    pub fn register_fn<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&Map<String, Value>, &mut WorkflowState) -> anyhow::Result<Option<Map<String, Value>>>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, Arc::new(FnHandler(func)));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
