use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref RUNS_STARTED_TOTAL: IntCounter = IntCounter::new(
        "graphflow_runs_started_total",
        "Total number of workflow runs started."
    )
    .expect("metric can be created");
    pub static ref RUNS_COMPLETED_TOTAL: IntCounter = IntCounter::new(
        "graphflow_runs_completed_total",
        "Total number of workflow runs that completed successfully."
    )
    .expect("metric can be created");
    pub static ref RUNS_FAILED_TOTAL: IntCounter = IntCounter::new(
        "graphflow_runs_failed_total",
        "Total number of workflow runs that failed."
    )
    .expect("metric can be created");
    pub static ref NODES_EXECUTED_TOTAL: IntCounter = IntCounter::new(
        "graphflow_nodes_executed_total",
        "Total number of node invocations across all runs."
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(RUNS_STARTED_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(RUNS_COMPLETED_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(RUNS_FAILED_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(NODES_EXECUTED_TOTAL.clone()))
        .expect("collector can be registered");
}

// Gather metrics for exposition on /metrics
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("metrics can be encoded");
    String::from_utf8(buffer).expect("metrics are valid utf-8")
}
