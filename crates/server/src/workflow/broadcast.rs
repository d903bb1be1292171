use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::state::{ExecutionLog, NodeStatus};

/// Events delivered to log-stream observers. Serialized as tagged JSON
/// (`{"type": "log", ...}`) for the transport layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Connected {
        run_id: String,
        message: String,
    },
    Log {
        timestamp: DateTime<Utc>,
        node_name: String,
        status: NodeStatus,
        message: String,
        state_snapshot: Map<String, Value>,
    },
    Status {
        run_id: String,
        status: NodeStatus,
        current_node: Option<String>,
    },
    Waiting {
        message: String,
    },
    Error {
        message: String,
    },
    Pong,
}

impl StreamEvent {
    pub fn from_log(entry: &ExecutionLog) -> Self {
        StreamEvent::Log {
            timestamp: entry.timestamp,
            node_name: entry.node_name.clone(),
            status: entry.status,
            message: entry.message.clone(),
            state_snapshot: entry.state_snapshot.clone(),
        }
    }
}

pub type ObserverId = Uuid;

struct Observer {
    id: ObserverId,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

/// Best-effort fan-out of log events to observers registered per run.
///
/// Sending is a non-blocking enqueue into each observer's unbounded channel,
/// so a slow or disconnected observer never stalls the run that produced the
/// event. Observers whose channel is closed are pruned on the next send.
#[derive(Default)]
pub struct LogBroadcaster {
    observers: RwLock<HashMap<String, Vec<Observer>>>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for a run and return its id plus the receiving
    /// end of its event channel.
    pub async fn subscribe(
        &self,
        run_id: &str,
    ) -> (ObserverId, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut observers = self.observers.write().await;
        observers
            .entry(run_id.to_string())
            .or_default()
            .push(Observer { id, tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, run_id: &str, observer_id: ObserverId) {
        let mut observers = self.observers.write().await;
        if let Some(list) = observers.get_mut(run_id) {
            list.retain(|observer| observer.id != observer_id);
            if list.is_empty() {
                observers.remove(run_id);
            }
        }
    }

    /// Fan an event out to every observer of a run, pruning observers whose
    /// receiving end has gone away.
    pub async fn broadcast(&self, run_id: &str, event: StreamEvent) {
        let mut observers = self.observers.write().await;
        let Some(list) = observers.get_mut(run_id) else {
            return;
        };

        list.retain(|observer| {
            if observer.tx.send(event.clone()).is_ok() {
                true
            } else {
                warn!("observer {} disconnected for run {}", observer.id, run_id);
                false
            }
        });

        if list.is_empty() {
            observers.remove(run_id);
        }
    }

    pub async fn active_observers(&self) -> usize {
        let observers = self.observers.read().await;
        observers.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(run_id: &str) -> StreamEvent {
        StreamEvent::Status {
            run_id: run_id.to_string(),
            status: NodeStatus::Running,
            current_node: None,
        }
    }

    #[tokio::test]
    async fn events_arrive_in_broadcast_order() {
        let broadcaster = LogBroadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe("run-1").await;

        for i in 0..3 {
            broadcaster
                .broadcast(
                    "run-1",
                    StreamEvent::Waiting {
                        message: format!("event {i}"),
                    },
                )
                .await;
        }

        for i in 0..3 {
            match rx.recv().await {
                Some(StreamEvent::Waiting { message }) => {
                    assert_eq!(message, format!("event {i}"));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn dropped_observer_is_pruned_on_broadcast() {
        let broadcaster = LogBroadcaster::new();
        let (_id, rx) = broadcaster.subscribe("run-1").await;
        assert_eq!(broadcaster.active_observers().await, 1);

        drop(rx);
        broadcaster.broadcast("run-1", status_event("run-1")).await;
        assert_eq!(broadcaster.active_observers().await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_observer() {
        let broadcaster = LogBroadcaster::new();
        let (first, _rx1) = broadcaster.subscribe("run-1").await;
        let (_second, mut rx2) = broadcaster.subscribe("run-1").await;

        broadcaster.unsubscribe("run-1", first).await;
        assert_eq!(broadcaster.active_observers().await, 1);

        broadcaster.broadcast("run-1", status_event("run-1")).await;
        assert!(matches!(rx2.recv().await, Some(StreamEvent::Status { .. })));
    }

    #[tokio::test]
    async fn broadcast_to_unknown_run_is_a_noop() {
        let broadcaster = LogBroadcaster::new();
        broadcaster.broadcast("missing", status_event("missing")).await;
        assert_eq!(broadcaster.active_observers().await, 0);
    }
}
