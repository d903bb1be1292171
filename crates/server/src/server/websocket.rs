use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::info;

use crate::workflow::{StreamEvent, WorkflowEngine};

use super::AppState;

/// Upgrade to a WebSocket streaming the execution log of one run.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(run_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, engine, run_id))
}

/// Subscribe before replaying the backlog so no live entry is missed, then
/// interleave live events with client frames (ping/pong, close).
async fn handle_socket(socket: WebSocket, engine: Arc<WorkflowEngine>, run_id: String) {
    let (observer_id, mut events) = engine.subscribe(&run_id).await;
    info!("observer {} connected for run {}", observer_id, run_id);

    let (mut sink, mut stream) = socket.split();

    let connected = StreamEvent::Connected {
        run_id: run_id.clone(),
        message: format!("Connected to workflow {run_id}"),
    };
    if send_event(&mut sink, &connected).await.is_err() {
        engine.unsubscribe(&run_id, observer_id).await;
        return;
    }

    // Replay the backlog, then report where the run currently stands.
    let backlog = match engine.get_run(&run_id).await {
        Some(run) => {
            let mut events: Vec<StreamEvent> =
                run.logs.iter().map(StreamEvent::from_log).collect();
            events.push(StreamEvent::Status {
                run_id: run_id.clone(),
                status: run.status,
                current_node: run.current_node.clone(),
            });
            events
        }
        None => vec![StreamEvent::Waiting {
            message: format!("Waiting for workflow {run_id} to start..."),
        }],
    };
    for event in &backlog {
        if send_event(&mut sink, event).await.is_err() {
            engine.unsubscribe(&run_id, observer_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if is_ping(&text) && send_event(&mut sink, &StreamEvent::Pong).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }

    engine.unsubscribe(&run_id, observer_id).await;
    info!("observer {} disconnected for run {}", observer_id, run_id);
}

fn is_ping(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| {
            value
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| kind == "ping")
        })
        .unwrap_or(false)
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &StreamEvent,
) -> Result<(), axum::Error> {
    let Ok(payload) = serde_json::to_string(event) else {
        return Ok(());
    };
    sink.send(Message::Text(payload.into())).await
}
