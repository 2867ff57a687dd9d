use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use serde_json::json;
use tokio::sync::broadcast;

use crate::state::AppState;
use crate::task::{TaskRecord, TaskRegistry};

/// GET /ws/progress/:task_id - 推送任务进度直到终态
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    let registry = state.registry().clone();
    ws.on_upgrade(move |socket| stream_progress(socket, registry, task_id))
}

async fn stream_progress(mut socket: WebSocket, registry: TaskRegistry, task_id: String) {
    let Some((current, mut rx)) = registry.subscribe(&task_id) else {
        let frame = json!({ "error": "Task not found" }).to_string();
        let _ = socket.send(Message::Text(frame)).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    tracing::debug!("WebSocket subscribed to task {}", task_id);
    let mut finished = current.is_terminal();
    if send_record(&mut socket, &current).await.is_err() {
        return;
    }

    while !finished {
        tokio::select! {
            result = rx.recv() => {
                let record = match result {
                    Ok(record) => record,
                    // 落后太多时丢弃积压的旧记录：先重新订阅再取最新记录，
                    // 之后收到的更新都不会比这份快照旧
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket for task {} lagged by {} updates", task_id, n);
                        rx = rx.resubscribe();
                        match registry.get(&task_id) {
                            Some(record) => record,
                            None => break,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                finished = record.is_terminal();
                if send_record(&mut socket, &record).await.is_err() {
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        tracing::debug!("WebSocket client for task {} disconnected", task_id);
                        return;
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

async fn send_record(socket: &mut WebSocket, record: &TaskRecord) -> Result<(), axum::Error> {
    let text = serde_json::to_string(record).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}
