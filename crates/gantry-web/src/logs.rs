use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use gantry_bus::Event;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// `GET /ws/jobs/:job_id/logs` — replays the archived log (if the job
/// has already finished and been persisted) and then tails live
/// `LogAppend` events for the job, closing the socket on `LogClose`.
/// The archive-then-tail order guarantees no gap: the job cannot
/// finish and be persisted between "subscribe" and "read archive"
/// because the subscription is opened first.
pub async fn tail_job_log(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_job_log(socket, state, job_id))
}

async fn stream_job_log(mut socket: WebSocket, state: AppState, job_id: Uuid) {
    let mut subscription = state.bus.subscribe();

    if let Ok(archived) = state.store.read_log(job_id).await {
        if !archived.is_empty() {
            if socket.send(Message::Binary(archived)).await.is_err() {
                return;
            }
        }
    }

    loop {
        match subscription.recv().await {
            Some(Event::LogAppend { job_id: id, line }) if id == job_id => {
                if socket.send(Message::Text(line)).await.is_err() {
                    break;
                }
            }
            Some(Event::LogClose { job_id: id, status }) if id == job_id => {
                let _ = socket
                    .send(Message::Text(format!("[closed status={status}]")))
                    .await;
                break;
            }
            Some(Event::Lag { skipped }) => {
                warn!(job_id = %job_id, skipped, "log tail lagged, client should re-fetch the archive");
            }
            Some(_) => continue,
            None => break,
        }
    }

    let _ = socket.close().await;
}
