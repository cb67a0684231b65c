use crate::app::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| forward_events(socket, state))
}

/// Push every bus event to the socket as a JSON text frame. Inbound
/// frames are drained and ignored; a lagged subscriber skips ahead
/// rather than disconnecting.
async fn forward_events(mut socket: WebSocket, state: AppState) {
    let mut events = state.event_sender.subscribe();
    loop {
        tokio::select! {
            _ = state.token.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("event subscriber disconnected");
}
