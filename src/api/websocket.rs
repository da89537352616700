use crate::chat::{ChatHub, Connection, RelayStatsSnapshot};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Json, Response},
    routing::get,
    Router,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;

/// Shared application state for the chat endpoints
#[derive(Clone)]
pub struct ChatAppState {
    pub hub: ChatHub,
}

/// GET /websocket - WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ChatAppState>>,
) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// GET /chat/stats - relay counters and live connection count
async fn chat_stats(State(state): State<Arc<ChatAppState>>) -> Json<RelayStatsSnapshot> {
    Json(state.hub.stats_snapshot())
}

/// Create chat router (upgrade endpoint + stats)
pub fn create_chat_router(state: ChatAppState) -> Router {
    Router::new()
        .route("/websocket", get(ws_handler))
        .route("/chat/stats", get(chat_stats))
        .with_state(Arc::new(state))
}

/// Handle WebSocket connection: the write half goes to the registry, this
/// task becomes the connection's reader.
async fn handle_socket(socket: WebSocket, state: Arc<ChatAppState>) {
    let (sink, stream) = socket.split();
    let conn = Connection::new(sink);

    state.hub.serve_connection(conn, stream).await;
}
