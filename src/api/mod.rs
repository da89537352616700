// HTTP and WebSocket APIs

pub mod games;
pub mod upload;
pub mod websocket;

pub use games::{create_games_router, GamesAppState};
pub use upload::{create_upload_router, UploadAppState};
pub use websocket::{create_chat_router, ws_handler, ChatAppState};

use crate::chat::ChatHub;
use crate::config::AppConfig;
use crate::games::GameStore;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Assemble every router into the application served by `main`
pub fn create_app(config: &AppConfig, store: Arc<dyn GameStore>, hub: ChatHub) -> Router {
    let games = create_games_router(GamesAppState {
        store,
        default_page_size: config.api.default_page_size,
        max_page_size: config.api.max_page_size,
    });

    let upload = create_upload_router(UploadAppState {
        upload_dir: config.api.upload_dir.clone(),
        max_upload_bytes: config.api.max_upload_bytes,
    });

    let chat = create_chat_router(ChatAppState { hub });

    Router::new()
        .merge(games)
        .merge(upload)
        .merge(chat)
        .layer(CorsLayer::permissive())
}
