use anyhow::{Context, Result};
use gameroom::api::create_app;
use gameroom::chat::ChatHub;
use gameroom::config::AppConfig;
use gameroom::games::SqliteGameStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gameroom=info".into()),
        )
        .init();

    info!("Gameroom starting...");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!(
        bind = %config.server.bind_addr(),
        database = %config.database.path,
        upload_dir = %config.api.upload_dir.display(),
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteGameStore::new(&config.database.path)
            .context("Failed to initialize games store")?,
    );

    let (hub, _relay_task) = ChatHub::start(&config.chat);

    let app = create_app(&config, store, hub);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr()))?;
    info!(addr = %config.server.bind_addr(), "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await
        .context("HTTP server error")?;

    info!("Gameroom stopped");
    Ok(())
}
