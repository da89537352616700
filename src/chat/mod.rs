//! Real-time chat broadcast.
//!
//! ```text
//!  client ─► ConnectionReader ─┐
//!  client ─► ConnectionReader ─┼─► mpsc (bounded) ─► BroadcastRelay ─► every Connection
//!  client ─► ConnectionReader ─┘                          │
//!                                                          ▼
//!                                                 ConnectionRegistry
//! ```
//!
//! Each accepted WebSocket gets one [`ConnectionReader`] task. All readers
//! submit into a single bounded queue drained by exactly one
//! [`BroadcastRelay`], which writes every message to the connections live in
//! the [`ConnectionRegistry`] at the moment it dequeues the message.
//!
//! The registry is the only shared state. Readers remove their own entry when
//! a read fails; the relay removes entries whose write fails.

pub mod reader;
pub mod registry;
pub mod relay;


pub use reader::ConnectionReader;
pub use registry::{Connection, ConnectionId, ConnectionRegistry};
pub use relay::{BroadcastRelay, Inbound, RelayHandle, RelayStats, RelayStatsSnapshot};

use axum::extract::ws::Message;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Chat message as it travels on the wire, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
}

/// Why a connection was discarded. Every variant is terminal.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] axum::Error),
    #[error("peer closed the connection")]
    Closed,
    #[error("malformed chat payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("broadcast relay is no longer running")]
    RelayClosed,
}

/// Chat configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Capacity of the inbound queue between readers and the relay
    #[serde(default = "default_inbound_queue_capacity")]
    pub inbound_queue_capacity: usize,
    /// Whether the sender receives its own message back
    #[serde(default)]
    pub echo_to_sender: bool,
    /// Upper bound on a single outbound write before the peer is dropped
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_inbound_queue_capacity() -> usize {
    256
}

fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: default_inbound_queue_capacity(),
            echo_to_sender: false,
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl ChatConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Handle to a running chat subsystem. Cheap to clone.
#[derive(Clone)]
pub struct ChatHub {
    pub registry: Arc<ConnectionRegistry>,
    pub relay: RelayHandle,
    pub stats: Arc<RelayStats>,
    write_timeout: Duration,
}

impl ChatHub {
    /// Create the registry and spawn the relay task.
    ///
    /// The relay runs until every clone of the hub (and therefore every
    /// [`RelayHandle`]) has been dropped.
    pub fn start(config: &ChatConfig) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let stats = Arc::new(RelayStats::default());
        let (relay, broadcast) =
            relay::channel(Arc::clone(&registry), Arc::clone(&stats), config);

        let task = tokio::spawn(broadcast.run());

        (
            Self {
                registry,
                relay,
                stats,
                write_timeout: config.write_timeout(),
            },
            task,
        )
    }

    /// Register `conn` and read from `stream` until the connection fails.
    ///
    /// Returns the reason the connection ended. By the time this returns the
    /// connection is no longer in the registry, even if the peer stopped
    /// reading and its write half could not be closed cleanly.
    pub async fn serve_connection<S>(&self, conn: Connection, stream: S) -> ConnectionError
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let id = conn.id();
        self.registry.register(conn);
        info!(
            connection_id = %id,
            connections = self.registry.len(),
            "Chat connection registered"
        );

        let reader = ConnectionReader::new(
            id,
            Arc::clone(&self.registry),
            self.relay.clone(),
            self.write_timeout,
        );
        let reason = reader.run(stream).await;

        match &reason {
            ConnectionError::Closed => {
                info!(connection_id = %id, "Chat client disconnected");
            }
            e => {
                warn!(connection_id = %id, error = %e, "Chat connection dropped");
            }
        }

        reason
    }

    /// Current counters plus the live connection count.
    pub fn stats_snapshot(&self) -> RelayStatsSnapshot {
        self.stats.snapshot(self.registry.len())
    }
}
