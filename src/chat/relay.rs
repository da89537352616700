use super::registry::{Connection, ConnectionId, ConnectionRegistry};
use super::{ChatConfig, ChatMessage, ConnectionError};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// A chat message together with the connection it arrived on
#[derive(Debug, Clone)]
pub struct Inbound {
    pub sender: ConnectionId,
    pub message: ChatMessage,
}

/// Submitting side of the relay queue. One clone per reader.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Inbound>,
}

impl RelayHandle {
    /// Queue a message for broadcast.
    ///
    /// Waits while the queue is full. Fails only if the relay has stopped.
    pub async fn submit(
        &self,
        sender: ConnectionId,
        message: ChatMessage,
    ) -> Result<(), ConnectionError> {
        self.tx
            .send(Inbound { sender, message })
            .await
            .map_err(|_| ConnectionError::RelayClosed)
    }
}

/// Relay counters
#[derive(Debug, Default)]
pub struct RelayStats {
    messages_relayed: AtomicU64,
    deliveries_attempted: AtomicU64,
    deliveries_failed: AtomicU64,
}

/// Point-in-time view of [`RelayStats`], served by `GET /chat/stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsSnapshot {
    pub connections: usize,
    pub messages_relayed: u64,
    pub deliveries_attempted: u64,
    pub deliveries_failed: u64,
}

impl RelayStats {
    pub fn snapshot(&self, connections: usize) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            connections,
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            deliveries_attempted: self.deliveries_attempted.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
        }
    }
}

/// Single consumer of the inbound queue; fans every message out to the
/// registry.
pub struct BroadcastRelay {
    rx: mpsc::Receiver<Inbound>,
    delivery: FanOut,
}

/// Delivery half of the relay, borrowed across the write awaits.
struct FanOut {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    echo_to_sender: bool,
    write_timeout: Duration,
}

/// Build a relay and the handle readers submit through.
pub fn channel(
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    config: &ChatConfig,
) -> (RelayHandle, BroadcastRelay) {
    // mpsc::channel panics on zero capacity
    let (tx, rx) = mpsc::channel(config.inbound_queue_capacity.max(1));

    let relay = BroadcastRelay {
        rx,
        delivery: FanOut {
            registry,
            stats,
            echo_to_sender: config.echo_to_sender,
            write_timeout: config.write_timeout(),
        },
    };

    (RelayHandle { tx }, relay)
}

impl BroadcastRelay {
    /// Drain the queue until every [`RelayHandle`] is dropped.
    pub async fn run(mut self) {
        info!(
            echo_to_sender = self.delivery.echo_to_sender,
            write_timeout_ms = self.delivery.write_timeout.as_millis() as u64,
            "Broadcast relay started"
        );

        while let Some(inbound) = self.rx.recv().await {
            self.delivery.run(inbound).await;
        }

        info!("Broadcast relay stopped (all handles dropped)");
    }

    /// Deliver one message to every connection registered right now.
    ///
    /// Writes run concurrently and are all awaited before returning, so a
    /// connection sees messages in dequeue order. Peers whose write fails or
    /// times out are removed and closed; the rest still receive the message.
    ///
    /// Returns the number of successful deliveries.
    pub async fn fan_out(&self, inbound: Inbound) -> usize {
        self.delivery.run(inbound).await
    }
}

impl FanOut {
    async fn run(&self, inbound: Inbound) -> usize {
        let payload = match serde_json::to_string(&inbound.message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize chat message");
                return 0;
            }
        };

        let targets: Vec<Connection> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|conn| self.echo_to_sender || conn.id() != inbound.sender)
            .collect();

        self.stats.messages_relayed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries_attempted
            .fetch_add(targets.len() as u64, Ordering::Relaxed);

        let results = join_all(targets.iter().map(|conn| self.deliver(conn, payload.clone()))).await;

        let mut delivered = 0;
        for (conn, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(connection_id = %conn.id(), error = %e, "Delivery failed, dropping connection");
                    self.stats.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                    self.discard(conn.id()).await;
                }
            }
        }

        debug!(
            sender = %inbound.sender,
            targets = targets.len(),
            delivered,
            "Chat message relayed"
        );

        delivered
    }

    async fn deliver(&self, conn: &Connection, payload: String) -> Result<(), ConnectionError> {
        match timeout(self.write_timeout, conn.send_text(payload)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::WriteTimeout(self.write_timeout)),
        }
    }

    async fn discard(&self, id: ConnectionId) {
        // The reader may have removed it already
        if let Some(conn) = self.registry.unregister(&id) {
            if timeout(self.write_timeout, conn.close()).await.is_err() {
                debug!(connection_id = %id, "Timed out closing failed connection");
            }
        }
    }
}
