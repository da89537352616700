use super::registry::{ConnectionId, ConnectionRegistry};
use super::relay::RelayHandle;
use super::{ChatMessage, ConnectionError};
use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Read loop for one connection.
///
/// `Open --(frame ok)--> Open`, `Open --(any failure)--> Closed`. Closed is
/// terminal; the reader never restarts.
pub struct ConnectionReader {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    relay: RelayHandle,
    close_timeout: Duration,
}

/// Unregisters on drop so a panicking read loop still leaves the registry
/// consistent.
struct RegistrationGuard {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

impl ConnectionReader {
    pub fn new(
        id: ConnectionId,
        registry: Arc<ConnectionRegistry>,
        relay: RelayHandle,
        close_timeout: Duration,
    ) -> Self {
        Self {
            id,
            registry,
            relay,
            close_timeout,
        }
    }

    /// Forward every inbound message to the relay until the stream fails.
    ///
    /// On exit the connection is unregistered and its write half closed,
    /// giving up on the close after `close_timeout`. Returns the failure that ended the loop.
    pub async fn run<S>(self, mut stream: S) -> ConnectionError
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let _guard = RegistrationGuard {
            id: self.id,
            registry: Arc::clone(&self.registry),
        };

        let reason = loop {
            match next_message(&mut stream).await {
                Ok(Some(message)) => {
                    if let Err(e) = self.relay.submit(self.id, message).await {
                        break e;
                    }
                }
                Ok(None) => continue,
                Err(e) => break e,
            }
        };

        if let Some(conn) = self.registry.unregister(&self.id) {
            if timeout(self.close_timeout, conn.close()).await.is_err() {
                debug!(connection_id = %self.id, "Timed out closing connection");
            }
        }
        debug!(connection_id = %self.id, reason = %reason, "Reader stopped");

        reason
    }
}

/// Wait for the next chat message.
///
/// `Ok(None)` for control frames that carry no chat payload.
async fn next_message<S>(stream: &mut S) -> Result<Option<ChatMessage>, ConnectionError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    match stream.next().await {
        None | Some(Ok(Message::Close(_))) => Err(ConnectionError::Closed),
        Some(Err(e)) => Err(ConnectionError::Transport(e)),
        Some(Ok(Message::Text(text))) => Ok(Some(serde_json::from_str(&text)?)),
        Some(Ok(Message::Binary(bytes))) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(None),
    }
}
