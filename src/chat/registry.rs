use super::ConnectionError;
use axum::extract::ws::Message;
use dashmap::DashMap;
use futures::{Sink, SinkExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

type BoxedSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Unique identity of one accepted connection (UUID v7, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Write half of one client connection.
///
/// Clones share the same underlying sink; writes are serialized by an async
/// mutex so the relay and the closing reader never interleave frames.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    sink: Arc<Mutex<BoxedSink>>,
}

impl Connection {
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        Self {
            id: ConnectionId::new(),
            sink: Arc::new(Mutex::new(Box::pin(sink))),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Send an already-serialized payload as a single text frame
    pub async fn send_text(&self, payload: String) -> Result<(), ConnectionError> {
        self.sink.lock().await.send(Message::Text(payload)).await?;
        Ok(())
    }

    /// Flush and close the write half. Errors are ignored: the peer is gone
    /// either way.
    pub async fn close(&self) {
        let _ = self.sink.lock().await.close().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

/// Set of currently live connections.
///
/// Backed by a sharded lock map, so readers removing themselves and the relay
/// removing failed peers never race on the same entry.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Mark `conn` live. Registering an id twice keeps the first entry.
    pub fn register(&self, conn: Connection) {
        self.connections.entry(conn.id()).or_insert(conn);
    }

    /// Remove `id`, handing the connection back so the caller can close it.
    ///
    /// Returns `None` when the id is not registered (already removed).
    pub fn unregister(&self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Call `f` once per live connection, in no particular order.
    ///
    /// `f` runs while a shard lock is held and must not touch the registry.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Connection),
    {
        for entry in self.connections.iter() {
            f(entry.value());
        }
    }

    /// Cloned handles of every live connection
    pub fn snapshot(&self) -> Vec<Connection> {
        let mut conns = Vec::with_capacity(self.connections.len());
        self.for_each(|conn| conns.push(conn.clone()));
        conns
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
