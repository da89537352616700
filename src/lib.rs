// HTTP and WebSocket APIs
pub mod api;

// Chat broadcast: registry, relay, per-connection readers
pub mod chat;

// Configuration loading
pub mod config;

// Game resource model and storage
pub mod games;
