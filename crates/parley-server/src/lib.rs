//! # parley-server
//!
//! Axum HTTP + `WebSocket` server for real-time chat.
//!
//! - [`gate`]: authenticates the upgrade request and snapshots room membership
//! - [`websocket`]: connection registry, broadcast dispatcher, per-connection reader/writer loops
//! - [`router`]: fixed dispatch table from message kind to handler
//! - [`handlers`]: chat messages, room creation, friendship lifecycle
//! - `/health` and `/metrics` endpoints, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod gate;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;
