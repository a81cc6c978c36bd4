//! Server configuration.

use std::time::Duration;

use parley_settings::ParleySettings;
use serde::{Deserialize, Serialize};

/// Configuration for the parley server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Header carrying the session credential.
    pub session_header: String,
    /// Per-connection outbound queue bound.
    pub outbound_queue_capacity: usize,
    /// Handler → dispatcher queue bound.
    pub event_queue_capacity: usize,
    /// Seconds between server-initiated pings.
    pub ping_interval_secs: u64,
    /// Seconds of silence after which a connection is dropped.
    pub pong_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for tasks on shutdown.
    pub shutdown_timeout_secs: u64,
    /// Longest accepted chat message, in characters.
    pub max_message_chars: usize,
    /// Largest room, creator included.
    pub max_room_members: usize,
    /// `Origin` values accepted on upgrade; empty accepts any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            session_header: "session_token".into(),
            outbound_queue_capacity: 256,
            event_queue_capacity: 1024,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 10,
            max_message_chars: 4000,
            max_room_members: 64,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Derive the server view of loaded settings.
    pub fn from_settings(settings: &ParleySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            session_header: server.session_header.clone(),
            outbound_queue_capacity: server.outbound_queue_capacity.max(1),
            event_queue_capacity: server.event_queue_capacity.max(1),
            ping_interval_secs: server.ping_interval_secs.max(1),
            pong_timeout_secs: server.pong_timeout_secs,
            max_message_size: server.max_message_size,
            shutdown_timeout_secs: server.shutdown_timeout_secs,
            max_message_chars: settings.chat.max_message_chars,
            max_room_members: settings.chat.max_room_members,
            allowed_origins: server.allowed_origins.clone(),
        }
    }

    /// Bind address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
