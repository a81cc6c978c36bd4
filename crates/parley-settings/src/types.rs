//! Settings schema.
//!
//! Every section uses `#[serde(default)]` so a partial user file only has to
//! name the keys it changes. Keys are camelCase on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Network, queue and heartbeat tuning.
    pub server: ServerSettings,
    /// Database location and session lifetime.
    pub storage: StorageSettings,
    /// Chat content limits.
    pub chat: ChatSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Request header carrying the session credential on upgrade.
    pub session_header: String,
    /// Per-connection outbound queue bound.
    pub outbound_queue_capacity: usize,
    /// Bound of the handler → dispatcher event queue.
    pub event_queue_capacity: usize,
    /// Seconds between server pings.
    pub ping_interval_secs: u64,
    /// A connection silent for this long is torn down.
    pub pong_timeout_secs: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for tasks to drain.
    pub shutdown_timeout_secs: u64,
    /// Browser origins allowed to open `/ws`. Empty allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9300,
            session_header: "session_token".to_string(),
            outbound_queue_capacity: 256,
            event_queue_capacity: 1024,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 10,
            allowed_origins: Vec::new(),
        }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Lifetime of newly issued sessions.
    pub session_ttl_hours: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: crate::loader::parley_home().join("parley.db"),
            session_ttl_hours: 24,
        }
    }
}

/// Limits applied by the message and room handlers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Longest accepted message body, in characters.
    pub max_message_chars: usize,
    /// Largest room, creator included.
    pub max_room_members: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            max_room_members: 64,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit one JSON object per line instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
