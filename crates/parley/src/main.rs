//! # parley
//!
//! Parley chat server binary: loads settings, opens the store and serves
//! the WebSocket endpoint until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use parley_core::{RoomId, UserId};
use parley_server::config::ServerConfig;
use parley_server::server::ParleyServer;
use parley_settings::ParleySettings;
use parley_store::ParleyStore;

/// Parley real-time chat server.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Parley real-time chat server")]
struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the user if needed and print a fresh session token.
    IssueSession {
        #[arg(long)]
        email: String,

        /// Session lifetime (defaults to `storage.sessionTtlHours`).
        #[arg(long)]
        ttl_hours: Option<u32>,
    },
    /// Revoke a session token.
    RevokeSession { token: String },
    /// List a user's friends, one id per line.
    Friends {
        #[arg(long)]
        email: String,
    },
    /// Print a room's members and latest messages as JSON.
    History {
        #[arg(long)]
        room: i64,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

impl Cli {
    /// Fold command-line overrides into loaded settings.
    fn apply(&self, settings: &mut ParleySettings) {
        if let Some(path) = &self.db_path {
            settings.storage.db_path.clone_from(path);
        }
        if let Command::Serve { host, port } = &self.command {
            if let Some(host) = host {
                settings.server.host.clone_from(host);
            }
            if let Some(port) = port {
                settings.server.port = *port;
            }
        }
    }
}

fn open_store(settings: &ParleySettings) -> Result<ParleyStore> {
    let path = &settings.storage.db_path;
    ParleyStore::open(path).with_context(|| format!("failed to open database {}", path.display()))
}

fn issue_session(settings: &ParleySettings, email: &str, ttl_hours: Option<u32>) -> Result<String> {
    let store = open_store(settings)?;
    let user = store
        .accounts()
        .get_or_create_user(email)
        .with_context(|| format!("failed to resolve user {email}"))?;
    let ttl = ttl_hours.unwrap_or(settings.storage.session_ttl_hours);
    let token = store.issue_session(user.id, ttl).context("failed to create session")?;
    info!(user_id = %user.id, ttl_hours = ttl, "session issued");
    Ok(token)
}

fn friends(settings: &ParleySettings, email: &str) -> Result<Vec<UserId>> {
    let store = open_store(settings)?;
    let user = store
        .accounts()
        .find_user(email)
        .with_context(|| format!("failed to look up user {email}"))?
        .with_context(|| format!("no user with email {email}"))?;
    store.friends().friends_of(user.id).context("failed to list friends")
}

fn history(settings: &ParleySettings, room: RoomId, limit: usize) -> Result<serde_json::Value> {
    let store = open_store(settings)?;
    let members = store.rooms().members(room).context("failed to list members")?;
    let messages = store.messages().recent(room, limit).context("failed to read messages")?;
    Ok(json!({ "chat_id": room, "members": members, "messages": messages }))
}

async fn serve(settings: &ParleySettings) -> Result<()> {
    let store = Arc::new(open_store(settings)?);

    let metrics = match parley_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let config = ServerConfig::from_settings(settings);
    let server = ParleyServer::new(config, store.clone(), store, metrics);
    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    info!("parley listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    let timeout = server.config().shutdown_timeout();
    if server.shutdown().graceful_shutdown(vec![handle], timeout).await {
        info!("parley stopped");
    } else {
        warn!("parley stopped with tasks still running");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.config.clone().unwrap_or_else(parley_settings::settings_path);
    let mut settings = parley_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);

    parley_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    match &cli.command {
        Command::Serve { .. } => serve(&settings).await,
        Command::IssueSession { email, ttl_hours } => {
            let token = issue_session(&settings, email, *ttl_hours)?;
            println!("{token}");
            Ok(())
        }
        Command::RevokeSession { token } => {
            open_store(&settings)?
                .accounts()
                .kill_session(token)
                .context("failed to revoke session")?;
            println!("revoked");
            Ok(())
        }
        Command::Friends { email } => {
            for friend in friends(&settings, email)? {
                println!("{friend}");
            }
            Ok(())
        }
        Command::History { room, limit } => {
            let report = history(&settings, RoomId::new(*room), *limit)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
