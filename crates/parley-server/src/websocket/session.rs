//! Per-connection lifecycle, from upgrade through disconnect.
//!
//! Each admitted socket gets two loops. The writer owns the socket's sink and
//! drains the connection's outbound queue, interleaving heartbeat pings. The
//! reader owns the stream, routes each frame through the [`MessageRouter`]
//! and forwards resulting events to the dispatcher. Either loop ending closes
//! the connection; the reader then unregisters it.
//!
//! [`MessageRouter`]: crate::router::MessageRouter

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, instrument, warn};

use parley_core::ConnectionId;

use super::connection::ConnectionHandle;
use crate::gate::Admission;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_FRAMES_DROPPED_TOTAL,
};
use crate::server::AppState;

/// How long teardown waits for the writer to flush a close frame.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// What the reader does with one transport frame.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Text(String),
    /// Binary payload that is not UTF-8; carries its length.
    Undecodable(usize),
    Control,
    Close,
}

fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Text(text.to_string()),
        Message::Binary(data) => match std::str::from_utf8(&data) {
            Ok(text) => Inbound::Text(text.to_owned()),
            Err(_) => Inbound::Undecodable(data.len()),
        },
        Message::Ping(_) | Message::Pong(_) => Inbound::Control,
        Message::Close(_) => Inbound::Close,
    }
}

/// The greeting written straight to the socket before the writer starts.
fn established_frame(connection: &ConnectionHandle) -> String {
    let mut rooms: Vec<_> = connection.rooms().iter().copied().collect();
    rooms.sort_unstable();
    json!({
        "type": "connection.established",
        "data": {
            "userId": connection.user(),
            "connectionId": connection.id().as_str(),
            "rooms": rooms,
        },
    })
    .to_string()
}

/// Run one admitted connection to completion.
#[instrument(skip_all, fields(conn_id = tracing::field::Empty, user_id = %admission.user))]
pub async fn run_connection(socket: WebSocket, admission: Admission, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(state.config.outbound_queue_capacity);
    let handle = Arc::new(ConnectionHandle::new(
        ConnectionId::new(),
        admission.user,
        admission.rooms,
        tx,
        state.shutdown.child_token(),
    ));
    let _ = tracing::Span::current().record("conn_id", handle.id().as_str());

    state.registry.register(Arc::clone(&handle));
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(rooms = handle.rooms().len(), "connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Registered first, so anything dispatched from here on is queued
    // behind the greeting.
    if let Err(err) = ws_tx.send(Message::Text(established_frame(&handle).into())).await {
        debug!(error = %err, "greeting failed");
        let _ = handle.close();
    }

    let writer_handle = Arc::clone(&handle);
    let ping_interval = state.config.ping_interval();
    let pong_timeout = state.config.pong_timeout();
    let mut writer = tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(ping_interval);
            // The first tick completes immediately.
            let _ = ticker.tick().await;

            loop {
                tokio::select! {
                    () = writer_handle.closed() => break,
                    next = rx.recv() => {
                        let Some(frame) = next else { break };
                        if let Err(err) = ws_tx.send(Message::Text(frame.to_string().into())).await {
                            debug!(error = %err, "socket write failed");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !writer_handle.check_alive()
                            && writer_handle.last_pong_elapsed() > pong_timeout
                        {
                            warn!(timeout = ?pong_timeout, "peer unresponsive, disconnecting");
                            break;
                        }
                        if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            let _ = ws_tx.send(Message::Close(None)).await;
            let _ = writer_handle.close();
        }
        .instrument(tracing::Span::current()),
    );

    loop {
        let next = tokio::select! {
            () = handle.closed() => break,
            next = ws_rx.next() => next,
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                debug!(error = %err, "socket read failed");
                break;
            }
            None => break,
        };
        handle.mark_alive();

        let text = match classify(msg) {
            Inbound::Text(text) => text,
            Inbound::Undecodable(len) => {
                counter!(WS_FRAMES_DROPPED_TOTAL, "reason" => "malformed").increment(1);
                debug!(len, "non-UTF-8 binary frame dropped");
                continue;
            }
            Inbound::Control => continue,
            Inbound::Close => {
                debug!("peer sent close frame");
                break;
            }
        };

        // Rejections are logged and counted by the router.
        if let Ok(event) = state.router.route(&text, handle.user()).await {
            if state.events.send(event).await.is_err() {
                debug!("event queue closed");
                break;
            }
        }
    }

    let _ = state.registry.unregister(handle.id());
    let _ = handle.close();
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(handle.age().as_secs_f64());
    info!(
        duration_secs = handle.age().as_secs(),
        dropped_frames = handle.drop_count(),
        "connection closed"
    );
}
