//! Per-connection state shared between the registry, the dispatcher and
//! the connection's own reader/writer loops.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use parley_core::{ConnectionId, DeliveryError, RoomId, UserId};

/// An admitted WebSocket connection.
///
/// Identity and membership snapshot are fixed at admission. The outbound
/// sender is only used by the dispatcher; its receiver belongs to the
/// connection's writer loop.
pub struct ConnectionHandle {
    id: ConnectionId,
    user: UserId,
    rooms: HashSet<RoomId>,
    tx: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
    closing: AtomicBool,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_frames: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        user: UserId,
        rooms: HashSet<RoomId>,
        tx: mpsc::Sender<Arc<str>>,
        closed: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            user,
            rooms,
            tx,
            closed,
            closing: AtomicBool::new(false),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// Rooms captured at admission. Not refreshed while connected.
    pub fn rooms(&self) -> &HashSet<RoomId> {
        &self.rooms
    }

    /// Non-blocking enqueue onto the outbound queue.
    pub fn try_enqueue(&self, frame: Arc<str>) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Transport("connection closed".into()));
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryError::Backpressure)
            }
            Err(TrySendError::Closed(_)) => {
                Err(DeliveryError::Transport("outbound queue closed".into()))
            }
        }
    }

    /// Frames refused because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Signal both loops to stop. Returns `true` only for the first caller.
    pub fn close(&self) -> bool {
        let first = !self.closing.swap(true, Ordering::AcqRel);
        self.closed.cancel();
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) was called or the server is shutting down.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("rooms", &self.rooms.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
