//! Event fan-out.
//!
//! One dispatcher task consumes the event queue in FIFO order. For each event
//! it encodes the frame once, takes a registry snapshot, and enqueues onto
//! every matching connection without blocking. A connection whose queue is
//! full is unregistered and closed on the spot; everyone else is unaffected.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::{DeliveryError, Event};

use super::registry::ConnectionRegistry;
use crate::metrics::{
    EVENT_RECIPIENTS_TOTAL, EVENTS_DISPATCHED_TOTAL, WS_BACKPRESSURE_DROPS_TOTAL,
};

/// Outcome of one dispatch pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections the frame was enqueued onto.
    pub delivered: usize,
    /// Matching connections torn down during this pass.
    pub dropped: usize,
}

/// Serialized consumer of outbound events.
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver one event to every matching connection.
    pub fn dispatch(&self, event: &Event) -> DispatchReport {
        let kind = event.kind();
        let frame: Arc<str> = match event.encode() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(event_type = %kind, error = %e, "failed to encode event");
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport::default();
        for conn in self.registry.snapshot() {
            if !event.audience().matches(conn.user(), conn.rooms()) {
                continue;
            }
            match conn.try_enqueue(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    let _ = self.registry.unregister(conn.id());
                    let _ = conn.close();
                    report.dropped += 1;
                    match err {
                        DeliveryError::Backpressure => {
                            counter!(WS_BACKPRESSURE_DROPS_TOTAL).increment(1);
                            warn!(
                                conn_id = %conn.id(),
                                user_id = %conn.user(),
                                event_type = %kind,
                                "outbound queue full, dropping slow consumer"
                            );
                        }
                        DeliveryError::Transport(reason) => {
                            debug!(conn_id = %conn.id(), reason = %reason, "connection gone during dispatch");
                        }
                    }
                }
            }
        }

        counter!(EVENTS_DISPATCHED_TOTAL, "type" => kind.tag()).increment(1);
        counter!(EVENT_RECIPIENTS_TOTAL).increment(report.delivered as u64);
        debug!(
            event_type = %kind,
            rule = event.audience().rule(),
            recipients = report.delivered,
            dropped = report.dropped,
            "event dispatched"
        );
        report
    }

    /// Drain `events` until the queue closes or `shutdown` fires.
    pub async fn run(self, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
        info!("broadcast dispatcher started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                next = events.recv() => match next {
                    Some(event) => {
                        let _ = self.dispatch(&event);
                    }
                    None => break,
                },
            }
        }
        info!("broadcast dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::websocket::connection::test_support::make_connection;
    use parley_core::{Audience, MessageKind, RoomId, UserId};
    use serde_json::{Value, json};

    fn room_event(room: i64) -> Event {
        Event::new(
            MessageKind::NewChatMessage,
            json!({"chat_id": room, "content": "hi"}),
            Audience::Membership(RoomId::new(room)),
        )
    }

    fn identity_event(ids: &[i64]) -> Event {
        Event::new(
            MessageKind::SendFriendRequest,
            json!({"sender_id": ids[0]}),
            Audience::identities(ids.iter().copied().map(UserId::new)),
        )
    }

    #[tokio::test]
    async fn membership_reaches_snapshot_holders_only() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (a, mut ra) = make_connection(1, &[10, 11], 8);
        let (b, mut rb) = make_connection(2, &[10], 8);
        let (c, mut rc) = make_connection(3, &[11], 8);
        for conn in [&a, &b, &c] {
            registry.register(conn.clone());
        }

        let report = BroadcastDispatcher::new(registry).dispatch(&room_event(10));
        assert_eq!(report, DispatchReport { delivered: 2, dropped: 0 });

        let frame: Value = serde_json::from_str(&ra.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "newMessage");
        assert_eq!(frame["data"]["content"], "hi");
        assert!(rb.try_recv().is_ok());
        assert!(rc.try_recv().is_err());
    }

    #[tokio::test]
    async fn identity_reaches_every_connection_of_listed_users() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (a1, mut r1) = make_connection(1, &[], 8);
        let (a2, mut r2) = make_connection(1, &[], 8);
        let (b, mut rb) = make_connection(2, &[], 8);
        let (c, mut rc) = make_connection(3, &[], 8);
        for conn in [&a1, &a2, &b, &c] {
            registry.register(conn.clone());
        }

        let report = BroadcastDispatcher::new(registry).dispatch(&identity_event(&[1, 2]));
        assert_eq!(report.delivered, 3);
        assert!(r1.try_recv().is_ok());
        assert!(r2.try_recv().is_ok());
        assert!(rb.try_recv().is_ok());
        assert!(rc.try_recv().is_err());
    }

    #[tokio::test]
    async fn saturated_connection_is_dropped_others_unaffected() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (slow, _slow_rx) = make_connection(1, &[5], 1);
        let (fast, mut fast_rx) = make_connection(2, &[5], 8);
        registry.register(slow.clone());
        registry.register(fast.clone());
        let dispatcher = BroadcastDispatcher::new(registry.clone());

        assert_eq!(dispatcher.dispatch(&room_event(5)).delivered, 2);
        let report = dispatcher.dispatch(&room_event(5));
        assert_eq!(report, DispatchReport { delivered: 1, dropped: 1 });

        assert!(!registry.contains(slow.id()));
        assert!(slow.is_closed());
        assert!(registry.contains(fast.id()));

        // the dropped connection receives nothing further
        let report = dispatcher.dispatch(&room_event(5));
        assert_eq!(report, DispatchReport { delivered: 1, dropped: 0 });
        for _ in 0..3 {
            assert!(fast_rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn closed_receiver_is_unregistered() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (gone, rx) = make_connection(1, &[], 4);
        registry.register(gone.clone());
        drop(rx);

        let report = BroadcastDispatcher::new(registry.clone()).dispatch(&identity_event(&[1]));
        assert_eq!(report.dropped, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn dispatch_tolerates_concurrent_registry_mutation() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (member, mut member_rx) = make_connection(1, &[9], 4096);
        registry.register(member);

        let churn = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let (conn, _rx) = make_connection(100 + i, &[9], 1);
                    registry.register(conn.clone());
                    let _ = registry.unregister(conn.id());
                }
            })
        };

        let dispatcher = BroadcastDispatcher::new(registry);
        for _ in 0..200 {
            let _ = dispatcher.dispatch(&room_event(9));
        }
        churn.join().unwrap();

        let mut received = 0;
        while member_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 200);
    }

    #[tokio::test]
    async fn run_processes_queue_in_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx) = make_connection(1, &[1], 8);
        registry.register(conn);

        let (tx, events) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(BroadcastDispatcher::new(registry).run(events, shutdown.clone()));

        for room_content in ["first", "second"] {
            tx.send(Event::new(
                MessageKind::NewChatMessage,
                json!({"content": room_content}),
                Audience::Membership(RoomId::new(1)),
            ))
            .await
            .unwrap();
        }

        for expected in ["first", "second"] {
            let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let frame: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(frame["data"]["content"], expected);
        }

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
