//! Index of admitted connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use parley_core::ConnectionId;

use super::connection::ConnectionHandle;

/// Thread-safe map of live connections.
///
/// The registry only indexes handles; each connection is driven by its own
/// reader/writer pair. Iteration goes through [`snapshot`](Self::snapshot),
/// which copies the current set so a dispatch pass never holds the lock while
/// enqueueing and is unaffected by concurrent register/unregister.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, connection: Arc<ConnectionHandle>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id().clone(), connection);
    }

    /// Remove a connection. Returns the handle only on the first call.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.write().remove(id)
    }

    /// Stable copy of the current connections.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().values().cloned().collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::test_support::make_connection;

    #[test]
    fn register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection(1, &[], 4);
        registry.register(conn.clone());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(conn.id()));

        assert!(registry.unregister(conn.id()).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_twice_is_noop() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection(1, &[], 4);
        registry.register(conn.clone());
        assert!(registry.unregister(conn.id()).is_some());
        assert!(registry.unregister(conn.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_survives_mutation() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = make_connection(1, &[], 4);
        let (b, _rb) = make_connection(2, &[], 4);
        registry.register(a.clone());
        registry.register(b.clone());

        let snapshot = registry.snapshot();
        let _ = registry.unregister(a.id());
        let (c, _rc) = make_connection(3, &[], 4);
        registry.register(c);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(a.id()));
    }

    #[test]
    fn concurrent_register_and_unregister() {
        let registry = Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let (conn, _rx) = make_connection(i, &[], 1);
                        registry.register(conn.clone());
                        let _ = registry.snapshot();
                        assert!(registry.unregister(conn.id()).is_some());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
