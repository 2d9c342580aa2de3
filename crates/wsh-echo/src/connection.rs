//! Active connection tracking
//!
//! The set is owned by the server and only touched from the upgrade and
//! close paths of each connection. Entries are independent, so removal is
//! idempotent and needs no cross-connection locking.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A live WebSocket session on the echo server
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub peer: SocketAddr,
    /// Path the upgrade request was made on
    pub path: String,
    pub connected_at: DateTime<Utc>,
    /// Number of echo frames sent so far
    pub frames_echoed: u64,
}

/// Set of connections currently served
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<Uuid, ConnectionInfo>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly upgraded connection and return its id
    pub fn register(&self, peer: SocketAddr, path: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.insert(
            id,
            ConnectionInfo {
                id,
                peer,
                path: path.into(),
                connected_at: Utc::now(),
                frames_echoed: 0,
            },
        );
        debug!(connection_id = %id, active = self.inner.len(), "Connection registered");
        id
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &Uuid) -> Option<ConnectionInfo> {
        let removed = self.inner.remove(id).map(|(_, info)| info);
        if removed.is_some() {
            debug!(connection_id = %id, active = self.inner.len(), "Connection removed");
        }
        removed
    }

    pub fn record_echo(&self, id: &Uuid) {
        if let Some(mut entry) = self.inner.get_mut(id) {
            entry.frames_echoed += 1;
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<ConnectionInfo> {
        self.inner.get(id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn test_register_and_remove() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(peer(), "/ws");

        assert_eq!(registry.len(), 1);
        let info = registry.get(&id).unwrap();
        assert_eq!(info.path, "/ws");
        assert_eq!(info.peer, peer());

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(peer(), "/");
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.remove(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_record_echo() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(peer(), "/ws");
        registry.record_echo(&id);
        registry.record_echo(&id);
        assert_eq!(registry.get(&id).unwrap().frames_echoed, 2);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = ConnectionRegistry::new();
        let clone = registry.clone();
        let a = registry.register(peer(), "/a");
        let _b = clone.register(peer(), "/b");

        assert_eq!(registry.len(), 2);
        clone.remove(&a);
        let paths: Vec<String> = registry.snapshot().into_iter().map(|c| c.path).collect();
        assert_eq!(paths, vec!["/b".to_string()]);
    }
}
