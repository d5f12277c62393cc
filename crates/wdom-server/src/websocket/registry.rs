//! Registry of live client connections.
//!
//! The registry is the only authority on liveness: a connection is "live"
//! exactly while it is registered here.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::RwLock;
use tracing::debug;
use wdom_core::errors::SyncError;
use wdom_core::ids::ConnectionId;

use super::connection::ClientConnection;
use crate::metrics::WS_CONNECTIONS_ACTIVE;

/// Set of live connections, keyed by identity.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    ///
    /// Registering the same identity twice is a bug in the caller and fails
    /// with [`SyncError::DuplicateConnection`].
    pub fn register(&self, connection: Arc<ClientConnection>) -> Result<(), SyncError> {
        let mut conns = self.connections.write();
        if conns.contains_key(&connection.id) {
            return Err(SyncError::DuplicateConnection {
                connection_id: connection.id.clone(),
            });
        }
        debug!(conn_id = %connection.id, "connection registered");
        let _ = conns.insert(connection.id.clone(), connection);
        gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
        Ok(())
    }

    /// Remove a connection. Absent IDs are a no-op, so racing closes are fine.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut conns = self.connections.write();
        let removed = conns.remove(connection_id);
        if removed.is_some() {
            debug!(conn_id = %connection_id, "connection unregistered");
            gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
        }
        removed
    }

    /// Whether any browser is connected.
    pub fn any_connected(&self) -> bool {
        !self.connections.read().is_empty()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether `connection_id` is registered.
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.read().contains_key(connection_id)
    }

    /// Point-in-time copy of the live connections, for broadcasting
    /// without holding the lock.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }
}
