//! Connection table and server lifecycle state

use crate::connection::{ConnectionId, ProxyConnection};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// Lifecycle of a [`ProxyServer`](super::ProxyServer)
#[derive(Debug, Clone)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    /// The listener failed; no further connections are accepted
    Error(Arc<io::Error>),
}

impl ServerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ServerState::Running)
    }
}

impl PartialEq for ServerState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ServerState::Stopped, ServerState::Stopped)
            | (ServerState::Starting, ServerState::Starting)
            | (ServerState::Running, ServerState::Running) => true,
            (ServerState::Error(a), ServerState::Error(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}

/// Tracked connections plus the server state, mutated under one lock
#[derive(Debug)]
pub struct ConnectionTable {
    pub(crate) state: ServerState,
    connections: HashMap<ConnectionId, Arc<ProxyConnection>>,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        ConnectionTable {
            state: ServerState::Stopped,
            connections: HashMap::new(),
        }
    }
}

impl ConnectionTable {
    /// Track a connection; refused unless the server is running
    pub fn insert(&mut self, conn: Arc<ProxyConnection>) -> bool {
        if !self.state.is_running() {
            return false;
        }
        self.connections.insert(conn.id(), conn);
        true
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Arc<ProxyConnection>> {
        self.connections.remove(&id)
    }

    /// Remove and return every tracked connection
    pub fn drain(&mut self) -> Vec<Arc<ProxyConnection>> {
        self.connections.drain().map(|(_, conn)| conn).collect()
    }

    pub fn snapshot(&self) -> Vec<Arc<ProxyConnection>> {
        self.connections.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
