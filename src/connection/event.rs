//! Completion notifications from connections to their owner

use crate::error::ProxyError;

/// Connection identifier, unique per server instance
pub type ConnectionId = u64;

/// Sent exactly once when a connection finishes
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Closed normally or cancelled
    Closed { id: ConnectionId },
    /// Terminated by an error
    Failed { id: ConnectionId, error: ProxyError },
}

impl ConnectionEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            ConnectionEvent::Closed { id } | ConnectionEvent::Failed { id, .. } => *id,
        }
    }
}
