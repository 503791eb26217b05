//! Connection lifecycle state and activity tracking

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Protocol state of a [`ProxyConnection`](super::ProxyConnection)
///
/// States advance in declaration order. `Error` and `Cancelled` are terminal
/// and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Accepted, nothing read yet
    Initial,
    /// Waiting for the method selection greeting
    Handshake,
    /// Waiting for the CONNECT request
    Request,
    /// Upstream connect in flight
    Connecting,
    /// Relaying bytes in both directions
    Relay,
    /// Failed
    Error,
    /// Cancelled or closed
    Cancelled,
}

impl ConnectionState {
    fn rank(self) -> u8 {
        match self {
            ConnectionState::Initial => 0,
            ConnectionState::Handshake => 1,
            ConnectionState::Request => 2,
            ConnectionState::Connecting => 3,
            ConnectionState::Relay => 4,
            ConnectionState::Error | ConnectionState::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Error | ConnectionState::Cancelled)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Initial => "initial",
            ConnectionState::Handshake => "handshake",
            ConnectionState::Request => "request",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Relay => "relay",
            ConnectionState::Error => "error",
            ConnectionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Last-activity timestamp shared between a connection's pumps and the idle monitor
#[derive(Debug)]
pub struct ActivityClock {
    base: Instant,
    last_ms: AtomicU64,
}

impl Default for ActivityClock {
    fn default() -> Self {
        ActivityClock {
            base: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }
}

impl ActivityClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity now
    pub fn touch(&self) {
        let ms = self.base.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        let now = self.base.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        use ConnectionState::*;
        assert!(Initial.can_transition_to(Handshake));
        assert!(Handshake.can_transition_to(Request));
        assert!(Request.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Relay));
        assert!(!Relay.can_transition_to(Handshake));
        assert!(!Request.can_transition_to(Request));
    }

    #[test]
    fn test_terminal_states() {
        use ConnectionState::*;
        for state in [Initial, Handshake, Request, Connecting, Relay] {
            assert!(state.can_transition_to(Error));
            assert!(state.can_transition_to(Cancelled));
            assert!(!state.is_terminal());
        }
        assert!(!Error.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Error));
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn test_activity_clock() {
        let clock = ActivityClock::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(clock.idle_for() >= Duration::from_millis(20));

        clock.touch();
        assert!(clock.idle_for() < Duration::from_millis(20));
    }
}
