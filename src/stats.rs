//! Traffic accounting
//!
//! Byte and connection counters observed at the relay boundary. All
//! mutations go through one mutex so a snapshot never sees a torn aggregate.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Aggregate traffic counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficStats {
    /// Bytes sent from clients towards upstream
    pub upload_bytes: u64,
    /// Bytes delivered from upstream to clients
    pub download_bytes: u64,
    /// Currently tracked connections, never negative
    pub connections: i64,
    /// When counting started (or was last reset)
    pub start_time: SystemTime,
}

impl Default for TrafficStats {
    fn default() -> Self {
        TrafficStats {
            upload_bytes: 0,
            download_bytes: 0,
            connections: 0,
            start_time: SystemTime::now(),
        }
    }
}

impl TrafficStats {
    /// Time since `start_time`
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed().unwrap_or_default()
    }

    pub fn total_bytes(&self) -> u64 {
        self.upload_bytes.saturating_add(self.download_bytes)
    }
}

/// Shared, serialized traffic counters
#[derive(Debug, Default)]
pub struct TrafficAccounting {
    stats: Mutex<TrafficStats>,
}

impl TrafficAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<F: FnOnce(&mut TrafficStats)>(&self, f: F) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stats);
    }

    pub fn record_upload(&self, bytes: u64) {
        self.with(|s| s.upload_bytes = s.upload_bytes.saturating_add(bytes));
    }

    pub fn record_download(&self, bytes: u64) {
        self.with(|s| s.download_bytes = s.download_bytes.saturating_add(bytes));
    }

    pub fn increment_connections(&self) {
        self.with(|s| s.connections += 1);
    }

    /// Decrement, floored at zero
    pub fn decrement_connections(&self) {
        self.with(|s| s.connections = (s.connections - 1).max(0));
    }

    /// Zero all counters and restart the clock
    pub fn reset_stats(&self) {
        self.with(|s| *s = TrafficStats::default());
    }

    pub fn snapshot(&self) -> TrafficStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Deliver a snapshot to `callback` every `interval`
    ///
    /// Reporting stops when the returned handle is stopped or dropped.
    pub fn start_reporting<F>(self: &Arc<Self>, interval: Duration, callback: F) -> ReporterHandle
    where
        F: Fn(TrafficStats) + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let accounting = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => callback(accounting.snapshot()),
                }
            }
            debug!("Traffic reporter stopped");
        });

        ReporterHandle { token }
    }
}

/// Handle to a periodic traffic reporter
#[derive(Debug)]
pub struct ReporterHandle {
    token: CancellationToken,
}

impl ReporterHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
