//! Pong bookkeeping for the application-level heartbeat.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Remembers when the last pong arrived on the current socket.
#[derive(Debug)]
pub(crate) struct PongTracker {
    last_pong: Mutex<Instant>,
}

impl Default for PongTracker {
    fn default() -> Self {
        Self {
            last_pong: Mutex::new(Instant::now()),
        }
    }
}

impl PongTracker {
    /// Start a fresh window; called whenever a socket opens.
    pub(crate) fn reset(&self) {
        self.record();
    }

    pub(crate) fn record(&self) {
        *self.last_pong.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub(crate) fn since_last_pong(&self) -> Duration {
        self.last_pong
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    pub(crate) fn is_stale(&self, timeout: Duration) -> bool {
        self.since_last_pong() > timeout
    }
}
