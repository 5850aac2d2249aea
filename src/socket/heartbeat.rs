//! Server-driven heartbeat watchdog.
//!
//! The server pings; the client only answers. The watchdog fires when no
//! ping arrived within `pingInterval + pingTimeout` of the handshake or of
//! the previous ping.
//!
//! Each arming gets a new generation. The timer task enqueues its expiry
//! with that generation, and the owner ignores expiries whose generation
//! is no longer current, so a timer that fired while being re-armed cannot
//! close a live connection.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

// ============================================================================
// Heartbeat
// ============================================================================

/// Restartable deadline timer.
#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// (Re)arms the deadline. `on_expire` receives the arming generation.
    pub(crate) fn arm<F>(&mut self, deadline: Duration, on_expire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        trace!(generation, deadline_ms = deadline.as_millis() as u64, "heartbeat armed");

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            on_expire(generation);
        }));
    }

    /// Disarms the deadline.
    pub(crate) fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Returns `true` if `generation` is the live arming.
    #[inline]
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.timer.is_some() && generation == self.generation
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================
