//! Upgrade probe state.
//!
//! ```text
//!   Opening ──open──► AwaitingPong ──pong "probe"──► Pausing ──paused──► promoted
//!      │                   │                            │
//!      └───── error / close / unexpected packet ────────┴──► failed
//! ```
//!
//! The probe transport is owned here until promotion. It never carries
//! application packets before it becomes the current transport.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::TransportId;
use crate::transport::Transport;

// ============================================================================
// ProbeStage
// ============================================================================

/// Progress of an upgrade probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeStage {
    /// Probe transport connecting.
    Opening,
    /// `ping "probe"` sent.
    AwaitingPong,
    /// Pong received; waiting for the current transport to pause.
    Pausing,
}

// ============================================================================
// Probe
// ============================================================================

/// An in-flight upgrade probe.
#[derive(Debug)]
pub(crate) struct Probe {
    pub(crate) transport: Transport,
    pub(crate) stage: ProbeStage,
}

impl Probe {
    pub(crate) fn new(transport: Transport) -> Self {
        Self {
            transport,
            stage: ProbeStage::Opening,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> TransportId {
        self.transport.id()
    }

    /// Closes the probe transport without reporting anything.
    pub(crate) fn abandon(mut self) {
        let _ = self.transport.close();
        self.transport.discard();
    }
}
