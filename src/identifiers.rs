//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// TransportId
// ============================================================================

/// Process-unique identifier of one transport instance.
///
/// Transport references handed to the application (in `upgrading` /
/// `upgrade` events) are compared by this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

impl TransportId {
    /// Allocates a fresh identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
