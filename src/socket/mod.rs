//! Engine.IO socket.
//!
//! A [`Socket`] is a handle to one logical connection. The connection
//! itself lives on a worker task that owns the current transport, the
//! upgrade probe, the write buffer and the heartbeat watchdog. Handle
//! methods enqueue work and return immediately; everything observable
//! comes back as [`SocketEvent`]s or through [`Socket::status`].
//!
//! # Connection Lifecycle
//!
//! ```text
//!          open()        handshake          close()
//!   Idle ─────────► Opening ────────► Open ─────────► Closed
//!                      │                │  ▲
//!                      │       upgrading│  │ probe resolved
//!                      │                ▼  │
//!                      │             Closing (close deferred)
//!                      └───── error / close ──────────► Closed
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent [`SocketBuilder`] |
//! | `events` | Events, states and close reasons |
//! | `handle` | Public [`Socket`] handle |
//! | `heartbeat` | Ping watchdog |
//! | `options` | [`SocketOptions`] and [`UpgradeMemory`] |
//! | `probe` | Upgrade probe state |
//! | `worker` | Connection orchestrator |

// ============================================================================
// Submodules
// ============================================================================

/// Socket builder.
pub mod builder;

/// Socket events and state.
pub mod events;

/// Public socket handle.
pub mod handle;

/// Socket configuration.
pub mod options;

mod heartbeat;
mod probe;
mod worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SocketBuilder;
pub use events::{CloseReason, EventHandler, SocketEvent, SocketState, SocketStatus};
pub use handle::Socket;
pub use options::{DEFAULT_PATH, DEFAULT_TIMESTAMP_PARAM, SocketOptions, UpgradeMemory};
