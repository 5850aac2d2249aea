//! Engine.IO client.
//!
//! Connects to an Engine.IO (protocol 4) server over HTTP long-polling,
//! then upgrades in place to WebSocket when the server offers it.
//!
//! # Architecture
//!
//! Each [`Socket`] runs on its own single-threaded event loop:
//!
//! - **Handle**: [`Socket`] methods enqueue tasks and return immediately
//! - **Worker**: owns the transport, probe, write buffer and heartbeat
//! - **Transports**: never block; network I/O runs on spawned tasks whose
//!   completions are fed back to the worker as tasks
//!
//! Nothing in the connection state is shared between threads, so no
//! socket state is ever behind a lock.
//!
//! # Quick Start
//!
//! ```no_run
//! use engineio_client::{Result, Socket, SocketEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let socket = Socket::builder().url("http://localhost:3000")?.build()?;
//!     let mut events = socket.subscribe();
//!     socket.open();
//!     socket.send("hello");
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SocketEvent::Message(data) => println!("message: {data:?}"),
//!             SocketEvent::Close(reason) => {
//!                 println!("closed: {reason}");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Injectable HTTP and WebSocket clients |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`event_loop`] | Single-consumer task queue |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Packets, payloads and handshake |
//! | [`socket`] | [`Socket`], options and events |
//! | [`transport`] | Polling and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Injectable network clients.
///
/// Implement [`HttpClient`] or [`WebSocketConnector`] to run the socket
/// over a custom stack or a test double.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Single-consumer task queue driving a socket.
pub mod event_loop;

/// Type-safe identifiers.
pub mod identifiers;

/// Engine.IO wire protocol.
pub mod protocol;

/// Engine.IO socket.
///
/// Use [`Socket::builder()`] to create a configured socket.
pub mod socket;

/// Transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Frame, Headers, HttpClient, HttpRequest, HttpResponse, Method, ReqwestHttpClient,
    TungsteniteConnector, WebSocketChannel, WebSocketConnector,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::TransportId;

// Protocol types
pub use protocol::{HandshakeData, Packet, PacketData, PacketType};

// Socket types
pub use socket::{
    CloseReason, EventHandler, Socket, SocketBuilder, SocketEvent, SocketOptions, SocketState,
    SocketStatus, UpgradeMemory,
};

// Transport types
pub use transport::{TransportInfo, TransportKind};
