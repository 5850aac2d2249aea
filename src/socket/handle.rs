//! Public socket handle.
//!
//! Every method only enqueues a task for the socket's worker and returns
//! immediately. Effects are observed through events and [`Socket::status`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{Error, Result};
use crate::event_loop::{self, TaskQueue};
use crate::protocol::PacketData;

use super::builder::SocketBuilder;
use super::events::{SocketEvent, SocketState, SocketStatus};
use super::options::SocketOptions;
use super::worker::{SocketWorker, Task};

// ============================================================================
// Socket
// ============================================================================

/// Engine.IO client socket.
///
/// Cheap to clone; all clones drive the same connection. When the last
/// clone is dropped the connection is closed.
#[derive(Debug, Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

#[derive(Debug)]
struct SocketInner {
    queue: TaskQueue<Task>,
    status: watch::Receiver<SocketStatus>,
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        if self.queue.exec(Task::Shutdown) {
            debug!("last socket handle dropped, closing");
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Socket {
    /// Creates a socket and spawns its worker. Nothing connects until
    /// [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are invalid or if called
    /// outside a tokio runtime.
    pub fn new(options: SocketOptions) -> Result<Self> {
        options.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("a tokio runtime is required: {e}")))?;

        let (queue, receiver) = TaskQueue::channel();
        let (status_tx, status_rx) = watch::channel(SocketStatus::default());
        let worker = SocketWorker::new(options, queue.clone(), status_tx);
        runtime.spawn(event_loop::run(receiver, worker));

        Ok(Self {
            inner: Arc::new(SocketInner {
                queue,
                status: status_rx,
            }),
        })
    }

    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SocketBuilder {
        SocketBuilder::new()
    }
}

// ============================================================================
// Operations
// ============================================================================

impl Socket {
    /// Starts connecting. Ignored unless the socket is idle.
    pub fn open(&self) {
        self.inner.queue.exec(Task::Open);
    }

    /// Queues a message.
    ///
    /// Messages sent before the handshake are buffered. Messages sent
    /// after close are dropped.
    pub fn send(&self, data: impl Into<PacketData>) {
        self.inner.queue.exec(Task::Send(data.into()));
    }

    /// Closes the connection.
    ///
    /// Buffered messages are written first. While an upgrade probe is in
    /// progress the close is carried out once the probe resolves.
    pub fn close(&self) {
        self.inner.queue.exec(Task::Close);
    }

    /// Registers a callback run on the worker for every event.
    ///
    /// Handlers must not block.
    pub fn on_event<F>(&self, handler: F)
    where
        F: FnMut(&SocketEvent) + Send + 'static,
    {
        self.inner.queue.exec(Task::Subscribe(Box::new(handler)));
    }

    /// Returns a stream of every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SocketEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_event(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }
}

// ============================================================================
// Status
// ============================================================================

impl Socket {
    /// Returns the latest status snapshot.
    #[must_use]
    pub fn status(&self) -> SocketStatus {
        self.inner.status.borrow().clone()
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.inner.status.borrow().state
    }

    /// Returns the session id once the handshake completed.
    #[must_use]
    pub fn sid(&self) -> Option<String> {
        self.inner.status.borrow().sid.clone()
    }

    /// Waits until the socket reaches `state`.
    ///
    /// Returns immediately if the worker has stopped.
    pub async fn wait_for_state(&self, state: SocketState) -> SocketStatus {
        let mut status = self.inner.status.clone();
        let result = status.wait_for(|s| s.state == state).await.map(|s| (*s).clone());
        match result {
            Ok(status) => status,
            Err(_) => self.status(),
        }
    }

    /// Waits until the socket is closed.
    pub async fn closed(&self) -> SocketStatus {
        self.wait_for_state(SocketState::Closed).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_outside_runtime_fails() {
        let err = Socket::new(SocketOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_options() {
        let err = Socket::new(SocketOptions::new().with_host("")).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[tokio::test]
    async fn test_initial_status_is_idle() {
        let socket = Socket::new(SocketOptions::new()).unwrap();
        assert_eq!(socket.state(), SocketState::Idle);
        assert!(socket.sid().is_none());
        assert!(socket.status().transport.is_none());
    }

    #[tokio::test]
    async fn test_close_while_idle_is_noop() {
        let socket = Socket::new(SocketOptions::new()).unwrap();
        let mut events = socket.subscribe();
        socket.close();
        socket.send("dropped?");

        // The worker stays alive: the message is buffered, not dropped.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, SocketEvent::PacketCreate(_)));
        assert_eq!(socket.state(), SocketState::Idle);
    }
}
