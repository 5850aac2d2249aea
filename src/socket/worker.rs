//! Socket worker: the connection orchestrator.
//!
//! Runs on the socket's event loop and owns every piece of connection
//! state: the current transport, the upgrade probe, the write buffer and
//! the heartbeat. Public calls, transport I/O and timer expiries all
//! arrive as [`Task`]s, one at a time.
//!
//! # Packet Dispatch
//!
//! | Packet | Action |
//! |--------|--------|
//! | `open` | parse handshake, become open, flush, arm heartbeat, probe |
//! | `ping` | emit `ping`, re-arm heartbeat, answer `pong` |
//! | `message` | emit `message` |
//! | `error` | treat as transport error |
//! | `close` | handled by the transport, which reports its close |

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::error::Error;
use crate::event_loop::{TaskHandler, TaskQueue};
use crate::identifiers::TransportId;
use crate::protocol::{HandshakeData, PARSER_ERROR, Packet, PacketData, PacketType};
use crate::transport::{IoSink, ReadyState, Transport, TransportEvent, TransportIo, TransportKind};

use super::events::{CloseReason, EventHandler, SocketEvent, SocketState, SocketStatus};
use super::heartbeat::Heartbeat;
use super::options::SocketOptions;
use super::probe::{Probe, ProbeStage};

// ============================================================================
// Task
// ============================================================================

/// Unit of work for the socket worker.
pub(crate) enum Task {
    /// Register an event handler.
    Subscribe(EventHandler),
    /// Start connecting.
    Open,
    /// Queue a message.
    Send(PacketData),
    /// Close the connection.
    Close,
    /// Last handle dropped: close, or stop if never opened.
    Shutdown,
    /// Transport I/O completion.
    Io {
        transport: TransportId,
        io: TransportIo,
    },
    /// Heartbeat deadline elapsed.
    HeartbeatExpired { generation: u64 },
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe(_) => f.write_str("Subscribe"),
            Self::Open => f.write_str("Open"),
            Self::Send(data) => f.debug_tuple("Send").field(data).finish(),
            Self::Close => f.write_str("Close"),
            Self::Shutdown => f.write_str("Shutdown"),
            Self::Io { transport, io } => f
                .debug_struct("Io")
                .field("transport", transport)
                .field("io", io)
                .finish(),
            Self::HeartbeatExpired { generation } => f
                .debug_struct("HeartbeatExpired")
                .field("generation", generation)
                .finish(),
        }
    }
}

// ============================================================================
// SocketWorker
// ============================================================================

/// Worker-owned connection state.
pub(crate) struct SocketWorker {
    options: SocketOptions,
    queue: TaskQueue<Task>,
    status: watch::Sender<SocketStatus>,
    handlers: Vec<EventHandler>,

    state: SocketState,
    handshake: Option<HandshakeData>,
    transport: Option<Transport>,
    write_buffer: Vec<Packet>,
    heartbeat: Heartbeat,

    probe: Option<Probe>,
    candidates: VecDeque<TransportKind>,
    upgrading: bool,
    close_deferred: bool,
}

impl SocketWorker {
    pub(crate) fn new(
        options: SocketOptions,
        queue: TaskQueue<Task>,
        status: watch::Sender<SocketStatus>,
    ) -> Self {
        Self {
            options,
            queue,
            status,
            handlers: Vec::new(),
            state: SocketState::Idle,
            handshake: None,
            transport: None,
            write_buffer: Vec::new(),
            heartbeat: Heartbeat::default(),
            probe: None,
            candidates: VecDeque::new(),
            upgrading: false,
            close_deferred: false,
        }
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn emit(&mut self, event: SocketEvent) {
        trace!(event = event.name(), "emit");
        for handler in &mut self.handlers {
            handler(&event);
        }
    }

    fn publish_status(&self) {
        let status = SocketStatus {
            state: self.state,
            sid: self.handshake.as_ref().map(|h| h.sid.clone()),
            transport: self.transport.as_ref().map(Transport::info),
            upgrading: self.upgrading,
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn current_id(&self) -> Option<TransportId> {
        self.transport.as_ref().map(Transport::id)
    }

    fn sink_for(&self, id: TransportId) -> IoSink {
        let queue = self.queue.clone();
        let deferred = self.queue.clone();
        IoSink::new(move |io| match queue.try_exec(Task::Io { transport: id, io }) {
            Ok(()) => Ok(()),
            Err(Task::Io { io, .. }) => Err(io),
            Err(_) => Ok(()),
        })
        .with_defer(move |io| match deferred.next_tick(Task::Io { transport: id, io }) {
            Ok(()) => Ok(()),
            Err(Task::Io { io, .. }) => Err(io),
            Err(_) => Ok(()),
        })
    }

    fn create_transport(&mut self, kind: TransportKind) -> Transport {
        let id = TransportId::generate();
        let mut options = self.options.transport_options();
        if let Some(handshake) = &self.handshake {
            options
                .query
                .insert("sid".to_string(), handshake.sid.clone());
        }

        debug!(transport = kind.name(), id = %id, "creating transport");
        let transport = Transport::with_id(id, kind, options, self.sink_for(id));
        self.emit(SocketEvent::Transport(transport.info()));
        transport
    }

    // ========================================================================
    // Public Operations
    // ========================================================================

    fn open(&mut self) {
        if self.state != SocketState::Idle {
            debug!(state = %self.state, "open ignored");
            return;
        }

        let remembered = self.options.remember_upgrade
            && self.options.upgrade_memory.get()
            && self.options.allows(TransportKind::WebSocket);
        let kind = if remembered {
            TransportKind::WebSocket
        } else if let Some(&first) = self.options.transports.first() {
            first
        } else {
            let err = Error::config("no transports configured");
            error!(error = %err, "cannot open socket");
            self.emit(SocketEvent::Error(Arc::new(err)));
            return;
        };

        info!(transport = kind.name(), host = %self.options.host, "opening socket");
        self.state = SocketState::Opening;

        let mut transport = self.create_transport(kind);
        let id = transport.id();
        let events = transport.open();
        self.transport = Some(transport);
        self.on_transport_events(id, events);
    }

    fn send_packet(&mut self, packet: Packet) {
        // Only a pending upgrade keeps a closing socket accepting packets.
        let closing = self.state == SocketState::Closing && !self.upgrading;
        if self.state == SocketState::Closed || closing {
            debug!(
                packet_type = %packet.packet_type(),
                state = %self.state,
                "socket closing, dropping packet"
            );
            return;
        }

        self.emit(SocketEvent::PacketCreate(packet.clone()));
        self.write_buffer.push(packet);
        self.flush();
    }

    fn close(&mut self) {
        if !matches!(self.state, SocketState::Opening | SocketState::Open) {
            debug!(state = %self.state, "close ignored");
            return;
        }

        let waiting_for_drain =
            self.state == SocketState::Open && !self.write_buffer.is_empty();
        if self.upgrading || waiting_for_drain {
            debug!(
                upgrading = self.upgrading,
                buffered = self.write_buffer.len(),
                "deferring close"
            );
            self.state = SocketState::Closing;
            self.close_deferred = true;
            return;
        }

        self.on_close(CloseReason::ForcedClose);
    }

    // ========================================================================
    // Write Buffer
    // ========================================================================

    fn flush(&mut self) {
        if !matches!(self.state, SocketState::Open | SocketState::Closing)
            || self.upgrading
            || self.write_buffer.is_empty()
        {
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if !transport.writable() {
            return;
        }

        let packets = std::mem::take(&mut self.write_buffer);
        debug!(count = packets.len(), transport = transport.name(), "flushing packets");
        if let Err(e) = transport.send(&packets) {
            error!(error = %e, "flush failed");
            self.emit(SocketEvent::Error(Arc::new(e)));
        }
    }

    fn on_drain(&mut self) {
        if !self.write_buffer.is_empty() {
            self.flush();
            return;
        }

        self.emit(SocketEvent::Drain);
        if self.close_deferred && !self.upgrading {
            debug!("buffer drained, running deferred close");
            self.on_close(CloseReason::ForcedClose);
        }
    }

    // ========================================================================
    // Current Transport
    // ========================================================================

    fn on_io(&mut self, id: TransportId, io: TransportIo) {
        if let Some(transport) = self.transport.as_mut().filter(|t| t.id() == id) {
            let events = transport.handle_io(io);
            self.on_transport_events(id, events);
        } else if let Some(probe) = self.probe.as_mut().filter(|p| p.id() == id) {
            let events = probe.transport.handle_io(io);
            self.on_probe_events(id, events);
        } else {
            trace!(id = %id, "I/O for retired transport");
        }
    }

    fn on_transport_events(&mut self, id: TransportId, events: Vec<TransportEvent>) {
        for event in events {
            if self.state == SocketState::Closed || self.current_id() != Some(id) {
                trace!(id = %id, "dropping events of replaced transport");
                break;
            }

            match event {
                TransportEvent::Open => trace!(id = %id, "transport open, awaiting handshake"),
                TransportEvent::Packet(packet) => self.on_packet(packet),
                TransportEvent::Drain => self.on_drain(),
                TransportEvent::Paused => self.on_paused(),
                TransportEvent::Close => self.on_close(CloseReason::TransportClose),
                TransportEvent::Error(e) => self.on_error(e),
                TransportEvent::ResponseHeaders(headers) => {
                    self.emit(SocketEvent::ResponseHeaders {
                        transport: id,
                        headers,
                    });
                }
            }
        }
    }

    fn on_packet(&mut self, packet: Packet) {
        if !matches!(
            self.state,
            SocketState::Opening | SocketState::Open | SocketState::Closing
        ) {
            debug!(state = %self.state, "packet received while not connected");
            return;
        }

        trace!(packet_type = %packet.packet_type(), "packet received");
        self.emit(SocketEvent::Packet(packet.clone()));

        match packet.packet_type() {
            PacketType::Open => self.on_handshake(&packet),
            PacketType::Ping => {
                self.emit(SocketEvent::Ping);
                self.arm_heartbeat();
                self.send_packet(Packet::empty(PacketType::Pong));
            }
            PacketType::Message => {
                let data = packet
                    .into_data()
                    .unwrap_or_else(|| PacketData::Text(String::new()));
                self.emit(SocketEvent::Message(data));
            }
            PacketType::Error => {
                let message = packet.text().unwrap_or(PARSER_ERROR).to_string();
                self.on_error(Error::server(message));
            }
            PacketType::Close | PacketType::Pong | PacketType::Upgrade | PacketType::Noop => {}
        }
    }

    fn on_handshake(&mut self, packet: &Packet) {
        if self.state != SocketState::Opening {
            debug!("duplicate handshake ignored");
            return;
        }

        let parsed = packet
            .text()
            .ok_or_else(|| Error::handshake("open packet without payload"))
            .and_then(HandshakeData::parse);
        let handshake = match parsed {
            Ok(handshake) => handshake,
            Err(e) => {
                error!(error = %e, "handshake failed");
                self.emit(SocketEvent::Error(Arc::new(e)));
                self.on_close(CloseReason::ParseError);
                return;
            }
        };

        let current = match self.transport.as_mut() {
            Some(transport) => {
                transport.set_sid(&handshake.sid);
                transport.kind()
            }
            None => return,
        };

        let mut candidates = VecDeque::new();
        for name in &handshake.upgrades {
            match name.parse::<TransportKind>() {
                Ok(kind)
                    if kind != current
                        && self.options.allows(kind)
                        && !candidates.contains(&kind) =>
                {
                    candidates.push_back(kind);
                }
                Ok(_) => {}
                Err(_) => debug!(upgrade = %name, "unknown upgrade ignored"),
            }
        }
        self.candidates = candidates;

        info!(sid = %handshake.sid, transport = current.name(), "socket open");
        self.state = SocketState::Open;
        self.options
            .upgrade_memory
            .set(current == TransportKind::WebSocket);
        self.handshake = Some(handshake.clone());
        self.emit(SocketEvent::Open(handshake));

        self.flush();
        self.arm_heartbeat();
        if self.options.upgrade {
            self.start_probe();
        }
    }

    fn on_error(&mut self, err: Error) {
        warn!(error = %err, "transport error");
        self.options.upgrade_memory.set(false);
        self.emit(SocketEvent::Error(Arc::new(err)));
        self.on_close(CloseReason::TransportError);
    }

    fn on_close(&mut self, reason: CloseReason) {
        if !matches!(
            self.state,
            SocketState::Opening | SocketState::Open | SocketState::Closing
        ) {
            return;
        }

        info!(reason = %reason, "socket closed");
        self.heartbeat.cancel();

        if let Some(probe) = self.probe.take() {
            debug!(id = %probe.id(), "abandoning upgrade probe");
            probe.abandon();
            self.upgrading = false;
            self.emit(SocketEvent::UpgradeError(Arc::new(Error::probe("socket closed"))));
        }

        if let Some(transport) = self.transport.as_mut() {
            let _ = transport.close();
            transport.discard();
        }

        if !self.write_buffer.is_empty() {
            debug!(count = self.write_buffer.len(), "discarding unsent packets");
            self.write_buffer.clear();
        }

        self.state = SocketState::Closed;
        self.upgrading = false;
        self.close_deferred = false;
        self.candidates.clear();
        self.emit(SocketEvent::Close(reason));
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    fn arm_heartbeat(&mut self) {
        let Some(handshake) = &self.handshake else {
            return;
        };

        let queue = self.queue.clone();
        self.heartbeat
            .arm(handshake.heartbeat_deadline(), move |generation| {
                queue.exec(Task::HeartbeatExpired { generation });
            });
    }

    fn on_heartbeat_expired(&mut self, generation: u64) {
        if !self.heartbeat.is_current(generation) {
            trace!(generation, "stale heartbeat expiry");
            return;
        }

        warn!("no ping from server, closing");
        self.on_close(CloseReason::PingTimeout);
    }

    // ========================================================================
    // Upgrade Probe
    // ========================================================================

    fn start_probe(&mut self) {
        if self.probe.is_some() || self.state != SocketState::Open {
            return;
        }
        let Some(kind) = self.candidates.pop_front() else {
            return;
        };

        debug!(transport = kind.name(), "probing upgrade");
        let mut transport = self.create_transport(kind);
        let id = transport.id();
        let events = transport.open();
        self.probe = Some(Probe::new(transport));
        self.on_probe_events(id, events);
    }

    fn on_probe_events(&mut self, id: TransportId, events: Vec<TransportEvent>) {
        for event in events {
            let Some(probe) = self.probe.as_mut().filter(|p| p.id() == id) else {
                break;
            };

            match event {
                TransportEvent::Open => {
                    debug!(id = %id, "probe transport open, sending probe");
                    if let Err(e) = probe.transport.send(&[Packet::ping_probe()]) {
                        self.fail_probe(Error::probe_caused_by("probe write failed", e));
                        break;
                    }
                    probe.stage = ProbeStage::AwaitingPong;
                    let info = probe.transport.info();
                    self.upgrading = true;
                    self.emit(SocketEvent::Upgrading(info));
                }

                TransportEvent::Packet(packet)
                    if packet.is_probe_pong() && probe.stage == ProbeStage::AwaitingPong =>
                {
                    debug!(id = %id, "probe answered, pausing current transport");
                    probe.stage = ProbeStage::Pausing;
                    let kind = probe.transport.kind();
                    self.options
                        .upgrade_memory
                        .set(kind == TransportKind::WebSocket);
                    self.pause_current();
                }

                TransportEvent::Packet(packet) => {
                    self.fail_probe(Error::probe(format!(
                        "unexpected {} packet",
                        packet.packet_type()
                    )));
                    break;
                }

                TransportEvent::Drain | TransportEvent::Paused => {}

                TransportEvent::Close => {
                    self.fail_probe(Error::probe("probe transport closed"));
                    break;
                }

                TransportEvent::Error(e) => {
                    self.fail_probe(Error::probe_caused_by("probe error", e));
                    break;
                }

                TransportEvent::ResponseHeaders(headers) => {
                    self.emit(SocketEvent::ResponseHeaders {
                        transport: id,
                        headers,
                    });
                }
            }
        }
    }

    fn pause_current(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let id = transport.id();
        let events = transport.pause();
        self.on_transport_events(id, events);
    }

    fn on_paused(&mut self) {
        if self
            .probe
            .as_ref()
            .is_some_and(|p| p.stage == ProbeStage::Pausing)
        {
            self.promote_probe();
        }
    }

    fn promote_probe(&mut self) {
        let Some(probe) = self.probe.take() else {
            return;
        };
        let mut transport = probe.transport;
        let info = transport.info();

        if let Some(mut old) = self.transport.take() {
            debug!(from = %old.id(), to = %info.id, "upgrade complete");
            old.discard();
        }
        self.upgrading = false;
        self.candidates.clear();

        let mut packets = Vec::with_capacity(self.write_buffer.len() + 1);
        packets.push(Packet::empty(PacketType::Upgrade));
        packets.append(&mut self.write_buffer);
        let result = transport.send(&packets);

        self.transport = Some(transport);
        self.emit(SocketEvent::Upgrade(info));

        if let Err(e) = result {
            self.on_error(e);
            return;
        }
        if self.close_deferred {
            debug!("running deferred close");
            self.on_close(CloseReason::ForcedClose);
        }
    }

    fn fail_probe(&mut self, err: Error) {
        let Some(probe) = self.probe.take() else {
            return;
        };

        warn!(id = %probe.id(), error = %err, "upgrade probe failed");
        probe.abandon();
        self.upgrading = false;
        self.emit(SocketEvent::UpgradeError(Arc::new(err)));

        if let Some(transport) = self.transport.as_mut()
            && transport.ready_state() == ReadyState::Paused
        {
            let id = transport.id();
            let events = transport.resume();
            self.on_transport_events(id, events);
        }

        self.flush();
        if self.close_deferred {
            if self.write_buffer.is_empty() {
                debug!("running deferred close");
                self.on_close(CloseReason::ForcedClose);
            }
            return;
        }

        self.start_probe();
    }
}

// ============================================================================
// TaskHandler
// ============================================================================

impl TaskHandler<Task> for SocketWorker {
    fn handle(&mut self, task: Task) -> ControlFlow<()> {
        match task {
            Task::Subscribe(handler) => self.handlers.push(handler),
            Task::Open => self.open(),
            Task::Send(data) => self.send_packet(Packet::message(data)),
            Task::Close => self.close(),
            Task::Shutdown if self.state == SocketState::Idle => {
                debug!("idle socket dropped, stopping worker");
                self.state = SocketState::Closed;
            }
            Task::Shutdown => self.close(),
            Task::Io { transport, io } => self.on_io(transport, io),
            Task::HeartbeatExpired { generation } => self.on_heartbeat_expired(generation),
        }

        self.publish_status();
        if self.state == SocketState::Closed {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn on_dropped(&mut self, task: Task) {
        // A closed polling transport still owes the server a deferred close.
        if let Task::Io { transport, io } = task
            && let Some(current) = self.transport.as_mut().filter(|t| t.id() == transport)
        {
            let _ = current.handle_io(io);
        }
    }
}
