//! WebSocket transport.
//!
//! One persistent connection. Every packet travels in its own frame, so no
//! payload framing is involved and binary payloads go out as binary frames.
//!
//! The channel has no drain signal of its own. After a batch has been
//! handed to the connection, [`TransportIo::Drained`] is deferred through
//! the sink, so the drain is observed on the next tick of the owner's worker.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::client::{Frame, WebSocketChannel};
use crate::error::{Error, Result};
use crate::protocol::{Encoded, Packet, PacketType, decode_packet, decode_packet_binary, encode_packet};

use super::uri::{SchemeFamily, build_uri};
use super::{Driver, ReadyState, TransportCore, TransportEvent, TransportIo};

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket transport.
#[derive(Debug)]
pub struct WebSocketTransport {
    core: TransportCore,
    sender: Option<mpsc::UnboundedSender<Frame>>,
}

impl WebSocketTransport {
    pub(crate) fn new(core: TransportCore) -> Self {
        Self { core, sender: None }
    }

    fn on_frame(&mut self, frame: Result<Frame>, events: &mut Vec<TransportEvent>) {
        if self.core.is_closed() {
            trace!(id = %self.core.id, "dropping frame on closed transport");
            return;
        }

        let packet = match frame {
            Ok(Frame::Text(text)) => decode_packet(&text),
            Ok(Frame::Binary(data)) => decode_packet_binary(&data),
            Ok(Frame::Close) => {
                debug!(id = %self.core.id, "websocket closed by server");
                self.sender = None;
                self.core.on_close(events);
                return;
            }
            Err(e) => {
                warn!(id = %self.core.id, error = %e, "websocket error");
                events.push(TransportEvent::Error(Error::transport("websocket error", e)));
                return;
            }
        };

        if packet.packet_type() == PacketType::Close {
            self.sender = None;
            self.core.on_close(events);
            return;
        }
        events.push(TransportEvent::Packet(packet));
    }
}

impl Driver for WebSocketTransport {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TransportCore {
        &mut self.core
    }

    fn do_open(&mut self, _events: &mut Vec<TransportEvent>) {
        let url = build_uri(SchemeFamily::Ws, &self.core.options);
        let headers = self.core.options.extra_headers.clone();
        let connector = self.core.options.ws_connector.clone();
        let sink = self.core.sink.clone();
        debug!(id = %self.core.id, url = %url, "connecting websocket");

        tokio::spawn(async move {
            let channel = match connector.connect(&url, &headers).await {
                Ok(channel) => channel,
                Err(e) => {
                    let _ = sink.post(TransportIo::WsConnectFailed(e));
                    return;
                }
            };

            let WebSocketChannel {
                sender,
                mut receiver,
                headers,
            } = channel;
            if sink.post(TransportIo::WsConnected { sender, headers }).is_err() {
                return;
            }

            while let Some(frame) = receiver.recv().await {
                if sink.post(TransportIo::WsFrame(frame)).is_err() {
                    return;
                }
            }
            let _ = sink.post(TransportIo::WsFrame(Ok(Frame::Close)));
        });
    }

    fn do_close(&mut self, _events: &mut Vec<TransportEvent>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Frame::Close);
        }
    }

    fn write(&mut self, packets: &[Packet]) -> Result<()> {
        let frames = packets
            .iter()
            .map(|packet| {
                encode_packet(packet, true).map(|encoded| match encoded {
                    Encoded::Text(text) => Frame::Text(text),
                    Encoded::Binary(data) => Frame::Binary(data),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        trace!(id = %self.core.id, count = frames.len(), "writing frames");
        self.core.writable = false;

        if let Some(sender) = &self.sender {
            for frame in frames {
                if sender.send(frame).is_err() {
                    debug!(id = %self.core.id, "websocket closed before write completed");
                    break;
                }
            }
        }

        let _ = self.core.sink.defer(TransportIo::Drained);
        Ok(())
    }

    fn pause(&mut self, events: &mut Vec<TransportEvent>) {
        events.push(TransportEvent::Paused);
    }

    fn resume(&mut self, _events: &mut Vec<TransportEvent>) {}

    fn handle_io(&mut self, io: TransportIo, events: &mut Vec<TransportEvent>) {
        match io {
            TransportIo::WsConnected { sender, headers } => {
                if self.core.ready_state != ReadyState::Opening {
                    debug!(id = %self.core.id, "connected after close, dropping connection");
                    let _ = sender.send(Frame::Close);
                    return;
                }
                self.sender = Some(sender);
                events.push(TransportEvent::ResponseHeaders(headers));
                self.core.on_open(events);
            }

            TransportIo::WsConnectFailed(e) => {
                if self.core.is_closed() {
                    return;
                }
                warn!(id = %self.core.id, error = %e, "websocket connect failed");
                events.push(TransportEvent::Error(Error::transport("websocket error", e)));
            }

            TransportIo::WsFrame(frame) => self.on_frame(frame, events),

            TransportIo::Drained => {
                if self.core.is_closed() {
                    return;
                }
                self.core.writable = true;
                events.push(TransportEvent::Drain);
            }

            other => trace!(?other, "ignoring polling I/O on websocket transport"),
        }
    }

    fn discard(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Frame::Close);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
