//! [`tokio_tungstenite`]-backed implementation of [`WebSocketConnector`].
//!
//! # Pump Task
//!
//! Each connection spawns a tokio task that bridges the socket to the
//! [`WebSocketChannel`] pair:
//!
//! - Incoming text/binary frames are forwarded to `receiver`
//! - Outgoing frames from `sender` are written in order
//! - A remote close, a stream error, or a dropped `sender` ends the task

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::{Frame, Headers, WebSocketChannel, WebSocketConnector};

// ============================================================================
// Types
// ============================================================================

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// TungsteniteConnector
// ============================================================================

/// WebSocket connector using `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// Creates a connector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WebSocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str, headers: &Headers) -> Result<WebSocketChannel> {
        let mut request = url.into_client_request()?;
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::config(format!("invalid header name {name:?}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::config(format!("invalid header value for {name}: {e}")))?;
            request.headers_mut().append(header_name, header_value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!(url, status = response.status().as_u16(), "WebSocket connected");

        let response_headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_pump(stream, out_rx, in_tx));

        Ok(WebSocketChannel {
            sender: out_tx,
            receiver: in_rx,
            headers: response_headers,
        })
    }
}

// ============================================================================
// Pump
// ============================================================================

async fn run_pump(
    stream: Stream,
    mut outgoing: mpsc::UnboundedReceiver<Frame>,
    incoming: mpsc::UnboundedSender<Result<Frame>>,
) {
    let (mut ws_write, mut ws_read) = stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if incoming.send(Ok(Frame::Text(text.as_str().to_owned()))).is_err() {
                            break;
                        }
                    }

                    Some(Ok(Message::Binary(data))) => {
                        if incoming.send(Ok(Frame::Binary(data.to_vec()))).is_err() {
                            break;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        let _ = incoming.send(Ok(Frame::Close));
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        let _ = incoming.send(Err(Error::WebSocket(e)));
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        let _ = incoming.send(Ok(Frame::Close));
                        break;
                    }

                    // Ping/Pong control frames are answered by tungstenite
                    _ => {}
                }
            }

            frame = outgoing.recv() => {
                let message = match frame {
                    Some(Frame::Text(text)) => Message::Text(text.into()),
                    Some(Frame::Binary(data)) => Message::Binary(data.into()),
                    Some(Frame::Close) | None => {
                        trace!("closing WebSocket");
                        let _ = ws_write.close().await;
                        break;
                    }
                };

                if let Err(e) = ws_write.send(message).await {
                    warn!(error = %e, "WebSocket write failed");
                    let _ = incoming.send(Err(Error::WebSocket(e)));
                    break;
                }
            }
        }
    }

    debug!("WebSocket pump terminated");
}
