//! In-process Engine.IO server double shared by the integration tests.
//!
//! [`FakeServer`] implements both [`HttpClient`] and [`WebSocketConnector`],
//! so a socket built with it never touches the network.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use engineio_client::{
    Error, Frame, HandshakeData, Headers, HttpClient, HttpRequest, HttpResponse, Method, Result,
    Socket, SocketBuilder, SocketEvent, UpgradeMemory, WebSocketChannel, WebSocketConnector,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

pub const SID: &str = "fake-sid";
pub const SEPARATOR: char = '\u{1e}';
const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Tracing
// ============================================================================

pub fn init_tracing() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Waiting
// ============================================================================

/// Receives events until one matches `predicate`.
///
/// Panics after five seconds.
pub async fn expect_event<F>(
    events: &mut mpsc::UnboundedReceiver<SocketEvent>,
    predicate: F,
) -> SocketEvent
where
    F: Fn(&SocketEvent) -> bool,
{
    let result = tokio::time::timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;

    match result {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event stream ended"),
        Err(_) => panic!("timed out waiting for event"),
    }
}

/// Drains every event currently queued.
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<SocketEvent>) -> Vec<SocketEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Polls `condition` until it holds. Panics after five seconds.
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    let result = tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}

/// Event names, for order assertions.
pub fn names(events: &[SocketEvent]) -> Vec<&'static str> {
    events.iter().map(SocketEvent::name).collect()
}

// ============================================================================
// FakeServer
// ============================================================================

/// How the websocket side answers `ping "probe"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeBehavior {
    /// Answer `pong "probe"`.
    Answer,
    /// Answer with a pong carrying the wrong payload.
    Reject,
    /// Wait for [`FakeServer::answer_probe`] or [`FakeServer::reject_probe`].
    Manual,
    /// Refuse websocket connections.
    FailConnect,
}

#[derive(Debug)]
pub struct FakeServerConfig {
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    pub probe: ProbeBehavior,
    pub fail_polls: bool,
    /// Sent instead of the generated `open` packet.
    pub raw_handshake: Option<String>,
    /// Delay before a websocket connection is established.
    pub connect_delay: Duration,
}

impl Default for FakeServerConfig {
    fn default() -> Self {
        Self {
            upgrades: vec!["websocket".to_string()],
            ping_interval: 25_000,
            ping_timeout: 20_000,
            probe: ProbeBehavior::Answer,
            fail_polls: false,
            raw_handshake: None,
            connect_delay: Duration::ZERO,
        }
    }
}

/// Scripted Engine.IO server. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeServer {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    handshake: HandshakeData,
    probe: ProbeBehavior,
    fail_polls: bool,
    raw_handshake: Option<String>,
    connect_delay: Duration,
    state: Mutex<ServerState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct ServerState {
    handshake_sent: bool,
    /// Probe answered: pending polls get a noop, as a real server does
    /// while the client upgrades.
    upgrading: bool,
    outbox: VecDeque<String>,
    requests: Vec<HttpRequest>,
    ws_urls: Vec<String>,
    ws_received: Vec<Frame>,
    ws_out: Option<mpsc::UnboundedSender<Result<Frame>>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::configure(|_| {})
    }

    pub fn configure(f: impl FnOnce(&mut FakeServerConfig)) -> Self {
        let mut config = FakeServerConfig::default();
        f(&mut config);
        Self {
            shared: Arc::new(Shared {
                handshake: HandshakeData {
                    sid: SID.to_string(),
                    upgrades: config.upgrades,
                    ping_interval: config.ping_interval,
                    ping_timeout: config.ping_timeout,
                },
                probe: config.probe,
                fail_polls: config.fail_polls,
                raw_handshake: config.raw_handshake,
                connect_delay: config.connect_delay,
                state: Mutex::new(ServerState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Socket builder wired to this server, with a private upgrade memory.
    pub fn builder(&self) -> SocketBuilder {
        Socket::builder()
            .host("fake.test")
            .upgrade_memory(UpgradeMemory::new())
            .http_client(Arc::new(self.clone()))
            .ws_connector(Arc::new(self.clone()))
    }

    pub fn handshake_packet(&self) -> String {
        self.shared.handshake_packet()
    }

    /// Queues an encoded packet for the pending or next poll.
    pub fn push_poll(&self, packet: &str) {
        self.shared.state.lock().outbox.push_back(packet.to_string());
        self.shared.notify.notify_waiters();
    }

    /// Sends a text frame over the open websocket.
    pub fn push_ws(&self, text: &str) {
        if let Some(out) = &self.shared.state.lock().ws_out {
            let _ = out.send(Ok(Frame::Text(text.to_string())));
        }
    }

    /// Answers an outstanding probe with `pong "probe"`.
    pub fn answer_probe(&self) {
        self.shared.reply_probe("3probe");
    }

    /// Answers an outstanding probe with a wrong pong.
    pub fn reject_probe(&self) {
        self.shared.reply_probe("3nope");
    }

    /// Closes the websocket from the server side.
    pub fn drop_ws(&self) {
        self.shared.state.lock().ws_out = None;
    }

    /// Bodies of every POST, in order.
    pub fn posts(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == Method::Post)
            .filter_map(|r| r.body.clone())
            .collect()
    }

    /// Individual packets across every POST body.
    pub fn posted_packets(&self) -> Vec<String> {
        self.posts()
            .iter()
            .flat_map(|body| body.split(SEPARATOR).map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.shared.state.lock().requests.clone()
    }

    pub fn ws_urls(&self) -> Vec<String> {
        self.shared.state.lock().ws_urls.clone()
    }

    /// Text frames the client sent over websocket.
    pub fn ws_texts(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .ws_received
            .iter()
            .filter_map(|f| match f {
                Frame::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Binary frames the client sent over websocket.
    pub fn ws_binaries(&self) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .ws_received
            .iter()
            .filter_map(|f| match f {
                Frame::Binary(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn ws_closed(&self) -> bool {
        self.shared
            .state
            .lock()
            .ws_received
            .iter()
            .any(|f| matches!(f, Frame::Close))
    }
}

impl Shared {
    fn handshake_packet(&self) -> String {
        if let Some(raw) = &self.raw_handshake {
            return raw.clone();
        }
        format!("0{}", serde_json::to_string(&self.handshake).unwrap())
    }

    async fn next_poll(&self) -> String {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if !state.outbox.is_empty() {
                    let packets: Vec<String> = state.outbox.drain(..).collect();
                    return packets.join(&SEPARATOR.to_string());
                }
                if state.upgrading {
                    return "6".to_string();
                }
            }
            notified.await;
        }
    }

    fn on_ws_frame(&self, frame: Frame) {
        let reply = match &frame {
            Frame::Text(text) if text == "2probe" => match self.probe {
                ProbeBehavior::Answer => Some("3probe"),
                ProbeBehavior::Reject => Some("3nope"),
                ProbeBehavior::Manual | ProbeBehavior::FailConnect => None,
            },
            _ => None,
        };

        {
            let mut state = self.state.lock();
            if frame == Frame::Close {
                state.ws_out = None;
            }
            state.ws_received.push(frame);
        }
        if let Some(reply) = reply {
            self.reply_probe(reply);
        }
    }

    fn reply_probe(&self, reply: &str) {
        let mut state = self.state.lock();
        if let Some(out) = &state.ws_out {
            let _ = out.send(Ok(Frame::Text(reply.to_string())));
        }
        if reply == "3probe" {
            state.upgrading = true;
            drop(state);
            self.notify.notify_waiters();
        }
    }
}

#[async_trait]
impl HttpClient for FakeServer {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method;
        let first_get = {
            let mut state = self.shared.state.lock();
            state.requests.push(request);
            let first = method == Method::Get && !state.handshake_sent;
            if first {
                state.handshake_sent = true;
            }
            first
        };

        let (status, body) = match method {
            Method::Post => (200, "ok".to_string()),
            Method::Get if self.shared.fail_polls => (500, "boom".to_string()),
            Method::Get if first_get => (200, self.shared.handshake_packet()),
            Method::Get => (200, self.shared.next_poll().await),
        };

        Ok(HttpResponse {
            status,
            headers: vec![("x-fake".to_string(), method.as_str().to_string())],
            body,
        })
    }
}

#[async_trait]
impl WebSocketConnector for FakeServer {
    async fn connect(&self, url: &str, _headers: &Headers) -> Result<WebSocketChannel> {
        self.shared.state.lock().ws_urls.push(url.to_string());
        if !self.shared.connect_delay.is_zero() {
            tokio::time::sleep(self.shared.connect_delay).await;
        }
        if self.shared.probe == ProbeBehavior::FailConnect {
            return Err(Error::config("connection refused"));
        }

        let (client_tx, mut server_rx) = mpsc::unbounded_channel::<Frame>();
        let (server_tx, client_rx) = mpsc::unbounded_channel::<Result<Frame>>();

        if !url.contains("sid=") {
            let _ = server_tx.send(Ok(Frame::Text(self.shared.handshake_packet())));
        }
        self.shared.state.lock().ws_out = Some(server_tx);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some(frame) = server_rx.recv().await {
                let close = matches!(frame, Frame::Close);
                shared.on_ws_frame(frame);
                if close {
                    break;
                }
            }
        });

        Ok(WebSocketChannel {
            sender: client_tx,
            receiver: client_rx,
            headers: vec![("x-fake".to_string(), "ws".to_string())],
        })
    }
}
