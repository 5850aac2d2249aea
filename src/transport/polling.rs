//! HTTP long-polling transport.
//!
//! Reads are a loop of GET requests, each answered with a payload once the
//! server has something to say. Writes are one POST per `send`, carrying
//! the whole batch as a payload.
//!
//! # Flags
//!
//! | Flag | Meaning |
//! |------|---------|
//! | `polling` | a GET is outstanding |
//! | `writable` | no POST is outstanding |
//!
//! `pause()` completes once both are quiet, so nothing straggles after an
//! upgrade swaps this transport out.
//!
//! # Close During Handshake
//!
//! Closing while the handshake poll is outstanding cannot send `close` yet:
//! the session id is unknown. The close is recorded in a flag shared with
//! the poll task, and the `close` packet is posted once the handshake
//! response arrives, whether it reaches the transport or its owner has
//! already gone.
//!
//! Closing while a POST is outstanding waits for it the same way, so the
//! server never sees two concurrent writes.

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace, warn};

use crate::client::{HttpRequest, HttpResponse, Method};
use crate::error::{Error, Result};
use crate::protocol::{HandshakeData, Packet, PacketType, decode_payload, encode_payload};

use super::uri::{SchemeFamily, build_uri};
use super::{Driver, ReadyState, TransportCore, TransportEvent, TransportIo, TransportOptions};

// ============================================================================
// Constants
// ============================================================================

const CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

// ============================================================================
// Types
// ============================================================================

/// What a pending `pause()` still waits for.
#[derive(Debug, Clone, Copy)]
struct PauseWait {
    poll: bool,
    drain: bool,
}

// ============================================================================
// PollingTransport
// ============================================================================

/// Long-polling transport.
#[derive(Debug)]
pub struct PollingTransport {
    core: TransportCore,
    polling: bool,
    pause: Option<PauseWait>,
    close_on_open: Arc<AtomicBool>,
    close_on_drain: Arc<AtomicBool>,
}

impl PollingTransport {
    pub(crate) fn new(core: TransportCore) -> Self {
        Self {
            core,
            polling: false,
            pause: None,
            close_on_open: Arc::new(AtomicBool::new(false)),
            close_on_drain: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `true` while a poll request is outstanding.
    #[inline]
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    // ========================================================================
    // Requests
    // ========================================================================

    fn poll(&mut self) {
        trace!(id = %self.core.id, "polling");
        self.polling = true;

        let request = build_request(&self.core.options, Method::Get, None);
        let client = self.core.options.http_client.clone();
        let sink = self.core.sink.clone();
        let deferred = (self.core.ready_state == ReadyState::Opening)
            .then(|| (self.close_on_open.clone(), self.core.options.clone()));

        tokio::spawn(async move {
            let result = client.execute(request).await;
            if let Err(TransportIo::PollResponse(Ok(response))) =
                sink.post(TransportIo::PollResponse(result))
                && let Some((close_on_open, options)) = deferred
                && close_on_open.swap(false, Ordering::AcqRel)
            {
                send_deferred_close(options, &response.body);
            }
        });
    }

    fn post(&mut self, packets: &[Packet]) -> Result<()> {
        let body = encode_payload(packets)?;
        trace!(id = %self.core.id, count = packets.len(), "posting payload");
        self.core.writable = false;

        let request = build_request(&self.core.options, Method::Post, Some(body));
        let client = self.core.options.http_client.clone();
        let sink = self.core.sink.clone();
        let close_on_drain = self.close_on_drain.clone();
        let options = self.core.options.clone();
        tokio::spawn(async move {
            let result = client.execute(request).await;
            let drained = matches!(&result, Ok(response) if response.is_success());
            if sink.post(TransportIo::PostResponse(result)).is_err()
                && drained
                && close_on_drain.swap(false, Ordering::AcqRel)
            {
                send_close(options);
            }
        });
        Ok(())
    }

    // ========================================================================
    // Responses
    // ========================================================================

    fn on_poll_response(
        &mut self,
        result: Result<HttpResponse>,
        events: &mut Vec<TransportEvent>,
    ) {
        if self.core.is_closed() {
            self.polling = false;
            if let Ok(response) = result
                && self.close_on_open.swap(false, Ordering::AcqRel)
            {
                send_deferred_close(self.core.options.clone(), &response.body);
            }
            return;
        }

        let response = match result {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                self.on_poll_failed(Error::http_status(response.status), events);
                return;
            }
            Err(e) => {
                self.on_poll_failed(e, events);
                return;
            }
        };

        events.push(TransportEvent::ResponseHeaders(response.headers));
        self.on_data(&response.body, events);
    }

    fn on_poll_failed(&mut self, cause: Error, events: &mut Vec<TransportEvent>) {
        warn!(id = %self.core.id, error = %cause, "poll failed");
        self.polling = false;
        events.push(TransportEvent::Error(Error::transport("xhr poll error", cause)));
        self.on_poll_complete(events);
    }

    fn on_data(&mut self, body: &str, events: &mut Vec<TransportEvent>) {
        trace!(id = %self.core.id, len = body.len(), "poll data");

        decode_payload(body, |packet, _, _| {
            if self.core.ready_state == ReadyState::Opening
                && packet.packet_type() == PacketType::Open
            {
                // The next poll goes out before the owner sees the handshake.
                if let Some(handshake) =
                    packet.text().and_then(|text| HandshakeData::parse(text).ok())
                {
                    self.core.options.query.insert("sid".to_string(), handshake.sid);
                }
                self.core.on_open(events);
            }

            if packet.packet_type() == PacketType::Close {
                self.core.on_close(events);
                return ControlFlow::Break(());
            }

            events.push(TransportEvent::Packet(packet));
            ControlFlow::Continue(())
        });

        if self.core.is_closed() {
            self.polling = false;
            return;
        }

        self.polling = false;
        self.on_poll_complete(events);

        if self.core.ready_state == ReadyState::Open {
            self.poll();
        } else {
            trace!(id = %self.core.id, state = self.core.ready_state.as_str(), "not polling");
        }
    }

    fn on_post_response(
        &mut self,
        result: Result<HttpResponse>,
        events: &mut Vec<TransportEvent>,
    ) {
        if self.core.is_closed() {
            if matches!(&result, Ok(response) if response.is_success())
                && self.close_on_drain.swap(false, Ordering::AcqRel)
            {
                send_close(self.core.options.clone());
            }
            return;
        }

        match result {
            Ok(response) if response.is_success() => {
                self.core.writable = true;
                events.push(TransportEvent::Drain);
                if let Some(wait) = self.pause.as_mut() {
                    wait.drain = false;
                }
                self.maybe_paused(events);
            }
            Ok(response) => {
                events.push(TransportEvent::Error(Error::transport(
                    "xhr post error",
                    Error::http_status(response.status),
                )));
            }
            Err(e) => {
                events.push(TransportEvent::Error(Error::transport("xhr post error", e)));
            }
        }
    }

    // ========================================================================
    // Pause
    // ========================================================================

    fn on_poll_complete(&mut self, events: &mut Vec<TransportEvent>) {
        if let Some(wait) = self.pause.as_mut() {
            wait.poll = false;
        }
        self.maybe_paused(events);
    }

    fn maybe_paused(&mut self, events: &mut Vec<TransportEvent>) {
        if let Some(wait) = self.pause
            && !wait.poll
            && !wait.drain
        {
            debug!(id = %self.core.id, "paused");
            self.pause = None;
            events.push(TransportEvent::Paused);
        }
    }
}

impl Driver for PollingTransport {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TransportCore {
        &mut self.core
    }

    fn do_open(&mut self, _events: &mut Vec<TransportEvent>) {
        self.close_on_open = Arc::new(AtomicBool::new(false));
        self.poll();
    }

    fn do_close(&mut self, _events: &mut Vec<TransportEvent>) {
        if self.core.ready_state == ReadyState::Open && !self.core.writable {
            debug!(id = %self.core.id, "write outstanding, closing after drain");
            self.close_on_drain.store(true, Ordering::Release);
        } else if self.core.ready_state == ReadyState::Open {
            debug!(id = %self.core.id, "writing close packet");
            if let Err(e) = self.post(&[Packet::empty(PacketType::Close)]) {
                warn!(error = %e, "close packet failed");
            }
        } else {
            debug!(id = %self.core.id, "transport not open, deferring close");
            self.close_on_open.store(true, Ordering::Release);
        }
        self.pause = None;
    }

    fn write(&mut self, packets: &[Packet]) -> Result<()> {
        self.post(packets)
    }

    fn pause(&mut self, events: &mut Vec<TransportEvent>) {
        let wait = PauseWait {
            poll: self.polling,
            drain: !self.core.writable,
        };
        if wait.poll {
            trace!(id = %self.core.id, "waiting for poll to complete before pause");
        }
        if wait.drain {
            trace!(id = %self.core.id, "waiting for drain before pause");
        }

        self.pause = Some(wait);
        self.maybe_paused(events);
    }

    fn resume(&mut self, _events: &mut Vec<TransportEvent>) {
        self.pause = None;
        if !self.polling {
            self.poll();
        }
    }

    fn handle_io(&mut self, io: TransportIo, events: &mut Vec<TransportEvent>) {
        match io {
            TransportIo::PollResponse(result) => self.on_poll_response(result, events),
            TransportIo::PostResponse(result) => self.on_post_response(result, events),
            other => trace!(?other, "ignoring websocket I/O on polling transport"),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

fn build_request(options: &TransportOptions, method: Method, body: Option<String>) -> HttpRequest {
    let mut headers = options.extra_headers.clone();
    headers.push(("Accept".to_string(), "*/*".to_string()));
    if method == Method::Post {
        headers.push(("Content-Type".to_string(), CONTENT_TYPE.to_string()));
    }

    HttpRequest {
        method,
        url: build_uri(SchemeFamily::Http, options),
        headers,
        body,
    }
}

/// Posts `close` for the session opened by the handshake in `body`.
fn send_deferred_close(mut options: TransportOptions, body: &str) {
    let mut sid = None;
    decode_payload(body, |packet, _, _| {
        if packet.packet_type() == PacketType::Open {
            sid = packet
                .text()
                .and_then(|text| HandshakeData::parse(text).ok())
                .map(|handshake| handshake.sid);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    });

    let Some(sid) = sid else {
        debug!("no handshake in response, nothing to close");
        return;
    };

    debug!(sid = %sid, "sending deferred close");
    options.query.insert("sid".to_string(), sid);
    send_close(options);
}

/// Posts a lone `close` packet.
fn send_close(options: TransportOptions) {
    let request = build_request(&options, Method::Post, Some("1".to_string()));
    let client = options.http_client;
    tokio::spawn(async move {
        if let Err(e) = client.execute(request).await {
            warn!(error = %e, "close packet failed");
        }
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::client::header_values;
    use crate::transport::test_support::{PreparedConnector, ScriptedHttp, options_with};
    use crate::transport::{IoSink, Transport, TransportKind};

    const HANDSHAKE: &str =
        r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;

    fn polling(http: &Arc<ScriptedHttp>) -> (Transport, mpsc::UnboundedReceiver<TransportIo>) {
        let (sink, rx) = IoSink::channel();
        let options = options_with(http.clone(), Arc::new(PreparedConnector::default()));
        (Transport::new(TransportKind::Polling, options, sink), rx)
    }

    async fn next_events(
        transport: &mut Transport,
        rx: &mut mpsc::UnboundedReceiver<TransportIo>,
    ) -> Vec<TransportEvent> {
        let io = rx.recv().await.unwrap();
        transport.handle_io(io)
    }

    #[tokio::test]
    async fn test_open_on_handshake() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, mut rx) = polling(&http);

        assert!(transport.open().is_empty());
        assert_eq!(transport.ready_state(), ReadyState::Opening);

        let events = next_events(&mut transport, &mut rx).await;
        assert!(matches!(events[0], TransportEvent::ResponseHeaders(_)));
        assert!(matches!(events[1], TransportEvent::Open));
        assert!(
            matches!(&events[2], TransportEvent::Packet(p) if p.packet_type() == PacketType::Open)
        );
        assert_eq!(transport.ready_state(), ReadyState::Open);
        assert!(transport.writable());

        let request = http.requests.lock()[0].clone();
        assert_eq!(request.method, Method::Get);
        assert!(request.url.starts_with("http://localhost/engine.io/?"));
        assert!(request.url.contains("transport=polling"));
        assert_eq!(header_values(&request.headers, "accept"), vec!["*/*"]);
    }

    #[tokio::test]
    async fn test_poll_after_handshake_carries_sid() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, mut rx) = polling(&http);
        transport.open();
        next_events(&mut transport, &mut rx).await;

        for _ in 0..100 {
            if http.requests.lock().len() >= 2 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let requests = http.requests.lock().clone();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].url.contains("sid="));
        assert!(requests[1].url.contains("sid=abc"));
        assert_eq!(transport.query().get("sid").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn test_close_packet_stops_batch() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, &format!("{HANDSHAKE}\u{1e}4a\u{1e}1\u{1e}4b"));
        let (mut transport, mut rx) = polling(&http);
        transport.open();

        let events = next_events(&mut transport, &mut rx).await;
        let messages: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Packet(p) if p.packet_type() == PacketType::Message => p.text(),
                _ => None,
            })
            .collect();
        assert_eq!(messages, vec!["a"]);
        assert!(matches!(events.last(), Some(TransportEvent::Close)));
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_send_posts_payload_and_drains() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, mut rx) = polling(&http);
        transport.open();
        next_events(&mut transport, &mut rx).await;

        transport
            .send(&[Packet::message("a"), Packet::message(vec![1u8, 2])])
            .unwrap();
        assert!(!transport.writable());

        let events = next_events(&mut transport, &mut rx).await;
        assert!(matches!(events[..], [TransportEvent::Drain]));
        assert!(transport.writable());
        assert_eq!(http.posts(), vec!["4a\u{1e}bAQI="]);

        let post = http
            .requests
            .lock()
            .iter()
            .find(|r| r.method == Method::Post)
            .cloned()
            .unwrap();
        assert_eq!(
            header_values(&post.headers, "content-type"),
            vec![CONTENT_TYPE]
        );
    }

    #[tokio::test]
    async fn test_deferred_close_after_owner_gone() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, rx) = polling(&http);
        transport.open();
        transport.close();
        drop(rx);

        for _ in 0..50 {
            if !http.posts().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(http.posts(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_pause_waits_for_poll() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, mut rx) = polling(&http);
        transport.open();
        next_events(&mut transport, &mut rx).await;

        // Second poll is outstanding.
        assert!(transport.pause().is_empty());
        assert_eq!(transport.ready_state(), ReadyState::Paused);

        // The server answers the outstanding poll with a noop.
        let io = TransportIo::PollResponse(Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: "6".into(),
        }));
        let events = transport.handle_io(io);
        assert!(matches!(events.last(), Some(TransportEvent::Paused)));
    }

    #[tokio::test]
    async fn test_poll_error_is_wrapped() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(500, "");
        let (mut transport, mut rx) = polling(&http);
        transport.open();

        let events = next_events(&mut transport, &mut rx).await;
        match &events[..] {
            [TransportEvent::Error(e)] => {
                assert!(e.is_transport_error());
                assert!(e.to_string().starts_with("xhr poll error"));
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(transport.ready_state(), ReadyState::Opening);
    }

    #[tokio::test]
    async fn test_close_while_open_posts_close_packet() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, mut rx) = polling(&http);
        transport.open();
        next_events(&mut transport, &mut rx).await;

        let events = transport.close();
        assert!(matches!(events[..], [TransportEvent::Close]));

        // Drain the POST completion; it is ignored once closed.
        assert!(next_events(&mut transport, &mut rx).await.is_empty());
        assert_eq!(http.posts(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_close_waits_for_outstanding_post() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, mut rx) = polling(&http);
        transport.open();
        next_events(&mut transport, &mut rx).await;

        transport.send(&[Packet::message("last")]).unwrap();
        transport.close();
        drop(rx);

        for _ in 0..50 {
            if http.posts().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(http.posts(), vec!["4last", "1"]);
    }

    #[tokio::test]
    async fn test_close_while_opening_is_deferred() {
        let http = Arc::new(ScriptedHttp::default());
        http.push_get(200, HANDSHAKE);
        let (mut transport, mut rx) = polling(&http);
        transport.open();

        let events = transport.close();
        assert!(matches!(events[..], [TransportEvent::Close]));
        assert!(http.posts().is_empty());

        // Handshake response arrives after close.
        assert!(next_events(&mut transport, &mut rx).await.is_empty());
        for _ in 0..50 {
            if !http.posts().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(http.posts(), vec!["1"]);
        let post_url = http
            .requests
            .lock()
            .iter()
            .find(|r| r.method == Method::Post)
            .map(|r| r.url.clone())
            .unwrap();
        assert!(post_url.contains("sid=abc"));
    }
}
