//! Socket.IO client transport
//!
//! Speaks Engine.IO v4 / Socket.IO v5 over a plain WebSocket, which is what a
//! Node `socket.io` 4.x server accepts on
//! `/socket.io/?EIO=4&transport=websocket`.
//!
//! Packets used by the agent:
//!
//! | Text frame        | Meaning                               |
//! |-------------------|---------------------------------------|
//! | `0{...}`          | Engine.IO open (sid, ping timings)    |
//! | `2` / `3`         | server ping / client pong             |
//! | `40` / `40{...}`  | namespace connect / acknowledgement   |
//! | `44{...}`         | namespace connect refused             |
//! | `42["name",data]` | event                                 |
//! | `41` / `1`        | namespace disconnect / transport close|
//!
//! Reconnection lives here: after a lost connection the session task retries
//! with exponential backoff and publishes `Connected` again on success.
//! Anything queued while the link was down is discarded before the new
//! session starts.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{ChannelEvent, ChannelEvents, CollectorChannel};
use crate::{RelayError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Liveness window used when the server does not announce ping timings.
const DEFAULT_LIVENESS: Duration = Duration::from_secs(45);

/// Transport tuning
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Upper bound on WebSocket connect plus Socket.IO handshake
    pub connect_timeout: Duration,
    /// Re-establish lost connections
    pub reconnect: bool,
    /// First delay between reconnection attempts
    pub reconnect_delay: Duration,
    /// Cap for the doubling reconnection delay
    pub reconnect_delay_max: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect: true,
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
        }
    }
}

/// Engine.IO open packet payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Handshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl Handshake {
    /// How long the link may stay silent before it is considered dead.
    fn liveness(&self) -> Duration {
        let window = Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout));
        if window.is_zero() { DEFAULT_LIVENESS } else { window }
    }
}

/// Decoded incoming text frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Incoming {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connected,
    ConnectError(String),
    Disconnect,
    Event(String),
}

/// Decode one Engine.IO text frame (default namespace only).
pub(crate) fn parse_packet(text: &str) -> Result<Incoming> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or_else(|| RelayError::protocol("empty frame"))?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(Incoming::Open)
            .map_err(|e| RelayError::protocol(format!("bad open packet: {e}"))),
        '1' => Ok(Incoming::Close),
        '2' => Ok(Incoming::Ping),
        '3' => Ok(Incoming::Pong),
        '6' => Ok(Incoming::Noop),
        '4' => parse_socket_packet(rest),
        other => Err(RelayError::protocol(format!("unknown engine packet type '{other}'"))),
    }
}

fn parse_socket_packet(packet: &str) -> Result<Incoming> {
    let mut chars = packet.chars();
    let kind = chars.next().ok_or_else(|| RelayError::protocol("empty message packet"))?;
    let data = chars.as_str();

    if data.starts_with('/') {
        return Err(RelayError::protocol(format!("unexpected namespace in '{packet}'")));
    }

    match kind {
        '0' => Ok(Incoming::Connected),
        '1' => Ok(Incoming::Disconnect),
        '2' => Ok(Incoming::Event(data.to_string())),
        '4' => Ok(Incoming::ConnectError(data.to_string())),
        other => Err(RelayError::protocol(format!("unsupported socket packet type '{other}'"))),
    }
}

/// Encode an event as a Socket.IO EVENT packet inside an Engine.IO message.
pub(crate) fn encode_event(event: &str, payload: &serde_json::Value) -> Result<String> {
    let body = serde_json::to_string(&serde_json::json!([event, payload]))?;
    Ok(format!("42{body}"))
}

/// Map a collector URL to its Socket.IO WebSocket endpoint.
pub fn websocket_url(url: &str) -> Result<String> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| RelayError::config(format!("collector URL '{url}' has no scheme")))?;

    match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => {}
        "https" | "wss" => {
            return Err(RelayError::config(format!(
                "collector URL '{url}' needs TLS, which this build does not support"
            )));
        }
        other => {
            return Err(RelayError::config(format!("unsupported collector URL scheme '{other}'")));
        }
    }

    let authority = rest.trim_end_matches('/');
    if authority.is_empty() || authority.contains('?') || authority.contains('#') {
        return Err(RelayError::config(format!("collector URL '{url}' has no usable host")));
    }

    Ok(format!("ws://{authority}/socket.io/?EIO=4&transport=websocket"))
}

async fn next_packet(ws: &mut WsStream) -> Result<Incoming> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return parse_packet(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(RelayError::connection_failed("collector closed the socket"));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Open the WebSocket and complete the Socket.IO handshake.
async fn handshake(url: &str, timeout: Duration) -> Result<(WsStream, Handshake)> {
    let attempt = async {
        let (mut ws, _response) = connect_async(url).await.map_err(|e| {
            RelayError::connection_failed_with_source("WebSocket connect failed", Box::new(e))
        })?;

        let open = loop {
            match next_packet(&mut ws).await? {
                Incoming::Open(open) => break open,
                Incoming::Noop => continue,
                other => {
                    return Err(RelayError::protocol(format!("expected open packet, got {other:?}")));
                }
            }
        };

        ws.send(Message::text("40")).await?;

        loop {
            match next_packet(&mut ws).await? {
                Incoming::Connected => break,
                Incoming::Ping => ws.send(Message::text("3")).await?,
                Incoming::Noop | Incoming::Pong => continue,
                Incoming::ConnectError(detail) => {
                    return Err(RelayError::connection_failed(format!(
                        "collector refused namespace connect: {detail}"
                    )));
                }
                other => {
                    return Err(RelayError::protocol(format!(
                        "expected connect acknowledgement, got {other:?}"
                    )));
                }
            }
        }

        Ok((ws, open))
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_elapsed| RelayError::Timeout { duration: timeout })?
}

/// Drop whatever was queued for a session that no longer exists.
fn discard_stale(outbound: &mut mpsc::UnboundedReceiver<String>) {
    let mut dropped = 0usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "Discarded messages queued while disconnected");
    }
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

struct SessionContext {
    url: String,
    config: TransportConfig,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
}

impl SessionContext {
    fn publish(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            trace!("No listener for channel events");
        }
    }

    /// Owns the socket for its whole life, including reconnections.
    async fn run(
        self,
        mut ws: WsStream,
        mut open: Handshake,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) {
        loop {
            match pump(&mut ws, &mut outbound, open.liveness(), &self.cancel).await {
                SessionEnd::Cancelled => {
                    close_gracefully(&mut ws).await;
                    info!("Disconnected from collector");
                    self.publish(ChannelEvent::Disconnected { reason: "client disconnect".into() });
                    return;
                }
                SessionEnd::Lost(reason) => {
                    warn!(%reason, "Collector connection lost");
                    self.publish(ChannelEvent::Disconnected { reason });
                }
            }

            if !self.config.reconnect {
                debug!("Reconnection disabled, session task ending");
                return;
            }

            match self.reconnect(&mut outbound).await {
                Some((new_ws, new_open)) => {
                    ws = new_ws;
                    open = new_open;
                }
                None => return,
            }
        }
    }

    async fn reconnect(
        &self,
        outbound: &mut mpsc::UnboundedReceiver<String>,
    ) -> Option<(WsStream, Handshake)> {
        let mut delay = self.config.reconnect_delay;
        let mut attempt = 0u32;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt = attempt.saturating_add(1);
            discard_stale(outbound);

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = handshake(&self.url, self.config.connect_timeout) => result,
            };

            match result {
                Ok((ws, open)) => {
                    discard_stale(outbound);
                    info!(attempt, sid = %open.sid, "Reconnected to collector");
                    self.publish(ChannelEvent::Connected);
                    return Some((ws, open));
                }
                Err(e) => {
                    warn!(attempt, error = %e, retry_in = ?delay, "Reconnect attempt failed");
                    self.publish(ChannelEvent::ConnectError { detail: e.to_string() });
                    delay = delay.saturating_mul(2).min(self.config.reconnect_delay_max);
                }
            }
        }
    }
}

/// Move frames both ways until the session ends.
async fn pump(
    ws: &mut WsStream,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    liveness: Duration,
    cancel: &CancellationToken,
) -> SessionEnd {
    let mut deadline = Instant::now() + liveness;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            _ = tokio::time::sleep_until(deadline) => {
                return SessionEnd::Lost("ping timeout".into());
            }
            Some(packet) = outbound.recv() => {
                trace!(%packet, "Sending packet");
                if let Err(e) = ws.send(Message::text(packet)).await {
                    return SessionEnd::Lost(e.to_string());
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => match parse_packet(text.as_str()) {
                    Ok(Incoming::Ping) => {
                        deadline = Instant::now() + liveness;
                        if let Err(e) = ws.send(Message::text("3")).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                    Ok(Incoming::Disconnect) => return SessionEnd::Lost("server disconnect".into()),
                    Ok(Incoming::Close) => return SessionEnd::Lost("transport close".into()),
                    Ok(Incoming::Event(data)) => debug!(%data, "Ignoring collector event"),
                    Ok(other) => trace!(?other, "Collector packet"),
                    Err(e) => warn!(error = %e, "Unparseable collector packet"),
                },
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost("socket closed".into()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
            },
        }
    }
}

async fn close_gracefully(ws: &mut WsStream) {
    if let Err(e) = ws.send(Message::text("41")).await {
        debug!(error = %e, "Could not send namespace disconnect");
    }
    if let Err(e) = ws.close(None).await {
        debug!(error = %e, "WebSocket close failed");
    }
}

#[derive(Default)]
struct Slot {
    /// Held here until `connect` hands it to the session task
    outbound: Option<mpsc::UnboundedReceiver<String>>,
    task: Option<JoinHandle<()>>,
}

/// Socket.IO client implementing [`CollectorChannel`]
///
/// One instance serves one connection lifetime: after `disconnect()` a new
/// channel has to be created.
pub struct SocketIoChannel {
    config: TransportConfig,
    events: mpsc::UnboundedSender<ChannelEvent>,
    outbound: mpsc::UnboundedSender<String>,
    slot: Mutex<Slot>,
    cancel: CancellationToken,
}

impl SocketIoChannel {
    /// Create the channel and the receiver for its lifecycle events.
    pub fn new(config: TransportConfig) -> (Self, ChannelEvents) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let channel = Self {
            config,
            events,
            outbound,
            slot: Mutex::new(Slot { outbound: Some(outbound_rx), task: None }),
            cancel: CancellationToken::new(),
        };
        (channel, events_rx)
    }
}

#[async_trait::async_trait]
impl CollectorChannel for SocketIoChannel {
    async fn connect(&self, url: &str) -> Result<()> {
        let ws_url = websocket_url(url)?;
        let mut slot = self.slot.lock().await;
        let Some(mut outbound) = slot.outbound.take() else {
            return Err(RelayError::connection_failed("channel was already connected"));
        };

        debug!(url = %ws_url, "Opening collector WebSocket");
        match handshake(&ws_url, self.config.connect_timeout).await {
            Ok((ws, open)) => {
                discard_stale(&mut outbound);
                info!(sid = %open.sid, "Connected to collector");

                let context = SessionContext {
                    url: ws_url,
                    config: self.config.clone(),
                    events: self.events.clone(),
                    cancel: self.cancel.clone(),
                };
                context.publish(ChannelEvent::Connected);
                slot.task = Some(tokio::spawn(context.run(ws, open, outbound)));
                Ok(())
            }
            Err(e) => {
                slot.outbound = Some(outbound);
                if self.events.send(ChannelEvent::ConnectError { detail: e.to_string() }).is_err() {
                    trace!("No listener for channel events");
                }
                Err(e)
            }
        }
    }

    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        let packet = encode_event(event, &payload)?;
        self.outbound
            .send(packet)
            .map_err(|_closed| RelayError::transport("collector session task has stopped"))
    }

    async fn disconnect(&self) -> Result<()> {
        self.cancel.cancel();
        let task = self.slot.lock().await.task.take();
        if let Some(task) = task {
            task.await.map_err(|e| RelayError::Transport {
                reason: "collector session task failed".to_string(),
                source: Some(Box::new(e)),
            })?;
        }
        Ok(())
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const OPEN: &str =
        r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    fn fast_config(reconnect: bool) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(5),
            reconnect,
            reconnect_delay: Duration::from_millis(20),
            reconnect_delay_max: Duration::from_millis(100),
        }
    }

    async fn read_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await.expect("client hung up").expect("read failed") {
                Message::Text(text) => return text.as_str().to_string(),
                _ => continue,
            }
        }
    }

    /// Accept one client and run the server side of the handshake.
    async fn accept_client(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::text(OPEN)).await.unwrap();
        assert_eq!(read_text(&mut ws).await, "40");
        ws.send(Message::text(r#"40{"sid":"sio-1"}"#)).await.unwrap();
        ws
    }

    #[test]
    fn parses_engine_and_socket_packets() {
        match parse_packet(OPEN).unwrap() {
            Incoming::Open(open) => {
                assert_eq!(open.sid, "eio-1");
                assert_eq!(open.liveness(), Duration::from_secs(45));
            }
            other => panic!("expected open, got {other:?}"),
        }
        assert_eq!(parse_packet("2").unwrap(), Incoming::Ping);
        assert_eq!(parse_packet("3").unwrap(), Incoming::Pong);
        assert_eq!(parse_packet("1").unwrap(), Incoming::Close);
        assert_eq!(parse_packet(r#"40{"sid":"x"}"#).unwrap(), Incoming::Connected);
        assert_eq!(parse_packet("41").unwrap(), Incoming::Disconnect);
        assert_eq!(
            parse_packet(r#"42["agents-update",[]]"#).unwrap(),
            Incoming::Event(r#"["agents-update",[]]"#.to_string())
        );
        assert_eq!(
            parse_packet(r#"44{"message":"nope"}"#).unwrap(),
            Incoming::ConnectError(r#"{"message":"nope"}"#.to_string())
        );

        assert!(parse_packet("").is_err());
        assert!(parse_packet("9").is_err());
        assert!(parse_packet("0not-json").is_err());
        assert!(parse_packet("40/admin,").is_err());
    }

    #[test]
    fn encodes_events_as_socketio_arrays() {
        let packet = encode_event("telemetry-data", &json!({ "lapNumber": 2 })).unwrap();
        assert!(packet.starts_with("42"));
        let body: serde_json::Value = serde_json::from_str(&packet[2..]).unwrap();
        assert_eq!(body, json!(["telemetry-data", { "lapNumber": 2 }]));
    }

    #[test]
    fn maps_collector_urls_to_socketio_endpoint() {
        assert_eq!(
            websocket_url("http://localhost:3000").unwrap(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("ws://10.0.0.5:3000/").unwrap(),
            "ws://10.0.0.5:3000/socket.io/?EIO=4&transport=websocket"
        );
        assert!(matches!(websocket_url("localhost:3000"), Err(RelayError::Config { .. })));
        assert!(matches!(websocket_url("https://collector"), Err(RelayError::Config { .. })));
        assert!(matches!(websocket_url("ftp://collector"), Err(RelayError::Config { .. })));
        assert!(matches!(websocket_url("http://"), Err(RelayError::Config { .. })));
    }

    #[tokio::test]
    async fn handshake_emit_and_server_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let mut ws = accept_client(&listener).await;
            let event = read_text(&mut ws).await;
            ws.send(Message::text("41")).await.unwrap();
            event
        });

        let (channel, mut events) = SocketIoChannel::new(fast_config(false));
        channel.connect(&format!("http://127.0.0.1:{port}")).await.expect("handshake");
        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));

        channel.emit("telemetry-data", json!({ "lapNumber": 1, "lapTime": 90.123 })).unwrap();

        let received = server.await.unwrap();
        let body: serde_json::Value = serde_json::from_str(&received[2..]).unwrap();
        assert_eq!(body, json!(["telemetry-data", { "lapNumber": 1, "lapTime": 90.123 }]));

        match events.recv().await {
            Some(ChannelEvent::Disconnected { reason }) => assert_eq!(reason, "server disconnect"),
            other => panic!("expected disconnect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn answers_server_pings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let mut ws = accept_client(&listener).await;
            ws.send(Message::text("2")).await.unwrap();
            read_text(&mut ws).await
        });

        let (channel, _events) = SocketIoChannel::new(fast_config(false));
        channel.connect(&format!("ws://127.0.0.1:{port}")).await.unwrap();

        assert_eq!(server.await.unwrap(), "3");
        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (channel, mut events) = SocketIoChannel::new(fast_config(false));
        let result = channel.connect(&format!("http://127.0.0.1:{port}")).await;

        assert!(matches!(result, Err(RelayError::Connection { .. })));
        assert!(matches!(events.recv().await, Some(ChannelEvent::ConnectError { .. })));
    }

    #[tokio::test]
    async fn namespace_refusal_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::text(OPEN)).await.unwrap();
            read_text(&mut ws).await;
            ws.send(Message::text(r#"44{"message":"Not authorized"}"#)).await.unwrap();
            // keep the socket open until the client gives up
            let _ = ws.next().await;
        });

        let (channel, _events) = SocketIoChannel::new(fast_config(false));
        let err = channel.connect(&format!("http://127.0.0.1:{port}")).await.unwrap_err();
        assert!(err.to_string().contains("Not authorized"));
    }

    #[tokio::test]
    async fn reconnects_after_server_drop_and_discards_stale_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let mut first = accept_client(&listener).await;
            first.send(Message::text("41")).await.unwrap();
            drop(first);

            let mut second = accept_client(&listener).await;
            read_text(&mut second).await
        });

        let (channel, mut events) = SocketIoChannel::new(fast_config(true));
        channel.connect(&format!("http://127.0.0.1:{port}")).await.unwrap();
        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));
        assert!(matches!(events.recv().await, Some(ChannelEvent::Disconnected { .. })));

        channel.emit("telemetry-data", json!({ "lapNumber": 7 })).unwrap();

        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));
        channel.emit("register-agent", json!({ "driverName": "Alex" })).unwrap();

        let first_after_reconnect = server.await.unwrap();
        assert!(first_after_reconnect.contains("register-agent"));

        channel.disconnect().await.unwrap();
        assert!(matches!(events.recv().await, Some(ChannelEvent::Disconnected { .. })));
    }
}
