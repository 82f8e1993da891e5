//! WebSocket relaying.
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Relay ←──── WebSocket frames ────→ Remote node
//!              client→remote pump ─────────────▶
//!              ◀───────────── remote→client pump
//! ```
//!
//! # Design Decisions
//! - The remote node is dialed first, with the sanitized original headers
//!   (cookies, auth and requested subprotocols travel with the handshake).
//!   The client upgrade then answers with the subprotocol the remote chose
//! - A failed dial still upgrades the client, which gets a single text frame
//!   with the reason before closing
//! - Frame-level forwarding with no inspection: text, binary, ping, pong and
//!   close frames pass one-for-one with their payload untouched
//! - Each pump reports completion on a capacity-2 channel. The first report
//!   closes both sockets, and the relay returns only after the second, so no
//!   pump or socket outlives the tunnel

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::extract::ws::{self, WebSocket};
use axum::http::{header, HeaderMap, HeaderName};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    protocol::{frame::coding::CloseCode, CloseFrame},
};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::RelayConfig;
use crate::observability::metrics;
use crate::relay::error::RelayError;
use crate::relay::headers::strip_hop_headers;
use crate::relay::tunnel::TunnelTracker;

/// Socket to the remote node.
pub type RemoteSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Headers the outbound handshake generates itself.
const HANDSHAKE_HEADERS: [HeaderName; 4] = [
    header::HOST,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
];

/// Upper bound for flushing a close frame on a half that is going away.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct TunnelSettings {
    connect_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl From<&RelayConfig> for TunnelSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            idle_timeout: config.websocket_idle_timeout(),
        }
    }
}

/// Direction of one pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToRemote,
    RemoteToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToRemote => f.write_str("client->remote"),
            Direction::RemoteToClient => f.write_str("remote->client"),
        }
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reached end-of-stream (or went idle).
    Eof,
    /// Reading the source failed.
    ReadError,
    /// Writing the sink failed.
    WriteError,
    /// The relay closed the tunnel because the other pump finished.
    Closed,
}

/// Completion report sent exactly once by each pump.
#[derive(Debug, Clone, Copy)]
pub struct PumpReport {
    pub direction: Direction,
    pub end: PumpEnd,
    pub frames: u64,
}

/// Relays upgraded WebSocket connections to remote nodes.
#[derive(Debug)]
pub struct WebSocketRelay {
    settings: ArcSwap<TunnelSettings>,
    tunnels: TunnelTracker,
}

impl WebSocketRelay {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            settings: ArcSwap::from_pointee(TunnelSettings::from(config)),
            tunnels: TunnelTracker::new(),
        }
    }

    /// Apply new timeouts to tunnels opened from now on.
    pub fn reconfigure(&self, config: &RelayConfig) {
        self.settings.store(Arc::new(TunnelSettings::from(config)));
    }

    pub fn tunnels(&self) -> &TunnelTracker {
        &self.tunnels
    }

    /// Open the remote side of a tunnel, forwarding `headers` with the
    /// handshake.
    pub async fn dial(&self, target: &str, headers: &HeaderMap) -> Result<DialedRemote, RelayError> {
        let dial_error = |reason: String| RelayError::Dial {
            target: target.to_string(),
            reason,
        };

        let mut request = target.into_client_request().map_err(|e| dial_error(e.to_string()))?;
        for (name, value) in handshake_headers(headers).iter() {
            request.headers_mut().append(name.clone(), value.clone());
        }

        let connect_timeout = self.settings.load().connect_timeout;
        match tokio::time::timeout(connect_timeout, connect_async(request)).await {
            Ok(Ok((socket, response))) => {
                let protocol = response
                    .headers()
                    .get(header::SEC_WEBSOCKET_PROTOCOL)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                tracing::debug!(
                    url = %target,
                    status = %response.status(),
                    protocol = ?protocol,
                    "Remote WebSocket connected"
                );
                Ok(DialedRemote { socket, protocol })
            }
            Ok(Err(e)) => Err(dial_error(e.to_string())),
            Err(_) => Err(dial_error(format!("timed out after {connect_timeout:?}"))),
        }
    }

    /// Report a failed dial to the upgraded client and close it.
    pub async fn reject(&self, mut client: WebSocket, error: RelayError, start: Instant) {
        tracing::warn!(error = %error, "WebSocket relay dial failed");
        metrics::record_relay("websocket", error.outcome(), start);
        let _ = client.send(ws::Message::Text(error.to_string().into())).await;
        let _ = client.close().await;
    }

    /// Relay `client` over `remote` until either side finishes.
    ///
    /// Returns only once both pumps have stopped and both sockets are closed.
    pub async fn tunnel(&self, client: WebSocket, remote: DialedRemote, start: Instant) {
        let guard = self.tunnels.track();
        let tunnel_id = guard.id();
        tracing::info!(tunnel_id = %tunnel_id, protocol = ?remote.protocol, "WebSocket tunnel established");

        let idle_timeout = self.settings.load().idle_timeout;
        let (client_tx, client_rx) = client.split();
        let (remote_tx, remote_rx) = remote.socket.split();
        let (done_tx, mut done_rx) = mpsc::channel(2);
        let (close_tx, close_rx) = watch::channel(false);

        tokio::spawn(pump(
            client_rx,
            remote_tx,
            client_to_remote,
            Direction::ClientToRemote,
            idle_timeout,
            close_rx.clone(),
            done_tx.clone(),
        ));
        tokio::spawn(pump(
            remote_rx,
            client_tx,
            remote_to_client,
            Direction::RemoteToClient,
            idle_timeout,
            close_rx,
            done_tx,
        ));

        let first = done_rx.recv().await;
        let _ = close_tx.send(true);
        let second = done_rx.recv().await;

        tracing::info!(
            tunnel_id = %tunnel_id,
            first = ?first,
            second = ?second,
            elapsed = ?start.elapsed(),
            "WebSocket tunnel closed"
        );
        metrics::record_relay("websocket", "closed", start);
        drop(guard);
    }
}

/// Remote side of a tunnel, dialed before the client handshake is answered.
pub struct DialedRemote {
    socket: RemoteSocket,
    protocol: Option<String>,
}

impl DialedRemote {
    /// Subprotocol the remote selected, echoed to the client.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }
}

/// Original headers minus hop-by-hop and handshake-owned headers.
pub fn handshake_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    strip_hop_headers(&mut headers);
    for name in &HANDSHAKE_HEADERS {
        headers.remove(name);
    }
    headers
}

/// Copy frames from `source` to `sink` until end-of-stream, an error, or
/// the close signal. Always closes `sink` and reports once on `done`.
async fn pump<S, K, A, B, ES, EK>(
    mut source: S,
    mut sink: K,
    convert: fn(A) -> Option<B>,
    direction: Direction,
    idle_timeout: Option<Duration>,
    mut closing: watch::Receiver<bool>,
    done: mpsc::Sender<PumpReport>,
) where
    S: Stream<Item = Result<A, ES>> + Unpin,
    K: Sink<B, Error = EK> + Unpin,
    ES: fmt::Display,
    EK: fmt::Display,
{
    let mut frames = 0u64;

    let end = loop {
        let next = tokio::select! {
            _ = closing.changed() => break PumpEnd::Closed,
            next = next_frame(&mut source, idle_timeout, direction) => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::debug!(direction = %direction, error = %e, "Tunnel read failed");
                break PumpEnd::ReadError;
            }
            None => break PumpEnd::Eof,
        };

        let Some(frame) = convert(frame) else {
            continue;
        };

        let sent = tokio::select! {
            _ = closing.changed() => break PumpEnd::Closed,
            sent = sink.send(frame) => sent,
        };
        if let Err(e) = sent {
            tracing::debug!(direction = %direction, error = %e, "Tunnel write failed");
            break PumpEnd::WriteError;
        }
        frames += 1;
    };

    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::trace!(direction = %direction, error = %e, "Close on finished half"),
        Err(_) => tracing::debug!(direction = %direction, "Close frame flush timed out"),
    }

    let _ = done
        .send(PumpReport {
            direction,
            end,
            frames,
        })
        .await;
}

async fn next_frame<S, T>(source: &mut S, idle_timeout: Option<Duration>, direction: Direction) -> Option<T>
where
    S: Stream<Item = T> + Unpin,
{
    match idle_timeout {
        Some(window) => match tokio::time::timeout(window, source.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::debug!(direction = %direction, idle = ?window, "Tunnel direction idle");
                None
            }
        },
        None => source.next().await,
    }
}

fn client_to_remote(message: ws::Message) -> Option<tungstenite::Message> {
    Some(match message {
        ws::Message::Text(text) => tungstenite::Message::Text(text.as_str().to_owned().into()),
        ws::Message::Binary(data) => tungstenite::Message::Binary(data),
        ws::Message::Ping(data) => tungstenite::Message::Ping(data),
        ws::Message::Pong(data) => tungstenite::Message::Pong(data),
        ws::Message::Close(frame) => tungstenite::Message::Close(frame.map(|f| CloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
    })
}

fn remote_to_client(message: tungstenite::Message) -> Option<ws::Message> {
    Some(match message {
        tungstenite::Message::Text(text) => ws::Message::Text(text.as_str().to_owned().into()),
        tungstenite::Message::Binary(data) => ws::Message::Binary(data),
        tungstenite::Message::Ping(data) => ws::Message::Ping(data),
        tungstenite::Message::Pong(data) => ws::Message::Pong(data),
        tungstenite::Message::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        })),
        // Raw frames never come out of a read.
        tungstenite::Message::Frame(_) => return None,
    })
}
