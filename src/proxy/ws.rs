//! WebSocket bridge to the gateway's control port
//!
//! Each session runs two pumps, client→gateway and gateway→client, as
//! separate tasks. The first pump to finish decides how the other end is
//! closed; the session is unregistered only after both have returned.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::error::Error as StdError;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::{self, Message as UpstreamMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::http::AUTH_HEADER;
use super::ProxyBridge;
use crate::error::{Error, Result};

/// Session closed after the idle window
pub const CLOSE_IDLE: u16 = 4008;
/// Frame over the size limit
pub const CLOSE_POLICY: u16 = 1008;
/// Gateway unreachable or the bridge failed
pub const CLOSE_PROXY_ERROR: u16 = 1011;
/// Gateway is not running
pub const CLOSE_NOT_RUNNING: u16 = 1013;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames up to this multiple of the limit are read so they can be refused
/// with a proper close code
const TRANSPORT_HEADROOM: usize = 16;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Instruction to a running pump
#[derive(Debug, Clone, Copy)]
enum Stop {
    /// Return without writing anything
    Quiet,
    /// Close the pump's outbound side with this code
    Close(u16, &'static str),
}

#[derive(Debug)]
enum PumpEnd {
    /// Inbound side closed; the close was passed on
    Closed,
    TooLarge(usize),
    Failed(String),
    Stopped,
}

/// Which pump finished first
enum First {
    Inbound(PumpEnd),
    Outbound(PumpEnd),
    Idle,
}

/// Last forwarded frame, shared by both pumps
struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Resolves once nothing was forwarded for `idle`
    async fn expired(&self, idle: Duration) {
        loop {
            let last = self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
            let deadline = last + idle;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

impl ProxyBridge {
    /// Accept a client upgrade and bridge it to the gateway
    pub fn serve_websocket(self: &Arc<Self>, ws: WebSocketUpgrade) -> Response {
        let limit = self
            .config
            .max_message_bytes
            .saturating_mul(TRANSPORT_HEADROOM);
        let bridge = Arc::clone(self);
        ws.max_message_size(limit)
            .max_frame_size(limit)
            .on_upgrade(move |socket| async move { bridge.run_session(socket).await })
    }

    /// Bridge an already upgraded client socket
    pub async fn run_session(&self, client: WebSocket) {
        let token = match self.running_token() {
            Ok(token) => token,
            Err(e) => {
                debug!("Refusing WebSocket session: {}", e);
                close_socket(client, CLOSE_NOT_RUNNING, "gateway not running").await;
                return;
            }
        };

        let upstream = match self.dial_upstream(&token).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!("Gateway WebSocket unavailable: {}", e);
                close_socket(client, CLOSE_PROXY_ERROR, "gateway unavailable").await;
                return;
            }
        };

        let guard = self.register();
        info!(session = %guard.id, "WebSocket session opened");
        match self.bridge(client, upstream).await {
            Ok(()) => info!(session = %guard.id, "WebSocket session closed"),
            Err(e) => info!(
                session = %guard.id,
                code = e.code(),
                "WebSocket session closed: {}",
                e
            ),
        }
    }

    async fn dial_upstream(&self, token: &str) -> Result<UpstreamSocket> {
        let url = format!(
            "ws://{}:{}/",
            Ipv4Addr::LOCALHOST,
            self.controller.settings().control_port
        );
        let mut request = url.into_client_request()?;
        let token = HeaderValue::from_str(token)
            .map_err(|e| Error::Internal(format!("gateway token is not a header value: {}", e)))?;
        request
            .headers_mut()
            .insert(HeaderName::from_static(AUTH_HEADER), token);

        let (socket, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| Error::UpstreamUnavailable("WebSocket connect timed out".to_string()))?
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
        Ok(socket)
    }

    /// Pump both directions until one side ends or a limit fires
    async fn bridge(&self, client: WebSocket, upstream: UpstreamSocket) -> Result<()> {
        let (client_tx, client_rx) = client.split();
        let (upstream_tx, upstream_rx) = upstream.split();

        let upstream_tx = upstream_tx
            .with(|msg: Message| future::ready(Ok::<_, tungstenite::Error>(to_upstream(msg))));
        let upstream_rx = upstream_rx.filter_map(|item| {
            future::ready(match item {
                Ok(msg) => from_upstream(msg).map(Ok),
                Err(e) => Some(Err(e)),
            })
        });

        let max = self.config.max_message_bytes;
        let activity = Arc::new(Activity::new());
        let (stop_tx, stop_rx) = watch::channel(None::<Stop>);

        let mut inbound = tokio::spawn(pump(
            client_rx,
            upstream_tx,
            stop_rx.clone(),
            activity.clone(),
            max,
        ));
        let mut outbound = tokio::spawn(pump(
            upstream_rx,
            client_tx,
            stop_rx,
            activity.clone(),
            max,
        ));

        let first = tokio::select! {
            end = &mut inbound => First::Inbound(joined(end)),
            end = &mut outbound => First::Outbound(joined(end)),
            _ = activity.expired(self.config.idle_timeout) => First::Idle,
        };

        let (stop, end) = match first {
            First::Idle => (
                Stop::Close(CLOSE_IDLE, "idle timeout"),
                Err(Error::IdleTimeout(self.config.idle_timeout)),
            ),
            First::Inbound(end) | First::Outbound(end) => match end {
                PumpEnd::TooLarge(size) => (
                    Stop::Close(CLOSE_POLICY, "message too large"),
                    Err(Error::MessageTooLarge(size)),
                ),
                PumpEnd::Failed(reason) => (
                    Stop::Close(CLOSE_PROXY_ERROR, "proxy error"),
                    Err(Error::WebSocket(reason)),
                ),
                PumpEnd::Closed | PumpEnd::Stopped => (Stop::Quiet, Ok(())),
            },
        };

        stop_tx.send_replace(Some(stop));
        for handle in [inbound, outbound] {
            if !handle.is_finished() {
                drain(handle).await;
            }
        }
        end
    }
}

/// Forward frames from `rx` to `tx` until either side ends or a stop
/// arrives
async fn pump<R, W, RE, WE>(
    mut rx: R,
    mut tx: W,
    mut stop: watch::Receiver<Option<Stop>>,
    activity: Arc<Activity>,
    max: usize,
) -> PumpEnd
where
    R: Stream<Item = std::result::Result<Message, RE>> + Unpin,
    W: Sink<Message, Error = WE> + Unpin,
    RE: StdError + 'static,
    WE: std::fmt::Display,
{
    loop {
        let next = tokio::select! {
            changed = stop.changed() => {
                let instruction = match changed {
                    Ok(()) => (*stop.borrow_and_update()).unwrap_or(Stop::Quiet),
                    Err(_) => Stop::Quiet,
                };
                if let Stop::Close(code, reason) = instruction {
                    let _ = tx.send(close_message(code, reason)).await;
                }
                return PumpEnd::Stopped;
            }
            next = rx.next() => next,
        };

        let msg = match next {
            None => return PumpEnd::Closed,
            Some(Err(e)) => {
                // The transport refuses frames past its own cap before we see them
                if let Some(size) = oversized_frame(&e) {
                    let _ = tx
                        .send(close_message(CLOSE_POLICY, "message too large"))
                        .await;
                    return PumpEnd::TooLarge(size);
                }
                let _ = tx.send(close_message(CLOSE_PROXY_ERROR, "proxy error")).await;
                return PumpEnd::Failed(e.to_string());
            }
            Some(Ok(msg)) => msg,
        };

        match msg {
            Message::Close(frame) => {
                let _ = tx.send(Message::Close(frame)).await;
                return PumpEnd::Closed;
            }
            // Control frames are answered per hop
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Text(_) | Message::Binary(_) => {
                let size = payload_len(&msg);
                if size > max {
                    let _ = tx
                        .send(close_message(CLOSE_POLICY, "message too large"))
                        .await;
                    return PumpEnd::TooLarge(size);
                }
                activity.touch();
                if let Err(e) = tx.send(msg).await {
                    return PumpEnd::Failed(e.to_string());
                }
            }
        }
    }
}

/// Size of a frame the transport refused to read, if that is what `err` is
fn oversized_frame(err: &(dyn StdError + 'static)) -> Option<usize> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, .. })) =
            e.downcast_ref::<tungstenite::Error>()
        {
            return Some(*size);
        }
        if let Some(CapacityError::MessageTooLong { size, .. }) = e.downcast_ref::<CapacityError>()
        {
            return Some(*size);
        }
        current = e.source();
    }

    // axum may link a different tungstenite release than ours
    let text = err.to_string();
    let (_, rest) = text.split_once("Message too long: ")?;
    rest.split_whitespace().next()?.parse().ok()
}

fn joined(result: std::result::Result<PumpEnd, JoinError>) -> PumpEnd {
    result.unwrap_or_else(|e| PumpEnd::Failed(format!("pump task failed: {}", e)))
}

async fn drain(mut handle: JoinHandle<PumpEnd>) {
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
        handle.abort();
        let _ = handle.await;
    }
}

/// Send a close frame on a socket that will not be bridged
pub async fn close_socket(mut client: WebSocket, code: u16, reason: &'static str) {
    let _ = client.send(close_message(code, reason)).await;
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

fn payload_len(msg: &Message) -> usize {
    match msg {
        Message::Text(text) => text.as_str().len(),
        Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data.len(),
        Message::Close(_) => 0,
    }
}

fn to_upstream(msg: Message) -> UpstreamMessage {
    match msg {
        Message::Text(text) => UpstreamMessage::Text(text.as_str().to_string().into()),
        Message::Binary(data) => UpstreamMessage::Binary(data),
        Message::Ping(data) => UpstreamMessage::Ping(data),
        Message::Pong(data) => UpstreamMessage::Pong(data),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_string().into(),
        })),
    }
}

fn from_upstream(msg: UpstreamMessage) -> Option<Message> {
    Some(match msg {
        UpstreamMessage::Text(text) => Message::Text(text.as_str().to_string().into()),
        UpstreamMessage::Binary(data) => Message::Binary(data),
        UpstreamMessage::Ping(data) => Message::Ping(data),
        UpstreamMessage::Pong(data) => Message::Pong(data),
        UpstreamMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_string().into(),
        })),
        UpstreamMessage::Frame(_) => return None,
    })
}
