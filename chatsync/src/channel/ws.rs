//! Socket.IO-over-WebSocket channel.
//!
//! Speaks Engine.IO v4 directly over a WebSocket (no HTTP long-polling
//! phase): waits for the server's open packet, joins the default namespace,
//! then hands the socket to two background tasks. The writer drains the
//! outbound queue; the reader answers pings and forwards decoded events in
//! arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use chatsync_proto::event::OutboundEvent;
use chatsync_proto::packet::{self, Handshake, Packet};

use super::{ChannelConfig, ChannelError, ChannelKind, ConnectionChannel, InboundReceiver};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Write half of the WebSocket connection.
type WsSender = futures_util::stream::SplitSink<WsStream, Message>;

/// Read half of the WebSocket connection.
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Used when the server announces no ping schedule.
const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(45);

/// WebSocket channel implementing [`ConnectionChannel`].
///
/// Created via [`WsChannel::connect`]. Dropping the channel closes the
/// socket.
pub struct WsChannel {
    /// Endpoint actually dialled.
    endpoint: Url,
    /// Engine.IO session id from the open packet.
    sid: String,
    /// Encoded frames waiting for the writer task.
    outbound: mpsc::UnboundedSender<String>,
    /// Cleared by either background task when the socket goes away.
    connected: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl WsChannel {
    /// Connect to a Socket.IO server and join its default namespace.
    ///
    /// `server_url` may be the server's base URL (`http://localhost:3001`)
    /// or a full `ws://` endpoint. The whole sequence is bounded by
    /// `config.connect_timeout`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Handshake`] for an unusable URL, a rejected
    ///   namespace connect, or an unexpected first packet.
    /// - [`ChannelError::Timeout`] if connecting or the handshake is too slow.
    /// - [`ChannelError::Io`] if the WebSocket connection itself fails.
    pub async fn connect(
        server_url: &str,
        config: &ChannelConfig,
    ) -> Result<(Self, InboundReceiver), ChannelError> {
        let endpoint = endpoint_url(server_url)?;

        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(endpoint.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %endpoint, "WebSocket connect timed out");
                    ChannelError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %endpoint, error = %e, "WebSocket connect failed");
                    ChannelError::Io(e.to_string())
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let handshake = tokio::time::timeout(
            config.connect_timeout,
            handshake(&mut ws_sender, &mut ws_reader),
        )
        .await
        .map_err(|_| {
            tracing::warn!(url = %endpoint, "Socket.IO handshake timed out");
            ChannelError::Timeout
        })??;

        tracing::info!(url = %endpoint, sid = %handshake.sid, "connected to chat server");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(true));

        let liveness = if handshake.ping_interval == 0 {
            DEFAULT_LIVENESS_WINDOW
        } else {
            handshake.liveness_window()
        };

        let writer_handle = tokio::spawn(writer_loop(ws_sender, out_rx, Arc::clone(&connected)));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            in_tx,
            out_tx.clone(),
            Arc::clone(&connected),
            liveness,
        ));

        let channel = Self {
            endpoint,
            sid: handshake.sid,
            outbound: out_tx,
            connected,
            reader_handle,
            _writer_handle: writer_handle,
        };
        Ok((channel, in_rx))
    }

    /// The WebSocket endpoint this channel dialled.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The Engine.IO session id assigned by the server.
    #[must_use]
    pub fn sid(&self) -> &str {
        &self.sid
    }
}

impl ConnectionChannel for WsChannel {
    fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(ChannelError::Disconnected);
        }
        let frame = packet::encode_event(&event)?;
        self.outbound
            .send(frame)
            .map_err(|_| ChannelError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::WebSocket
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        // The writer exits on its own once `outbound` is dropped and sends
        // the close frame; the reader would otherwise wait for the server.
        self.reader_handle.abort();
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Derive the Engine.IO WebSocket endpoint from a server URL.
///
/// `http`/`https` map to `ws`/`wss`. A bare host gets the standard
/// `/socket.io/` path; the Engine.IO query is always set.
///
/// # Errors
///
/// Returns [`ChannelError::Handshake`] if the URL does not parse or uses an
/// unsupported scheme.
pub fn endpoint_url(server_url: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(server_url)
        .map_err(|e| ChannelError::Handshake(format!("invalid server URL {server_url:?}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChannelError::Handshake(format!(
                "unsupported URL scheme {other:?}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::Handshake(format!("cannot use scheme {scheme:?}")))?;

    if url.path() == "/" || url.path().is_empty() {
        url.set_path("/socket.io/");
    }
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Wait for the open packet, join the default namespace, wait for the ack.
async fn handshake(
    ws_sender: &mut WsSender,
    ws_reader: &mut WsReader,
) -> Result<Handshake, ChannelError> {
    let mut opened: Option<Handshake> = None;

    loop {
        let frame = match ws_reader.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Disconnected),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ChannelError::Io(e.to_string())),
        };

        match packet::decode(frame.as_str())? {
            Packet::Open(hs) if opened.is_none() => {
                tracing::debug!(sid = %hs.sid, "engine.io session opened");
                send_text(ws_sender, packet::CONNECT).await?;
                opened = Some(hs);
            }
            Packet::Ping => send_text(ws_sender, packet::PONG).await?,
            Packet::Connect => {
                return opened.ok_or_else(|| {
                    ChannelError::Handshake("namespace ack before open packet".into())
                });
            }
            Packet::ConnectError(reason) => {
                tracing::warn!(reason = %reason, "server refused namespace connect");
                return Err(ChannelError::Handshake(reason));
            }
            Packet::Close | Packet::Disconnect => return Err(ChannelError::Disconnected),
            other => {
                tracing::debug!(?other, "ignoring packet during handshake");
            }
        }
    }
}

async fn send_text(ws_sender: &mut WsSender, frame: &str) -> Result<(), ChannelError> {
    ws_sender
        .send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|e| ChannelError::Io(e.to_string()))
}

/// Background task that writes queued frames to the socket.
///
/// Exits when every sender is gone or the socket refuses a write, then
/// closes the connection.
async fn writer_loop(
    mut ws_sender: WsSender,
    mut outbound: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
            tracing::warn!(error = %e, "WebSocket write failed");
            break;
        }
    }
    connected.store(false, Ordering::Relaxed);
    let _ = ws_sender.send(Message::Close(None)).await;
    tracing::debug!("writer task exiting");
}

/// Background task that reads frames and dispatches them.
///
/// Pings are answered through the writer queue. Decoded events go to
/// `inbound` in arrival order; malformed frames are logged and skipped.
/// Silence longer than `liveness` counts as a dead connection.
async fn reader_loop(
    mut ws_reader: WsReader,
    inbound: mpsc::Sender<chatsync_proto::event::InboundEvent>,
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    liveness: Duration,
) {
    loop {
        let next = match tokio::time::timeout(liveness, ws_reader.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::warn!(?liveness, "no traffic from server, treating as disconnected");
                break;
            }
        };

        let frame = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!("WebSocket closed by server");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "WebSocket read error");
                break;
            }
        };

        match packet::decode(frame.as_str()) {
            Ok(Packet::Event(event)) => {
                tracing::trace!(event = %event.name(), "inbound event");
                if inbound.send(event).await.is_err() {
                    // Receiver dropped: nobody is listening any more.
                    break;
                }
            }
            Ok(Packet::Ping) => {
                if outbound.send(packet::PONG.to_string()).is_err() {
                    break;
                }
            }
            Ok(Packet::Close | Packet::Disconnect) => {
                tracing::info!("server ended the session");
                break;
            }
            Ok(Packet::UnknownEvent(name)) => {
                tracing::debug!(event = %name, "ignoring unknown event");
            }
            Ok(Packet::ConnectError(reason)) => {
                tracing::warn!(reason = %reason, "server reported a connect error");
            }
            Ok(other) => {
                tracing::trace!(?other, "ignoring control packet");
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame, skipping");
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("reader task exiting");
}
