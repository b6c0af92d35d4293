//! Integration tests for the Socket.IO WebSocket channel.
//!
//! A stub server built on `tokio_tungstenite::accept_async` plays the chat
//! server side of the Engine.IO/Socket.IO handshake and then exchanges raw
//! frames with the client.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use chatsync::channel::ws::WsChannel;
use chatsync::channel::{ChannelConfig, ChannelError, ConnectionChannel, InboundReceiver};

use chatsync_proto::event::{InboundEvent, OutboundEvent};
use chatsync_proto::message::{ChatMessage, Identity, Timestamp};

type ServerWs = WebSocketStream<TcpStream>;

const OPEN: &str =
    r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Accept one client, send the open packet, and expect the namespace connect.
async fn accept_and_open(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    send(&mut ws, OPEN).await;
    assert_eq!(next_text(&mut ws).await, "40");
    ws
}

/// Run the full handshake and return both ends.
async fn connected() -> (WsChannel, InboundReceiver, ServerWs) {
    let (listener, url) = listen().await;
    let client =
        tokio::spawn(async move { WsChannel::connect(&url, &ChannelConfig::default()).await });

    let mut ws = accept_and_open(&listener).await;
    send(&mut ws, r#"40{"sid":"ns-1"}"#).await;

    let (channel, inbound) = client.await.unwrap().unwrap();
    (channel, inbound, ws)
}

async fn send(ws: &mut ServerWs, frame: &str) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn next_text(ws: &mut ServerWs) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
            Some(Ok(_)) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn recv(inbound: &mut InboundReceiver) -> Option<InboundEvent> {
    tokio::time::timeout(Duration::from_secs(5), inbound.recv())
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_records_session_id() {
    let (channel, _inbound, _ws) = connected().await;

    assert_eq!(channel.sid(), "eio-1");
    assert!(channel.is_connected());
    assert_eq!(channel.endpoint().path(), "/socket.io/");
    assert_eq!(
        channel.endpoint().query(),
        Some("EIO=4&transport=websocket")
    );
}

#[tokio::test]
async fn refused_namespace_connect_is_a_handshake_error() {
    let (listener, url) = listen().await;
    let client =
        tokio::spawn(async move { WsChannel::connect(&url, &ChannelConfig::default()).await });

    let mut ws = accept_and_open(&listener).await;
    send(&mut ws, r#"44{"message":"not authorized"}"#).await;

    match client.await.unwrap() {
        Err(ChannelError::Handshake(reason)) => assert_eq!(reason, "not authorized"),
        Err(e) => panic!("expected handshake error, got {e:?}"),
        Ok(_) => panic!("expected handshake error, got a channel"),
    }
}

#[tokio::test]
async fn silent_server_times_out() {
    let (listener, url) = listen().await;
    let config = ChannelConfig {
        connect_timeout: Duration::from_millis(200),
        ..ChannelConfig::default()
    };
    let client = tokio::spawn(async move { WsChannel::connect(&url, &config).await });

    // Upgrade the socket but never send the open packet.
    let (stream, _) = listener.accept().await.unwrap();
    let _ws = accept_async(stream).await.unwrap();

    assert!(matches!(
        client.await.unwrap(),
        Err(ChannelError::Timeout)
    ));
}

// ---------------------------------------------------------------------------
// Event exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outbound_events_are_socket_io_frames() {
    let (channel, _inbound, mut ws) = connected().await;
    let ann = Identity::parse("Ann").unwrap();

    channel
        .emit(OutboundEvent::SetUsername(ann.clone()))
        .unwrap();
    assert_eq!(next_text(&mut ws).await, r#"42["setUsername","Ann"]"#);

    channel.emit(OutboundEvent::Typing(ann.clone())).unwrap();
    assert_eq!(next_text(&mut ws).await, r#"42["typing","Ann"]"#);

    channel.emit(OutboundEvent::StopTyping(ann)).unwrap();
    assert_eq!(next_text(&mut ws).await, r#"42["stopTyping","Ann"]"#);
}

#[tokio::test]
async fn outbound_message_carries_iso_timestamp() {
    let (channel, _inbound, mut ws) = connected().await;
    let message = ChatMessage::new(Identity::parse("Ann").unwrap(), "hello");
    let expected_ts = message.timestamp.to_iso_string();

    channel.emit(OutboundEvent::Message(message)).unwrap();

    let frame = next_text(&mut ws).await;
    let args: Value = serde_json::from_str(frame.strip_prefix("42").unwrap()).unwrap();
    assert_eq!(args[0], "message");
    assert_eq!(args[1]["username"], "Ann");
    assert_eq!(args[1]["message"], "hello");
    assert_eq!(args[1]["timestamp"], expected_ts.as_str());
    assert!(expected_ts.ends_with('Z'));
}

#[tokio::test]
async fn inbound_frames_arrive_in_order() {
    let (_channel, mut inbound, mut ws) = connected().await;

    send(&mut ws, r#"42["onlineUsers",["Ann","Bob"]]"#).await;
    send(&mut ws, r#"42["typing","Bob"]"#).await;
    send(
        &mut ws,
        r#"42["message",{"username":"Bob","message":"hi","timestamp":"2024-05-01T12:00:00.000Z"}]"#,
    )
    .await;
    send(&mut ws, r#"42["stopTyping","Bob"]"#).await;

    assert_eq!(
        recv(&mut inbound).await,
        Some(InboundEvent::OnlineUsers(vec![
            Identity::from_wire("Ann"),
            Identity::from_wire("Bob")
        ]))
    );
    assert_eq!(
        recv(&mut inbound).await,
        Some(InboundEvent::Typing(Identity::from_wire("Bob")))
    );
    let Some(InboundEvent::Message(msg)) = recv(&mut inbound).await else {
        panic!("expected a message event");
    };
    assert_eq!(msg.username, "Bob");
    assert_eq!(msg.message, "hi");
    assert_eq!(msg.timestamp.to_iso_string(), "2024-05-01T12:00:00.000Z");
    assert_eq!(
        recv(&mut inbound).await,
        Some(InboundEvent::StopTyping(Identity::from_wire("Bob")))
    );
}

#[tokio::test]
async fn unknown_and_malformed_frames_are_skipped() {
    let (_channel, mut inbound, mut ws) = connected().await;

    send(&mut ws, r#"42["roomList",{"rooms":[]}]"#).await;
    send(&mut ws, "42not json").await;
    send(&mut ws, r#"42["typing",42]"#).await;
    send(&mut ws, "9").await;
    send(&mut ws, r#"42["typing","Carol"]"#).await;

    assert_eq!(
        recv(&mut inbound).await,
        Some(InboundEvent::Typing(Identity::from_wire("Carol")))
    );
}

#[tokio::test]
async fn zero_inbound_capacity_still_delivers() {
    let (listener, url) = listen().await;
    let config = ChannelConfig {
        inbound_capacity: 0,
        ..ChannelConfig::default()
    };
    let client = tokio::spawn(async move { WsChannel::connect(&url, &config).await });

    let mut ws = accept_and_open(&listener).await;
    send(&mut ws, r#"40{"sid":"ns-1"}"#).await;
    let (_channel, mut inbound) = client.await.unwrap().unwrap();

    send(&mut ws, r#"42["typing","Bob"]"#).await;
    assert_eq!(
        recv(&mut inbound).await,
        Some(InboundEvent::Typing(Identity::from_wire("Bob")))
    );
}

#[tokio::test]
async fn server_ping_gets_pong() {
    let (_channel, _inbound, mut ws) = connected().await;

    send(&mut ws, "2").await;
    assert_eq!(next_text(&mut ws).await, "3");
}

// ---------------------------------------------------------------------------
// Disconnects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_close_ends_inbound_and_fails_emits() {
    let (channel, mut inbound, mut ws) = connected().await;

    ws.close(None).await.unwrap();

    assert_eq!(recv(&mut inbound).await, None);
    assert!(!channel.is_connected());
    assert!(matches!(
        channel.emit(OutboundEvent::Typing(Identity::from_wire("Ann"))),
        Err(ChannelError::Disconnected)
    ));
}

#[tokio::test]
async fn engine_io_close_packet_ends_session() {
    let (channel, mut inbound, mut ws) = connected().await;

    send(&mut ws, "1").await;

    assert_eq!(recv(&mut inbound).await, None);
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn stamped_message_survives_the_round_trip() {
    let (channel, mut inbound, mut ws) = connected().await;
    let message = ChatMessage {
        username: Identity::parse("Ann").unwrap(),
        message: "echo me".to_string(),
        timestamp: "2024-05-01T08:30:15.250Z".parse::<chrono::DateTime<chrono::Utc>>()
            .map(Timestamp::from_datetime)
            .unwrap(),
    };

    channel.emit(OutboundEvent::Message(message.clone())).unwrap();

    // Rebroadcast exactly what the client sent, as the chat server does.
    let frame = next_text(&mut ws).await;
    send(&mut ws, &frame).await;

    assert_eq!(recv(&mut inbound).await, Some(InboundEvent::Message(message)));
}
