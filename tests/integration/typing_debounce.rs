//! Integration tests for local typing signals under a paused tokio clock.
//!
//! The engine reads `tokio::time::Instant::now()`, so advancing the paused
//! clock drives the debounce deadline deterministically.

use std::time::Duration;

use chatsync::channel::loopback::{LoopbackChannel, LoopbackServer};
use chatsync::engine::{EngineConfig, SyncEngine};
use chatsync::typing::TypingState;

use chatsync_proto::event::{EventName, OutboundEvent};
use chatsync_proto::message::Identity;

use tokio::time::{Instant, advance};

const DEBOUNCE: Duration = Duration::from_millis(1000);

fn joined_engine(debounce: Duration) -> (SyncEngine<LoopbackChannel>, LoopbackServer) {
    let (channel, _inbound, server) = LoopbackChannel::create_pair(16);
    let mut engine = SyncEngine::new(
        channel,
        EngineConfig {
            typing_debounce: debounce,
        },
    );
    engine.attach();
    engine.join("Ann").unwrap();
    server.take_outbound();
    (engine, server)
}

fn count(events: &[OutboundEvent], name: EventName) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

#[tokio::test(start_paused = true)]
async fn burst_of_input_emits_one_typing() {
    let (mut engine, server) = joined_engine(DEBOUNCE);

    for text in ["h", "he", "hel", "hell", "hello"] {
        engine.on_local_input(text);
        advance(Duration::from_millis(100)).await;
        assert!(!engine.poll_typing_timer());
    }

    let outbound = server.take_outbound();
    assert_eq!(outbound, [OutboundEvent::Typing(Identity::from_wire("Ann"))]);
    assert_eq!(engine.typing_state(), TypingState::Active);
}

#[tokio::test(start_paused = true)]
async fn quiet_period_emits_exactly_one_stop() {
    let (mut engine, server) = joined_engine(DEBOUNCE);
    engine.on_local_input("hi");

    advance(DEBOUNCE).await;
    assert!(engine.poll_typing_timer());
    assert!(!engine.poll_typing_timer());

    advance(DEBOUNCE * 3).await;
    assert!(!engine.poll_typing_timer());

    let outbound = server.take_outbound();
    assert_eq!(count(&outbound, EventName::Typing), 1);
    assert_eq!(count(&outbound, EventName::StopTyping), 1);
    assert_eq!(engine.typing_state(), TypingState::Idle);
    assert!(engine.typing_deadline().is_none());
}

#[tokio::test(start_paused = true)]
async fn each_keystroke_pushes_the_deadline_back() {
    let (mut engine, server) = joined_engine(DEBOUNCE);
    let start = Instant::now();

    engine.on_local_input("a");
    assert_eq!(engine.typing_deadline(), Some(start + DEBOUNCE));

    advance(Duration::from_millis(600)).await;
    engine.on_local_input("ab");
    assert_eq!(
        engine.typing_deadline(),
        Some(start + Duration::from_millis(1600))
    );

    // The first deadline would have fired here; it was replaced.
    advance(Duration::from_millis(400)).await;
    assert!(!engine.poll_typing_timer());

    advance(Duration::from_millis(600)).await;
    assert!(engine.poll_typing_timer());
    assert_eq!(count(&server.take_outbound(), EventName::StopTyping), 1);
}

#[tokio::test(start_paused = true)]
async fn send_while_typing_stops_immediately() {
    let (mut engine, server) = joined_engine(DEBOUNCE);
    engine.on_local_input("quick");
    advance(Duration::from_millis(200)).await;

    engine.send_message("quick");
    assert_eq!(engine.typing_state(), TypingState::Idle);
    assert!(engine.typing_deadline().is_none());

    // The cancelled deadline never fires a second stop.
    advance(DEBOUNCE * 2).await;
    assert!(!engine.poll_typing_timer());

    let outbound = server.take_outbound();
    let names: Vec<EventName> = outbound.iter().map(OutboundEvent::name).collect();
    assert_eq!(
        names,
        [EventName::Typing, EventName::Message, EventName::StopTyping]
    );
}

#[tokio::test(start_paused = true)]
async fn typing_restarts_after_going_idle() {
    let (mut engine, server) = joined_engine(DEBOUNCE);

    engine.on_local_input("one");
    advance(DEBOUNCE).await;
    engine.poll_typing_timer();
    engine.on_local_input("two");

    let names: Vec<EventName> = server
        .take_outbound()
        .iter()
        .map(OutboundEvent::name)
        .collect();
    assert_eq!(
        names,
        [EventName::Typing, EventName::StopTyping, EventName::Typing]
    );
}

#[tokio::test(start_paused = true)]
async fn configured_debounce_is_honoured() {
    let short = Duration::from_millis(250);
    let (mut engine, _server) = joined_engine(short);
    engine.on_local_input("x");

    advance(Duration::from_millis(249)).await;
    assert!(!engine.poll_typing_timer());
    advance(Duration::from_millis(1)).await;
    assert!(engine.poll_typing_timer());
}

#[tokio::test(start_paused = true)]
async fn detach_while_typing_sends_final_stop() {
    let (mut engine, server) = joined_engine(DEBOUNCE);
    engine.on_local_input("bye");
    engine.detach();

    assert!(engine.typing_deadline().is_none());
    let outbound = server.take_outbound();
    assert_eq!(
        outbound.last(),
        Some(&OutboundEvent::StopTyping(Identity::from_wire("Ann")))
    );

    // Detaching again has nothing left to cancel.
    engine.detach();
    assert!(server.outbound().is_empty());
}

#[tokio::test(start_paused = true)]
async fn input_before_join_only_updates_compose() {
    let (channel, _inbound, server) = LoopbackChannel::create_pair(16);
    let mut engine = SyncEngine::new(channel, EngineConfig::default());
    engine.attach();

    engine.on_local_input("draft");
    assert_eq!(engine.compose(), "draft");
    assert!(engine.typing_deadline().is_none());
    assert!(server.outbound().is_empty());
}
