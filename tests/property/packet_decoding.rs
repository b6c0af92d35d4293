//! Property-based tests for the Socket.IO packet codec.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never causes a panic in `packet::decode`.
//! 2. Any identity the client emits is read back unchanged when the server
//!    relays it as a typing event.
//! 3. Any message body survives the outbound -> inbound event path
//!    (timestamps compare at wire precision).

use chatsync_proto::event::{InboundEvent, OutboundEvent};
use chatsync_proto::message::{ChatMessage, Identity};
use chatsync_proto::packet::{self, Packet};
use proptest::prelude::*;

/// Strategy for display names that pass local validation.
fn arb_identity() -> impl Strategy<Value = Identity> {
    "[^\x00]{0,16}[a-zA-Z0-9][^\x00]{0,16}".prop_map(|s| Identity::parse(s).unwrap())
}

proptest! {
    #[test]
    fn decode_never_panics(frame in "\\PC{0,256}") {
        let _ = packet::decode(&frame);
    }

    #[test]
    fn decode_never_panics_on_event_prefix(body in "\\PC{0,256}") {
        let _ = packet::decode(&format!("42{body}"));
    }

    #[test]
    fn typing_identity_survives_relay(id in arb_identity()) {
        let frame = packet::encode_event(&OutboundEvent::Typing(id.clone())).unwrap();
        let decoded = packet::decode(&frame).unwrap();
        prop_assert_eq!(decoded, Packet::Event(InboundEvent::Typing(id)));
    }

    #[test]
    fn message_body_survives_relay(id in arb_identity(), body in "\\PC{1,512}") {
        let msg = ChatMessage::new(id, body);
        let frame = packet::encode_event(&OutboundEvent::Message(msg.clone())).unwrap();
        let Packet::Event(InboundEvent::Message(decoded)) = packet::decode(&frame).unwrap() else {
            return Err(TestCaseError::fail("expected a message event"));
        };
        prop_assert_eq!(decoded.username, msg.username);
        prop_assert_eq!(decoded.message, msg.message);
        prop_assert_eq!(decoded.timestamp.to_iso_string(), msg.timestamp.to_iso_string());
    }
}
