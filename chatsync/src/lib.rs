//! `chatsync`: event-driven synchronization engine for a real-time chat
//! client.
//!
//! The [`engine::SyncEngine`] turns inbound server events and local user
//! actions into a consistent view of the conversation; the
//! [`session::Session`] actor runs it on a tokio runtime.

pub mod channel;
pub mod config;
pub mod engine;
pub mod presence;
pub mod session;
pub mod timeline;
pub mod typing;
