//! Shared protocol definitions for the chatsync wire format.

pub mod event;
pub mod message;
pub mod packet;
