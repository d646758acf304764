//! # confab-protocol
//!
//! Wire-level event vocabulary for the Confab chat engine.
//!
//! This crate defines the JSON events exchanged between clients and the
//! server: the inbound [`ClientEvent`] union, the outbound [`ServerEvent`]
//! union, shared wire structs, and stable error codes.
//!
//! ## Event flow
//!
//! - `hello` - identity handshake, first frame on every connection
//! - `send_private` / `send_group` - message routing
//! - `create_group` / `join_room` / `leave_room` - room membership
//! - `typing` / `stop_typing` - ephemeral typing relay
//! - `update_status` / `search_messages` - profile and history
//!
//! ## Example
//!
//! ```rust
//! use confab_protocol::{codec, ClientEvent};
//!
//! let event = codec::decode_client(
//!     r#"{"type": "send_private", "to": "bob", "message": "hi"}"#,
//! ).unwrap();
//! assert!(matches!(event, ClientEvent::SendPrivate { .. }));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode_client, decode_hello, encode_server, ProtocolError};
pub use events::{
    ChatMessage, ClientEvent, ClientHello, ErrorCode, FileAttachment, MessageId, MessageKind,
    RoomId, ServerEvent, UserEntry,
};
