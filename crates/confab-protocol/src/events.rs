//! Event types for the Confab wire protocol.
//!
//! Every frame exchanged with a client is a JSON object carrying a `type`
//! tag. Inbound frames deserialize into [`ClientEvent`]; outbound frames
//! serialize from [`ServerEvent`]. Shapes that do not match a known event
//! fail deserialization and never reach the routing engine.

use serde::{Deserialize, Serialize};

/// A room identifier.
pub type RoomId = u64;

/// A message identifier, unique and increasing within a conversation.
pub type MessageId = u64;

/// Stable error codes reported to clients in `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or self-referential input.
    Validation,
    /// Unknown user or room reference.
    NotFound,
    /// Membership check failure.
    Forbidden,
    /// Storage write failure.
    Persistence,
    /// Identity handshake failure.
    Auth,
}

/// Message content classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
}

/// An opaque file attachment reference.
///
/// The engine never inspects the payload; upload storage is an external
/// concern and `data` is whatever reference the uploader produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Original file name.
    pub name: String,
    /// Storage reference or inline data URL.
    pub data: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// A persisted chat message as it appears on the wire and in history.
///
/// `to` is set for private messages (the recipient's username); `room_id`
/// is always the conversation the message belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    /// Sender username.
    pub from: String,
    /// Recipient username, for private messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub room_id: RoomId,
    /// Text body. For file messages this is the caption, possibly empty.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileAttachment>,
    pub kind: MessageKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// One entry in a `user_list` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub online: bool,
    pub last_seen: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub status: String,
}

/// The identity handshake, sent by a client as its first frame.
///
/// Authentication proper (token validation, password checks) happens in the
/// transport layer before the engine sees the user; this frame only carries
/// the resolved identity and optional profile fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientHello {
    Hello {
        username: String,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
    },
}

/// Events a client may send after the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Send a direct message to another user by username.
    SendPrivate {
        to: String,
        message: String,
        #[serde(default)]
        file_data: Option<FileAttachment>,
    },
    /// Send a message into a group room.
    SendGroup {
        room_id: RoomId,
        message: String,
        #[serde(default)]
        file_data: Option<FileAttachment>,
    },
    /// Create a group room with an initial member list.
    CreateGroup {
        group_name: String,
        members: Vec<String>,
    },
    /// Join an existing room.
    JoinRoom { room_id: RoomId },
    /// Leave a room.
    LeaveRoom { room_id: RoomId },
    /// Start-typing indicator; exactly one of `to` / `room_id` must be set.
    Typing {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    /// Stop-typing indicator; same addressing rules as `typing`.
    StopTyping {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    /// Replace the sender's custom status string.
    UpdateStatus { status: String },
    /// Search message history across the sender's rooms.
    SearchMessages { query: String },
}

/// Events pushed from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Handshake accepted.
    Connected { user_id: u64, username: String },
    /// A private message addressed to this connection's user.
    ReceivePrivate {
        #[serde(flatten)]
        message: ChatMessage,
    },
    /// A group message in a room this user belongs to.
    ReceiveGroup {
        #[serde(flatten)]
        message: ChatMessage,
    },
    /// Sender acknowledgement carrying the persisted message.
    MessageSent {
        #[serde(flatten)]
        message: ChatMessage,
    },
    /// Presence snapshot: every known user except the viewer.
    UserList { users: Vec<UserEntry> },
    /// Recent messages for a room.
    RoomHistory {
        room_id: RoomId,
        messages: Vec<ChatMessage>,
    },
    /// A group room was created with this user as a member.
    GroupCreated {
        room_id: RoomId,
        group_name: String,
        members: Vec<String>,
        created_by: String,
    },
    /// Another user started typing.
    Typing {
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    /// Another user stopped typing.
    StopTyping {
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    /// Results of a `search_messages` request.
    SearchResults {
        query: String,
        messages: Vec<ChatMessage>,
    },
    /// This session was displaced by a newer connection for the same user.
    SessionReplaced,
    /// A request failed; `code` is stable, `message` is human-readable.
    Error { code: ErrorCode, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_tags() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type": "send_private", "to": "bob", "message": "hi"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SendPrivate {
                to: "bob".into(),
                message: "hi".into(),
                file_data: None,
            }
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type": "drop_tables", "message": "oops"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type": "send_group", "message": "no room"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_flattens_message() {
        let event = ServerEvent::ReceivePrivate {
            message: ChatMessage {
                id: 7,
                from: "alice".into(),
                to: Some("bob".into()),
                room_id: 3,
                message: "hi".into(),
                file_data: None,
                kind: MessageKind::Text,
                timestamp: 1_700_000_000_000,
            },
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "receive_private");
        assert_eq!(json["from"], "alice");
        assert_eq!(json["id"], 7);
        // Absent optionals are omitted entirely.
        assert!(json.get("file_data").is_none());
    }

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::NotFound).unwrap(),
            "\"not_found\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::Forbidden).unwrap(),
            "\"forbidden\""
        );
    }

    #[test]
    fn test_hello_roundtrip() {
        let hello: ClientHello =
            serde_json::from_str(r#"{"type": "hello", "username": "alice"}"#).unwrap();
        let ClientHello::Hello {
            username,
            status,
            avatar,
        } = hello;
        assert_eq!(username, "alice");
        assert!(status.is_none());
        assert!(avatar.is_none());
    }
}
