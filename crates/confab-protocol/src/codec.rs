//! Codec for encoding and decoding Confab events.
//!
//! The wire format is one JSON object per WebSocket text frame. Decoding is
//! the validation boundary: unknown event tags and missing required fields
//! are rejected here, before any payload reaches the routing engine.

use thiserror::Error;

use crate::events::{ClientEvent, ClientHello, ServerEvent};

/// Maximum inbound event size in bytes.
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Errors that can occur while encoding or decoding events.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds the maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    TooLarge(usize),

    /// JSON did not match any known event shape.
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode an inbound client event.
///
/// # Errors
///
/// Returns an error if the frame is oversized or does not deserialize into
/// a known [`ClientEvent`] shape.
pub fn decode_client(text: &str) -> Result<ClientEvent, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::TooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// Decode the identity handshake frame.
///
/// # Errors
///
/// Returns an error if the frame is oversized or is not a `hello` event.
pub fn decode_hello(text: &str) -> Result<ClientHello, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::TooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode an outbound server event as a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_server(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ErrorCode;

    #[test]
    fn test_decode_client() {
        let event = decode_client(r#"{"type": "update_status", "status": "afk"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::UpdateStatus {
                status: "afk".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_shape() {
        assert!(matches!(
            decode_client(r#"{"kind": "send_private"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let huge = format!(
            r#"{{"type": "update_status", "status": "{}"}}"#,
            "x".repeat(MAX_EVENT_SIZE)
        );
        assert!(matches!(
            decode_client(&huge),
            Err(ProtocolError::TooLarge(_))
        ));
    }

    #[test]
    fn test_encode_server() {
        let text = encode_server(&ServerEvent::Error {
            code: ErrorCode::Forbidden,
            message: "not a member".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "forbidden");
    }
}
