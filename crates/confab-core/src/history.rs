//! Bounded per-conversation message history.
//!
//! [`HistoryStore`] is the persistence seam: the engine only ever talks to
//! this trait, so a SQL-backed store can be swapped in without touching the
//! routers. [`MemoryHistory`] is the default implementation, an append-only
//! ring of the most recent messages per conversation.

use crate::error::CoreError;
use async_trait::async_trait;
use confab_protocol::{ChatMessage, FileAttachment, MessageKind, RoomId};
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::trace;

/// Default history capacity per conversation.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// A message as built by a router, before the store assigns its id.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub from: String,
    pub to: Option<String>,
    pub message: String,
    pub file_data: Option<FileAttachment>,
    pub kind: MessageKind,
    pub timestamp: u64,
}

impl MessageDraft {
    fn into_message(self, id: u64, room_id: RoomId) -> ChatMessage {
        ChatMessage {
            id,
            from: self.from,
            to: self.to,
            room_id,
            message: self.message,
            file_data: self.file_data,
            kind: self.kind,
            timestamp: self.timestamp,
        }
    }
}

/// Persistence contract for conversation history.
///
/// `append` may fail; a failure aborts the triggering operation before any
/// delivery is attempted. Reads never fail: an unknown conversation is an
/// empty one.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a message, assigning an id that is unique and strictly
    /// increasing within the conversation.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the write fails.
    async fn append(&self, room_id: RoomId, draft: MessageDraft)
        -> Result<ChatMessage, CoreError>;

    /// The last `limit` messages in insertion order.
    async fn recent(&self, room_id: RoomId, limit: usize) -> Vec<ChatMessage>;

    /// Messages whose body contains `query`, case-insensitively.
    async fn search(&self, room_id: RoomId, query: &str) -> Vec<ChatMessage>;
}

#[derive(Debug, Default)]
struct Buffer {
    next_seq: u64,
    messages: VecDeque<ChatMessage>,
}

/// In-memory bounded history, FIFO eviction at capacity.
#[derive(Debug)]
pub struct MemoryHistory {
    buffers: DashMap<RoomId, Buffer>,
    capacity: usize,
}

impl MemoryHistory {
    /// Create a store with the default per-conversation capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a store with a custom per-conversation capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            capacity,
        }
    }

    /// Number of messages stored for a conversation.
    #[must_use]
    pub fn len(&self, room_id: RoomId) -> usize {
        self.buffers
            .get(&room_id)
            .map(|b| b.messages.len())
            .unwrap_or(0)
    }

    /// Whether a conversation has no stored messages.
    #[must_use]
    pub fn is_empty(&self, room_id: RoomId) -> bool {
        self.len(room_id) == 0
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(
        &self,
        room_id: RoomId,
        draft: MessageDraft,
    ) -> Result<ChatMessage, CoreError> {
        // The entry lock serializes append and eviction per conversation.
        let mut buffer = self.buffers.entry(room_id).or_default();
        buffer.next_seq += 1;
        let message = draft.into_message(buffer.next_seq, room_id);
        buffer.messages.push_back(message.clone());
        if buffer.messages.len() > self.capacity {
            buffer.messages.pop_front();
        }
        trace!(room = room_id, id = message.id, "History: appended");
        Ok(message)
    }

    async fn recent(&self, room_id: RoomId, limit: usize) -> Vec<ChatMessage> {
        self.buffers
            .get(&room_id)
            .map(|buffer| {
                let skip = buffer.messages.len().saturating_sub(limit);
                buffer.messages.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    async fn search(&self, room_id: RoomId, query: &str) -> Vec<ChatMessage> {
        let needle = query.to_lowercase();
        self.buffers
            .get(&room_id)
            .map(|buffer| {
                buffer
                    .messages
                    .iter()
                    .filter(|m| m.message.to_lowercase().contains(&needle))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(body: &str) -> MessageDraft {
        MessageDraft {
            from: "alice".into(),
            to: None,
            message: body.into(),
            file_data: None,
            kind: MessageKind::Text,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_ids_increase_within_conversation() {
        let history = MemoryHistory::new();

        let first = history.append(1, draft("a")).await.unwrap();
        let second = history.append(1, draft("b")).await.unwrap();
        let other_room = history.append(2, draft("c")).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(other_room.id, 1); // Sequences are per conversation.
    }

    #[tokio::test]
    async fn test_fifo_eviction_at_capacity() {
        let history = MemoryHistory::with_capacity(3);

        for i in 0..4 {
            history.append(1, draft(&format!("m{i}"))).await.unwrap();
        }

        let messages = history.recent(1, 10).await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].message, "m1"); // m0 evicted
        assert_eq!(messages[2].message, "m3");
    }

    #[tokio::test]
    async fn test_capacity_1000_overflow() {
        let history = MemoryHistory::new();

        for i in 0..=DEFAULT_HISTORY_CAPACITY {
            history.append(1, draft(&format!("m{i}"))).await.unwrap();
        }

        let messages = history.recent(1, DEFAULT_HISTORY_CAPACITY + 10).await;
        assert_eq!(messages.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(messages[0].message, "m1"); // the oldest is gone
        assert_eq!(
            messages.last().unwrap().message,
            format!("m{DEFAULT_HISTORY_CAPACITY}")
        );
    }

    #[tokio::test]
    async fn test_recent_limits_and_unknown_key() {
        let history = MemoryHistory::new();

        for i in 0..5 {
            history.append(1, draft(&format!("m{i}"))).await.unwrap();
        }

        let last_two = history.recent(1, 2).await;
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].message, "m3");

        assert!(history.recent(99, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_case_insensitive() {
        let history = MemoryHistory::new();

        history.append(1, draft("Hi there")).await.unwrap();
        history.append(1, draft("nothing")).await.unwrap();
        history.append(1, draft("say HI again")).await.unwrap();

        let hits = history.search(1, "hI").await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].message, "Hi there");
        assert_eq!(hits[1].message, "say HI again");

        assert!(history.search(1, "absent").await.is_empty());
        assert!(history.search(42, "hi").await.is_empty());
    }
}
