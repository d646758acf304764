//! Message routing: the orchestrator every inbound chat event passes through.
//!
//! Each operation validates membership through [`RoomManager`], persists
//! through [`HistoryStore`], resolves delivery targets through
//! [`ConnectionRegistry`], and returns the resulting deliveries without
//! touching the transport. A persistence failure aborts the whole operation
//! before any delivery is queued.

use crate::connection::{ConnectionRegistry, Delivery};
use crate::error::CoreError;
use crate::history::{HistoryStore, MessageDraft};
use crate::room::RoomManager;
use crate::user::{now_millis, UserDirectory, UserId};
use confab_protocol::{FileAttachment, MessageKind, RoomId, ServerEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Messages returned when a client joins a room.
const JOIN_HISTORY_LIMIT: usize = 50;

/// The top-level routing component.
pub struct MessageRouter {
    directory: Arc<UserDirectory>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    history: Arc<dyn HistoryStore>,
}

impl MessageRouter {
    /// Create a router over the shared stores.
    #[must_use]
    pub fn new(
        directory: Arc<UserDirectory>,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            directory,
            registry,
            rooms,
            history,
        }
    }

    fn username(&self, id: UserId) -> Result<String, CoreError> {
        self.directory
            .username_of(id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown user id: {id}")))
    }

    fn draft(
        from: String,
        to: Option<String>,
        body: String,
        file_data: Option<FileAttachment>,
    ) -> MessageDraft {
        let kind = if file_data.is_some() {
            MessageKind::File
        } else {
            MessageKind::Text
        };
        MessageDraft {
            from,
            to,
            message: body,
            file_data,
            kind,
            timestamp: now_millis(),
        }
    }

    /// Route a private message, addressed by the recipient's username.
    ///
    /// The message is persisted into the pair's private room before any
    /// delivery. The recipient receives `receive_private` only if online;
    /// the sender is always acknowledged with `message_sent` carrying the
    /// persisted message.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown recipient, `Validation` for messaging
    /// yourself, `Persistence` if the write fails.
    pub async fn route_private(
        &self,
        from: UserId,
        to_username: &str,
        body: String,
        file_data: Option<FileAttachment>,
    ) -> Result<Vec<Delivery>, CoreError> {
        let to = self
            .directory
            .resolve_username(to_username)
            .ok_or_else(|| CoreError::NotFound(format!("unknown user: {to_username}")))?;
        let from_name = self.username(from)?;

        let room_id = self.rooms.private_room(from, to)?;
        let draft = Self::draft(
            from_name,
            Some(to_username.to_string()),
            body,
            file_data,
        );
        let message = self.history.append(room_id, draft).await?;
        debug!(room = room_id, id = message.id, "Routed private message");

        let mut deliveries = Vec::with_capacity(2);
        if let Some(handle) = self.registry.resolve(to) {
            deliveries.push(Delivery::new(
                handle,
                ServerEvent::ReceivePrivate {
                    message: message.clone(),
                },
            ));
        }
        if let Some(handle) = self.registry.resolve(from) {
            deliveries.push(Delivery::new(handle, ServerEvent::MessageSent { message }));
        }
        Ok(deliveries)
    }

    /// Route a message into a group room.
    ///
    /// One membership snapshot serves both the access check and the fan-out,
    /// so the target set cannot go stale between the two. Every online
    /// member receives exactly one copy, the sender included.
    ///
    /// # Errors
    ///
    /// `Forbidden` if the sender is not a member (or the room is unknown),
    /// `Persistence` if the write fails.
    pub async fn route_group(
        &self,
        from: UserId,
        room_id: RoomId,
        body: String,
        file_data: Option<FileAttachment>,
    ) -> Result<Vec<Delivery>, CoreError> {
        let members = self
            .rooms
            .members(room_id)
            .map_err(|_| CoreError::Forbidden(format!("not a member of room {room_id}")))?;
        if !members.contains(&from) {
            warn!(user = from, room = room_id, "Group send rejected");
            return Err(CoreError::Forbidden(format!(
                "not a member of room {room_id}"
            )));
        }

        let from_name = self.username(from)?;
        let draft = Self::draft(from_name, None, body, file_data);
        let message = self.history.append(room_id, draft).await?;
        debug!(
            room = room_id,
            id = message.id,
            members = members.len(),
            "Routed group message"
        );

        Ok(members
            .into_iter()
            .filter_map(|member| self.registry.resolve(member))
            .map(|handle| {
                Delivery::new(
                    handle,
                    ServerEvent::ReceiveGroup {
                        message: message.clone(),
                    },
                )
            })
            .collect())
    }

    /// Create a group room and notify its online members.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown member username, `Validation` if the
    /// deduplicated member set (creator included) has fewer than two users.
    pub fn create_group(
        &self,
        creator: UserId,
        group_name: &str,
        member_usernames: &[String],
    ) -> Result<Vec<Delivery>, CoreError> {
        let mut member_ids = Vec::with_capacity(member_usernames.len());
        for username in member_usernames {
            let id = self
                .directory
                .resolve_username(username)
                .ok_or_else(|| CoreError::NotFound(format!("unknown user: {username}")))?;
            member_ids.push(id);
        }

        let creator_name = self.username(creator)?;
        let room_id = self.rooms.create_group(group_name, creator, &member_ids)?;

        let members = self.rooms.members(room_id)?;
        let mut member_names = Vec::with_capacity(members.len());
        for id in &members {
            member_names.push(self.username(*id)?);
        }
        member_names.sort_unstable();

        let event = ServerEvent::GroupCreated {
            room_id,
            group_name: group_name.to_string(),
            members: member_names,
            created_by: creator_name,
        };

        Ok(members
            .into_iter()
            .filter_map(|member| self.registry.resolve(member))
            .map(|handle| Delivery::new(handle, event.clone()))
            .collect())
    }

    /// Join a room and hand the joiner its recent history.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown room.
    pub async fn join_room(
        &self,
        user: UserId,
        room_id: RoomId,
    ) -> Result<Vec<Delivery>, CoreError> {
        self.rooms.add_member(room_id, user)?;
        let messages = self.history.recent(room_id, JOIN_HISTORY_LIMIT).await;
        Ok(self
            .registry
            .resolve(user)
            .map(|handle| {
                Delivery::new(handle, ServerEvent::RoomHistory { room_id, messages })
            })
            .into_iter()
            .collect())
    }

    /// Leave a room. Removing the last member deletes the room.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown room.
    pub fn leave_room(&self, user: UserId, room_id: RoomId) -> Result<Vec<Delivery>, CoreError> {
        self.rooms.remove_member(room_id, user)?;
        Ok(Vec::new())
    }

    /// Fetch recent history for a room the user belongs to.
    ///
    /// # Errors
    ///
    /// `Forbidden` if the user is not a member (or the room is unknown).
    pub async fn room_history(
        &self,
        user: UserId,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<Delivery>, CoreError> {
        if !self.rooms.is_member(room_id, user) {
            return Err(CoreError::Forbidden(format!(
                "not a member of room {room_id}"
            )));
        }
        let messages = self.history.recent(room_id, limit).await;
        Ok(self
            .registry
            .resolve(user)
            .map(|handle| {
                Delivery::new(handle, ServerEvent::RoomHistory { room_id, messages })
            })
            .into_iter()
            .collect())
    }

    /// Search message history across every room the user belongs to.
    ///
    /// Matches are case-insensitive substring hits on the message body,
    /// ordered by timestamp with the per-conversation id as tie-break.
    pub async fn search_messages(
        &self,
        user: UserId,
        query: &str,
    ) -> Result<Vec<Delivery>, CoreError> {
        let mut matches = Vec::new();
        for room_id in self.rooms.user_rooms(user) {
            matches.extend(self.history.search(room_id, query).await);
        }
        matches.sort_by_key(|m| (m.timestamp, m.id));

        Ok(self
            .registry
            .resolve(user)
            .map(|handle| {
                Delivery::new(
                    handle,
                    ServerEvent::SearchResults {
                        query: query.to_string(),
                        messages: matches,
                    },
                )
            })
            .into_iter()
            .collect())
    }
}
