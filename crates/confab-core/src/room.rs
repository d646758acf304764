//! Room identity and membership.
//!
//! Rooms store member ids, never user objects or transport handles; the
//! connection registry is the only place an id resolves to a live handle.
//! Private rooms are keyed by the unordered pair of their two participants,
//! so lookup is symmetric and a pair can never own two rooms.

use crate::error::CoreError;
use crate::user::{now_millis, UserId};
use confab_protocol::RoomId;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Room classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    /// Direct conversation between exactly two users.
    Private,
    /// Explicitly created group with an arbitrary member set.
    Group,
}

/// A room record. Snapshots handed to callers are immutable clones.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    /// Display name; `None` for private rooms.
    pub name: Option<String>,
    pub kind: RoomKind,
    pub created_by: UserId,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Member ids. Never empty while the room exists.
    pub members: HashSet<UserId>,
}

/// Order-independent key for a private conversation.
fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Owner of all room identity and membership state.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: DashMap<RoomId, Room>,
    private_index: DashMap<(UserId, UserId), RoomId>,
    next_id: AtomicU64,
}

impl RoomManager {
    /// Create an empty room manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_room_id(&self) -> RoomId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Create a group room.
    ///
    /// The member set is the deduplicated union of `member_ids` and the
    /// creator.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the resulting set has fewer than two
    /// members.
    pub fn create_group(
        &self,
        name: impl Into<String>,
        creator: UserId,
        member_ids: &[UserId],
    ) -> Result<RoomId, CoreError> {
        let mut members: HashSet<UserId> = member_ids.iter().copied().collect();
        members.insert(creator);

        if members.len() < 2 {
            return Err(CoreError::Validation(
                "a group needs at least two members".into(),
            ));
        }

        let id = self.next_room_id();
        let name = name.into();
        debug!(room = id, name = %name, members = members.len(), "Room: group created");
        self.rooms.insert(
            id,
            Room {
                id,
                name: Some(name),
                kind: RoomKind::Group,
                created_by: creator,
                created_at: now_millis(),
                members,
            },
        );
        Ok(id)
    }

    /// Find or create the private room for an unordered pair of users.
    ///
    /// Idempotent and symmetric: `private_room(a, b)` and
    /// `private_room(b, a)` always return the same room id.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `a == b`.
    pub fn private_room(&self, a: UserId, b: UserId) -> Result<RoomId, CoreError> {
        if a == b {
            return Err(CoreError::Validation(
                "cannot open a private room with yourself".into(),
            ));
        }

        // The index entry lock makes concurrent lookups for the same pair
        // agree on a single room.
        let id = *self.private_index.entry(pair_key(a, b)).or_insert_with(|| {
            let id = self.next_room_id();
            debug!(room = id, a, b, "Room: private room created");
            self.rooms.insert(
                id,
                Room {
                    id,
                    name: None,
                    kind: RoomKind::Private,
                    created_by: a,
                    created_at: now_millis(),
                    members: HashSet::from([a, b]),
                },
            );
            id
        });
        Ok(id)
    }

    /// Whether a user belongs to a room. False for unknown rooms.
    #[must_use]
    pub fn is_member(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.rooms
            .get(&room_id)
            .map(|room| room.members.contains(&user_id))
            .unwrap_or(false)
    }

    /// Member ids of a room.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown room.
    pub fn members(&self, room_id: RoomId) -> Result<Vec<UserId>, CoreError> {
        self.rooms
            .get(&room_id)
            .map(|room| room.members.iter().copied().collect())
            .ok_or_else(|| CoreError::NotFound(format!("unknown room: {room_id}")))
    }

    /// Add a user to a room. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown room.
    pub fn add_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), CoreError> {
        let mut room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown room: {room_id}")))?;
        if room.members.insert(user_id) {
            debug!(room = room_id, user = user_id, "Room: member added");
        }
        Ok(())
    }

    /// Remove a user from a room.
    ///
    /// Removing the last member deletes the room: a member set is never
    /// empty while the room exists.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown room.
    pub fn remove_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), CoreError> {
        let emptied = {
            let mut room = self
                .rooms
                .get_mut(&room_id)
                .ok_or_else(|| CoreError::NotFound(format!("unknown room: {room_id}")))?;
            if room.members.remove(&user_id) {
                debug!(room = room_id, user = user_id, "Room: member removed");
            }
            room.members.is_empty()
        };

        if emptied {
            self.rooms.remove(&room_id);
            self.private_index.retain(|_, id| *id != room_id);
            debug!(room = room_id, "Room: deleted empty room");
        }
        Ok(())
    }

    /// All rooms a user belongs to.
    #[must_use]
    pub fn user_rooms(&self, user_id: UserId) -> Vec<RoomId> {
        self.rooms
            .iter()
            .filter(|room| room.members.contains(&user_id))
            .map(|room| room.id)
            .collect()
    }

    /// Snapshot of a room record.
    #[must_use]
    pub fn get(&self, room_id: RoomId) -> Option<Room> {
        self.rooms.get(&room_id).map(|room| room.clone())
    }

    /// Number of rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
