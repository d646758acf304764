//! Ephemeral typing-indicator relay.
//!
//! Typing state is fire-and-forget: nothing is persisted or queued, an
//! offline private target silently drops the indicator, and there are no
//! acknowledgements.

use crate::connection::{ConnectionRegistry, Delivery};
use crate::error::CoreError;
use crate::room::RoomManager;
use crate::user::{UserDirectory, UserId};
use confab_protocol::{RoomId, ServerEvent};
use std::sync::Arc;

/// Where a typing indicator is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingTarget {
    /// A private conversation, addressed by the peer's username.
    User(String),
    /// A group room.
    Room(RoomId),
}

/// Relays typing state to the affected connections.
pub struct TypingIndicatorRouter {
    directory: Arc<UserDirectory>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
}

impl TypingIndicatorRouter {
    /// Create a typing router over the shared stores.
    #[must_use]
    pub fn new(
        directory: Arc<UserDirectory>,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
    ) -> Self {
        Self {
            directory,
            registry,
            rooms,
        }
    }

    /// Relay a typing (or stop-typing) indicator.
    ///
    /// Private targets that are offline produce no deliveries and no error;
    /// absence of a connection is expected steady-state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown username and `Forbidden` when the
    /// sender is not a member of the target room.
    pub fn notify(
        &self,
        from: UserId,
        target: TypingTarget,
        active: bool,
    ) -> Result<Vec<Delivery>, CoreError> {
        let from_name = self
            .directory
            .username_of(from)
            .ok_or_else(|| CoreError::NotFound(format!("unknown user id: {from}")))?;

        let event = |room_id: Option<RoomId>| {
            if active {
                ServerEvent::Typing {
                    from: from_name.clone(),
                    room_id,
                }
            } else {
                ServerEvent::StopTyping {
                    from: from_name.clone(),
                    room_id,
                }
            }
        };

        match target {
            TypingTarget::User(username) => {
                let peer = self
                    .directory
                    .resolve_username(&username)
                    .ok_or_else(|| CoreError::NotFound(format!("unknown user: {username}")))?;
                Ok(self
                    .registry
                    .resolve(peer)
                    .map(|handle| Delivery::new(handle, event(None)))
                    .into_iter()
                    .collect())
            }
            TypingTarget::Room(room_id) => {
                let members = self.rooms.members(room_id).map_err(|_| {
                    CoreError::Forbidden(format!("not a member of room {room_id}"))
                })?;
                if !members.contains(&from) {
                    return Err(CoreError::Forbidden(format!(
                        "not a member of room {room_id}"
                    )));
                }
                Ok(members
                    .into_iter()
                    .filter(|member| *member != from)
                    .filter_map(|member| self.registry.resolve(member))
                    .map(|handle| Delivery::new(handle, event(Some(room_id))))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;

    struct Fixture {
        directory: Arc<UserDirectory>,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
        typing: TypingIndicatorRouter,
    }

    fn setup() -> Fixture {
        let directory = Arc::new(UserDirectory::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::new());
        let typing =
            TypingIndicatorRouter::new(directory.clone(), registry.clone(), rooms.clone());
        Fixture {
            directory,
            registry,
            rooms,
            typing,
        }
    }

    #[test]
    fn test_private_typing_reaches_online_peer() {
        let f = setup();
        let alice = f.directory.intern("alice");
        let bob = f.directory.intern("bob");
        let (bob_conn, _rx) = ConnectionHandle::new(bob);
        f.registry.register(bob_conn);

        let deliveries = f
            .typing
            .notify(alice, TypingTarget::User("bob".into()), true)
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].event,
            ServerEvent::Typing {
                from: "alice".into(),
                room_id: None
            }
        );
    }

    #[test]
    fn test_private_typing_to_offline_peer_drops_silently() {
        let f = setup();
        let alice = f.directory.intern("alice");
        f.directory.intern("bob");

        let deliveries = f
            .typing
            .notify(alice, TypingTarget::User("bob".into()), false)
            .unwrap();
        assert!(deliveries.is_empty());
    }

    #[test]
    fn test_unknown_username_is_not_found() {
        let f = setup();
        let alice = f.directory.intern("alice");

        assert!(matches!(
            f.typing
                .notify(alice, TypingTarget::User("ghost".into()), true),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_group_typing_excludes_sender_and_gates_membership() {
        let f = setup();
        let alice = f.directory.intern("alice");
        let bob = f.directory.intern("bob");
        let carol = f.directory.intern("carol");
        let mallory = f.directory.intern("mallory");

        let room = f.rooms.create_group("devs", alice, &[bob, carol]).unwrap();

        let (alice_conn, _arx) = ConnectionHandle::new(alice);
        let (bob_conn, _brx) = ConnectionHandle::new(bob);
        f.registry.register(alice_conn);
        f.registry.register(bob_conn);
        // carol is a member but offline

        let deliveries = f
            .typing
            .notify(alice, TypingTarget::Room(room), true)
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].target.user_id(), bob);

        assert!(matches!(
            f.typing.notify(mallory, TypingTarget::Room(room), true),
            Err(CoreError::Forbidden(_))
        ));
        // Unknown room reads as a membership failure too.
        assert!(matches!(
            f.typing.notify(alice, TypingTarget::Room(404), true),
            Err(CoreError::Forbidden(_))
        ));
    }
}
