//! Presence computation and broadcast.
//!
//! On every connect, disconnect, or status change the broadcaster rebuilds
//! a per-viewer `user_list` for each online user. Message traffic does not
//! trigger a recompute. Offline users are never delivery targets but still
//! appear in other users' lists with `online: false`.

use crate::connection::{ConnectionRegistry, Delivery};
use crate::user::UserDirectory;
use confab_protocol::{ServerEvent, UserEntry};
use std::sync::Arc;
use tracing::trace;

/// Computes and queues per-viewer presence snapshots.
pub struct PresenceBroadcaster {
    directory: Arc<UserDirectory>,
    registry: Arc<ConnectionRegistry>,
}

impl PresenceBroadcaster {
    /// Create a broadcaster over the given directory and registry.
    #[must_use]
    pub fn new(directory: Arc<UserDirectory>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            directory,
            registry,
        }
    }

    /// Recompute presence for every online user.
    ///
    /// Returns one `user_list` delivery per live connection, each listing
    /// all *other* known users. The viewer never appears in its own list.
    #[must_use]
    pub fn refresh(&self) -> Vec<Delivery> {
        let users = self.directory.all();
        let connections = self.registry.snapshot();

        let deliveries: Vec<Delivery> = connections
            .into_iter()
            .map(|handle| {
                let list: Vec<UserEntry> = users
                    .iter()
                    .filter(|user| user.id != handle.user_id())
                    .map(|user| UserEntry {
                        username: user.username.clone(),
                        online: self.registry.is_online(user.id),
                        last_seen: user.last_seen,
                        avatar: user.avatar.clone(),
                        status: user.status.clone(),
                    })
                    .collect();
                Delivery::new(handle, ServerEvent::UserList { users: list })
            })
            .collect();

        trace!(viewers = deliveries.len(), "Presence: refreshed");
        deliveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;

    fn setup() -> (Arc<UserDirectory>, Arc<ConnectionRegistry>, PresenceBroadcaster) {
        let directory = Arc::new(UserDirectory::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = PresenceBroadcaster::new(directory.clone(), registry.clone());
        (directory, registry, presence)
    }

    #[test]
    fn test_viewer_excluded_from_own_list() {
        let (directory, registry, presence) = setup();

        let alice = directory.intern("alice");
        let bob = directory.intern("bob");
        let (alice_conn, _arx) = ConnectionHandle::new(alice);
        let (bob_conn, _brx) = ConnectionHandle::new(bob);
        registry.register(alice_conn);
        registry.register(bob_conn);

        for delivery in presence.refresh() {
            let viewer = directory.get(delivery.target.user_id()).unwrap();
            let ServerEvent::UserList { users } = &delivery.event else {
                panic!("expected user_list");
            };
            assert!(users.iter().all(|u| u.username != viewer.username));
            assert_eq!(users.len(), 1);
        }
    }

    #[test]
    fn test_offline_users_listed_but_not_targeted() {
        let (directory, registry, presence) = setup();

        let alice = directory.intern("alice");
        directory.intern("bob"); // known but never connected

        let (alice_conn, _arx) = ConnectionHandle::new(alice);
        registry.register(alice_conn);

        let deliveries = presence.refresh();
        assert_eq!(deliveries.len(), 1); // only alice is a target
        let ServerEvent::UserList { users } = &deliveries[0].event else {
            panic!("expected user_list");
        };
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "bob");
        assert!(!users[0].online);
    }

    #[test]
    fn test_disconnect_flips_online_flag() {
        let (directory, registry, presence) = setup();

        let alice = directory.intern("alice");
        let bob = directory.intern("bob");
        let (alice_conn, _arx) = ConnectionHandle::new(alice);
        let (bob_conn, _brx) = ConnectionHandle::new(bob);
        registry.register(alice_conn);
        registry.register(bob_conn.clone());

        registry.unregister(bob, bob_conn.id());
        directory.touch_last_seen(bob);

        let deliveries = presence.refresh();
        assert_eq!(deliveries.len(), 1);
        let ServerEvent::UserList { users } = &deliveries[0].event else {
            panic!("expected user_list");
        };
        assert_eq!(users[0].username, "bob");
        assert!(!users[0].online);
    }
}
