//! User identity and profile directory.
//!
//! Users are created on first handshake and never deleted by the engine;
//! account deletion is an external concern. The directory is the only
//! authority for username-to-id resolution.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// A stable user identifier.
pub type UserId = u64;

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// A user profile record.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Milliseconds since the Unix epoch; updated on connect and disconnect.
    pub last_seen: u64,
    pub avatar: Option<String>,
    pub status: String,
}

impl User {
    fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            last_seen: now_millis(),
            avatar: None,
            status: String::new(),
        }
    }
}

/// Directory of every user the engine has ever seen.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<UserId, User>,
    by_username: DashMap<String, UserId>,
    next_id: AtomicU64,
}

impl UserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the id for a username, creating the user on first sight.
    pub fn intern(&self, username: &str) -> UserId {
        *self
            .by_username
            .entry(username.to_string())
            .or_insert_with(|| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                self.users.insert(id, User::new(id, username));
                debug!(user = %username, id, "Directory: user created");
                id
            })
    }

    /// Look up a user id by username.
    #[must_use]
    pub fn resolve_username(&self, username: &str) -> Option<UserId> {
        self.by_username.get(username).map(|id| *id)
    }

    /// Get a snapshot of a user record.
    #[must_use]
    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    /// Get a user's username.
    #[must_use]
    pub fn username_of(&self, id: UserId) -> Option<String> {
        self.users.get(&id).map(|u| u.username.clone())
    }

    /// Replace a user's custom status string.
    pub fn set_status(&self, id: UserId, status: impl Into<String>) {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.status = status.into();
        }
    }

    /// Replace a user's avatar reference.
    pub fn set_avatar(&self, id: UserId, avatar: Option<String>) {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.avatar = avatar;
        }
    }

    /// Update a user's last-seen timestamp to now.
    pub fn touch_last_seen(&self, id: UserId) {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.last_seen = now_millis();
        }
    }

    /// Snapshot of all known users, for presence computation.
    #[must_use]
    pub fn all(&self) -> Vec<User> {
        self.users.iter().map(|u| u.clone()).collect()
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
