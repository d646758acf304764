//! Connection registry: the single mapping from user ids to live transports.
//!
//! A [`ConnectionHandle`] pairs a user with the outbound event queue of one
//! live connection. The registry holds at most one handle per user; a new
//! registration displaces the old handle rather than accumulating sessions.
//! Nothing else in the engine holds transport references, so a reconnect
//! can never leave a stale handle reachable through a room or a user record.

use crate::user::UserId;
use confab_protocol::ServerEvent;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// A connection identifier, unique for the lifetime of the process.
pub type ConnectionId = u64;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An outbound event queued for one connection.
#[derive(Debug)]
pub struct Delivery {
    /// The connection to deliver to.
    pub target: ConnectionHandle,
    /// The event to deliver.
    pub event: ServerEvent,
}

impl Delivery {
    /// Create a new delivery.
    #[must_use]
    pub fn new(target: ConnectionHandle, event: ServerEvent) -> Self {
        Self { target, event }
    }

    /// Push the event onto the target's outbound queue.
    ///
    /// Returns `false` if the connection's receiver is gone; the transport
    /// is already tearing down, so the event is dropped.
    pub fn push(self) -> bool {
        self.target.send(self.event)
    }
}

/// A live connection's identity and outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the transport will drain.
    #[must_use]
    pub fn new(user_id: UserId) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            id: CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1,
            user_id,
            sender,
        };
        (handle, receiver)
    }

    /// The connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The user this connection belongs to.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Queue an event for this connection.
    ///
    /// Returns `false` if the receiving side has been dropped.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Registry of live connections, at most one per user.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the active handle for a user, replacing any existing one.
    ///
    /// Returns the displaced handle, if any, so the caller can force-close
    /// the stale session.
    pub fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self.connections.insert(handle.user_id(), handle);
        if let Some(prev) = &previous {
            debug!(
                user = prev.user_id(),
                displaced = prev.id(),
                "Registry: connection replaced"
            );
        }
        previous
    }

    /// Remove the mapping, but only if it still belongs to `connection_id`.
    ///
    /// A late disconnect from a replaced session must not clobber the newer
    /// connection. Returns `true` if the mapping was removed.
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        self.connections
            .remove_if(&user_id, |_, handle| handle.id() == connection_id)
            .is_some()
    }

    /// Resolve a user to their live connection; `None` means offline.
    #[must_use]
    pub fn resolve(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections.get(&user_id).map(|h| h.clone())
    }

    /// Whether a user has a live connection.
    #[must_use]
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    /// Snapshot of every live connection, for presence computation.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.iter().map(|h| h.clone()).collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.connections.len()
    }
}
