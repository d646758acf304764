//! # confab-core
//!
//! Presence, room-membership, and message-routing engine for Confab.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **ConnectionRegistry** - at most one live connection per user
//! - **UserDirectory** - identity and profile records
//! - **RoomManager** - room identity, membership, private-pair index
//! - **HistoryStore** - bounded per-conversation message history
//! - **PresenceBroadcaster** - per-viewer filtered online lists
//! - **TypingIndicatorRouter** - ephemeral typing relay
//! - **MessageRouter** - membership-gated persistence and fan-out
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │  Transport   │────▶│ MessageRouter │────▶│ HistoryStore │
//! └──────────────┘     └───────────────┘     └──────────────┘
//!                         │           │
//!                         ▼           ▼
//!                  ┌─────────────┐ ┌────────────────────┐
//!                  │ RoomManager │ │ ConnectionRegistry │
//!                  └─────────────┘ └────────────────────┘
//! ```
//!
//! Routing operations never push to the wire themselves: each returns the
//! list of [`Delivery`] pairs to queue, which keeps the routing logic
//! directly testable without a live transport.

pub mod connection;
pub mod error;
pub mod history;
pub mod presence;
pub mod room;
pub mod router;
pub mod typing;
pub mod user;

pub use connection::{ConnectionHandle, ConnectionId, ConnectionRegistry, Delivery};
pub use error::CoreError;
pub use history::{HistoryStore, MemoryHistory, MessageDraft, DEFAULT_HISTORY_CAPACITY};
pub use presence::PresenceBroadcaster;
pub use room::{Room, RoomKind, RoomManager};
pub use router::MessageRouter;
pub use typing::{TypingIndicatorRouter, TypingTarget};
pub use user::{User, UserDirectory, UserId};
