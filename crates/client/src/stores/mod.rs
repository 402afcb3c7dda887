//! Client-side chat state.
//!
//! Stores are plain data structures; [`crate::session::ChatSession`] owns
//! them and is the only thing that mutates them in response to events.

pub mod messages;
pub mod presence;
pub mod rooms;

pub use messages::{HistoryPlacement, MessageStore, NewMessage, RoomMessages, StoredMessage};
pub use presence::PresenceTracker;
pub use rooms::{LastMessage, MessageActivity, RoomRegistry, RoomSummary};
