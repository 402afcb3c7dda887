//! Chillow Client - realtime one-to-one chat
//!
//! This crate holds the client side of chillow's messaging layer: one shared
//! websocket connection with reconnect and heartbeat, the per-room message
//! store, presence and typing state, and the session that ties them to the
//! REST API.

pub mod logging;

pub mod api_client;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod notice;
pub mod session;
pub mod stores;
pub mod typing;
pub mod ws;

#[cfg(test)]
mod testing;

pub use api_client::ApiClient;
pub use backend::{AttachmentUpload, ChatBackend};
pub use client::ChatClient;
pub use config::{ClientConfig, TypingConfig};
pub use error::{ChatError, IntentError};
pub use notice::ChatNotice;
pub use session::{ChatSession, HistoryLoad, SendOptions, SessionSettings};
pub use stores::{RoomSummary, StoredMessage};
pub use typing::TypingNotifier;
pub use ws::{ConnectionState, EventSink, WsClient};
