//! WebSocket transport for realtime chat traffic.
//!
//! This module provides:
//! - One long-lived connection with auto-reconnect and exponential backoff
//! - An application-level ping/pong heartbeat that detects half-open sockets
//! - Fan-out of parsed inbound events to any number of subscribers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  WsClient                    │
//! │ (connect / close / send / join / subscribe)  │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//!          ┌───────────────────────────┐
//!          │   connection loop task    │
//!          │ socket + heartbeat timers │
//!          └───────────────────────────┘
//!                        │ ServerEvent
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │ subscriber │ │ subscriber │ │ subscriber │
//!   │ (session)  │ │ (typed)    │ │ (typed)    │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! The transport never touches message state; it only publishes events.
//! Stores live in [`crate::stores`] and are driven by
//! [`crate::session::ChatSession`].

mod client;
mod connection;
mod heartbeat;
mod listeners;

use chillow_shared::ClientEvent;

pub use client::WsClient;
pub use connection::{ConnectionState, HeartbeatConfig, ReconnectConfig, TransportConfig};
pub use listeners::Subscription;

/// Anything that accepts outbound events on a fire-and-forget basis.
pub trait EventSink: Send + Sync {
    fn send(&self, event: ClientEvent);
}
