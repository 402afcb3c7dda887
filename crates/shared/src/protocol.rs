//! Realtime protocol definitions: frames in both directions and room ids.
//!
//! Frames are flat JSON objects discriminated by a `type` field, e.g.
//! `{"type":"join","roomId":"3-7"}`.

use serde::{Deserialize, Serialize};

use crate::models::{MessageId, MessageKind, MessageRecord, UserId};

/// Canonical identifier of the conversation between two users.
pub type RoomId = String;

const ROOM_SEPARATOR: char = '-';

/// Build the room id for a pair of users. The smaller id always comes first so
/// both participants compute the same value.
pub fn canonical_room_id(user_a: UserId, user_b: UserId) -> RoomId {
    let (low, high) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{low}{ROOM_SEPARATOR}{high}")
}

/// Split a canonical room id back into its two user ids.
pub fn parse_room_id(room_id: &str) -> Option<(UserId, UserId)> {
    let (a, b) = room_id.split_once(ROOM_SEPARATOR)?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// The other participant of `room_id`, if `me` is part of it.
pub fn counterpart(room_id: &str, me: UserId) -> Option<UserId> {
    let (a, b) = parse_room_id(room_id)?;
    if a == me {
        Some(b)
    } else if b == me {
        Some(a)
    } else {
        None
    }
}

/// Frames sent from the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    #[serde(rename = "join")]
    Join { room_id: RoomId },
    #[serde(rename = "message:send")]
    MessageSend {
        room_id: RoomId,
        content: String,
        message_type: MessageKind,
        attachment_url: Option<String>,
        attachment_object: Option<String>,
    },
    #[serde(rename = "message:edit")]
    MessageEdit {
        room_id: RoomId,
        message_id: MessageId,
        content: String,
    },
    #[serde(rename = "message:delete")]
    MessageDelete {
        room_id: RoomId,
        message_id: MessageId,
    },
    #[serde(rename = "typing:start")]
    TypingStart { room_id: RoomId },
    #[serde(rename = "typing:stop")]
    TypingStop { room_id: RoomId },
    #[serde(rename = "ping")]
    Ping,
}

/// Frames pushed from the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "message:new")]
    MessageNew {
        room_id: RoomId,
        message: MessageRecord,
    },
    #[serde(rename = "message:updated")]
    MessageUpdated {
        room_id: RoomId,
        message: MessageRecord,
    },
    #[serde(rename = "message:deleted")]
    MessageDeleted {
        room_id: RoomId,
        message: MessageRecord,
    },
    #[serde(rename = "message:read")]
    MessageRead {
        room_id: RoomId,
        message: MessageRecord,
    },
    #[serde(rename = "typing:start")]
    TypingStart { room_id: RoomId, user_id: UserId },
    #[serde(rename = "typing:stop")]
    TypingStop { room_id: RoomId, user_id: UserId },
    #[serde(rename = "presence:update")]
    PresenceUpdate { room_id: RoomId, users: Vec<UserId> },
    #[serde(rename = "room:revoked")]
    RoomRevoked { room_id: RoomId },
    #[serde(rename = "pong")]
    Pong,
}

/// Discriminant of a [`ServerEvent`], used to key typed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageNew,
    MessageUpdated,
    MessageDeleted,
    MessageRead,
    TypingStart,
    TypingStop,
    PresenceUpdate,
    RoomRevoked,
    Pong,
}

impl EventKind {
    /// Wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageNew => "message:new",
            EventKind::MessageUpdated => "message:updated",
            EventKind::MessageDeleted => "message:deleted",
            EventKind::MessageRead => "message:read",
            EventKind::TypingStart => "typing:start",
            EventKind::TypingStop => "typing:stop",
            EventKind::PresenceUpdate => "presence:update",
            EventKind::RoomRevoked => "room:revoked",
            EventKind::Pong => "pong",
        }
    }
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::MessageNew { .. } => EventKind::MessageNew,
            ServerEvent::MessageUpdated { .. } => EventKind::MessageUpdated,
            ServerEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
            ServerEvent::MessageRead { .. } => EventKind::MessageRead,
            ServerEvent::TypingStart { .. } => EventKind::TypingStart,
            ServerEvent::TypingStop { .. } => EventKind::TypingStop,
            ServerEvent::PresenceUpdate { .. } => EventKind::PresenceUpdate,
            ServerEvent::RoomRevoked { .. } => EventKind::RoomRevoked,
            ServerEvent::Pong => EventKind::Pong,
        }
    }

    /// Room the event is scoped to. `pong` is connection-wide.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ServerEvent::MessageNew { room_id, .. }
            | ServerEvent::MessageUpdated { room_id, .. }
            | ServerEvent::MessageDeleted { room_id, .. }
            | ServerEvent::MessageRead { room_id, .. }
            | ServerEvent::TypingStart { room_id, .. }
            | ServerEvent::TypingStop { room_id, .. }
            | ServerEvent::PresenceUpdate { room_id, .. }
            | ServerEvent::RoomRevoked { room_id } => Some(room_id),
            ServerEvent::Pong => None,
        }
    }
}
