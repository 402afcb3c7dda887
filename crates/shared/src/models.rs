//! Data models exchanged with the chat server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned user identifier.
pub type UserId = u64;

/// Server-assigned message identifier.
pub type MessageId = u64;

/// Maximum number of characters the server accepts for text and sticker content.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Kind of payload a message carries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Sticker,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Sticker => "sticker",
        }
    }
}

/// A message as delivered by the realtime channel and the history endpoint.
///
/// History pages omit `room_id`; it defaults to empty and callers that need it
/// derive it from the sender/receiver pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: MessageId,
    #[serde(default)]
    pub room_id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub attachment_object: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Canonical room this message belongs to.
    pub fn room(&self) -> String {
        crate::protocol::canonical_room_id(self.sender_id, self.receiver_id)
    }
}

/// The signed-in user (`GET /api/users/me`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub id: UserId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// An accepted friendship as returned by `GET /api/friends`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Friend {
    pub friend_id: UserId,
    #[serde(default)]
    pub friend_nickname: String,
    #[serde(default)]
    pub friend_avatar_url: Option<String>,
    #[serde(default)]
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub last_message_id: Option<MessageId>,
    #[serde(default)]
    pub last_message_content: Option<String>,
    #[serde(default)]
    pub last_message_type: Option<MessageKind>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Parameters for one page of conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub friend_id: UserId,
    pub limit: usize,
    /// Only return messages created strictly before this instant.
    pub before: Option<DateTime<Utc>>,
}

/// Result of uploading an attachment (`POST /api/messages/media`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAttachment {
    pub url: String,
    #[serde(default)]
    pub object_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_record_without_room_id_parses() {
        let json = r#"{
            "id": 12,
            "sender_id": 7,
            "receiver_id": 3,
            "content": "hi",
            "message_type": "text",
            "attachment_url": null,
            "is_read": false,
            "is_deleted": false,
            "edited_at": null,
            "deleted_at": null,
            "created_at": "2025-03-01T10:00:00+09:00",
            "updated_at": "2025-03-01T10:00:00+09:00"
        }"#;
        let record: MessageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 12);
        assert!(record.room_id.is_empty());
        assert_eq!(record.room(), "3-7");
        assert_eq!(record.created_at.to_rfc3339(), "2025-03-01T01:00:00+00:00");
    }

    #[test]
    fn unknown_fields_and_missing_optionals_are_tolerated() {
        let json = r#"{"friend_id": 9, "created_at": "2025-01-01T00:00:00Z"}"#;
        let friend: Friend = serde_json::from_str(json).unwrap();
        assert_eq!(friend.friend_id, 9);
        assert_eq!(friend.unread_count, None);
    }
}
