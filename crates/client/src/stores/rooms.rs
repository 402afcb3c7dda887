//! Room registry: which rooms are joined, which one is open, and the
//! per-friend summary shown in a conversation list.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chillow_shared::{
    canonical_room_id, Friend, MessageId, MessageKind, MessageRecord, RoomId, UserId,
};
use chrono::{DateTime, Utc};

/// Preview of the newest message in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct LastMessage {
    pub id: MessageId,
    /// Unknown for previews seeded from the friend list.
    pub sender_id: Option<UserId>,
    pub content: String,
    pub kind: MessageKind,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub is_own: bool,
}

/// Conversation-list entry for one friend.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSummary {
    pub friend_id: UserId,
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub unread_count: u32,
    pub is_online: bool,
    pub last_message: Option<LastMessage>,
}

impl RoomSummary {
    fn from_friend(friend: &Friend, is_online: bool) -> Self {
        let last_message = match (friend.last_message_id, friend.last_message_at) {
            (Some(id), Some(created_at)) => Some(LastMessage {
                id,
                sender_id: None,
                content: friend.last_message_content.clone().unwrap_or_default(),
                kind: friend.last_message_type.unwrap_or_default(),
                attachment_url: None,
                created_at,
                edited_at: None,
                is_deleted: false,
                is_own: false,
            }),
            _ => None,
        };
        Self {
            friend_id: friend.friend_id,
            nickname: friend.friend_nickname.clone(),
            avatar_url: friend.friend_avatar_url.clone(),
            unread_count: friend.unread_count.unwrap_or(0),
            is_online,
            last_message,
        }
    }
}

/// How a message event affects a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageActivity {
    New,
    Changed,
}

#[derive(Debug, Clone)]
pub struct RoomRegistry {
    me: UserId,
    joined: BTreeSet<RoomId>,
    active: Option<RoomId>,
    summaries: BTreeMap<RoomId, RoomSummary>,
    revoked: HashSet<RoomId>,
}

impl RoomRegistry {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            joined: BTreeSet::new(),
            active: None,
            summaries: BTreeMap::new(),
            revoked: HashSet::new(),
        }
    }

    pub fn room_for(&self, friend_id: UserId) -> RoomId {
        canonical_room_id(self.me, friend_id)
    }

    /// Replace the friend list. Online flags already known are kept.
    /// Returns the rooms that still need a `join`.
    pub fn sync_friends(&mut self, friends: &[Friend]) -> Vec<RoomId> {
        let mut summaries = BTreeMap::new();
        let mut to_join = Vec::new();
        for friend in friends {
            let room_id = self.room_for(friend.friend_id);
            let is_online = self
                .summaries
                .get(&room_id)
                .is_some_and(|summary| summary.is_online);
            summaries.insert(room_id.clone(), RoomSummary::from_friend(friend, is_online));
            if self.revoked.remove(&room_id) {
                crate::log_info!("room {} re-established", room_id);
            }
            if self.ensure_joined(&room_id) {
                to_join.push(room_id);
            }
        }
        self.summaries = summaries;
        to_join
    }

    /// Record a room as joined. Returns true the first time.
    pub fn ensure_joined(&mut self, room_id: &str) -> bool {
        if self.revoked.contains(room_id) || self.joined.contains(room_id) {
            return false;
        }
        self.joined.insert(room_id.to_string())
    }

    pub fn joined_rooms(&self) -> Vec<RoomId> {
        self.joined.iter().cloned().collect()
    }

    pub fn set_active(&mut self, room_id: Option<RoomId>) {
        self.active = room_id;
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, room_id: &str) -> bool {
        self.active.as_deref() == Some(room_id)
    }

    /// A room is relevant while joined or open.
    pub fn is_relevant(&self, room_id: &str) -> bool {
        !self.revoked.contains(room_id) && (self.joined.contains(room_id) || self.is_active(room_id))
    }

    /// Mark a room revoked. It stays unusable until the friend shows up
    /// again in [`RoomRegistry::sync_friends`].
    pub fn revoke(&mut self, room_id: &str) {
        self.joined.remove(room_id);
        self.summaries.remove(room_id);
        self.revoked.insert(room_id.to_string());
    }

    pub fn is_revoked(&self, room_id: &str) -> bool {
        self.revoked.contains(room_id)
    }

    /// Fold a message event into the room's summary. Returns true if the
    /// summary changed.
    pub fn record_message(
        &mut self,
        room_id: &str,
        record: &MessageRecord,
        activity: MessageActivity,
    ) -> bool {
        let is_active = self.is_active(room_id);
        let me = self.me;
        let Some(summary) = self.summaries.get_mut(room_id) else {
            return false;
        };
        if activity == MessageActivity::Changed {
            if let Some(last) = &summary.last_message {
                if last.id != record.id {
                    return false;
                }
            }
        }

        let is_own = record.sender_id == me;
        if !is_own {
            if is_active {
                summary.unread_count = 0;
            } else if activity == MessageActivity::New {
                summary.unread_count += 1;
            }
        }
        summary.last_message = Some(LastMessage {
            id: record.id,
            sender_id: Some(record.sender_id),
            content: record.content.clone(),
            kind: record.message_type,
            attachment_url: record.attachment_url.clone(),
            created_at: record.created_at,
            edited_at: record.edited_at,
            is_deleted: record.is_deleted,
            is_own,
        });
        true
    }

    /// Returns true if the flag changed.
    pub fn set_online(&mut self, room_id: &str, online: bool) -> bool {
        match self.summaries.get_mut(room_id) {
            Some(summary) if summary.is_online != online => {
                summary.is_online = online;
                true
            }
            _ => false,
        }
    }

    pub fn reset_unread(&mut self, room_id: &str) -> bool {
        match self.summaries.get_mut(room_id) {
            Some(summary) if summary.unread_count != 0 => {
                summary.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    pub fn summary(&self, room_id: &str) -> Option<&RoomSummary> {
        self.summaries.get(room_id)
    }

    pub fn summaries(&self) -> Vec<(RoomId, RoomSummary)> {
        self.summaries
            .iter()
            .map(|(room_id, summary)| (room_id.clone(), summary.clone()))
            .collect()
    }
}
