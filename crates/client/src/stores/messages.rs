//! Per-room message store.
//!
//! This store is the single source of truth for conversation contents. Each
//! room keeps its messages in arrival order (history pages are sorted oldest
//! first before they are merged). Every mutation goes through the methods
//! here so deduplication and tombstones are enforced in one place.

use std::collections::{HashMap, HashSet};

use chillow_shared::{MessageId, MessageKind, MessageRecord, RoomId, UserId};
use chrono::{DateTime, Utc};

/// A message as held by the store, with `is_own` resolved for the session user.
#[derive(Clone, PartialEq, Debug)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub attachment_url: Option<String>,
    pub attachment_object: Option<String>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub is_read: bool,
    pub is_own: bool,
}

impl StoredMessage {
    pub fn from_record(record: MessageRecord, me: UserId) -> Self {
        let mut stored = Self {
            id: record.id,
            is_own: record.sender_id == me,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            content: record.content,
            kind: record.message_type,
            attachment_url: record.attachment_url,
            attachment_object: record.attachment_object,
            created_at: record.created_at,
            edited_at: record.edited_at,
            is_deleted: false,
            is_read: record.is_read,
        };
        if record.is_deleted {
            stored.tombstone();
        }
        stored
    }

    fn tombstone(&mut self) {
        self.is_deleted = true;
        self.content.clear();
        self.attachment_url = None;
        self.attachment_object = None;
    }
}

/// Where a fetched history page goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPlacement {
    /// First page: becomes the room's contents, keeping any held message
    /// the page does not cover.
    Initial,
    /// Older page: goes in front of the current contents.
    Older,
}

/// Outcome of [`MessageStore::apply_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewMessage {
    Inserted {
        /// The message came from the friend into the open conversation and
        /// was marked read; the server should be told.
        needs_receipt: bool,
    },
    Duplicate,
}

/// Messages for a single room.
#[derive(Default, Clone, PartialEq, Debug)]
pub struct RoomMessages {
    /// Messages in arrival order, oldest first.
    pub messages: Vec<StoredMessage>,
    /// Whether the first history page has been fetched.
    pub is_loaded: bool,
}

impl RoomMessages {
    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().rposition(|m| m.id == id)
    }

    pub fn get(&self, id: MessageId) -> Option<&StoredMessage> {
        self.position(id).map(|pos| &self.messages[pos])
    }

    /// Append a message. Returns false if a message with the same id exists.
    pub fn add_message(&mut self, msg: StoredMessage) -> bool {
        if self.position(msg.id).is_some() {
            return false;
        }
        self.messages.push(msg);
        true
    }

    /// Install the first history page. Messages already held whose ids are
    /// not on the page (live arrivals during the fetch) are kept; for ids on
    /// both sides the page's copy wins.
    pub fn set_history(&mut self, mut messages: Vec<StoredMessage>) {
        let on_page: HashSet<MessageId> = messages.iter().map(|m| m.id).collect();
        messages.extend(
            self.messages
                .drain(..)
                .filter(|held| !on_page.contains(&held.id)),
        );
        sort_chronologically(&mut messages);
        messages.dedup_by_key(|m| m.id);
        self.messages = messages;
        self.is_loaded = true;
    }

    /// Put an older page in front, skipping ids already present.
    /// Returns how many messages were added.
    pub fn prepend_history(&mut self, mut messages: Vec<StoredMessage>) -> usize {
        sort_chronologically(&mut messages);
        messages.dedup_by_key(|m| m.id);
        messages.retain(|m| self.position(m.id).is_none());
        let added = messages.len();
        messages.append(&mut self.messages);
        self.messages = messages;
        added
    }

    fn apply_update(&mut self, record: &MessageRecord) -> bool {
        let Some(pos) = self.position(record.id) else {
            return false;
        };
        let msg = &mut self.messages[pos];
        if msg.is_deleted {
            return false;
        }
        if record.is_deleted {
            msg.tombstone();
            return true;
        }
        msg.content = record.content.clone();
        msg.kind = record.message_type;
        msg.attachment_url = record.attachment_url.clone();
        if record.attachment_object.is_some() {
            msg.attachment_object = record.attachment_object.clone();
        }
        msg.edited_at = record.edited_at.or(msg.edited_at);
        msg.is_read |= record.is_read;
        true
    }

    fn apply_delete(&mut self, id: MessageId) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.messages[pos].tombstone();
                true
            }
            None => false,
        }
    }

    fn mark_read(&mut self, id: MessageId) -> bool {
        match self.position(id) {
            Some(pos) if !self.messages[pos].is_read => {
                self.messages[pos].is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Oldest loaded message, the cursor for fetching the previous page.
    pub fn oldest(&self) -> Option<&StoredMessage> {
        self.messages.first()
    }
}

fn sort_chronologically(messages: &mut [StoredMessage]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// All rooms' messages for the signed-in user, keyed by room id.
///
/// Rooms are created lazily on first touch and kept for the session.
#[derive(Debug, Clone)]
pub struct MessageStore {
    me: UserId,
    rooms: HashMap<RoomId, RoomMessages>,
}

impl MessageStore {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            rooms: HashMap::new(),
        }
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn room(&self, room_id: &str) -> Option<&RoomMessages> {
        self.rooms.get(room_id)
    }

    /// Snapshot of a room's messages (empty for unknown rooms).
    pub fn messages(&self, room_id: &str) -> Vec<StoredMessage> {
        self.rooms
            .get(room_id)
            .map(|room| room.messages.clone())
            .unwrap_or_default()
    }

    fn room_mut(&mut self, room_id: &str) -> &mut RoomMessages {
        self.rooms.entry(room_id.to_string()).or_default()
    }

    /// Merge a fetched history page. Returns how many messages were placed.
    pub fn load_history(
        &mut self,
        room_id: &str,
        page: Vec<MessageRecord>,
        placement: HistoryPlacement,
    ) -> usize {
        let me = self.me;
        let page: Vec<StoredMessage> = page
            .into_iter()
            .map(|record| StoredMessage::from_record(record, me))
            .collect();
        let room = self.room_mut(room_id);
        match placement {
            HistoryPlacement::Initial => {
                room.set_history(page);
                room.messages.len()
            }
            HistoryPlacement::Older => room.prepend_history(page),
        }
    }

    /// Apply a `message:new` event. Duplicate ids are ignored.
    ///
    /// When `room_is_open` is set and the friend sent the message, it is
    /// marked read right away and the caller is asked to send a receipt.
    pub fn apply_new(
        &mut self,
        room_id: &str,
        record: MessageRecord,
        room_is_open: bool,
    ) -> NewMessage {
        let mut msg = StoredMessage::from_record(record, self.me);
        let needs_receipt = room_is_open && !msg.is_own && !msg.is_deleted && !msg.is_read;
        if needs_receipt {
            msg.is_read = true;
        }
        if self.room_mut(room_id).add_message(msg) {
            NewMessage::Inserted { needs_receipt }
        } else {
            NewMessage::Duplicate
        }
    }

    /// Apply a `message:updated` event. Unknown ids and tombstones are left alone.
    pub fn apply_updated(&mut self, room_id: &str, record: &MessageRecord) -> bool {
        self.rooms
            .get_mut(room_id)
            .is_some_and(|room| room.apply_update(record))
    }

    /// Apply a `message:deleted` event: the record stays in place with its
    /// content and attachment cleared.
    pub fn apply_deleted(&mut self, room_id: &str, record: &MessageRecord) -> bool {
        self.rooms
            .get_mut(room_id)
            .is_some_and(|room| room.apply_delete(record.id))
    }

    /// Apply a `message:read` event.
    pub fn apply_read_receipt(&mut self, room_id: &str, record: &MessageRecord) -> bool {
        self.rooms
            .get_mut(room_id)
            .is_some_and(|room| room.mark_read(record.id))
    }

    /// Drop everything held for a room (used when the room is revoked).
    pub fn clear_room(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.messages.clear();
            room.is_loaded = false;
        }
    }

    pub fn find(&self, room_id: &str, id: MessageId) -> Option<&StoredMessage> {
        self.rooms.get(room_id)?.get(id)
    }
}
