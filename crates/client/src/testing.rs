//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chillow_shared::{
    canonical_room_id, ApiError, ClientEvent, CurrentUser, Friend, HistoryQuery, MessageId,
    MessageKind, MessageRecord, UploadedAttachment, UserId,
};
use chrono::{TimeZone, Utc};

use crate::backend::{AttachmentUpload, ChatBackend};
use crate::ws::EventSink;

/// Records every outbound event instead of sending it.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: ClientEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Scripted REST backend.
pub(crate) struct MockBackend {
    pub(crate) me: UserId,
    pub(crate) friends: Mutex<Vec<Friend>>,
    pub(crate) history: Mutex<VecDeque<Result<Vec<MessageRecord>, ApiError>>>,
    pub(crate) queries: Mutex<Vec<HistoryQuery>>,
    pub(crate) read: Mutex<Vec<MessageId>>,
    pub(crate) uploads: Mutex<Vec<AttachmentUpload>>,
    /// Held by a test to keep history fetches in flight.
    pub(crate) gate: tokio::sync::Mutex<()>,
}

impl MockBackend {
    pub(crate) fn new(me: UserId) -> Self {
        Self {
            me,
            friends: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
            read: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn with_friends(self, ids: &[UserId]) -> Self {
        *self.friends.lock().unwrap() = ids.iter().copied().map(friend).collect();
        self
    }

    pub(crate) fn push_history(&self, page: Result<Vec<MessageRecord>, ApiError>) {
        self.history.lock().unwrap().push_back(page);
    }

    pub(crate) fn read_receipts(&self) -> Vec<MessageId> {
        self.read.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        Ok(CurrentUser {
            id: self.me,
            nickname: "me".into(),
            avatar_url: String::new(),
        })
    }

    async fn fetch_friends(&self) -> Result<Vec<Friend>, ApiError> {
        let friends = self.friends.lock().unwrap().clone();
        Ok(friends)
    }

    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<MessageRecord>, ApiError> {
        let _open = self.gate.lock().await;
        self.queries.lock().unwrap().push(query.clone());
        let next = self.history.lock().unwrap().pop_front();
        next.unwrap_or(Ok(Vec::new()))
    }

    async fn mark_read(&self, message_id: MessageId) -> Result<(), ApiError> {
        self.read.lock().unwrap().push(message_id);
        Ok(())
    }

    async fn upload_attachment(
        &self,
        upload: AttachmentUpload,
    ) -> Result<UploadedAttachment, ApiError> {
        let key = format!("chat/{}", upload.file_name);
        self.uploads.lock().unwrap().push(upload);
        Ok(UploadedAttachment {
            url: format!("https://cdn.example/{key}"),
            object_key: Some(key),
        })
    }
}

pub(crate) fn friend(id: UserId) -> Friend {
    Friend {
        friend_id: id,
        friend_nickname: format!("friend {id}"),
        friend_avatar_url: None,
        unread_count: None,
        last_message_id: None,
        last_message_content: None,
        last_message_type: None,
        last_message_at: None,
    }
}

/// A text message; `minute` orders messages in time.
pub(crate) fn record(id: MessageId, sender: UserId, receiver: UserId, minute: u32) -> MessageRecord {
    MessageRecord {
        id,
        room_id: canonical_room_id(sender, receiver),
        sender_id: sender,
        receiver_id: receiver,
        content: format!("message {id}"),
        message_type: MessageKind::Text,
        attachment_url: None,
        attachment_object: None,
        is_deleted: false,
        is_read: false,
        created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap(),
        edited_at: None,
    }
}

pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
