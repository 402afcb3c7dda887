use std::sync::Mutex;

use async_trait::async_trait;
use chillow_client::{AttachmentUpload, ChatBackend};
use chillow_shared::{
    ApiError, CurrentUser, Friend, HistoryQuery, MessageId, MessageRecord, UploadedAttachment,
    UserId,
};

/// Backend with a fixed friend list and no history.
pub struct FakeBackend {
    pub me: UserId,
    pub friends: Vec<UserId>,
    pub read: Mutex<Vec<MessageId>>,
}

impl FakeBackend {
    pub fn new(me: UserId, friends: &[UserId]) -> Self {
        Self {
            me,
            friends: friends.to_vec(),
            read: Mutex::new(Vec::new()),
        }
    }

    pub fn read_receipts(&self) -> Vec<MessageId> {
        self.read.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        Ok(CurrentUser {
            id: self.me,
            nickname: "tester".into(),
            avatar_url: String::new(),
        })
    }

    async fn fetch_friends(&self) -> Result<Vec<Friend>, ApiError> {
        Ok(self
            .friends
            .iter()
            .map(|&id| Friend {
                friend_id: id,
                friend_nickname: format!("friend {id}"),
                friend_avatar_url: None,
                unread_count: Some(0),
                last_message_id: None,
                last_message_content: None,
                last_message_type: None,
                last_message_at: None,
            })
            .collect())
    }

    async fn fetch_history(&self, _query: &HistoryQuery) -> Result<Vec<MessageRecord>, ApiError> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, message_id: MessageId) -> Result<(), ApiError> {
        self.read.lock().unwrap().push(message_id);
        Ok(())
    }

    async fn upload_attachment(
        &self,
        _upload: AttachmentUpload,
    ) -> Result<UploadedAttachment, ApiError> {
        Err(ApiError::Http {
            status: 503,
            body: r#"{"error":"uploads disabled"}"#.into(),
        })
    }
}
