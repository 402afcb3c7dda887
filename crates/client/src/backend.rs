//! REST collaborators the session depends on.

use async_trait::async_trait;
use chillow_shared::{ApiError, CurrentUser, Friend, HistoryQuery, MessageId, MessageRecord, UploadedAttachment};

/// A file to attach to an image message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Everything the chat session needs from the HTTP API.
///
/// [`crate::ApiClient`] is the real implementation; tests substitute their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Identity of the signed-in user.
    async fn current_user(&self) -> Result<CurrentUser, ApiError>;

    /// Accepted friends, with server-side unread counts and previews.
    async fn fetch_friends(&self) -> Result<Vec<Friend>, ApiError>;

    /// One page of a conversation, oldest first.
    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<MessageRecord>, ApiError>;

    /// Mark a received message read on the server.
    async fn mark_read(&self, message_id: MessageId) -> Result<(), ApiError>;

    async fn upload_attachment(
        &self,
        upload: AttachmentUpload,
    ) -> Result<UploadedAttachment, ApiError>;
}
