//! Client error types.

use chillow_shared::{ApiError, MAX_CONTENT_CHARS};
use thiserror::Error;

/// Reasons a local intent (send, edit, delete) is refused before anything
/// goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("message content is empty")]
    EmptyContent,
    #[error("image messages need an attachment")]
    MissingAttachment,
    #[error("message content exceeds {max} characters")]
    ContentTooLong { max: usize },
    #[error("conversation is no longer available")]
    RoomRevoked,
    #[error("message has been deleted")]
    MessageDeleted,
    #[error("only the author can change this message")]
    NotOwnMessage,
}

impl IntentError {
    pub(crate) fn too_long() -> Self {
        IntentError::ContentTooLong {
            max: MAX_CONTENT_CHARS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
