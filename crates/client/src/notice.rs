//! Lightweight notices for whatever renders the chat.

use chillow_shared::RoomId;
use tokio::sync::broadcast;

use crate::ws::ConnectionState;

pub(crate) const NOTICE_CAPACITY: usize = 256;

/// Something changed that a view may want to re-read or show.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatNotice {
    ConnectionChanged(ConnectionState),
    MessagesChanged { room_id: RoomId },
    TypingChanged { room_id: RoomId, typing: bool },
    PresenceChanged { room_id: RoomId, online: bool },
    SummaryChanged { room_id: RoomId },
    RoomRevoked { room_id: RoomId, message: String },
    HistoryFailed { room_id: RoomId, message: String },
}

/// Sending side of the notice channel. Sending with nobody listening is fine.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    sender: broadcast::Sender<ChatNotice>,
}

impl Default for Notifier {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { sender }
    }
}

impl Notifier {
    pub(crate) fn notify(&self, notice: ChatNotice) {
        let _ = self.sender.send(notice);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChatNotice> {
        self.sender.subscribe()
    }
}
