//! Chat session: the boundary between the realtime transport, the REST
//! collaborators and the client-side stores.
//!
//! A [`ChatSession`] is created once the signed-in user is known. It listens
//! to every inbound event from a [`WsClient`], keeps the stores consistent,
//! and turns user intents (send, edit, delete, typing) into outbound events.
//!
//! All store mutation happens here; views only read snapshots and react to
//! [`ChatNotice`]s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chillow_shared::{
    canonical_room_id, counterpart, ClientEvent, HistoryQuery, MessageId, MessageKind,
    MessageRecord, RoomId, ServerEvent, UserId, MAX_CONTENT_CHARS,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::{AttachmentUpload, ChatBackend};
use crate::config::{ClientConfig, TypingConfig, DEFAULT_HISTORY_PAGE};
use crate::error::{ChatError, IntentError};
use crate::notice::{ChatNotice, Notifier};
use crate::stores::{
    HistoryPlacement, MessageActivity, MessageStore, NewMessage, PresenceTracker, RoomRegistry,
    RoomSummary, StoredMessage,
};
use crate::typing::TypingNotifier;
use crate::ws::{ConnectionState, EventSink, Subscription, WsClient};

const REVOKED_NOTICE: &str = "This conversation is no longer available. Check your friendship status.";

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub history_page_size: usize,
    pub typing: TypingConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_page_size: DEFAULT_HISTORY_PAGE,
            typing: TypingConfig::default(),
        }
    }
}

impl From<&ClientConfig> for SessionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            history_page_size: config.history_page_size,
            typing: config.typing.clone(),
        }
    }
}

/// Payload options for [`ChatSession::send_message`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub kind: MessageKind,
    pub attachment_url: Option<String>,
    pub attachment_object: Option<String>,
}

impl SendOptions {
    pub fn sticker() -> Self {
        Self {
            kind: MessageKind::Sticker,
            ..Self::default()
        }
    }

    pub fn image(url: impl Into<String>, object_key: Option<String>) -> Self {
        Self {
            kind: MessageKind::Image,
            attachment_url: Some(url.into()),
            attachment_object: object_key,
        }
    }
}

/// Outcome of a history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLoad {
    Loaded {
        /// Messages placed into the room.
        added: usize,
        /// The server returned a full page, so older messages may exist.
        has_more: bool,
    },
    /// The room was closed, revoked, or re-fetched while this request was in
    /// flight; the page was thrown away.
    Discarded,
}

struct State {
    messages: MessageStore,
    rooms: RoomRegistry,
    /// Bumped for a room whenever a history fetch starts or the room goes
    /// away, so an older in-flight fetch can tell it lost the race.
    history_generation: HashMap<RoomId, u64>,
}

impl State {
    fn next_generation(&mut self, room_id: &str) -> u64 {
        let generation = self.history_generation.entry(room_id.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn generation(&self, room_id: &str) -> u64 {
        self.history_generation.get(room_id).copied().unwrap_or(0)
    }
}

struct Attachment {
    _subscription: Subscription,
    watcher: JoinHandle<()>,
}

pub struct ChatSession {
    me: UserId,
    sink: Arc<dyn EventSink>,
    backend: Arc<dyn ChatBackend>,
    settings: SessionSettings,
    state: Mutex<State>,
    presence: PresenceTracker,
    notifier: Notifier,
    attachment: Mutex<Option<Attachment>>,
}

impl ChatSession {
    pub fn new(
        me: UserId,
        sink: Arc<dyn EventSink>,
        backend: Arc<dyn ChatBackend>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let notifier = Notifier::default();
        Arc::new(Self {
            me,
            sink,
            backend,
            presence: PresenceTracker::new(settings.typing.decay_after, notifier.clone()),
            settings,
            state: Mutex::new(State {
                messages: MessageStore::new(me),
                rooms: RoomRegistry::new(me),
                history_generation: HashMap::new(),
            }),
            notifier,
            attachment: Mutex::new(None),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn room_for(&self, friend_id: UserId) -> RoomId {
        canonical_room_id(self.me, friend_id)
    }

    /// Start receiving events from `ws`. Also re-joins every known room
    /// whenever the connection (re)opens. Must be called within a tokio
    /// runtime. Attaching again replaces the previous attachment.
    pub fn attach(self: &Arc<Self>, ws: &WsClient) {
        let weak = Arc::downgrade(self);
        let subscription = ws.subscribe(move |event| {
            if let Some(session) = weak.upgrade() {
                session.handle_event(event);
            }
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        let mut changes = ws.state_changes();
        let watcher = tokio::spawn(async move {
            loop {
                let state = *changes.borrow_and_update();
                match weak.upgrade() {
                    Some(session) => session.connection_changed(state),
                    None => break,
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        let previous = self
            .attachment
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Attachment {
                _subscription: subscription,
                watcher,
            });
        if let Some(previous) = previous {
            previous.watcher.abort();
        }
    }

    fn connection_changed(&self, state: ConnectionState) {
        self.notifier.notify(ChatNotice::ConnectionChanged(state));
        if state.is_connected() {
            self.rejoin_all();
        }
    }

    /// Send `join` for every room this session cares about.
    pub fn rejoin_all(&self) {
        let rooms = {
            let state = self.lock();
            let mut rooms = state.rooms.joined_rooms();
            if let Some(active) = state.rooms.active() {
                if !rooms.iter().any(|room| room == active) {
                    rooms.push(active.to_string());
                }
            }
            rooms
        };
        crate::log_debug!("joining {} rooms", rooms.len());
        for room_id in rooms {
            self.sink.send(ClientEvent::Join { room_id });
        }
    }

    /// Apply one inbound event to the stores.
    pub fn handle_event(&self, event: &ServerEvent) {
        let Some(room_id) = event.room_id() else {
            return;
        };
        let Some(friend_id) = counterpart(room_id, self.me) else {
            crate::log_debug!("ignoring {} for foreign room {}", event.kind().as_str(), room_id);
            return;
        };
        if self.lock().rooms.is_revoked(room_id) {
            crate::log_debug!("ignoring {} for revoked room {}", event.kind().as_str(), room_id);
            return;
        }

        match event {
            ServerEvent::MessageNew { message, .. } => self.on_new_message(room_id, message),
            ServerEvent::MessageUpdated { message, .. } => {
                self.on_message_changed(room_id, message, MessageStore::apply_updated)
            }
            ServerEvent::MessageDeleted { message, .. } => {
                self.on_message_changed(room_id, message, MessageStore::apply_deleted)
            }
            ServerEvent::MessageRead { message, .. } => {
                self.on_message_changed(room_id, message, MessageStore::apply_read_receipt)
            }
            ServerEvent::TypingStart { user_id, .. } if *user_id != self.me => {
                self.presence.typing_started(room_id)
            }
            ServerEvent::TypingStop { user_id, .. } if *user_id != self.me => {
                self.presence.typing_stopped(room_id)
            }
            ServerEvent::TypingStart { .. } | ServerEvent::TypingStop { .. } => {}
            ServerEvent::PresenceUpdate { users, .. } => {
                let online = self.presence.presence_snapshot(room_id, friend_id, users);
                if self.lock().rooms.set_online(room_id, online) {
                    self.notify_summary(room_id);
                }
            }
            ServerEvent::RoomRevoked { .. } => self.revoke_room(room_id),
            ServerEvent::Pong => {}
        }
    }

    fn on_new_message(&self, room_id: &str, message: &MessageRecord) {
        let outcome = {
            let mut state = self.lock();
            let open = state.rooms.is_active(room_id);
            let outcome = state.messages.apply_new(room_id, message.clone(), open);
            if outcome != NewMessage::Duplicate {
                state
                    .rooms
                    .record_message(room_id, message, MessageActivity::New);
            }
            outcome
        };

        let NewMessage::Inserted { needs_receipt } = outcome else {
            crate::log_debug!("duplicate delivery of message {}", message.id);
            return;
        };
        self.notify_messages(room_id);
        self.notify_summary(room_id);
        if needs_receipt {
            self.send_read_receipt(message.id);
        }
    }

    fn on_message_changed(
        &self,
        room_id: &str,
        message: &MessageRecord,
        apply: fn(&mut MessageStore, &str, &MessageRecord) -> bool,
    ) {
        let (applied, summary_changed) = {
            let mut state = self.lock();
            let applied = apply(&mut state.messages, room_id, message);
            let summary_changed =
                state
                    .rooms
                    .record_message(room_id, message, MessageActivity::Changed);
            (applied, summary_changed)
        };
        if applied {
            self.notify_messages(room_id);
        } else {
            crate::log_debug!("no local change for message {} in {}", message.id, room_id);
        }
        if summary_changed {
            self.notify_summary(room_id);
        }
    }

    fn send_read_receipt(&self, message_id: MessageId) {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.mark_read(message_id).await {
                crate::log_warn!("failed to mark message {} read: {}", message_id, e);
            }
        });
    }

    fn revoke_room(&self, room_id: &str) {
        {
            let mut state = self.lock();
            state.messages.clear_room(room_id);
            state.rooms.revoke(room_id);
            if state.rooms.is_active(room_id) {
                state.rooms.set_active(None);
            }
            state.next_generation(room_id);
        }
        self.presence.reset_room(room_id);
        crate::log_info!("room {} revoked", room_id);
        self.notify_messages(room_id);
        self.notifier.notify(ChatNotice::RoomRevoked {
            room_id: room_id.to_string(),
            message: REVOKED_NOTICE.to_string(),
        });
    }

    fn notify_messages(&self, room_id: &str) {
        self.notifier.notify(ChatNotice::MessagesChanged {
            room_id: room_id.to_string(),
        });
    }

    fn notify_summary(&self, room_id: &str) {
        self.notifier.notify(ChatNotice::SummaryChanged {
            room_id: room_id.to_string(),
        });
    }

    /// Fetch the friend list, refresh summaries and join any new rooms.
    pub async fn load_friends(&self) -> Result<Vec<RoomSummary>, ChatError> {
        let friends = self.backend.fetch_friends().await.inspect_err(|e| {
            crate::log_error!("failed to load friends: {}", e);
        })?;
        let (to_join, summaries) = {
            let mut state = self.lock();
            let to_join = state.rooms.sync_friends(&friends);
            (to_join, state.rooms.summaries())
        };
        for room_id in to_join {
            self.sink.send(ClientEvent::Join { room_id });
        }
        for (room_id, _) in &summaries {
            self.notify_summary(room_id);
        }
        Ok(summaries.into_iter().map(|(_, summary)| summary).collect())
    }

    /// Make the conversation with `friend_id` the open one.
    pub fn open_room(&self, friend_id: UserId) -> Result<RoomId, IntentError> {
        let room_id = self.room_for(friend_id);
        let (newly_joined, unread_reset) = {
            let mut state = self.lock();
            if state.rooms.is_revoked(&room_id) {
                return Err(IntentError::RoomRevoked);
            }
            state.rooms.set_active(Some(room_id.clone()));
            (
                state.rooms.ensure_joined(&room_id),
                state.rooms.reset_unread(&room_id),
            )
        };
        if newly_joined {
            self.sink.send(ClientEvent::Join {
                room_id: room_id.clone(),
            });
        }
        if unread_reset {
            self.notify_summary(&room_id);
        }
        Ok(room_id)
    }

    /// Close the open conversation. In-flight history fetches for it are
    /// discarded when they complete, and the friend's typing and online
    /// flags are cleared until the room is opened again.
    pub fn close_room(&self) {
        let closed = {
            let mut state = self.lock();
            let closed = state.rooms.active().map(str::to_string);
            state.rooms.set_active(None);
            if let Some(room_id) = &closed {
                state.next_generation(room_id);
            }
            closed
        };
        if let Some(room_id) = closed {
            self.presence.reset_room(&room_id);
        }
    }

    pub fn active_room(&self) -> Option<RoomId> {
        self.lock().rooms.active().map(str::to_string)
    }

    /// Fetch the newest page of the open conversation with `friend_id`.
    /// Messages that arrived live while the fetch was in flight are kept.
    pub async fn load_history(&self, friend_id: UserId) -> Result<HistoryLoad, ChatError> {
        self.fetch_page(friend_id, HistoryPlacement::Initial).await
    }

    /// Fetch the page before the oldest loaded message and prepend it.
    pub async fn load_older(&self, friend_id: UserId) -> Result<HistoryLoad, ChatError> {
        self.fetch_page(friend_id, HistoryPlacement::Older).await
    }

    async fn fetch_page(
        &self,
        friend_id: UserId,
        placement: HistoryPlacement,
    ) -> Result<HistoryLoad, ChatError> {
        let room_id = self.room_for(friend_id);
        let (generation, before) = {
            let mut state = self.lock();
            if state.rooms.is_revoked(&room_id) {
                return Err(IntentError::RoomRevoked.into());
            }
            let before = match placement {
                HistoryPlacement::Initial => None,
                HistoryPlacement::Older => state
                    .messages
                    .room(&room_id)
                    .and_then(|room| room.oldest())
                    .map(|oldest| oldest.created_at),
            };
            (state.next_generation(&room_id), before)
        };

        let query = HistoryQuery {
            friend_id,
            limit: self.settings.history_page_size,
            before,
        };
        let page = match self.backend.fetch_history(&query).await {
            Ok(page) => page,
            Err(e) => {
                crate::log_warn!("history fetch for {} failed: {}", room_id, e);
                self.notifier.notify(ChatNotice::HistoryFailed {
                    room_id: room_id.clone(),
                    message: e.user_message(),
                });
                return Err(e.into());
            }
        };

        let has_more = page.len() >= query.limit;
        let added = {
            let mut state = self.lock();
            let still_wanted = state.rooms.is_relevant(&room_id)
                && state.rooms.is_active(&room_id)
                && state.generation(&room_id) == generation;
            if !still_wanted {
                crate::log_debug!("discarding stale history page for {}", room_id);
                return Ok(HistoryLoad::Discarded);
            }
            let placement = if before.is_none() {
                HistoryPlacement::Initial
            } else {
                placement
            };
            state.messages.load_history(&room_id, page, placement)
        };
        self.notify_messages(&room_id);
        Ok(HistoryLoad::Loaded { added, has_more })
    }

    /// Ask the server to post a message. Nothing is stored locally until the
    /// server echoes it back as `message:new`.
    pub fn send_message(
        &self,
        friend_id: UserId,
        content: &str,
        options: SendOptions,
    ) -> Result<(), IntentError> {
        let room_id = self.usable_room(friend_id)?;
        let content = content.trim();
        match options.kind {
            MessageKind::Text | MessageKind::Sticker if content.is_empty() => {
                return Err(IntentError::EmptyContent);
            }
            MessageKind::Image
                if !matches!(options.attachment_url.as_deref(), Some(url) if !url.trim().is_empty()) =>
            {
                return Err(IntentError::MissingAttachment);
            }
            _ => {}
        }
        check_length(content)?;

        self.sink.send(ClientEvent::MessageSend {
            room_id,
            content: content.to_string(),
            message_type: options.kind,
            attachment_url: options.attachment_url,
            attachment_object: options.attachment_object,
        });
        Ok(())
    }

    /// Upload an image, then send it as an image message.
    pub async fn send_image(
        &self,
        friend_id: UserId,
        upload: AttachmentUpload,
        caption: &str,
    ) -> Result<(), ChatError> {
        self.usable_room(friend_id)?;
        check_length(caption.trim())?;
        let uploaded = self.backend.upload_attachment(upload).await.inspect_err(|e| {
            crate::log_warn!("attachment upload failed: {}", e);
        })?;
        self.send_message(
            friend_id,
            caption,
            SendOptions::image(uploaded.url, uploaded.object_key),
        )?;
        Ok(())
    }

    /// Ask the server to edit one of our messages.
    pub fn edit_message(
        &self,
        friend_id: UserId,
        message_id: MessageId,
        content: &str,
    ) -> Result<(), IntentError> {
        let room_id = self.usable_room(friend_id)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(IntentError::EmptyContent);
        }
        check_length(content)?;
        self.check_own_live_message(&room_id, message_id)?;

        self.sink.send(ClientEvent::MessageEdit {
            room_id,
            message_id,
            content: content.to_string(),
        });
        Ok(())
    }

    /// Ask the server to delete one of our messages.
    pub fn delete_message(&self, friend_id: UserId, message_id: MessageId) -> Result<(), IntentError> {
        let room_id = self.usable_room(friend_id)?;
        self.check_own_live_message(&room_id, message_id)?;
        self.sink.send(ClientEvent::MessageDelete {
            room_id,
            message_id,
        });
        Ok(())
    }

    fn usable_room(&self, friend_id: UserId) -> Result<RoomId, IntentError> {
        let room_id = self.room_for(friend_id);
        if self.lock().rooms.is_revoked(&room_id) {
            return Err(IntentError::RoomRevoked);
        }
        Ok(room_id)
    }

    /// Messages we have not loaded are left for the server to judge.
    fn check_own_live_message(&self, room_id: &str, message_id: MessageId) -> Result<(), IntentError> {
        let state = self.lock();
        match state.messages.find(room_id, message_id) {
            Some(message) if message.is_deleted => Err(IntentError::MessageDeleted),
            Some(message) if !message.is_own => Err(IntentError::NotOwnMessage),
            _ => Ok(()),
        }
    }

    /// Outbound typing notifier for the conversation with `friend_id`.
    pub fn typing_notifier(&self, friend_id: UserId) -> Result<TypingNotifier, IntentError> {
        let room_id = self.usable_room(friend_id)?;
        Ok(TypingNotifier::new(
            room_id,
            self.sink.clone(),
            self.settings.typing.idle_after,
        ))
    }

    /// Snapshot of a conversation, oldest first.
    pub fn messages(&self, friend_id: UserId) -> Vec<StoredMessage> {
        self.lock().messages.messages(&self.room_for(friend_id))
    }

    pub fn is_friend_typing(&self, friend_id: UserId) -> bool {
        self.presence.is_typing(&self.room_for(friend_id))
    }

    pub fn is_friend_online(&self, friend_id: UserId) -> bool {
        self.presence.is_online(&self.room_for(friend_id))
    }

    pub fn is_revoked(&self, friend_id: UserId) -> bool {
        self.lock().rooms.is_revoked(&self.room_for(friend_id))
    }

    pub fn summary(&self, friend_id: UserId) -> Option<RoomSummary> {
        self.lock().rooms.summary(&self.room_for(friend_id)).cloned()
    }

    /// Conversation list, ordered by room id.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.lock()
            .rooms
            .summaries()
            .into_iter()
            .map(|(_, summary)| summary)
            .collect()
    }

    pub fn joined_rooms(&self) -> Vec<RoomId> {
        self.lock().rooms.joined_rooms()
    }

    pub fn notices(&self) -> broadcast::Receiver<ChatNotice> {
        self.notifier.subscribe()
    }

    /// Stop listening to the transport and cancel every timer.
    pub fn shutdown(&self) {
        let attachment = self
            .attachment
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(attachment) = attachment {
            attachment.watcher.abort();
        }
        self.presence.shutdown();
    }
}

fn check_length(content: &str) -> Result<(), IntentError> {
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(IntentError::too_long());
    }
    Ok(())
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("me", &self.me)
            .field("active_room", &self.active_room())
            .finish()
    }
}
