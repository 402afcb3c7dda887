//! Presence and inbound typing state, per room.
//!
//! Each room tracks two flags for the counterpart user: whether they are
//! online and whether they are typing. The typing flag decays on its own if
//! no `typing:stop` arrives; a fresh `typing:start` re-arms the decay timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chillow_shared::{RoomId, UserId};
use tokio::task::JoinHandle;

use crate::notice::{ChatNotice, Notifier};

#[derive(Default)]
struct RoomPresence {
    typing: bool,
    online: bool,
    /// Bumped on every typing transition; a decay task only clears the flag
    /// if the generation it was armed with is still current.
    generation: u64,
    decay: Option<JoinHandle<()>>,
}

impl RoomPresence {
    fn cancel_decay(&mut self) {
        if let Some(task) = self.decay.take() {
            task.abort();
        }
    }
}

type Rooms = Arc<Mutex<HashMap<RoomId, RoomPresence>>>;

/// Cheap-to-clone handle to the presence state of every room.
#[derive(Clone)]
pub struct PresenceTracker {
    rooms: Rooms,
    decay_after: Duration,
    notifier: Notifier,
}

impl PresenceTracker {
    pub(crate) fn new(decay_after: Duration, notifier: Notifier) -> Self {
        Self {
            rooms: Arc::default(),
            decay_after,
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, RoomPresence>> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inbound `typing:start`. Needs a tokio runtime for the decay timer.
    pub fn typing_started(&self, room_id: &str) {
        let mut rooms = self.lock();
        let room = rooms.entry(room_id.to_string()).or_default();
        room.cancel_decay();
        room.generation += 1;
        let was_typing = room.typing;
        room.typing = true;
        room.decay = Some(self.spawn_decay(room_id, room.generation));
        drop(rooms);

        if !was_typing {
            self.notifier.notify(ChatNotice::TypingChanged {
                room_id: room_id.to_string(),
                typing: true,
            });
        }
    }

    fn spawn_decay(&self, room_id: &str, generation: u64) -> JoinHandle<()> {
        let rooms = Arc::downgrade(&self.rooms);
        let notifier = self.notifier.clone();
        let room_id = room_id.to_string();
        let deadline = tokio::time::Instant::now() + self.decay_after;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(rooms) = rooms.upgrade() else {
                return;
            };
            let mut rooms = rooms.lock().unwrap_or_else(|e| e.into_inner());
            let Some(room) = rooms.get_mut(&room_id) else {
                return;
            };
            if room.generation != generation || !room.typing {
                return;
            }
            room.typing = false;
            room.decay = None;
            drop(rooms);
            crate::log_debug!("typing indicator for {} expired", room_id);
            notifier.notify(ChatNotice::TypingChanged {
                room_id,
                typing: false,
            });
        })
    }

    /// Inbound `typing:stop`: clear immediately.
    pub fn typing_stopped(&self, room_id: &str) {
        let mut rooms = self.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        room.cancel_decay();
        room.generation += 1;
        let was_typing = std::mem::replace(&mut room.typing, false);
        drop(rooms);

        if was_typing {
            self.notifier.notify(ChatNotice::TypingChanged {
                room_id: room_id.to_string(),
                typing: false,
            });
        }
    }

    /// Inbound `presence:update`. Returns the counterpart's online flag.
    pub fn presence_snapshot(&self, room_id: &str, friend_id: UserId, users: &[UserId]) -> bool {
        let online = users.contains(&friend_id);
        let mut rooms = self.lock();
        let room = rooms.entry(room_id.to_string()).or_default();
        let changed = room.online != online;
        room.online = online;
        drop(rooms);

        if changed {
            self.notifier.notify(ChatNotice::PresenceChanged {
                room_id: room_id.to_string(),
                online,
            });
        }
        online
    }

    pub fn is_typing(&self, room_id: &str) -> bool {
        self.lock().get(room_id).is_some_and(|room| room.typing)
    }

    pub fn is_online(&self, room_id: &str) -> bool {
        self.lock().get(room_id).is_some_and(|room| room.online)
    }

    /// Forget everything about a room and cancel its timer.
    pub fn reset_room(&self, room_id: &str) {
        let Some(mut room) = self.lock().remove(room_id) else {
            return;
        };
        room.cancel_decay();
        if room.typing {
            self.notifier.notify(ChatNotice::TypingChanged {
                room_id: room_id.to_string(),
                typing: false,
            });
        }
        if room.online {
            self.notifier.notify(ChatNotice::PresenceChanged {
                room_id: room_id.to_string(),
                online: false,
            });
        }
    }

    /// Cancel every pending decay timer.
    pub fn shutdown(&self) {
        for room in self.lock().values_mut() {
            room.cancel_decay();
            room.typing = false;
        }
    }
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("rooms", &self.lock().len())
            .field("decay_after", &self.decay_after)
            .finish()
    }
}
