//! Outbound typing notifications for one conversation.
//!
//! The first keystroke after idle sends `typing:start`. `typing:stop` goes
//! out when the input is cleared or sent, after the idle window passes with
//! no keystrokes, or when the notifier is dropped, whichever comes first.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chillow_shared::{ClientEvent, RoomId};
use tokio::task::JoinHandle;

use crate::ws::EventSink;

#[derive(Default)]
struct TypingState {
    active: bool,
    generation: u64,
    idle: Option<JoinHandle<()>>,
}

impl TypingState {
    fn cancel_idle(&mut self) {
        if let Some(task) = self.idle.take() {
            task.abort();
        }
    }
}

pub struct TypingNotifier {
    room_id: RoomId,
    sink: Arc<dyn EventSink>,
    idle_after: Duration,
    state: Arc<Mutex<TypingState>>,
}

impl TypingNotifier {
    pub fn new(room_id: RoomId, sink: Arc<dyn EventSink>, idle_after: Duration) -> Self {
        Self {
            room_id,
            sink,
            idle_after,
            state: Arc::default(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    fn lock(&self) -> MutexGuard<'_, TypingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record input activity. Needs a tokio runtime for the idle timer.
    pub fn keystroke(&self) {
        let mut state = self.lock();
        if !state.active {
            state.active = true;
            self.sink.send(ClientEvent::TypingStart {
                room_id: self.room_id.clone(),
            });
        }
        state.cancel_idle();
        state.generation += 1;
        state.idle = Some(self.spawn_idle(state.generation));
    }

    fn spawn_idle(&self, generation: u64) -> JoinHandle<()> {
        let deadline = tokio::time::Instant::now() + self.idle_after;
        let state = Arc::downgrade(&self.state);
        let sink = self.sink.clone();
        let room_id = self.room_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            if state.generation != generation || !state.active {
                return;
            }
            state.active = false;
            state.idle = None;
            sink.send(ClientEvent::TypingStop { room_id });
        })
    }

    /// The input was cleared or its content was sent.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.cancel_idle();
        state.generation += 1;
        if std::mem::replace(&mut state.active, false) {
            self.sink.send(ClientEvent::TypingStop {
                room_id: self.room_id.clone(),
            });
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TypingNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingNotifier")
            .field("room_id", &self.room_id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ClientEvent>>);

    impl EventSink for RecordingSink {
        fn send(&self, event: ClientEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl RecordingSink {
        fn kinds(&self) -> Vec<&'static str> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .map(|event| match event {
                    ClientEvent::TypingStart { .. } => "start",
                    ClientEvent::TypingStop { .. } => "stop",
                    _ => "other",
                })
                .collect()
        }
    }

    fn notifier() -> (TypingNotifier, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let typing = TypingNotifier::new("3-7".into(), sink.clone(), Duration::from_millis(2_500));
        (typing, sink)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_keystrokes_sends_one_start() {
        let (typing, sink) = notifier();
        for _ in 0..10 {
            typing.keystroke();
            advance(Duration::from_millis(200)).await;
        }
        assert_eq!(sink.kinds(), vec!["start"]);
        assert!(typing.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_sends_stop() {
        let (typing, sink) = notifier();
        typing.keystroke();
        advance(Duration::from_millis(2_400)).await;
        settle().await;
        assert_eq!(sink.kinds(), vec!["start"]);

        advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(sink.kinds(), vec!["start", "stop"]);

        typing.keystroke();
        assert_eq!(sink.kinds(), vec!["start", "stop", "start"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_input_stops_once() {
        let (typing, sink) = notifier();
        typing.keystroke();
        typing.stop();
        typing.stop();
        advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(sink.kinds(), vec!["start", "stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_sends_pending_stop() {
        let (typing, sink) = notifier();
        typing.keystroke();
        drop(typing);
        assert_eq!(sink.kinds(), vec!["start", "stop"]);

        let (idle, sink) = notifier();
        drop(idle);
        assert!(sink.kinds().is_empty());
    }
}
