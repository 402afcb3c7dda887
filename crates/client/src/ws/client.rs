//! The process-wide realtime client.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chillow_shared::{ClientEvent, EventKind, RoomId, ServerEvent};
use futures_channel::mpsc::UnboundedSender;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::connection::{run_connection_loop, ConnectionState, TransportConfig};
use super::heartbeat::PongTracker;
use super::listeners::{Listeners, Subscription};
use super::EventSink;

/// State shared between [`WsClient`] handles and the connection task.
pub(crate) struct Shared {
    pub(crate) config: TransportConfig,
    pub(crate) listeners: Listeners,
    pub(crate) pongs: PongTracker,
    /// Reconnects scheduled since the last successful open.
    pub(crate) attempts: AtomicU32,
    /// Bumped on every `connect`/`close`; a loop whose epoch is stale must
    /// not touch shared state.
    epoch: AtomicU64,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<UnboundedSender<ClientEvent>>>,
    run: Mutex<Option<RunHandle>>,
}

struct RunHandle {
    task: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl Shared {
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Publish `state` on behalf of the loop running under `epoch`. The epoch
    /// is checked under the state channel's lock, so a write from a stale
    /// loop either lands before the epoch moved on or not at all.
    pub(crate) fn set_state(&self, epoch: u64, state: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if !self.is_current(epoch) {
                return false;
            }
            *current = state;
            true
        })
    }

    /// Start a new epoch, optionally publishing `state` in the same step.
    fn advance_epoch(&self, state: Option<ConnectionState>) -> u64 {
        let mut epoch = 0;
        self.state.send_if_modified(|current| {
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            match state {
                Some(next) => {
                    *current = next;
                    true
                }
                None => false,
            }
        });
        epoch
    }

    pub(crate) fn install_outbound(&self, epoch: u64, sender: UnboundedSender<ClientEvent>) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_current(epoch) {
            *outbound = Some(sender);
        }
    }

    pub(crate) fn clear_outbound(&self, epoch: u64) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_current(epoch) {
            *outbound = None;
        }
    }

    /// Parse one text frame and fan it out. Frames that do not parse into a
    /// known event are dropped.
    pub(crate) fn dispatch_text(&self, text: &str) {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                crate::log_debug!("dropping unrecognized frame: {}", e);
                return;
            }
        };
        if matches!(event, ServerEvent::Pong) {
            self.pongs.record();
        }
        self.listeners.dispatch(&event);
    }
}

/// Handle to the single long-lived realtime connection.
///
/// Cheap to clone; every clone drives the same socket. Create one at startup
/// and pass it to whatever needs it. The connection keeps itself alive until
/// [`WsClient::close`] is called.
#[derive(Clone)]
pub struct WsClient {
    shared: Arc<Shared>,
}

impl WsClient {
    pub fn new(config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                listeners: Listeners::default(),
                pongs: PongTracker::default(),
                attempts: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                state,
                outbound: Mutex::new(None),
                run: Mutex::new(None),
            }),
        }
    }

    /// Tear down any existing socket and open a new one in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut run = self.shared.run.lock().unwrap_or_else(|e| e.into_inner());
        let epoch = {
            let mut outbound = self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner());
            let epoch = self.shared.advance_epoch(None);
            *outbound = None;
            epoch
        };
        if let Some(previous) = run.take() {
            previous.task.abort();
        }
        self.shared.attempts.store(0, Ordering::SeqCst);

        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(run_connection_loop(
            self.shared.clone(),
            epoch,
            shutdown.clone(),
        ));
        *run = Some(RunHandle { task, shutdown });
    }

    /// Deliberately shut the connection down. No reconnect is attempted until
    /// `connect` is called again.
    pub fn close(&self) {
        let mut run = self.shared.run.lock().unwrap_or_else(|e| e.into_inner());
        {
            let mut outbound = self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner());
            self.shared.advance_epoch(Some(ConnectionState::Closing));
            *outbound = None;
        }
        if let Some(previous) = run.take() {
            // The stale loop sends a close frame and exits on its own.
            previous.shutdown.notify_one();
        }
        self.shared.state.send_replace(ConnectionState::Disconnected);
        crate::log_info!("realtime connection closed by client");
    }

    /// Best-effort send. Dropped silently unless the socket is open.
    pub fn send(&self, event: ClientEvent) {
        let outbound = self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner());
        match outbound.as_ref() {
            Some(sender) if self.is_connected() => {
                if sender.unbounded_send(event).is_err() {
                    crate::log_debug!("socket writer gone, dropping outbound event");
                }
            }
            _ => crate::log_debug!("not connected, dropping outbound event"),
        }
    }

    /// Ask the server to route a room's traffic to this connection.
    pub fn join(&self, room_id: &str) {
        self.send(ClientEvent::Join {
            room_id: RoomId::from(room_id),
        });
    }

    /// Invoke `handler` for every inbound event.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.add(None, Arc::new(handler))
    }

    /// Invoke `handler` for inbound events of one kind.
    pub fn subscribe_to<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.add(Some(kind), Arc::new(handler))
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Reconnect attempts scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl EventSink for WsClient {
    fn send(&self, event: ClientEvent) {
        WsClient::send(self, event);
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_connection_is_a_no_op() {
        let client = WsClient::new(TransportConfig::new("ws://127.0.0.1:9/ws"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        client.send(ClientEvent::Ping);
        client.join("3-7");
        assert!(!client.is_connected());
    }

    #[test]
    fn stale_epoch_cannot_publish_after_close() {
        let client = WsClient::new(TransportConfig::new("ws://127.0.0.1:9/ws"));
        let stale = client.shared.epoch.load(Ordering::SeqCst);
        client.close();

        assert!(!client.shared.set_state(stale, ConnectionState::Open));
        let (tx, _rx) = futures_channel::mpsc::unbounded();
        client.shared.install_outbound(stale, tx);

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.shared.outbound.lock().unwrap().is_none());
    }

    #[test]
    fn close_wins_over_a_loop_publishing_concurrently() {
        for _ in 0..200 {
            let client = WsClient::new(TransportConfig::new("ws://127.0.0.1:9/ws"));
            let shared = client.shared.clone();
            let epoch = shared.epoch.load(Ordering::SeqCst);
            let writer = std::thread::spawn(move || {
                for _ in 0..50 {
                    shared.set_state(epoch, ConnectionState::Open);
                }
            });
            client.close();
            writer.join().unwrap();
            assert_eq!(client.state(), ConnectionState::Disconnected);
        }
    }

    #[test]
    fn inbound_frames_reach_subscribers_and_bad_frames_are_dropped() {
        use std::sync::atomic::AtomicUsize;

        let client = WsClient::new(TransportConfig::new("ws://127.0.0.1:9/ws"));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let _sub = client.subscribe_to(EventKind::RoomRevoked, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.shared.dispatch_text("{not json");
        client.shared.dispatch_text(r#"{"type":"unknown:event","roomId":"3-7"}"#);
        client.shared.dispatch_text(r#"{"roomId":"3-7"}"#);
        client.shared.dispatch_text(r#"{"type":"room:revoked","roomId":"3-7"}"#);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
