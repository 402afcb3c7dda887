//! Native socket loop using tokio-tungstenite.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chillow_shared::ClientEvent;
use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::ConnectionState;
use crate::ws::client::Shared;

/// Why a socket session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Peer closed, read error, or write error.
    Dropped,
    /// No pong within the timeout.
    Stale,
    /// `close()` was called.
    Shutdown,
}

/// Connect, serve the socket until it ends, then back off and try again.
/// Exits once the loop's epoch is superseded or shutdown is signalled.
pub(crate) async fn run_connection_loop(shared: Arc<Shared>, epoch: u64, shutdown: Arc<Notify>) {
    let url = shared.config.url.clone();

    loop {
        if !shared.is_current(epoch) {
            break;
        }
        shared.set_state(epoch, ConnectionState::Connecting);

        let request = match shared.config.client_request() {
            Ok(request) => request,
            Err(e) => {
                crate::log_error!("invalid realtime endpoint {}: {}", url, e);
                shared.set_state(epoch, ConnectionState::Disconnected);
                break;
            }
        };

        let handshake = tokio::time::timeout(shared.config.handshake_timeout, connect_async(request));
        let outcome = tokio::select! {
            result = handshake => Some(result),
            _ = shutdown.notified() => None,
        };
        let Some(outcome) = outcome else {
            break;
        };

        match outcome {
            Ok(Ok((stream, _response))) => {
                shared.attempts.store(0, Ordering::SeqCst);
                crate::log_info!("realtime connection open to {}", url);
                let end = serve_socket(&shared, epoch, stream, &shutdown).await;
                crate::log_info!("realtime connection to {} ended: {:?}", url, end);
                if end == SessionEnd::Shutdown {
                    break;
                }
            }
            Ok(Err(e)) => crate::log_warn!("realtime connect to {} failed: {}", url, e),
            Err(_) => crate::log_warn!("realtime connect to {} timed out", url),
        }

        if !shared.is_current(epoch) {
            break;
        }
        shared.set_state(epoch, ConnectionState::Disconnected);

        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = shared.config.reconnect.delay_for_attempt(attempt);
        crate::log_info!(
            "reconnecting to {} in {}ms (attempt {})",
            url,
            delay.as_millis(),
            attempt + 1
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.notified() => break,
        }
    }
}

async fn serve_socket(
    shared: &Shared,
    epoch: u64,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    shutdown: &Notify,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();
    let (sender, mut outbound) = unbounded::<ClientEvent>();

    let heartbeat = shared.config.heartbeat.clone();
    let mut ticker = interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    shared.pongs.reset();
    shared.install_outbound(epoch, sender);
    shared.set_state(epoch, ConnectionState::Open);

    let end = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.dispatch_text(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    crate::log_info!("server closed the socket: {:?}", frame);
                    break SessionEnd::Dropped;
                }
                // Protocol pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    crate::log_warn!("socket read error: {}", e);
                    break SessionEnd::Dropped;
                }
                None => break SessionEnd::Dropped,
            },
            Some(event) = outbound.next() => {
                if let Err(end) = write_event(&mut write, &event).await {
                    break end;
                }
            }
            _ = ticker.tick() => {
                if let Err(end) = write_event(&mut write, &ClientEvent::Ping).await {
                    break end;
                }
                if shared.pongs.is_stale(heartbeat.pong_timeout) {
                    crate::log_warn!(
                        "no pong for {}ms, closing half-open socket",
                        shared.pongs.since_last_pong().as_millis()
                    );
                    break SessionEnd::Stale;
                }
            }
            _ = shutdown.notified() => break SessionEnd::Shutdown,
        }
    };

    shared.clear_outbound(epoch);
    if end != SessionEnd::Dropped {
        let _ = write.send(Message::Close(None)).await;
    }
    end
}

async fn write_event<S>(write: &mut S, event: &ClientEvent) -> Result<(), SessionEnd>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            crate::log_error!("failed to serialize outbound event: {}", e);
            return Ok(());
        }
    };
    write.send(Message::Text(json.into())).await.map_err(|e| {
        crate::log_warn!("socket write failed: {}", e);
        SessionEnd::Dropped
    })
}
