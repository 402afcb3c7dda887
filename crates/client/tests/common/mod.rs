#![allow(dead_code)]

pub mod backend;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chillow_client::ws::{HeartbeatConfig, ReconnectConfig, TransportConfig};
use chillow_client::{ConnectionState, WsClient};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub type ServerSocket = WebSocketStream<TcpStream>;

/// A websocket server on a random local port that hands every accepted
/// socket to the test.
pub struct TestServer {
    pub url: String,
    sockets: mpsc::UnboundedReceiver<ServerSocket>,
    accepted: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, sockets) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if tx.send(ws).is_err() {
                    break;
                }
            }
        });

        Self {
            url: format!("ws://{}/ws", addr),
            sockets,
            accepted,
        }
    }

    /// Wait for the client to open its next socket.
    pub async fn next_socket(&mut self) -> ServerSocket {
        tokio::time::timeout(Duration::from_secs(5), self.sockets.recv())
            .await
            .expect("client did not connect in time")
            .expect("accept loop ended")
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Short timings so heartbeat and reconnect behaviour shows up quickly.
pub fn fast_transport(url: &str) -> TransportConfig {
    TransportConfig {
        reconnect: fast_reconnect(),
        heartbeat: fast_heartbeat(),
        ..TransportConfig::new(url)
    }
}

/// Fast reconnects but a heartbeat slow enough to never fire during a test.
pub fn steady_transport(url: &str) -> TransportConfig {
    TransportConfig {
        reconnect: fast_reconnect(),
        heartbeat: steady_heartbeat(),
        ..TransportConfig::new(url)
    }
}

pub fn steady_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig {
        interval: Duration::from_secs(30),
        pong_timeout: Duration::from_secs(90),
    }
}

pub fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    }
}

pub fn fast_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig {
        interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(350),
    }
}

pub async fn wait_for_state(client: &WsClient, state: ConnectionState) {
    let mut changes = client.state_changes();
    tokio::time::timeout(Duration::from_secs(5), changes.wait_for(|current| *current == state))
        .await
        .unwrap_or_else(|_| panic!("client never reached {state:?}"))
        .unwrap();
}

/// Next text frame parsed as JSON, with timeout.
pub async fn recv_json(ws: &mut ServerSocket) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), ws.next()).await;
        match frame {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

/// Next frame whose `type` is `kind`, skipping heartbeat pings and anything else.
pub async fn recv_type(ws: &mut ServerSocket, kind: &str) -> Option<Value> {
    loop {
        let value = recv_json(ws).await?;
        if value["type"] == kind {
            return Some(value);
        }
    }
}

/// Drain all pending frames until a short quiet period.
pub async fn drain_messages(ws: &mut ServerSocket) -> Vec<Value> {
    let mut messages = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
        match frame {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(v) = serde_json::from_str::<Value>(text.as_str()) {
                    messages.push(v);
                }
            }
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
    messages
}

pub async fn send_json(ws: &mut ServerSocket, value: &Value) {
    ws.send(Message::Text(serde_json::to_string(value).unwrap().into()))
        .await
        .unwrap();
}

pub async fn send_raw(ws: &mut ServerSocket, text: &str) {
    ws.send(Message::Text(text.to_string().into())).await.unwrap();
}

/// Answer every ping with a pong until the socket goes away.
pub fn spawn_pong_responder(mut ws: ServerSocket) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                if text.as_str().contains(r#""type":"ping""#) {
                    let pong = Message::Text(r#"{"type":"pong"}"#.to_string().into());
                    if ws.send(pong).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
