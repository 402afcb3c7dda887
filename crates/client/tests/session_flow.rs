mod common;

use std::sync::Arc;
use std::time::Duration;

use chillow_client::{ChatClient, ChatNotice, ClientConfig, ConnectionState, SendOptions};
use common::backend::FakeBackend;
use common::{
    drain_messages, fast_reconnect, steady_heartbeat, recv_type, send_json, wait_for_state,
    TestServer,
};
use serde_json::json;
use tokio::sync::broadcast;

const ME: u64 = 3;
const FRIEND: u64 = 7;

fn config(url: &str) -> ClientConfig {
    ClientConfig {
        ws_url: url.to_string(),
        api_base_url: "http://127.0.0.1:9".into(),
        reconnect: fast_reconnect(),
        heartbeat: steady_heartbeat(),
        ..ClientConfig::default()
    }
}

async fn wait_for_notice(
    notices: &mut broadcast::Receiver<ChatNotice>,
    wanted: impl Fn(&ChatNotice) -> bool,
) -> ChatNotice {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match notices.recv().await {
                Ok(notice) if wanted(&notice) => return notice,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("notice channel closed"),
            }
        }
    })
    .await
    .expect("notice did not arrive")
}

fn message(id: u64, sender: u64, receiver: u64, content: &str) -> serde_json::Value {
    json!({
        "id": id,
        "room_id": "3-7",
        "sender_id": sender,
        "receiver_id": receiver,
        "content": content,
        "message_type": "text",
        "attachment_url": null,
        "is_deleted": false,
        "is_read": false,
        "created_at": "2025-03-01T10:00:00Z",
        "edited_at": null
    })
}

#[tokio::test]
async fn conversation_round_trip_over_a_live_socket() {
    let mut server = TestServer::start().await;
    let backend = Arc::new(FakeBackend::new(ME, &[FRIEND]));
    let client = ChatClient::start_with_backend(config(&server.url), backend.clone())
        .await
        .unwrap();
    let session = client.session().clone();
    let mut notices = session.notices();

    let mut ws = server.next_socket().await;
    wait_for_state(client.transport(), ConnectionState::Open).await;

    session.load_friends().await.unwrap();
    assert_eq!(
        recv_type(&mut ws, "join").await.unwrap(),
        json!({"type": "join", "roomId": "3-7"})
    );
    session.open_room(FRIEND).unwrap();

    // Incoming message in the open room: stored once, read, receipt sent once.
    let incoming = json!({"type": "message:new", "roomId": "3-7", "message": message(1, FRIEND, ME, "hey")});
    send_json(&mut ws, &incoming).await;
    send_json(&mut ws, &incoming).await;
    wait_for_notice(&mut notices, |n| matches!(n, ChatNotice::MessagesChanged { .. })).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let messages = session.messages(FRIEND);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_read);
    assert!(!messages[0].is_own);
    assert_eq!(backend.read_receipts(), vec![1]);

    // Our send goes out; nothing is stored until the echo.
    session.send_message(FRIEND, "hi back", SendOptions::default()).unwrap();
    let sent = recv_type(&mut ws, "message:send").await.unwrap();
    assert_eq!(sent["roomId"], "3-7");
    assert_eq!(sent["content"], "hi back");
    assert_eq!(session.messages(FRIEND).len(), 1);

    send_json(
        &mut ws,
        &json!({"type": "message:new", "roomId": "3-7", "message": message(2, ME, FRIEND, "hi back")}),
    )
    .await;
    send_json(
        &mut ws,
        &json!({"type": "message:deleted", "roomId": "3-7", "message": message(2, ME, FRIEND, "hi back")}),
    )
    .await;
    tokio::time::timeout(Duration::from_secs(3), async {
        while !session.messages(FRIEND).iter().any(|m| m.id == 2 && m.is_deleted) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("delete was not applied");
    let tombstone = &session.messages(FRIEND)[1];
    assert_eq!(tombstone.content, "");

    // Friend typing is visible.
    send_json(&mut ws, &json!({"type": "typing:start", "roomId": "3-7", "userId": FRIEND})).await;
    wait_for_notice(&mut notices, |n| matches!(n, ChatNotice::TypingChanged { typing: true, .. })).await;
    assert!(session.is_friend_typing(FRIEND));

    client.shutdown();
}

async fn joined_rooms(ws: &mut common::ServerSocket) -> Vec<String> {
    let mut rooms: Vec<String> = drain_messages(ws)
        .await
        .into_iter()
        .filter(|frame| frame["type"] == "join")
        .filter_map(|frame| frame["roomId"].as_str().map(str::to_string))
        .collect();
    rooms.sort();
    rooms.dedup();
    rooms
}

#[tokio::test]
async fn rooms_are_joined_again_after_reconnect() {
    let mut server = TestServer::start().await;
    let backend = Arc::new(FakeBackend::new(ME, &[FRIEND, 9]));
    let client = ChatClient::start_with_backend(config(&server.url), backend)
        .await
        .unwrap();
    let session = client.session().clone();

    let mut first = server.next_socket().await;
    wait_for_state(client.transport(), ConnectionState::Open).await;
    session.load_friends().await.unwrap();
    assert_eq!(joined_rooms(&mut first).await, vec!["3-7", "3-9"]);
    drop(first);

    let mut second = server.next_socket().await;
    assert_eq!(joined_rooms(&mut second).await, vec!["3-7", "3-9"]);

    client.shutdown();
}

#[tokio::test]
async fn revoked_room_surfaces_a_notice_and_blocks_sends() {
    let mut server = TestServer::start().await;
    let backend = Arc::new(FakeBackend::new(ME, &[FRIEND]));
    let client = ChatClient::start_with_backend(config(&server.url), backend)
        .await
        .unwrap();
    let session = client.session().clone();
    let mut notices = session.notices();

    let mut ws = server.next_socket().await;
    wait_for_state(client.transport(), ConnectionState::Open).await;
    session.load_friends().await.unwrap();
    session.open_room(FRIEND).unwrap();

    send_json(
        &mut ws,
        &json!({"type": "message:new", "roomId": "3-7", "message": message(1, FRIEND, ME, "bye")}),
    )
    .await;
    send_json(&mut ws, &json!({"type": "room:revoked", "roomId": "3-7"})).await;

    let notice = wait_for_notice(&mut notices, |n| matches!(n, ChatNotice::RoomRevoked { .. })).await;
    let ChatNotice::RoomRevoked { room_id, message } = notice else {
        unreachable!()
    };
    assert_eq!(room_id, "3-7");
    assert!(!message.is_empty());
    assert!(session.messages(FRIEND).is_empty());
    assert!(session
        .send_message(FRIEND, "still there?", SendOptions::default())
        .is_err());

    // Upload failures propagate as API errors.
    let upload = chillow_client::AttachmentUpload {
        file_name: "cat.png".into(),
        mime_type: "image/png".into(),
        bytes: vec![0; 4],
    };
    assert!(session.send_image(9, upload, "").await.is_err());

    client.shutdown();
}
