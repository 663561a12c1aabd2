use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use futures::{SinkExt, StreamExt};
use lobby_server::websocket::{ChatMessage, ServerEvent, TypingNotice};
use lobby_server::{configure, AppState, Settings};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(300);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn spawn_server(settings: Settings) -> (SocketAddr, AppState) {
    let state = AppState::new(settings);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let data = web::Data::new(state.clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure)
    })
    .listen(listener)
    .unwrap()
    .workers(1)
    .disable_signals()
    .run();
    actix_rt::spawn(server);

    (addr, state)
}

fn start() -> (SocketAddr, AppState) {
    spawn_server(Settings::new_for_test().expect("Failed to load test config"))
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

/// Waits until the hub has seen exactly `expected` live connections.
async fn wait_for_connections(state: &AppState, expected: usize) {
    timeout(EVENT_TIMEOUT * 3, async {
        loop {
            if state.hub.stats().await.unwrap().connections == expected {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub never reached {} connections", expected));
}

async fn send(client: &mut Client, frame: serde_json::Value) {
    client.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_event(client: &mut Client) -> ServerEvent {
    loop {
        let frame = timeout(EVENT_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream closed")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn expect_silence(client: &mut Client) {
    let quiet = timeout(QUIET_PERIOD, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;

    if let Ok(Some(text)) = quiet {
        panic!("expected no event, got {}", text);
    }
}

fn roster(names: &[&str]) -> ServerEvent {
    ServerEvent::RosterUpdated(names.iter().map(|n| n.to_string()).collect())
}

#[actix_web::test]
async fn test_roster_follows_joins_and_leaves() {
    let (addr, state) = start();
    let mut x = connect(addr).await;
    let mut y = connect(addr).await;
    wait_for_connections(&state, 2).await;

    send(&mut x, json!({"type": "register", "payload": "alice"})).await;
    for client in [&mut x, &mut y] {
        assert_eq!(next_event(client).await, roster(&["alice"]));
        assert_eq!(next_event(client).await, ServerEvent::ParticipantJoined);
    }

    send(&mut y, json!({"type": "register", "payload": "bob"})).await;
    for client in [&mut x, &mut y] {
        assert_eq!(next_event(client).await, roster(&["alice", "bob"]));
        assert_eq!(next_event(client).await, ServerEvent::ParticipantJoined);
    }

    x.close(None).await.unwrap();
    assert_eq!(next_event(&mut y).await, ServerEvent::ParticipantLeft);
    assert_eq!(next_event(&mut y).await, roster(&["bob"]));

    let stats = state.hub.stats().await.unwrap();
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.participants, vec!["bob"]);
}

#[actix_web::test]
async fn test_message_reaches_everyone_unmodified() {
    let (addr, state) = start();
    let mut x = connect(addr).await;
    let mut y = connect(addr).await;
    wait_for_connections(&state, 2).await;

    send(&mut x, json!({"type": "register", "payload": "alice"})).await;
    send(&mut y, json!({"type": "register", "payload": "bob"})).await;
    for client in [&mut x, &mut y] {
        for _ in 0..4 {
            next_event(client).await;
        }
    }

    send(
        &mut x,
        json!({"type": "send-message", "payload": {"text": "hi", "author": "alice", "avatarUrl": "a.png"}}),
    )
    .await;

    let expected = ServerEvent::MessageReceived(ChatMessage::new("hi", "alice", "a.png"));
    assert_eq!(next_event(&mut x).await, expected);
    assert_eq!(next_event(&mut y).await, expected);
}

#[actix_web::test]
async fn test_typing_notice_skips_sender() {
    let (addr, state) = start();
    let mut x = connect(addr).await;
    let mut y = connect(addr).await;
    wait_for_connections(&state, 2).await;

    send(&mut x, json!({"type": "typing", "payload": {"author": "alice"}})).await;

    assert_eq!(
        next_event(&mut y).await,
        ServerEvent::TypingNotice(TypingNotice::new("alice"))
    );
    expect_silence(&mut x).await;
}

#[actix_web::test]
async fn test_malformed_frames_are_dropped_quietly() {
    let (addr, state) = start();
    let mut x = connect(addr).await;
    let mut y = connect(addr).await;
    wait_for_connections(&state, 2).await;

    x.send(Message::Text("not json".to_string())).await.unwrap();
    send(&mut x, json!({"type": "shout", "payload": "hey"})).await;
    x.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    expect_silence(&mut x).await;
    expect_silence(&mut y).await;

    // still connected and routed
    send(&mut x, json!({"type": "send-message", "payload": {"text": "still here"}})).await;
    let expected = ServerEvent::MessageReceived(ChatMessage {
        text: Some("still here".to_string()),
        ..ChatMessage::default()
    });
    assert_eq!(next_event(&mut y).await, expected);
    assert_eq!(state.hub.stats().await.unwrap().connections, 2);
}

#[actix_web::test]
async fn test_silent_client_is_evicted() {
    let mut settings = Settings::new_for_test().expect("Failed to load test config");
    settings.hub.heartbeat_interval_secs = 1;
    settings.hub.client_timeout_secs = 1;
    let (addr, state) = spawn_server(settings);

    // never polled, so pings go unanswered
    let _lurker = connect(addr).await;
    wait_for_connections(&state, 1).await;

    wait_for_connections(&state, 0).await;
}

#[actix_web::test]
async fn test_typing_burst_is_fully_delivered() {
    const BURST: usize = 500;

    let (addr, state) = start();
    let mut x = connect(addr).await;
    let mut y = connect(addr).await;
    wait_for_connections(&state, 2).await;

    for _ in 0..BURST {
        x.feed(Message::Text(json!({"type": "typing", "payload": {"author": "alice"}}).to_string()))
            .await
            .unwrap();
    }
    x.flush().await.unwrap();

    let expected = ServerEvent::TypingNotice(TypingNotice::new("alice"));
    for received in 0..BURST {
        let event = next_event(&mut y).await;
        assert_eq!(event, expected, "unexpected event after {} notices", received);
    }
    expect_silence(&mut x).await;
}

#[actix_web::test]
async fn test_message_burst_reaches_every_participant() {
    const PARTICIPANTS: usize = 6;
    const MESSAGES: usize = 100;

    let (addr, state) = start();
    let mut clients = Vec::new();
    for _ in 0..PARTICIPANTS {
        clients.push(connect(addr).await);
    }
    wait_for_connections(&state, PARTICIPANTS).await;

    for i in 0..MESSAGES {
        let frame = json!({
            "type": "send-message",
            "payload": {"text": format!("line {}", i), "author": "alice", "avatarUrl": "a.png"}
        });
        clients[0].feed(Message::Text(frame.to_string())).await.unwrap();
    }
    clients[0].flush().await.unwrap();

    for client in clients.iter_mut() {
        for i in 0..MESSAGES {
            let expected = ServerEvent::MessageReceived(ChatMessage::new(format!("line {}", i), "alice", "a.png"));
            assert_eq!(next_event(client).await, expected);
        }
    }
}
