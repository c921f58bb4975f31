//! End-to-end tests driving a real server over WebSocket.

use futures_util::{SinkExt, StreamExt};
use match_core::protocol::ServerMessage;
use match_core::MatchStatus;
use match_server::{MatchServer, ServerConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (Arc<MatchServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = Arc::new(MatchServer::new(ServerConfig::default()));

    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve(listener).await.unwrap();
    });
    (server, url)
}

async fn connect(url: &str) -> Client {
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn send(client: &mut Client, event: &str, data: serde_json::Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    client.send(Message::Text(frame.into())).await.unwrap();
}

async fn recv(client: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn full_match_over_websocket() {
    let (server, url) = spawn_server().await;
    let mut host = connect(&url).await;
    let mut guest = connect(&url).await;

    send(&mut host, "create-match", json!({ "userId": "alice", "displayName": "Alice" })).await;
    let match_id = match recv(&mut host).await {
        ServerMessage::MatchCreated(view) => {
            assert_eq!(view.status, MatchStatus::Pending);
            view.id
        }
        other => panic!("expected match-created, got {other:?}"),
    };

    send(
        &mut guest,
        "join-match",
        json!({ "matchId": match_id, "userId": "bob", "displayName": "Bob" }),
    )
    .await;
    assert!(matches!(recv(&mut guest).await, ServerMessage::MatchJoined(_)));
    assert!(matches!(recv(&mut host).await, ServerMessage::MatchJoined(_)));

    send(&mut host, "start-match", json!({ "matchId": match_id })).await;
    assert!(matches!(recv(&mut host).await, ServerMessage::MatchStarted(_)));
    assert!(matches!(recv(&mut guest).await, ServerMessage::MatchStarted(_)));

    send(&mut host, "chess-move", json!({ "matchId": match_id, "from": "e2", "to": "e4" })).await;
    for client in [&mut host, &mut guest] {
        match recv(client).await {
            ServerMessage::MatchState(state) => assert_eq!(state.history, vec!["e4".to_string()]),
            other => panic!("expected match-state, got {other:?}"),
        }
    }

    // Moving out of turn is answered only to the mover
    send(&mut host, "chess-move", json!({ "matchId": match_id, "from": "d2", "to": "d4" })).await;
    assert!(matches!(recv(&mut host).await, ServerMessage::InvalidMove(_)));

    server.shutdown();
}

#[tokio::test]
async fn garbage_frames_are_answered_not_fatal() {
    let (server, url) = spawn_server().await;
    let mut client = connect(&url).await;

    client.send(Message::Text("not json".into())).await.unwrap();
    assert!(matches!(recv(&mut client).await, ServerMessage::InvalidMessage(_)));

    send(&mut client, "teleport", json!({})).await;
    assert!(matches!(recv(&mut client).await, ServerMessage::InvalidMessage(_)));

    // The connection is still usable afterwards
    send(&mut client, "create-match", json!({ "userId": "carol" })).await;
    assert!(matches!(recv(&mut client).await, ServerMessage::MatchCreated(_)));

    server.shutdown();
}

#[tokio::test]
async fn disconnect_is_reported_to_the_opponent() {
    let (server, url) = spawn_server().await;
    let mut host = connect(&url).await;
    let mut guest = connect(&url).await;

    send(&mut host, "create-match", json!({ "userId": "alice" })).await;
    let ServerMessage::MatchCreated(view) = recv(&mut host).await else {
        panic!("expected match-created");
    };
    send(&mut guest, "join-match", json!({ "matchId": view.id, "userId": "bob" })).await;
    recv(&mut guest).await;
    recv(&mut host).await;
    send(&mut host, "start-match", json!({ "matchId": view.id })).await;
    recv(&mut host).await;
    recv(&mut guest).await;

    guest.close(None).await.unwrap();

    match recv(&mut host).await {
        ServerMessage::PlayerDisconnected(player) => assert_eq!(player.player_id.0, "bob"),
        other => panic!("expected player-disconnected, got {other:?}"),
    }

    server.shutdown();
}

#[tokio::test]
async fn shutdown_closes_open_sockets() {
    let (server, url) = spawn_server().await;
    let mut client = connect(&url).await;

    // Round trip first so the server has registered the socket
    send(&mut client, "create-match", json!({ "userId": "dave" })).await;
    recv(&mut client).await;

    server.shutdown();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = client.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return true,
                _ => continue,
            }
        }
        true
    })
    .await;
    assert!(matches!(closed, Ok(true)));
}
