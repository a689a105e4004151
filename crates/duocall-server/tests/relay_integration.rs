//! Integration tests for the Duocall relay
//!
//! Each test serves the real app on an ephemeral port and drives it with
//! plain WebSocket clients.
//!
//! Run with: cargo test -p duocall-server --test relay_integration

use duocall_protocol::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: std::net::SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> anyhow::Result<Self> {
        let config = duocall_server::state::Config {
            bind_address: "127.0.0.1:0".to_string(),
        };
        let state = duocall_server::state::AppState::new(config);
        let router = duocall_server::create_app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn connect(server: &TestServer) -> WsClient {
    let (stream, _) = connect_async(server.ws_url())
        .await
        .expect("websocket connect failed");
    stream
}

async fn join(client: &mut WsClient, room_id: &str, participant_id: &str) {
    let msg = ClientMessage::JoinRoom {
        room_id: room_id.to_string(),
        participant_id: participant_id.to_string(),
    };
    client
        .send(Message::Text(serde_json::to_string(&msg).unwrap().into()))
        .await
        .expect("send failed");
}

async fn recv_event(client: &mut WsClient) -> ServerMessage {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("invalid server message");
        }
    }
}

async fn assert_silent(client: &mut WsClient) {
    let result = timeout(Duration::from_millis(300), client.next()).await;
    assert!(result.is_err(), "expected no event, got {result:?}");
}

#[tokio::test]
async fn scenario_a_pairing_and_capacity() {
    let server = TestServer::start().await.unwrap();

    // P1 joins; nobody to notify.
    let mut p1 = connect(&server).await;
    join(&mut p1, "R", "p1").await;
    assert_silent(&mut p1).await;

    // P2 joins; only P1 hears about it.
    let mut p2 = connect(&server).await;
    join(&mut p2, "R", "p2").await;
    match recv_event(&mut p1).await {
        ServerMessage::UserConnected { participant_id } => assert_eq!(participant_id, "p2"),
        other => panic!("expected user-connected, got {other:?}"),
    }
    assert_silent(&mut p2).await;

    // P3 is rejected with a private full-room; members hear nothing.
    let mut p3 = connect(&server).await;
    join(&mut p3, "R", "p3").await;
    match recv_event(&mut p3).await {
        ServerMessage::FullRoom { participant_id } => assert_eq!(participant_id, "p3"),
        other => panic!("expected full-room, got {other:?}"),
    }
    assert_silent(&mut p1).await;
    assert_silent(&mut p2).await;
}

#[tokio::test]
async fn scenario_b_departure_reopens_the_room() {
    let server = TestServer::start().await.unwrap();

    let mut p1 = connect(&server).await;
    join(&mut p1, "R", "p1").await;
    let mut p2 = connect(&server).await;
    join(&mut p2, "R", "p2").await;
    recv_event(&mut p1).await; // user-connected(p2)

    // P2's connection drops without an explicit leave.
    drop(p2);

    match recv_event(&mut p1).await {
        ServerMessage::UserDisconnected { participant_id } => assert_eq!(participant_id, "p2"),
        other => panic!("expected user-disconnected, got {other:?}"),
    }
    assert_silent(&mut p1).await; // exactly one departure event

    // Room reopens for P3.
    let mut p3 = connect(&server).await;
    join(&mut p3, "R", "p3").await;
    match recv_event(&mut p1).await {
        ServerMessage::UserConnected { participant_id } => assert_eq!(participant_id, "p3"),
        other => panic!("expected user-connected, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_connection_dropping_announces_nothing() {
    let server = TestServer::start().await.unwrap();

    let mut p1 = connect(&server).await;
    join(&mut p1, "R", "p1").await;
    let mut p2 = connect(&server).await;
    join(&mut p2, "R", "p2").await;
    recv_event(&mut p1).await;

    let mut p3 = connect(&server).await;
    join(&mut p3, "R", "p3").await;
    recv_event(&mut p3).await; // full-room
    drop(p3);

    assert_silent(&mut p1).await;
    assert_silent(&mut p2).await;
}

#[tokio::test]
async fn offer_answer_exchange_is_relayed_between_members() {
    let server = TestServer::start().await.unwrap();

    let mut p1 = connect(&server).await;
    join(&mut p1, "R", "p1").await;
    let mut p2 = connect(&server).await;
    join(&mut p2, "R", "p2").await;
    recv_event(&mut p1).await;

    let offer = ClientMessage::RtcOffer {
        sdp: "v=0 offer".into(),
    };
    p1.send(Message::Text(
        serde_json::to_string(&offer).unwrap().into(),
    ))
    .await
    .unwrap();

    match recv_event(&mut p2).await {
        ServerMessage::RtcOffer { from, sdp } => {
            assert_eq!(from, "p1");
            assert_eq!(sdp, "v=0 offer");
        }
        other => panic!("expected rtc-offer, got {other:?}"),
    }

    let answer = ClientMessage::RtcAnswer {
        sdp: "v=0 answer".into(),
    };
    p2.send(Message::Text(
        serde_json::to_string(&answer).unwrap().into(),
    ))
    .await
    .unwrap();

    match recv_event(&mut p1).await {
        ServerMessage::RtcAnswer { from, sdp } => {
            assert_eq!(from, "p2");
            assert_eq!(sdp, "v=0 answer");
        }
        other => panic!("expected rtc-answer, got {other:?}"),
    }
}

#[tokio::test]
async fn rooms_do_not_bleed_into_each_other() {
    let server = TestServer::start().await.unwrap();

    let mut a1 = connect(&server).await;
    join(&mut a1, "A", "a1").await;
    let mut b1 = connect(&server).await;
    join(&mut b1, "B", "b1").await;

    let mut a2 = connect(&server).await;
    join(&mut a2, "A", "a2").await;

    match recv_event(&mut a1).await {
        ServerMessage::UserConnected { participant_id } => assert_eq!(participant_id, "a2"),
        other => panic!("expected user-connected, got {other:?}"),
    }
    assert_silent(&mut b1).await;
}
