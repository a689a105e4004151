use duocall_protocol::{ClientMessage, ServerMessage};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::registry::{Admission, ConnectionRegistry};

/// Room-grouped broadcast relay.
///
/// Owns one outbound sender per live connection and the room broadcast
/// groups; admission decisions are delegated to the [`ConnectionRegistry`].
/// Delivery is fire-and-forget: sends go to an unbounded channel drained by
/// the connection's socket task and are never awaited on acknowledgment.
pub struct RoomRelay {
    registry: ConnectionRegistry,
    senders: RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>,
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,
}

impl RoomRelay {
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            senders: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Registers a connection's outbound channel on socket accept. The
    /// connection belongs to no room until a join succeeds.
    pub async fn register(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.senders.write().await.insert(connection_id, sender);
        tracing::debug!("connection {} registered", connection_id);
    }

    /// Handles a `joinRoom` request. On `RoomFull` only the requesting
    /// connection is notified; on admission the connection is added to the
    /// broadcast group and every *other* member learns about the arrival.
    pub async fn join_room(&self, connection_id: Uuid, room_id: &str, participant_id: &str) {
        match self
            .registry
            .join(room_id, participant_id, connection_id)
            .await
        {
            Admission::RoomFull => {
                tracing::info!(
                    "room {} full, rejecting participant {}",
                    room_id,
                    participant_id
                );
                self.send_to_connection(
                    connection_id,
                    &ServerMessage::FullRoom {
                        participant_id: participant_id.to_owned(),
                    },
                )
                .await;
            }
            Admission::Admitted => {
                self.rooms
                    .write()
                    .await
                    .entry(room_id.to_owned())
                    .or_default()
                    .insert(connection_id);

                self.broadcast_except(
                    room_id,
                    connection_id,
                    &ServerMessage::UserConnected {
                        participant_id: participant_id.to_owned(),
                    },
                )
                .await;
            }
        }
    }

    /// Invoked when a connection drops for any reason. The departure is
    /// announced at most once, and only after the registry removal
    /// succeeded; connections that never joined announce nothing.
    pub async fn disconnect(&self, connection_id: Uuid) {
        self.senders.write().await.remove(&connection_id);

        let Some(participant) = self.registry.leave(connection_id).await else {
            return;
        };

        {
            let mut rooms = self.rooms.write().await;
            if let Some(group) = rooms.get_mut(&participant.room_id) {
                group.remove(&connection_id);
                if group.is_empty() {
                    rooms.remove(&participant.room_id);
                }
            }
        }

        self.broadcast_except(
            &participant.room_id,
            connection_id,
            &ServerMessage::UserDisconnected {
                participant_id: participant.participant_id,
            },
        )
        .await;
    }

    /// Forwards a peer negotiation message to the other member of the
    /// sender's room, stamped with the sender's participant id. Messages
    /// from connections that never joined are dropped.
    pub async fn forward(&self, connection_id: Uuid, message: ClientMessage) {
        let Some(sender) = self.registry.find(connection_id).await else {
            tracing::debug!(
                "dropping signaling message from unadmitted connection {}",
                connection_id
            );
            return;
        };

        let relayed = match message {
            ClientMessage::RtcOffer { sdp } => ServerMessage::RtcOffer {
                from: sender.participant_id.clone(),
                sdp,
            },
            ClientMessage::RtcAnswer { sdp } => ServerMessage::RtcAnswer {
                from: sender.participant_id.clone(),
                sdp,
            },
            ClientMessage::RtcIceCandidate { candidate } => ServerMessage::RtcIceCandidate {
                from: sender.participant_id.clone(),
                candidate,
            },
            ClientMessage::JoinRoom { .. } => return,
        };

        self.broadcast_except(&sender.room_id, connection_id, &relayed)
            .await;
    }

    pub async fn send_to_connection(&self, connection_id: Uuid, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("failed to serialize message: {}", e);
                return;
            }
        };

        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&connection_id) {
            if let Err(e) = sender.send(json) {
                tracing::error!("failed to send to {}: {}", connection_id, e);
            }
        }
    }

    async fn broadcast_except(&self, room_id: &str, exclude: Uuid, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("failed to serialize message: {}", e);
                return;
            }
        };

        let rooms = self.rooms.read().await;
        let senders = self.senders.read().await;

        if let Some(group) = rooms.get(room_id) {
            for conn_id in group {
                if *conn_id == exclude {
                    continue;
                }
                if let Some(sender) = senders.get(conn_id) {
                    if let Err(e) = sender.send(json.clone()) {
                        tracing::error!("failed to send to {}: {}", conn_id, e);
                    }
                }
            }
        }
    }
}

impl Default for RoomRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestConn {
        id: Uuid,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl TestConn {
        async fn connect(relay: &RoomRelay) -> Self {
            let id = Uuid::new_v4();
            let (tx, rx) = mpsc::unbounded_channel();
            relay.register(id, tx).await;
            Self { id, rx }
        }

        fn next(&mut self) -> Option<ServerMessage> {
            self.rx
                .try_recv()
                .ok()
                .map(|json| serde_json::from_str(&json).unwrap())
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Some(msg) = self.next() {
                out.push(msg);
            }
            out
        }
    }

    #[tokio::test]
    async fn first_join_announces_to_nobody() {
        let relay = RoomRelay::new();
        let mut p1 = TestConn::connect(&relay).await;

        relay.join_room(p1.id, "r", "p1").await;

        assert_eq!(relay.registry().occupancy("r").await, 1);
        assert!(p1.next().is_none());
    }

    #[tokio::test]
    async fn second_join_notifies_only_the_existing_member() {
        let relay = RoomRelay::new();
        let mut p1 = TestConn::connect(&relay).await;
        let mut p2 = TestConn::connect(&relay).await;

        relay.join_room(p1.id, "r", "p1").await;
        relay.join_room(p2.id, "r", "p2").await;

        match p1.next() {
            Some(ServerMessage::UserConnected { participant_id }) => {
                assert_eq!(participant_id, "p2")
            }
            other => panic!("expected user-connected, got {other:?}"),
        }
        assert!(p2.next().is_none(), "joiner must not hear its own arrival");
    }

    #[tokio::test]
    async fn third_join_gets_exactly_one_full_room_and_nothing_leaks() {
        let relay = RoomRelay::new();
        let mut p1 = TestConn::connect(&relay).await;
        let mut p2 = TestConn::connect(&relay).await;
        let mut p3 = TestConn::connect(&relay).await;

        relay.join_room(p1.id, "r", "p1").await;
        relay.join_room(p2.id, "r", "p2").await;
        p1.drain();
        p2.drain();

        relay.join_room(p3.id, "r", "p3").await;

        let to_p3 = p3.drain();
        assert_eq!(to_p3.len(), 1);
        match &to_p3[0] {
            ServerMessage::FullRoom { participant_id } => assert_eq!(participant_id, "p3"),
            other => panic!("expected full-room, got {other:?}"),
        }
        assert!(p1.next().is_none());
        assert!(p2.next().is_none());
        assert_eq!(relay.registry().occupancy("r").await, 2);
    }

    #[tokio::test]
    async fn disconnect_announces_once_and_only_for_admitted_connections() {
        let relay = RoomRelay::new();
        let mut p1 = TestConn::connect(&relay).await;
        let p2 = TestConn::connect(&relay).await;

        relay.join_room(p1.id, "r", "p1").await;
        relay.join_room(p2.id, "r", "p2").await;
        p1.drain();

        relay.disconnect(p2.id).await;
        relay.disconnect(p2.id).await; // repeated drop detection

        let events = p1.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerMessage::UserDisconnected { participant_id } => {
                assert_eq!(participant_id, "p2")
            }
            other => panic!("expected user-disconnected, got {other:?}"),
        }
        assert!(relay.registry().find(p2.id).await.is_none());
    }

    #[tokio::test]
    async fn never_admitted_connection_disconnects_silently() {
        let relay = RoomRelay::new();
        let mut p1 = TestConn::connect(&relay).await;
        let lurker = TestConn::connect(&relay).await;

        relay.join_room(p1.id, "r", "p1").await;
        relay.disconnect(lurker.id).await;

        assert!(p1.next().is_none());
    }

    #[tokio::test]
    async fn rtc_messages_reach_only_the_other_member() {
        let relay = RoomRelay::new();
        let mut p1 = TestConn::connect(&relay).await;
        let mut p2 = TestConn::connect(&relay).await;

        relay.join_room(p1.id, "r", "p1").await;
        relay.join_room(p2.id, "r", "p2").await;
        p1.drain();

        relay
            .forward(p1.id, ClientMessage::RtcOffer { sdp: "v=0".into() })
            .await;

        match p2.next() {
            Some(ServerMessage::RtcOffer { from, sdp }) => {
                assert_eq!(from, "p1");
                assert_eq!(sdp, "v=0");
            }
            other => panic!("expected rtc-offer, got {other:?}"),
        }
        assert!(p1.next().is_none());
    }

    #[tokio::test]
    async fn rtc_from_unadmitted_connection_is_dropped() {
        let relay = RoomRelay::new();
        let mut p1 = TestConn::connect(&relay).await;
        let outsider = TestConn::connect(&relay).await;

        relay.join_room(p1.id, "r", "p1").await;
        relay
            .forward(outsider.id, ClientMessage::RtcOffer { sdp: "v=0".into() })
            .await;

        assert!(p1.next().is_none());
    }
}
