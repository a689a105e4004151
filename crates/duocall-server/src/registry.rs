use duocall_protocol::{Participant, ROOM_CAPACITY};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Outcome of a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    RoomFull,
}

/// Bookkeeping of admitted participants, keyed by connection id.
///
/// Room membership is derived by filtering; there is no Room entity. All
/// mutation goes through one mutex so the occupancy check and the insert
/// are a single critical section, which is what keeps `|room| <= 2` true
/// under concurrent join attempts.
pub struct ConnectionRegistry {
    participants: Mutex<HashMap<Uuid, Participant>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            participants: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic check-and-insert. On `RoomFull` nothing is mutated; the
    /// caller is responsible for wiring the broadcast group and announcing
    /// the arrival on `Admitted`.
    pub async fn join(
        &self,
        room_id: &str,
        participant_id: &str,
        connection_id: Uuid,
    ) -> Admission {
        let mut participants = self.participants.lock().await;

        let occupancy = participants
            .values()
            .filter(|p| p.room_id == room_id)
            .count();
        if occupancy >= ROOM_CAPACITY {
            return Admission::RoomFull;
        }

        participants.insert(
            connection_id,
            Participant {
                participant_id: participant_id.to_owned(),
                connection_id,
                room_id: room_id.to_owned(),
            },
        );

        tracing::debug!(
            "participant {} admitted to room {} on connection {}",
            participant_id,
            room_id,
            connection_id
        );
        Admission::Admitted
    }

    /// Removes by connection id (not participant identity) and returns the
    /// removed record so the caller can announce the departure. Unknown
    /// connections are a no-op.
    pub async fn leave(&self, connection_id: Uuid) -> Option<Participant> {
        let removed = self.participants.lock().await.remove(&connection_id);
        if let Some(p) = &removed {
            tracing::debug!(
                "participant {} left room {} (connection {})",
                p.participant_id,
                p.room_id,
                connection_id
            );
        }
        removed
    }

    pub async fn find(&self, connection_id: Uuid) -> Option<Participant> {
        self.participants.lock().await.get(&connection_id).cloned()
    }

    pub async fn members(&self, room_id: &str) -> Vec<Participant> {
        self.participants
            .lock()
            .await
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect()
    }

    pub async fn occupancy(&self, room_id: &str) -> usize {
        self.members(room_id).await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
