use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of participants admitted to a room.
pub const ROOM_CAPACITY: usize = 2;

/// Room id used by deployments that only ever run a single room.
///
/// The protocol itself is room-parametric; this is just the client default.
pub const DEFAULT_ROOM_ID: &str = "123456";

/// An admitted participant as tracked by the relay's registry.
///
/// `connection_id` is assigned by the relay per physical connection and is
/// never reused across reconnects; `participant_id` is chosen by the client
/// and may reappear under a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub connection_id: Uuid,
    pub room_id: String,
}
