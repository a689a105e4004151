use duocall_media::MediaConstraints;
use duocall_protocol::DEFAULT_ROOM_ID;
use uuid::Uuid;

/// Client-side configuration for joining a room.
///
/// The current deployment only ever uses [`DEFAULT_ROOM_ID`], but the relay
/// is room-parametric and `room_id` can name any room.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
    pub room_id: String,
    pub participant_id: String,
    pub stun_servers: Vec<String>,
    pub constraints: MediaConstraints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080/ws".to_string(),
            room_id: DEFAULT_ROOM_ID.to_string(),
            participant_id: Uuid::new_v4().to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            constraints: MediaConstraints::default(),
        }
    }
}
