use serde::{Deserialize, Serialize};

/// Messages sent from client to server over the signaling channel.
///
/// Variant names on the wire keep the event names the deployed clients
/// already speak (`joinRoom`, `rtc-offer`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Request admission to a room.
    #[serde(rename = "joinRoom")]
    JoinRoom {
        room_id: String,
        participant_id: String,
    },

    /// Negotiation offer, relayed to the other room member.
    #[serde(rename = "rtc-offer")]
    RtcOffer { sdp: String },

    /// Negotiation answer, relayed to the other room member.
    #[serde(rename = "rtc-answer")]
    RtcAnswer { sdp: String },

    /// ICE candidate, relayed to the other room member.
    #[serde(rename = "rtc-ice-candidate")]
    RtcIceCandidate { candidate: String },
}

/// Messages sent from server to client over the signaling channel.
///
/// Delivery is best-effort and at-most-once; a client that joins after an
/// event fired never sees it retroactively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Admission rejected, room is at capacity. Sent to the requester only.
    #[serde(rename = "full-room")]
    FullRoom { participant_id: String },

    /// A new member was admitted. Sent to every other room member.
    #[serde(rename = "user-connected")]
    UserConnected { participant_id: String },

    /// A member departed. Sent to the remaining room members.
    #[serde(rename = "user-disconnected")]
    UserDisconnected { participant_id: String },

    /// Negotiation offer from the other room member.
    #[serde(rename = "rtc-offer")]
    RtcOffer { from: String, sdp: String },

    /// Negotiation answer from the other room member.
    #[serde(rename = "rtc-answer")]
    RtcAnswer { from: String, sdp: String },

    /// ICE candidate from the other room member.
    #[serde(rename = "rtc-ice-candidate")]
    RtcIceCandidate { from: String, candidate: String },
}
