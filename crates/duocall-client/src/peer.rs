use std::sync::Arc;

use async_trait::async_trait;
use duocall_media::{LocalMedia, LocalTrack, RemoteStream, TrackKind};
use tokio::sync::mpsc;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;

use crate::error::{ClientError, Result};

/// Events a peer link surfaces back into the session loop.
#[derive(Debug)]
pub enum PeerEvent {
    /// A remote track arrived; attaching it completes the pairing.
    RemoteTrack(RemoteStream),
    /// A locally gathered ICE candidate to relay to the other side.
    LocalCandidate(String),
    /// The underlying connection failed or closed.
    Closed,
}

/// One active peer pairing. The session holds at most one at a time.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Produces the outbound offer SDP.
    async fn create_offer(&self) -> Result<String>;

    /// Accepts an inbound offer and produces the answer SDP.
    async fn accept_offer(&self, sdp: &str) -> Result<String>;

    async fn apply_answer(&self, sdp: &str) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()>;

    /// Swaps the outgoing track of the matching kind without renegotiating.
    /// Returns `false` when no sender of that kind exists yet.
    async fn replace_sender_track(&self, track: &LocalTrack) -> Result<bool>;

    async fn close(&self);
}

#[async_trait]
pub trait PeerFactory: Send + Sync {
    /// Builds a link carrying the given local tracks; events flow into the
    /// session loop's inbox.
    async fn create(
        &self,
        local: &LocalMedia,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>>;
}

/// [`PeerFactory`] backed by the webrtc crate.
pub struct RtcPeerFactory {
    stun_servers: Vec<String>,
}

impl RtcPeerFactory {
    pub fn new(stun_servers: Vec<String>) -> Self {
        Self { stun_servers }
    }
}

#[async_trait]
impl PeerFactory for RtcPeerFactory {
    async fn create(
        &self,
        local: &LocalMedia,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let api = APIBuilder::new().with_media_engine(media_engine).build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);

        for track in local.tracks() {
            pc.add_track(track.rtc() as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
        }

        let track_events = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Video => Some(TrackKind::Video),
                RTPCodecType::Audio => Some(TrackKind::Audio),
                _ => None,
            };
            if let Some(kind) = kind {
                let _ = track_events.send(PeerEvent::RemoteTrack(RemoteStream {
                    id: track.id().to_string(),
                    kind,
                }));
            }
            Box::pin(async {})
        }));

        let ice_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let ice_events = ice_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => match serde_json::to_string(&init) {
                        Ok(json) => {
                            let _ = ice_events.send(PeerEvent::LocalCandidate(json));
                        }
                        Err(e) => tracing::error!("failed to serialize ICE candidate: {}", e),
                    },
                    Err(e) => tracing::error!("failed to convert ICE candidate: {}", e),
                }
            })
        }));

        let state_events = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::debug!("peer connection state: {}", state);
            if matches!(
                state,
                RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed
                    | RTCPeerConnectionState::Disconnected
            ) {
                let _ = state_events.send(PeerEvent::Closed);
            }
            Box::pin(async {})
        }));

        Ok(Arc::new(RtcPeerLink { pc }))
    }
}

/// [`PeerLink`] over a real `RTCPeerConnection`.
pub struct RtcPeerLink {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    async fn create_offer(&self) -> Result<String> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    async fn accept_offer(&self, sdp: &str) -> Result<String> {
        let offer = RTCSessionDescription::offer(sdp.to_string())?;
        self.pc.set_remote_description(offer).await?;

        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(answer.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_str(candidate)
            .map_err(|e| ClientError::Signaling(format!("bad ICE candidate: {e}")))?;
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn replace_sender_track(&self, track: &LocalTrack) -> Result<bool> {
        let wanted = match track.kind() {
            TrackKind::Video => RTPCodecType::Video,
            TrackKind::Audio => RTPCodecType::Audio,
        };

        for sender in self.pc.get_senders().await {
            let Some(current) = sender.track().await else {
                continue;
            };
            if current.kind() != wanted {
                continue;
            }
            sender
                .replace_track(Some(track.rtc() as Arc<dyn TrackLocal + Send + Sync>))
                .await?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::debug!("peer connection close failed: {}", e);
        }
    }
}
