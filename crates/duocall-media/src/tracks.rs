use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally captured outgoing track.
///
/// The webrtc-level track is shared with the peer connection; the stop flag
/// is observed by whatever capture loop feeds it samples.
#[derive(Clone)]
pub struct LocalTrack {
    kind: TrackKind,
    device_id: Option<String>,
    rtc: Arc<TrackLocalStaticSample>,
    stopped: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, track_id: String, device_id: Option<String>) -> Self {
        let capability = match kind {
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
        };

        let rtc = Arc::new(TrackLocalStaticSample::new(
            capability,
            track_id,
            "duocall".to_owned(),
        ));

        Self {
            kind,
            device_id,
            rtc,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        self.rtc.id()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn rtc(&self) -> Arc<TrackLocalStaticSample> {
        self.rtc.clone()
    }

    /// Signals the capture loop feeding this track to stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Handle on the stop flag for capture loops.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("id", &self.id())
            .field("device_id", &self.device_id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The set of local tracks owned by one client session.
#[derive(Debug, Default, Clone)]
pub struct LocalMedia {
    pub video: Option<LocalTrack>,
    pub audio: Option<LocalTrack>,
}

impl LocalMedia {
    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        match kind {
            TrackKind::Video => self.video.as_ref(),
            TrackKind::Audio => self.audio.as_ref(),
        }
    }

    /// Installs a new track for `kind`, returning the one it displaced.
    pub fn replace(&mut self, track: LocalTrack) -> Option<LocalTrack> {
        match track.kind() {
            TrackKind::Video => self.video.replace(track),
            TrackKind::Audio => self.audio.replace(track),
        }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.video.iter().chain(self.audio.iter())
    }

    pub fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// A remote track surfaced by the peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
    pub kind: TrackKind,
}
