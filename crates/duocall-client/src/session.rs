use std::sync::Arc;

use duocall_media::{LocalMedia, MediaConstraints, MediaSource, TrackKind, VideoSink};
use duocall_protocol::{ClientMessage, ServerMessage};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ClientConfig;
use crate::devices;
use crate::error::{ClientError, Result};
use crate::peer::{PeerEvent, PeerFactory, PeerLink};
use crate::signaling::{SignalEvent, SignalingChannel};

/// Lifecycle of a client's pairing.
///
/// `Disconnected` is terminal for this client instance; re-entry to
/// `Waiting` happens only through a fresh join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Waiting,
    Connected,
    Disconnected,
}

/// User-facing notices that are not state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Admission was rejected; the room already has two members.
    RoomFull,
}

enum Command {
    SwitchVideo {
        device_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SwitchAudio {
        device_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}

/// Handle on a joined room session.
///
/// Dropping the handle tears the session down: the peer link is closed,
/// local tracks are stopped and the relay connection is released.
pub struct RoomClient {
    cmd_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<SessionStatus>,
    notices: Option<mpsc::UnboundedReceiver<Notice>>,
    participant_id: String,
}

impl RoomClient {
    /// Joins a room. Local media is acquired *before* the relay is
    /// contacted, so an acquisition failure can never leave a registry
    /// entry behind.
    pub async fn join(
        config: ClientConfig,
        media: Arc<dyn MediaSource>,
        peers: Arc<dyn PeerFactory>,
    ) -> Result<Self> {
        let local = media.acquire(&config.constraints).await?;
        let (signaling, signal_rx) = SignalingChannel::connect(&config.relay_url).await?;
        Self::start(config, media, peers, local, signaling, signal_rx)
    }

    /// Join over an already-established channel; the acquire-before-join
    /// ordering is identical.
    pub(crate) async fn join_with_channel(
        config: ClientConfig,
        media: Arc<dyn MediaSource>,
        peers: Arc<dyn PeerFactory>,
        signaling: SignalingChannel,
        signal_rx: mpsc::UnboundedReceiver<SignalEvent>,
    ) -> Result<Self> {
        let local = media.acquire(&config.constraints).await?;
        Self::start(config, media, peers, local, signaling, signal_rx)
    }

    fn start(
        config: ClientConfig,
        media: Arc<dyn MediaSource>,
        peers: Arc<dyn PeerFactory>,
        local: LocalMedia,
        signaling: SignalingChannel,
        signal_rx: mpsc::UnboundedReceiver<SignalEvent>,
    ) -> Result<Self> {
        signaling.send(ClientMessage::JoinRoom {
            room_id: config.room_id.clone(),
            participant_id: config.participant_id.clone(),
        })?;

        let (status_tx, status_rx) = watch::channel(SessionStatus::Waiting);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (peer_inbox, peer_rx) = mpsc::unbounded_channel();

        let mut preview = VideoSink::new();
        if let Some(video) = &local.video {
            preview.attach(video.id());
        }

        let task = SessionTask {
            self_id: config.participant_id.clone(),
            signaling,
            media,
            peers,
            constraints: config.constraints,
            local,
            peer: None,
            peer_inbox,
            link_gen: 0,
            status_tx,
            notice_tx,
            preview,
            remote_sink: VideoSink::new(),
        };
        tokio::spawn(task.run(signal_rx, peer_rx, cmd_rx));

        Ok(Self {
            cmd_tx,
            status_rx,
            notices: Some(notice_rx),
            participant_id: config.participant_id,
        })
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_rx.borrow()
    }

    /// Watch handle for status transitions.
    pub fn status_stream(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Takes the notice stream (full-room and similar user-facing alerts).
    pub fn take_notices(&mut self) -> Option<mpsc::UnboundedReceiver<Notice>> {
        self.notices.take()
    }

    pub async fn switch_video(&self, device_id: &str) -> Result<()> {
        self.switch(TrackKind::Video, device_id).await
    }

    pub async fn switch_audio(&self, device_id: &str) -> Result<()> {
        self.switch(TrackKind::Audio, device_id).await
    }

    async fn switch(&self, kind: TrackKind, device_id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let cmd = match kind {
            TrackKind::Video => Command::SwitchVideo {
                device_id: device_id.to_owned(),
                reply,
            },
            TrackKind::Audio => Command::SwitchAudio {
                device_id: device_id.to_owned(),
                reply,
            },
        };
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Leaves the room, completing only after teardown finished.
    pub async fn leave(self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Leave { reply })
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }
}

/// The session state machine. Everything it owns is touched only from its
/// own task; relay events, peer events and commands land in one inbox per
/// source and are processed to completion one at a time, which is what
/// keeps events ordered relative to in-flight async operations.
pub(crate) struct SessionTask {
    pub(crate) self_id: String,
    pub(crate) signaling: SignalingChannel,
    pub(crate) media: Arc<dyn MediaSource>,
    pub(crate) peers: Arc<dyn PeerFactory>,
    pub(crate) constraints: MediaConstraints,
    pub(crate) local: LocalMedia,
    pub(crate) peer: Option<Arc<dyn PeerLink>>,
    pub(crate) peer_inbox: mpsc::UnboundedSender<(u64, PeerEvent)>,
    pub(crate) link_gen: u64,
    pub(crate) status_tx: watch::Sender<SessionStatus>,
    pub(crate) notice_tx: mpsc::UnboundedSender<Notice>,
    pub(crate) preview: VideoSink,
    pub(crate) remote_sink: VideoSink,
}

impl SessionTask {
    async fn run(
        mut self,
        mut signal_rx: mpsc::UnboundedReceiver<SignalEvent>,
        mut peer_rx: mpsc::UnboundedReceiver<(u64, PeerEvent)>,
        mut cmd_rx: mpsc::Receiver<Command>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Leave { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    // Handle dropped: unmount.
                    None => break,
                },
                Some(event) = signal_rx.recv() => match event {
                    SignalEvent::Message(msg) => self.handle_relay(msg).await,
                    SignalEvent::Closed => {
                        tracing::info!("signaling connection lost");
                        self.handle_departure().await;
                        break;
                    }
                },
                Some((generation, event)) = peer_rx.recv() => self.handle_peer_event(generation, event).await,
                else => break,
            }
        }
        self.teardown().await;
    }

    fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    fn set_status(&self, status: SessionStatus) {
        let _ = self.status_tx.send(status);
    }

    /// Fresh event channel for one peer link, tagged with a generation so
    /// events from an abandoned link can never act on its successor.
    fn next_link_channel(&mut self) -> mpsc::UnboundedSender<PeerEvent> {
        self.link_gen += 1;
        let generation = self.link_gen;
        let inbox = self.peer_inbox.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if inbox.send((generation, event)).is_err() {
                    break;
                }
            }
        });
        tx
    }

    /// Every relay event is defined for every state; unexpected pairs are
    /// deliberate no-ops rather than unhandled cases.
    async fn handle_relay(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::UserConnected { participant_id } => {
                if self.status() == SessionStatus::Waiting && self.peer.is_none() {
                    self.initiate(&participant_id).await;
                } else {
                    tracing::debug!(
                        "ignoring user-connected({}) in {:?}",
                        participant_id,
                        self.status()
                    );
                }
            }
            ServerMessage::UserDisconnected { participant_id } => {
                tracing::info!("peer {} departed", participant_id);
                self.handle_departure().await;
            }
            ServerMessage::FullRoom { participant_id } => {
                if participant_id == self.self_id {
                    tracing::warn!("room is full, join rejected");
                    let _ = self.notice_tx.send(Notice::RoomFull);
                }
            }
            ServerMessage::RtcOffer { from, sdp } => {
                if self.status() != SessionStatus::Waiting {
                    tracing::debug!("ignoring rtc-offer from {} in {:?}", from, self.status());
                } else if self.peer.is_none() {
                    self.answer(&from, &sdp).await;
                } else if from.as_str() < self.self_id.as_str() {
                    // Both sides offered at once; the lower participant id
                    // wins. Abandon our offer and take theirs.
                    tracing::info!("offer glare with {}, yielding", from);
                    if let Some(peer) = self.peer.take() {
                        peer.close().await;
                    }
                    self.answer(&from, &sdp).await;
                } else {
                    // Glare, but our id is lower: the other side yields and
                    // answers the offer we already sent.
                    tracing::debug!("offer glare with {}, holding our offer", from);
                }
            }
            ServerMessage::RtcAnswer { from, sdp } => {
                if let Some(peer) = &self.peer {
                    if let Err(e) = peer.apply_answer(&sdp).await {
                        tracing::error!("failed to apply answer from {}: {}", from, e);
                    }
                }
            }
            ServerMessage::RtcIceCandidate { from, candidate } => {
                if let Some(peer) = &self.peer {
                    if let Err(e) = peer.add_ice_candidate(&candidate).await {
                        tracing::warn!("failed to add ICE candidate from {}: {}", from, e);
                    }
                }
            }
        }
    }

    /// Outbound negotiation toward a newly admitted peer.
    async fn initiate(&mut self, other_id: &str) {
        tracing::info!("initiating session toward {}", other_id);
        let events = self.next_link_channel();
        let peer = match self.peers.create(&self.local, events).await {
            Ok(peer) => peer,
            Err(e) => {
                tracing::error!("failed to create peer link: {}", e);
                return;
            }
        };

        match peer.create_offer().await {
            Ok(sdp) => {
                self.peer = Some(peer);
                if self.signaling.send(ClientMessage::RtcOffer { sdp }).is_err() {
                    tracing::error!("signaling channel closed while sending offer");
                }
            }
            Err(e) => {
                // No retry; the session stays waiting for the next event.
                tracing::error!("offer creation failed: {}", e);
                peer.close().await;
            }
        }
    }

    /// Inbound negotiation from the other side.
    async fn answer(&mut self, from: &str, offer_sdp: &str) {
        tracing::info!("answering session request from {}", from);
        let events = self.next_link_channel();
        let peer = match self.peers.create(&self.local, events).await {
            Ok(peer) => peer,
            Err(e) => {
                tracing::error!("failed to create peer link: {}", e);
                return;
            }
        };

        match peer.accept_offer(offer_sdp).await {
            Ok(sdp) => {
                self.peer = Some(peer);
                if self
                    .signaling
                    .send(ClientMessage::RtcAnswer { sdp })
                    .is_err()
                {
                    tracing::error!("signaling channel closed while sending answer");
                }
            }
            Err(e) => {
                tracing::error!("offer accept failed: {}", e);
                peer.close().await;
            }
        }
    }

    async fn handle_peer_event(&mut self, generation: u64, event: PeerEvent) {
        if generation != self.link_gen {
            // The link that sent this was superseded.
            return;
        }
        match event {
            PeerEvent::RemoteTrack(stream) => {
                if self.peer.is_none() {
                    // Late event from a link that was already torn down.
                    return;
                }
                if stream.kind == TrackKind::Video && !self.remote_sink.attach(&stream.id) {
                    tracing::debug!("remote stream {} already attached", stream.id);
                }
                if self.status() == SessionStatus::Waiting {
                    tracing::info!("remote stream attached, session connected");
                    self.set_status(SessionStatus::Connected);
                }
            }
            PeerEvent::LocalCandidate(candidate) => {
                if self.peer.is_some() {
                    let _ = self
                        .signaling
                        .send(ClientMessage::RtcIceCandidate { candidate });
                }
            }
            PeerEvent::Closed => {
                if self.peer.is_some() {
                    tracing::info!("peer link closed");
                    self.handle_departure().await;
                }
            }
        }
    }

    /// Shared teardown for user-disconnected, relay loss and peer failure.
    ///
    /// A departure while still `Waiting` only aborts the in-flight pairing
    /// attempt; the session keeps waiting for the next arrival.
    async fn handle_departure(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
        self.remote_sink.clear();
        if self.status() == SessionStatus::Connected {
            self.set_status(SessionStatus::Disconnected);
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SwitchVideo { device_id, reply } => {
                let result = devices::switch_track(self, TrackKind::Video, &device_id).await;
                let _ = reply.send(result);
            }
            Command::SwitchAudio { device_id, reply } => {
                let result = devices::switch_track(self, TrackKind::Audio, &device_id).await;
                let _ = reply.send(result);
            }
            Command::Leave { .. } => unreachable!("handled in run"),
        }
    }

    /// Ordered teardown: close the pairing, release held tracks, drop the
    /// relay connection. Safe to call twice.
    async fn teardown(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
        self.remote_sink.clear();
        self.local.stop_all();
        self.preview.clear();
        self.set_status(SessionStatus::Disconnected);
    }
}
