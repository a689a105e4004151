use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tokio::sync::{mpsc, oneshot};
use webrtc::media::Sample;

use crate::error::{MediaError, Result};
use crate::tracks::{LocalMedia, LocalTrack, TrackKind};

/// The currently selected input devices, `None` meaning platform default.
///
/// Single-writer: only the device switch path mutates it; the negotiator
/// reads it when (re)acquiring local media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video_device: Option<String>,
    pub audio_device: Option<String>,
}

impl MediaConstraints {
    pub fn device_for(&self, kind: TrackKind) -> Option<&str> {
        match kind {
            TrackKind::Video => self.video_device.as_deref(),
            TrackKind::Audio => self.audio_device.as_deref(),
        }
    }

    pub fn set_device(&mut self, kind: TrackKind, device_id: String) {
        match kind {
            TrackKind::Video => self.video_device = Some(device_id),
            TrackKind::Audio => self.audio_device = Some(device_id),
        }
    }
}

/// Acquires local capture tracks.
///
/// `acquire` is the join-time path (video-only unless an audio device is
/// selected); `acquire_track` is the device-switch path and touches exactly
/// one kind. A failed acquisition must leave nothing running.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia>;

    async fn acquire_track(&self, kind: TrackKind, device_id: &str) -> Result<LocalTrack>;
}

/// Frame interval for the camera pump (~30 fps).
const VIDEO_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Audio packet duration fed to the track (20ms).
const AUDIO_FRAME_INTERVAL: Duration = Duration::from_millis(20);

static TRACK_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_track_id(kind: TrackKind) -> String {
    let n = TRACK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{kind}-{n}")
}

/// [`MediaSource`] backed by real input devices: nokhwa cameras and cpal
/// microphones, each pumped from a dedicated capture thread into the
/// track's sample writer.
#[derive(Debug, Default)]
pub struct DeviceMediaSource;

impl DeviceMediaSource {
    pub fn new() -> Self {
        Self
    }

    async fn open_video(&self, device_id: Option<&str>) -> Result<LocalTrack> {
        let index = match device_id {
            Some(id) => id.parse::<u32>().map_err(|_| MediaError::DeviceNotFound {
                kind: "video",
                device_id: id.to_owned(),
            })?,
            None => 0,
        };
        let device_id = device_id.map(str::to_owned);

        let track = LocalTrack::new(
            TrackKind::Video,
            next_track_id(TrackKind::Video),
            device_id.clone(),
        );
        let stop = track.stop_flag();

        let (frame_tx, frame_rx) = mpsc::channel::<Vec<u8>>(4);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = match Camera::new(CameraIndex::Index(index), format) {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(MediaError::DeviceUnavailable {
                        kind: "video",
                        device_id: index.to_string(),
                        reason: e.to_string(),
                    }));
                    return;
                }
            };
            if let Err(e) = camera.open_stream() {
                let _ = ready_tx.send(Err(MediaError::DeviceUnavailable {
                    kind: "video",
                    device_id: index.to_string(),
                    reason: e.to_string(),
                }));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while !stop.load(Ordering::SeqCst) {
                match camera.frame() {
                    Ok(frame) => {
                        if frame_tx.blocking_send(frame.buffer().to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("camera read failed, stopping capture: {e}");
                        break;
                    }
                }
                thread::sleep(VIDEO_FRAME_INTERVAL);
            }
            let _ = camera.stop_stream();
        });

        ready_rx
            .await
            .unwrap_or_else(|_| Err(MediaError::NoDefaultDevice("video")))?;

        spawn_sample_pump(track.clone(), frame_rx, VIDEO_FRAME_INTERVAL);
        Ok(track)
    }

    async fn open_audio(&self, device_id: Option<&str>) -> Result<LocalTrack> {
        let device_id = device_id.map(str::to_owned);
        let track = LocalTrack::new(
            TrackKind::Audio,
            next_track_id(TrackKind::Audio),
            device_id.clone(),
        );
        let stop = track.stop_flag();

        let (frame_tx, frame_rx) = mpsc::channel::<Vec<u8>>(8);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let host = cpal::default_host();
            let device = match &device_id {
                Some(id) => match host.input_devices() {
                    Ok(mut devices) => {
                        devices.find(|d| d.name().map(|n| &n == id).unwrap_or(false))
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(MediaError::Enumeration(e.to_string())));
                        return;
                    }
                },
                None => host.default_input_device(),
            };
            let Some(device) = device else {
                let _ = ready_tx.send(Err(match device_id {
                    Some(id) => MediaError::DeviceNotFound {
                        kind: "audio",
                        device_id: id,
                    },
                    None => MediaError::NoDefaultDevice("audio"),
                }));
                return;
            };

            let config = match device.default_input_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(MediaError::DeviceUnavailable {
                        kind: "audio",
                        device_id: device.name().unwrap_or_default(),
                        reason: e.to_string(),
                    }));
                    return;
                }
            };

            let tx = frame_tx.clone();
            let stream = device.build_input_stream(
                &config.into(),
                move |data: &[f32], _| {
                    let mut bytes = Vec::with_capacity(data.len() * 2);
                    for sample in data {
                        let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        bytes.extend_from_slice(&s.to_le_bytes());
                    }
                    let _ = tx.try_send(bytes);
                },
                |e| tracing::warn!("audio capture error: {e}"),
                None,
            );
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(MediaError::DeviceUnavailable {
                        kind: "audio",
                        device_id: device.name().unwrap_or_default(),
                        reason: e.to_string(),
                    }));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(MediaError::DeviceUnavailable {
                    kind: "audio",
                    device_id: device.name().unwrap_or_default(),
                    reason: e.to_string(),
                }));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // The cpal stream lives as long as this thread.
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(AUDIO_FRAME_INTERVAL);
            }
            drop(stream);
        });

        ready_rx
            .await
            .unwrap_or_else(|_| Err(MediaError::NoDefaultDevice("audio")))?;

        spawn_sample_pump(track.clone(), frame_rx, AUDIO_FRAME_INTERVAL);
        Ok(track)
    }
}

/// Forwards captured payloads into the webrtc track until the capture side
/// hangs up or the track is stopped.
fn spawn_sample_pump(track: LocalTrack, mut rx: mpsc::Receiver<Vec<u8>>, duration: Duration) {
    let rtc = track.rtc();
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if track.is_stopped() {
                break;
            }
            let sample = Sample {
                data: Bytes::from(payload),
                duration,
                ..Default::default()
            };
            if let Err(e) = rtc.write_sample(&sample).await {
                tracing::debug!("sample write failed, track likely unbound: {e}");
                break;
            }
        }
    });
}

#[async_trait]
impl MediaSource for DeviceMediaSource {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia> {
        let mut media = LocalMedia::default();

        // Video-only by default; audio joins in once a device is selected.
        let video = self.open_video(constraints.video_device.as_deref()).await?;
        media.replace(video);

        if constraints.audio_device.is_some() {
            match self.open_audio(constraints.audio_device.as_deref()).await {
                Ok(audio) => {
                    media.replace(audio);
                }
                Err(e) => {
                    media.stop_all();
                    return Err(e);
                }
            }
        }

        Ok(media)
    }

    async fn acquire_track(&self, kind: TrackKind, device_id: &str) -> Result<LocalTrack> {
        match kind {
            TrackKind::Video => self.open_video(Some(device_id)).await,
            TrackKind::Audio => self.open_audio(Some(device_id)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_single_kind_update_leaves_other_untouched() {
        let mut constraints = MediaConstraints {
            video_device: Some("cam-0".into()),
            audio_device: Some("mic-0".into()),
        };

        constraints.set_device(TrackKind::Video, "cam-1".into());
        assert_eq!(constraints.video_device.as_deref(), Some("cam-1"));
        assert_eq!(constraints.audio_device.as_deref(), Some("mic-0"));

        constraints.set_device(TrackKind::Audio, "mic-1".into());
        assert_eq!(constraints.video_device.as_deref(), Some("cam-1"));
        assert_eq!(constraints.audio_device.as_deref(), Some("mic-1"));
    }

    #[tokio::test]
    async fn bad_video_device_id_is_rejected_without_side_effects() {
        let source = DeviceMediaSource::new();
        let err = source
            .acquire_track(TrackKind::Video, "not-a-number")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DeviceNotFound { kind: "video", .. }));
    }
}
