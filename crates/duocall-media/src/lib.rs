//! Local media for Duocall clients
//!
//! This crate provides everything below the peer connection:
//! - input device enumeration (cameras via nokhwa, microphones via cpal)
//! - local track acquisition behind the [`MediaSource`] trait
//! - the shared [`MediaConstraints`] read at every (re)acquisition
//! - [`VideoSink`], the idempotent attach point for preview and remote video

pub mod devices;
pub mod error;
pub mod sink;
pub mod source;
pub mod tracks;

pub use devices::{list_audio_devices, list_video_devices, MediaDeviceInfo};
pub use error::MediaError;
pub use sink::VideoSink;
pub use source::{DeviceMediaSource, MediaConstraints, MediaSource};
pub use tracks::{LocalMedia, LocalTrack, RemoteStream, TrackKind};
