//! Duocall client library
//!
//! Turns relay membership events into an established peer media session:
//! - [`session::RoomClient`] — join a room and run the session state machine
//! - device switching without renegotiation (mid-session camera/mic change)
//! - [`capture::CaptureSession`] — chunked screen recording, independent of
//!   the peer session
//!
//! UI rendering and application bootstrap live elsewhere; this crate stops
//! at streams, sinks and status.

pub mod capture;
pub mod config;
mod devices;
pub mod error;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{Notice, RoomClient, SessionStatus};

// Device selection surface: the client re-exports the enumeration lists.
pub use duocall_media::{list_audio_devices, list_video_devices, MediaDeviceInfo};
