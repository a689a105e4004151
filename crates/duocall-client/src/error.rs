use duocall_media::MediaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("media acquisition failed: {0}")]
    Media(#[from] MediaError),

    #[error("signaling channel error: {0}")]
    Signaling(String),

    #[error("signaling channel closed")]
    ChannelClosed,

    #[error("negotiation failed: {0}")]
    Negotiation(#[from] webrtc::Error),

    #[error("recording failed: {0}")]
    Recording(#[from] std::io::Error),

    #[error("session is shutting down")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
