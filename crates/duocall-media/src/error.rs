use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("no {kind} device matching '{device_id}'")]
    DeviceNotFound { kind: &'static str, device_id: String },

    #[error("no default {0} device available")]
    NoDefaultDevice(&'static str),

    #[error("failed to open {kind} device '{device_id}': {reason}")]
    DeviceUnavailable {
        kind: &'static str,
        device_id: String,
        reason: String,
    },

    #[error("device enumeration failed: {0}")]
    Enumeration(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
