use cpal::traits::{DeviceTrait, HostTrait};
use nokhwa::utils::ApiBackend;

use crate::error::{MediaError, Result};

/// A selectable input device, as presented in the client's device lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub device_name: String,
}

/// Enumerates video input devices (cameras).
pub fn list_video_devices() -> Result<Vec<MediaDeviceInfo>> {
    let devices =
        nokhwa::query(ApiBackend::Auto).map_err(|e| MediaError::Enumeration(e.to_string()))?;

    Ok(devices
        .iter()
        .map(|d| MediaDeviceInfo {
            device_id: d.index().to_string(),
            device_name: d.human_name().to_string(),
        })
        .collect())
}

/// Enumerates audio input devices (microphones).
pub fn list_audio_devices() -> Result<Vec<MediaDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| MediaError::Enumeration(e.to_string()))?;

    Ok(devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            Some(MediaDeviceInfo {
                device_id: name.clone(),
                device_name: name,
            })
        })
        .collect())
}
