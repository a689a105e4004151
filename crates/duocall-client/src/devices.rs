use duocall_media::TrackKind;

use crate::error::Result;
use crate::session::SessionTask;

/// Switches the input device for one kind of track.
///
/// The new device is acquired first, so a failure here mutates nothing: the
/// old track keeps flowing and the selected-device state stays as it was.
/// Only once the new track exists is the sender swapped (no renegotiation)
/// and the old capture stopped.
pub(crate) async fn switch_track(
    task: &mut SessionTask,
    kind: TrackKind,
    device_id: &str,
) -> Result<()> {
    let new_track = task.media.acquire_track(kind, device_id).await?;

    if let Some(peer) = &task.peer {
        match peer.replace_sender_track(&new_track).await {
            Ok(replaced) => {
                if !replaced {
                    tracing::debug!("no {kind} sender yet, track swapped locally only");
                }
            }
            Err(e) => {
                new_track.stop();
                return Err(e);
            }
        }
    }

    task.constraints.set_device(kind, device_id.to_owned());
    let old = task.local.replace(new_track);
    if let Some(old) = old {
        old.stop();
    }

    if kind == TrackKind::Video {
        if let Some(video) = task.local.track(TrackKind::Video) {
            task.preview.clear();
            task.preview.attach(video.id());
        }
    }

    tracing::info!("switched {kind} input to device {device_id}");
    Ok(())
}
