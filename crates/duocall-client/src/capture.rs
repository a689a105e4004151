use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{ClientError, Result};

/// Interval at which the capture source is expected to hand over chunks.
pub const CHUNK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

/// Screen recording over a chunked capture feed.
///
/// The caller owns the capture source and pushes encoded chunks through a
/// channel; the session buffers them in order and writes a single
/// `RECORDING_<epoch millis>.webm` file when stopped.
pub struct CaptureSession {
    output_dir: PathBuf,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }

    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Starts buffering chunks from `chunks`. Recording runs until
    /// [`RecordingHandle::stop`] is called or the producer hangs up.
    pub fn start(&self, chunks: mpsc::Receiver<Vec<u8>>) -> RecordingHandle {
        let output_dir = self.output_dir.clone();
        let (stop_tx, stop_rx) = oneshot::channel();
        let recording = Arc::new(AtomicBool::new(true));
        let flag = recording.clone();

        let task = tokio::spawn(async move {
            let result = record(output_dir, chunks, stop_rx).await;
            flag.store(false, Ordering::SeqCst);
            result
        });

        RecordingHandle {
            stop_tx: Some(stop_tx),
            task,
            recording,
        }
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

async fn record(
    output_dir: PathBuf,
    mut chunks: mpsc::Receiver<Vec<u8>>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<PathBuf> {
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            // Stop wins the race, but chunks already queued are drained below.
            _ = &mut stop_rx => break,
            chunk = chunks.recv() => match chunk {
                Some(chunk) => append(&mut buffer, chunk),
                None => break,
            },
        }
    }

    // Chunks delivered before the stop signal must land in the file.
    while let Ok(chunk) = chunks.try_recv() {
        append(&mut buffer, chunk);
    }

    let filename = format!("RECORDING_{}.webm", Utc::now().timestamp_millis());
    let path = output_dir.join(filename);
    tokio::fs::write(&path, &buffer).await?;
    tracing::info!("recording saved to {}", path.display());
    Ok(path)
}

fn append(buffer: &mut Vec<u8>, chunk: Vec<u8>) {
    // Capture sources occasionally emit empty chunks between frames.
    if !chunk.is_empty() {
        buffer.extend_from_slice(&chunk);
    }
}

/// Handle on an in-progress recording.
pub struct RecordingHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<PathBuf>>,
    recording: Arc<AtomicBool>,
}

impl RecordingHandle {
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Stops the recording and waits for the file to be written, returning
    /// its path.
    pub async fn stop(mut self) -> Result<PathBuf> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.task
            .await
            .map_err(|e| ClientError::Recording(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("duocall-capture-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn chunks_are_concatenated_in_arrival_order() {
        let dir = scratch_dir();
        let (tx, rx) = mpsc::channel(16);
        let handle = CaptureSession::with_output_dir(&dir).start(rx);

        tx.send(b"one-".to_vec()).await.unwrap();
        tx.send(b"two-".to_vec()).await.unwrap();
        tx.send(b"three".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let path = handle.stop().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one-two-three");
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let dir = scratch_dir();
        let (tx, rx) = mpsc::channel(16);
        let handle = CaptureSession::with_output_dir(&dir).start(rx);

        tx.send(b"a".to_vec()).await.unwrap();
        tx.send(Vec::new()).await.unwrap();
        tx.send(b"b".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let path = handle.stop().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ab");
    }

    #[tokio::test]
    async fn chunks_pending_at_stop_are_flushed() {
        let dir = scratch_dir();
        let (tx, rx) = mpsc::channel(16);
        let handle = CaptureSession::with_output_dir(&dir).start(rx);

        tx.send(b"kept".to_vec()).await.unwrap();
        // Stop immediately; the chunk may still be queued.
        let path = handle.stop().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn producer_hangup_finalizes_the_file() {
        let dir = scratch_dir();
        let (tx, rx) = mpsc::channel(16);
        let handle = CaptureSession::with_output_dir(&dir).start(rx);

        tx.send(b"data".to_vec()).await.unwrap();
        drop(tx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_recording());

        let path = handle.stop().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }

    #[tokio::test]
    async fn filename_carries_the_recording_prefix_and_extension() {
        let dir = scratch_dir();
        let (tx, rx) = mpsc::channel(16);
        let handle = CaptureSession::with_output_dir(&dir).start(rx);
        drop(tx);

        let path = handle.stop().await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("RECORDING_"));
        assert!(name.ends_with(".webm"));
        let millis: i64 = name
            .strip_prefix("RECORDING_")
            .unwrap()
            .strip_suffix(".webm")
            .unwrap()
            .parse()
            .unwrap();
        assert!(millis > 0);
    }
}
