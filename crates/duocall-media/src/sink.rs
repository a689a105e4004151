/// Attach point for a video surface (the local preview or the remote view).
///
/// Attaching is keyed by stream id and idempotent: re-attaching the stream
/// that is already displayed is a no-op, so duplicate track notifications
/// never disturb an established view.
#[derive(Debug, Default)]
pub struct VideoSink {
    attached: Option<String>,
}

impl VideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `stream_id`, returning `true` if the sink changed.
    pub fn attach(&mut self, stream_id: &str) -> bool {
        if self.attached.as_deref() == Some(stream_id) {
            return false;
        }
        self.attached = Some(stream_id.to_owned());
        true
    }

    /// Clears the sink, e.g. when the peer departs.
    pub fn clear(&mut self) {
        self.attached = None;
    }

    pub fn current(&self) -> Option<&str> {
        self.attached.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }
}
