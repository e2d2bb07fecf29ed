//! Live media stream handle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::types::{Frame, Resolution};

/// Settings the producer actually negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSettings {
    pub resolution: Resolution,
    pub frame_rate: u32,
}

/// A live camera feed.
///
/// Frames arrive from whatever produced the stream (a camera thread, a test
/// script). The stream ends once the producer side is dropped. Dropping the
/// stream raises the producer's stop signal, if one was attached.
pub struct MediaStream {
    label: String,
    settings: TrackSettings,
    frames: mpsc::Receiver<Frame>,
    stop_signal: Option<Arc<AtomicBool>>,
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("label", &self.label)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MediaStream {
    pub fn new(
        label: impl Into<String>,
        settings: TrackSettings,
        frames: mpsc::Receiver<Frame>,
    ) -> Self {
        Self {
            label: label.into(),
            settings,
            frames,
            stop_signal: None,
        }
    }

    /// Create a stream together with the sender that feeds it.
    pub fn channel(
        label: impl Into<String>,
        settings: TrackSettings,
        capacity: usize,
    ) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(label, settings, rx))
    }

    /// Attach a flag that is raised when the stream is dropped.
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop_signal = Some(stop);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn settings(&self) -> TrackSettings {
        self.settings
    }

    /// Wait for the next frame. `None` once the producer has gone away.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        if let Some(stop) = &self.stop_signal {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TrackSettings {
        TrackSettings {
            resolution: Resolution::new(4, 4),
            frame_rate: 30,
        }
    }

    #[tokio::test]
    async fn test_stream_yields_frames_then_ends() {
        let (tx, mut stream) = MediaStream::channel("test", settings(), 4);
        tx.send(Frame::solid(4, 4, [1, 2, 3])).await.unwrap();
        drop(tx);

        let frame = stream.next_frame().await.expect("one frame");
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3]));
        assert!(stream.next_frame().await.is_none());
    }

    #[test]
    fn test_drop_raises_stop_signal() {
        let stop = Arc::new(AtomicBool::new(false));
        let (_tx, stream) = MediaStream::channel("test", settings(), 1);
        let stream = stream.with_stop_signal(Arc::clone(&stop));
        assert_eq!(stream.label(), "test");
        drop(stream);
        assert!(stop.load(Ordering::SeqCst));
    }
}
