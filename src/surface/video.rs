//! Video sink playing a [`MediaStream`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::media::{Frame, MediaError, MediaErrorKind, MediaStream};

/// How much data the element has, ordered like the media element states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// Observable playback state of a [`VideoElement`].
#[derive(Debug, Clone)]
pub struct Playback {
    pub ready_state: ReadyState,
    pub paused: bool,
    pub ended: bool,
    pub muted: bool,
    pub disable_picture_in_picture: bool,
    /// Most recent decoded frame
    pub frame: Option<Arc<Frame>>,
    /// Frames presented since playback started
    pub frames_presented: u64,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            ready_state: ReadyState::HaveNothing,
            paused: true,
            ended: false,
            muted: true,
            disable_picture_in_picture: false,
            frame: None,
            frames_presented: 0,
        }
    }
}

impl Playback {
    /// Whether frame data for the current position is available.
    pub fn has_current_data(&self) -> bool {
        self.ready_state >= ReadyState::HaveCurrentData
    }

    pub fn is_active(&self) -> bool {
        !self.paused && !self.ended
    }
}

/// A video sink.
///
/// Holds the attached stream until [`VideoElement::play`] hands it to a
/// pump task, which publishes every frame through a watch channel. The first
/// frame raises the ready state, which is the "loaded data" event.
pub struct VideoElement {
    playback: Arc<watch::Sender<Playback>>,
    source: Mutex<Option<MediaStream>>,
    has_source: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for VideoElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoElement")
            .field("ready_state", &self.ready_state())
            .field("paused", &self.is_paused())
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

impl Default for VideoElement {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VideoElement {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Playback::default());
        Self {
            playback: Arc::new(tx),
            source: Mutex::new(None),
            has_source: AtomicBool::new(false),
            pump: Mutex::new(None),
        }
    }

    /// Attach a stream. Replaces and stops any previous source.
    pub fn set_src_object(&self, stream: MediaStream) {
        self.stop_pump();
        *lock(&self.source) = Some(stream);
        self.has_source.store(true, Ordering::SeqCst);
        self.playback.send_modify(|p| {
            *p = Playback {
                muted: p.muted,
                disable_picture_in_picture: p.disable_picture_in_picture,
                ready_state: ReadyState::HaveMetadata,
                ..Playback::default()
            };
        });
    }

    pub fn has_src_object(&self) -> bool {
        self.has_source.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.playback.send_modify(|p| p.muted = muted);
    }

    pub fn set_disable_picture_in_picture(&self, disable: bool) {
        self.playback
            .send_modify(|p| p.disable_picture_in_picture = disable);
    }

    /// Start or resume playback.
    ///
    /// The first call after [`VideoElement::set_src_object`] spawns the pump
    /// task, so it must run inside a tokio runtime.
    pub fn play(&self) -> Result<(), MediaError> {
        let source = lock(&self.source).take();
        if source.is_none() && !self.has_src_object() {
            return Err(MediaError::new(
                MediaErrorKind::NotSupported,
                "no source attached",
            ));
        }

        // Unpause before the pump starts so the first frame is not dropped
        self.playback.send_if_modified(|p| {
            if p.ended || !p.paused {
                return false;
            }
            p.paused = false;
            true
        });

        if let Some(mut stream) = source {
            let playback = Arc::clone(&self.playback);
            let handle = tokio::spawn(async move {
                while let Some(frame) = stream.next_frame().await {
                    playback.send_if_modified(|p| {
                        if p.paused {
                            return false;
                        }
                        p.frame = Some(Arc::new(frame));
                        p.ready_state = ReadyState::HaveEnoughData;
                        p.frames_presented += 1;
                        true
                    });
                }
                log::debug!("Stream '{}' ended", stream.label());
                playback.send_modify(|p| {
                    p.ended = true;
                    p.paused = true;
                });
            });
            *lock(&self.pump) = Some(handle);
        }
        Ok(())
    }

    pub fn pause(&self) {
        self.playback.send_if_modified(|p| {
            let changed = !p.paused;
            p.paused = true;
            changed
        });
    }

    /// Stop playback for good and release the stream.
    pub fn stop(&self) {
        self.stop_pump();
        lock(&self.source).take();
        self.playback.send_modify(|p| {
            p.paused = true;
            p.ended = true;
        });
    }

    fn stop_pump(&self) {
        if let Some(handle) = lock(&self.pump).take() {
            handle.abort();
        }
    }

    pub fn playback(&self) -> Playback {
        self.playback.borrow().clone()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.playback.borrow().ready_state
    }

    pub fn is_paused(&self) -> bool {
        self.playback.borrow().paused
    }

    pub fn is_ended(&self) -> bool {
        self.playback.borrow().ended
    }

    pub fn is_muted(&self) -> bool {
        self.playback.borrow().muted
    }

    pub fn disable_picture_in_picture(&self) -> bool {
        self.playback.borrow().disable_picture_in_picture
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.playback.borrow().frame.clone()
    }

    /// Receive every playback change.
    pub fn subscribe(&self) -> watch::Receiver<Playback> {
        self.playback.subscribe()
    }

    /// Resolve once frame data is available ("loaded data").
    ///
    /// Resolves immediately when the element is already ready. Never
    /// resolves if no frame ever arrives; callers wanting a bound wrap this
    /// in a timeout.
    pub async fn loaded_data(&self) {
        let mut rx = self.subscribe();
        if rx.wait_for(Playback::has_current_data).await.is_err() {
            // The sender lives as long as `self`
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for VideoElement {
    fn drop(&mut self) {
        self.stop_pump();
    }
}
