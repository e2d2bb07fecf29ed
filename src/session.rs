//! Camera capture session.
//!
//! A session binds one video sink and one preview canvas, acquires the
//! camera stream into them and captures still frames on demand:
//!
//! `Idle → Acquiring → Playing → Capturing` (repeatable). There is no closed
//! state; a session is simply dropped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::detect::{Face, FaceDetector};
use crate::device::DeviceClass;
use crate::error::{CaptureError, MediaResult};
use crate::media::{AcquisitionApi, MediaConstraints, MediaDevices};
use crate::surface::{Canvas, VideoElement};

/// Tunables for a [`CaptureSession`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Skip user-agent detection and use this class
    pub device_class: Option<DeviceClass>,
    /// Bound on waiting for the video's first frame; `None` waits forever
    pub load_timeout: Option<Duration>,
    /// Flip the preview canvas horizontally
    pub mirror_preview: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device_class: None,
            load_timeout: None,
            mirror_preview: true,
        }
    }
}

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Playing,
    /// A `capture` call is in flight; returns to `Playing` afterwards
    Capturing,
}

#[derive(Clone)]
struct Binding {
    video: Arc<VideoElement>,
    canvas: Arc<Canvas>,
}

/// Coordinates the video sink, the preview canvas and the stream lifecycle
/// for one attendance photo.
pub struct CaptureSession {
    devices: Arc<dyn MediaDevices>,
    api: AcquisitionApi,
    device_class: DeviceClass,
    options: SessionOptions,
    binding: Mutex<Option<Binding>>,
    playing: AtomicBool,
    captures_in_flight: AtomicUsize,
    detector: Mutex<Option<Arc<dyn FaceDetector>>>,
    last_faces: Mutex<Option<Vec<Face>>>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("api", &self.api)
            .field("device_class", &self.device_class)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureSession {
    /// Create a session. The acquisition API is probed here, once.
    pub fn new(devices: Arc<dyn MediaDevices>, options: SessionOptions) -> Self {
        let api = AcquisitionApi::probe(devices.as_ref());
        let device_class = options
            .device_class
            .unwrap_or_else(|| DeviceClass::detect(&devices.user_agent()));
        log::debug!("Capture session: api={:?}, device={}", api, device_class);

        Self {
            devices,
            api,
            device_class,
            options,
            binding: Mutex::new(None),
            playing: AtomicBool::new(false),
            captures_in_flight: AtomicUsize::new(0),
            detector: Mutex::new(None),
            last_faces: Mutex::new(None),
        }
    }

    /// Run `detector` on every captured frame.
    pub fn with_detector(self, detector: Arc<dyn FaceDetector>) -> Self {
        *lock(&self.detector) = Some(detector);
        self
    }

    pub fn acquisition_api(&self) -> AcquisitionApi {
        self.api
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    /// Constraints `enable` requests.
    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints::for_device(self.device_class)
    }

    pub fn is_video_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        if self.captures_in_flight.load(Ordering::SeqCst) > 0 {
            SessionState::Capturing
        } else if self.is_video_playing() {
            SessionState::Playing
        } else if lock(&self.binding).is_some() {
            SessionState::Acquiring
        } else {
            SessionState::Idle
        }
    }

    pub fn has_detector(&self) -> bool {
        lock(&self.detector).is_some()
    }

    /// Faces found on the most recent capture, if detection ran.
    pub fn last_faces(&self) -> Option<Vec<Face>> {
        lock(&self.last_faces).clone()
    }

    /// Acquire the camera into `video` and mirror it onto `canvas`.
    ///
    /// Returns `None` without doing anything when a video/canvas pair is
    /// already bound. Otherwise resolves once the first frame has loaded
    /// (success) or acquisition failed.
    pub async fn enable(
        &self,
        video: Arc<VideoElement>,
        canvas: Arc<Canvas>,
    ) -> Option<MediaResult> {
        {
            let mut binding = lock(&self.binding);
            if binding.is_some() {
                log::debug!("Camera already enabled, ignoring");
                return None;
            }
            if !self.api.is_supported() {
                log::warn!("No camera acquisition API available");
                return Some(MediaResult::from(Err(CaptureError::UnsupportedBrowser)));
            }
            *binding = Some(Binding {
                video: Arc::clone(&video),
                canvas: Arc::clone(&canvas),
            });
        }

        let saved_transform = canvas.transform();
        let result = self.start_camera(&video, &canvas).await;
        if let Err(e) = &result {
            log::warn!("Failed to enable camera: {}", e);
            video.stop();
            canvas.set_transform(saved_transform);
            *lock(&self.binding) = None;
        }
        Some(MediaResult::from(result))
    }

    async fn start_camera(
        &self,
        video: &Arc<VideoElement>,
        canvas: &Arc<Canvas>,
    ) -> Result<(), CaptureError> {
        let constraints = self.constraints();
        log::info!(
            "Requesting {}x{} camera stream ({})",
            constraints.video.width,
            constraints.video.height,
            self.device_class
        );

        let stream = self.api.acquire(self.devices.as_ref(), &constraints).await?;

        video.set_muted(false);
        video.set_disable_picture_in_picture(true);
        video.set_src_object(stream);
        video.play()?;

        if self.options.mirror_preview {
            canvas.translate(f64::from(canvas.width()), 0.0);
            canvas.scale(-1.0, 1.0);
        }

        if !self.device_class.is_mobile() {
            tokio::spawn(redraw_loop(Arc::clone(video), Arc::clone(canvas)));
        }

        self.wait_for_loaded_data(video).await?;
        self.playing.store(true, Ordering::SeqCst);
        log::info!("Camera playing");
        Ok(())
    }

    async fn wait_for_loaded_data(&self, video: &VideoElement) -> Result<(), CaptureError> {
        match self.options.load_timeout {
            Some(limit) => tokio::time::timeout(limit, video.loaded_data())
                .await
                .map_err(|_| CaptureError::LoadTimeout(limit)),
            None => {
                video.loaded_data().await;
                Ok(())
            }
        }
    }

    /// Draw the current video frame into `preview`.
    ///
    /// Returns `None` when no video is bound. Waits for the first frame if
    /// the video is not ready yet. Detection failures are logged and do not
    /// affect the result.
    pub async fn capture(&self, preview: &Canvas) -> Option<MediaResult> {
        let video = lock(&self.binding).as_ref().map(|b| Arc::clone(&b.video))?;
        let _in_flight = InFlight::enter(&self.captures_in_flight);

        if !video.playback().has_current_data() {
            if let Err(e) = self.wait_for_loaded_data(&video).await {
                log::warn!("Capture aborted: {}", e);
                return Some(MediaResult::failed(e));
            }
        }

        let frame = video.current_frame()?;
        self.detect_faces(&frame).await;
        preview.draw_frame(&frame);
        log::info!("Captured {}x{} frame", frame.width, frame.height);
        Some(MediaResult::ok())
    }

    async fn detect_faces(&self, frame: &crate::media::Frame) {
        let Some(detector) = lock(&self.detector).clone() else {
            return;
        };

        match detector.estimate_faces(frame).await {
            Ok(faces) => {
                log::info!("Detected {} face(s)", faces.len());
                *lock(&self.last_faces) = Some(faces);
            }
            Err(e) => {
                log::error!("Face detection failed, discarding detector: {}", e);
                detector.dispose();
                *lock(&self.detector) = None;
                *lock(&self.last_faces) = None;
            }
        }
    }
}

/// Counts a running `capture`, also when its future is dropped early.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Copy video frames onto the preview canvas while the video plays.
///
/// Pausing suspends drawing; resuming picks it up again. The loop exits when
/// the video ends.
async fn redraw_loop(video: Arc<VideoElement>, canvas: Arc<Canvas>) {
    let mut rx = video.subscribe();
    loop {
        let frame = {
            let playback = rx.borrow_and_update();
            if playback.ended {
                break;
            }
            if playback.paused {
                None
            } else {
                playback.frame.clone()
            }
        };
        if let Some(frame) = frame {
            canvas.draw_frame(&frame);
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
    log::debug!("Preview redraw loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaError, MediaStream};
    use async_trait::async_trait;

    struct NoCamera;

    #[async_trait]
    impl MediaDevices for NoCamera {
        fn user_agent(&self) -> String {
            "Mozilla/5.0 (Linux; Android 14)".to_string()
        }

        fn has_get_user_media(&self) -> bool {
            false
        }

        async fn get_user_media(
            &self,
            _constraints: &MediaConstraints,
        ) -> Result<MediaStream, MediaError> {
            unreachable!("never probed as available")
        }
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = CaptureSession::new(Arc::new(NoCamera), SessionOptions::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.acquisition_api(), AcquisitionApi::Unsupported);
        assert_eq!(session.device_class(), DeviceClass::Mobile);
        assert!(!session.is_video_playing());
        assert!(session.last_faces().is_none());
    }

    #[test]
    fn test_device_class_override() {
        let options = SessionOptions {
            device_class: Some(DeviceClass::Desktop),
            ..SessionOptions::default()
        };
        let session = CaptureSession::new(Arc::new(NoCamera), options);
        assert_eq!(session.device_class(), DeviceClass::Desktop);
        assert_eq!(session.constraints().video.width, 640);
    }

    #[tokio::test]
    async fn test_unsupported_does_not_bind() {
        let session = CaptureSession::new(Arc::new(NoCamera), SessionOptions::default());
        let video = Arc::new(VideoElement::new());
        let canvas = Arc::new(Canvas::new(4, 4));

        let result = session.enable(video, canvas).await.expect("reported");
        assert!(!result.success);
        assert_eq!(session.state(), SessionState::Idle);
    }
}
