//! Background camera thread feeding a [`MediaStream`](super::MediaStream).

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::constraints::MediaConstraints;
use super::stream::TrackSettings;
use super::types::{Frame, MediaError, MediaErrorKind, Resolution};

/// Run the capture loop until the stream is dropped.
///
/// The negotiated settings (or the open failure) are reported once through
/// `ready`. Frames are offered to `frames` without blocking; when the
/// consumer lags, frames are dropped rather than queued.
pub fn run_capture_loop(
    index: u32,
    constraints: MediaConstraints,
    frames: mpsc::Sender<Frame>,
    stop: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<TrackSettings, MediaError>>,
) {
    let index = CameraIndex::Index(index);

    let mut camera = match open_camera_with_fallback(&index, &constraints) {
        Ok(cam) => cam,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(classify_open_error(&e.to_string())));
        return;
    }

    let res = camera.resolution();
    let settings = TrackSettings {
        resolution: Resolution::new(res.width(), res.height()),
        frame_rate: camera.frame_rate(),
    };
    log::info!(
        "Camera {} streaming at {} @ {} fps",
        index,
        settings.resolution,
        settings.frame_rate
    );
    if ready.send(Ok(settings)).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    while !stop.load(Ordering::Relaxed) {
        if let Ok(raw_frame) = camera.frame() {
            // Undecodable frames are skipped
            if let Some(frame) = convert_to_rgb(&raw_frame) {
                match frames.try_send(frame) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }

        thread::sleep(Duration::from_millis(1));
    }

    let _ = camera.stop_stream();
    log::debug!("Camera {} stream stopped", index);
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(
    index: &CameraIndex,
    constraints: &MediaConstraints,
) -> Result<Camera, MediaError> {
    let wanted = nokhwa::utils::Resolution::new(constraints.video.width, constraints.video.height);
    let fps = constraints.video.frame_rate.ideal;

    // NV12 is native on macOS, MJPEG and YUYV cover most UVC devices
    let format_attempts: Vec<RequestedFormat> = vec![
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            wanted,
            NokhwaFrameFormat::NV12,
            fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            wanted,
            NokhwaFrameFormat::MJPEG,
            fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            wanted,
            NokhwaFrameFormat::YUYV,
            fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    let mut last_error = None;

    for requested in format_attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => {
                log::debug!("Camera {} rejected format request: {}", index, e);
                last_error = Some(e.to_string());
            }
        }
    }

    Err(classify_open_error(
        &last_error.unwrap_or_else(|| "no format could be negotiated".to_string()),
    ))
}

/// Map a backend error message onto a media error kind.
pub fn classify_open_error(message: &str) -> MediaError {
    let msg = message.to_lowercase();
    let kind = if msg.contains("permission")
        || msg.contains("denied")
        || msg.contains("authorization")
        || msg.contains("access")
    {
        MediaErrorKind::NotAllowed
    } else if msg.contains("not found") || msg.contains("no device") {
        MediaErrorKind::NotFound
    } else if msg.contains("format") || msg.contains("resolution") {
        MediaErrorKind::Overconstrained
    } else {
        MediaErrorKind::NotReadable
    };
    MediaError::new(kind, message)
}

/// Convert a nokhwa buffer to an RGB [`Frame`].
///
/// Returns `None` if the conversion fails (unsupported format or corrupt data).
fn convert_to_rgb(buffer: &nokhwa::Buffer) -> Option<Frame> {
    let decoded = buffer.decode_image::<RgbFormat>().ok()?;
    let resolution = buffer.resolution();

    Some(Frame::rgb(
        resolution.width(),
        resolution.height(),
        decoded.into_raw(),
    ))
}
