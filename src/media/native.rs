//! Camera access through the operating system's native backend.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use nokhwa::query;
use nokhwa::utils::ApiBackend;
use tokio::sync::{mpsc, oneshot};

use super::capture_loop::run_capture_loop;
use super::constraints::{FacingMode, MediaConstraints};
use super::devices::MediaDevices;
use super::stream::MediaStream;
use super::types::{CameraInfo, MediaError, MediaErrorKind};

/// Frames buffered between the camera thread and the video sink.
const FRAME_QUEUE: usize = 2;

const FRONT_KEYWORDS: &[&str] = &["front", "facetime", "user", "integrated", "built-in"];
const REAR_KEYWORDS: &[&str] = &["back", "rear", "environment"];

/// List all available camera devices on the system.
///
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices() -> Result<Vec<CameraInfo>, MediaError> {
    let devices = query(ApiBackend::Auto).map_err(|e| {
        MediaError::new(
            MediaErrorKind::NotReadable,
            format!("Failed to query cameras: {}", e),
        )
    })?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

/// Resolve a facing mode to a device index.
///
/// An explicit `preferred` index wins when it exists. Otherwise the first
/// device whose name suggests the requested side is used, falling back to
/// the first device.
pub fn select_device(
    devices: &[CameraInfo],
    facing: FacingMode,
    preferred: Option<u32>,
) -> Result<u32, MediaError> {
    let first = devices.first().ok_or_else(|| {
        MediaError::new(MediaErrorKind::NotFound, "No cameras found")
    })?;

    if let Some(index) = preferred {
        return devices
            .iter()
            .find(|d| d.index == index)
            .map(|d| d.index)
            .ok_or_else(|| {
                MediaError::new(
                    MediaErrorKind::NotFound,
                    format!("Camera device {} not found", index),
                )
            });
    }

    let keywords = match facing {
        FacingMode::User => FRONT_KEYWORDS,
        FacingMode::Environment => REAR_KEYWORDS,
    };

    Ok(devices
        .iter()
        .find(|d| {
            let name = d.name.to_lowercase();
            keywords.iter().any(|k| name.contains(k))
        })
        .unwrap_or(first)
        .index)
}

/// User agent describing this build and platform.
pub fn native_user_agent() -> String {
    format!(
        "absence-capture/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// [`MediaDevices`] backed by nokhwa.
#[derive(Debug, Clone, Default)]
pub struct NativeMediaDevices {
    device_index: Option<u32>,
    user_agent: Option<String>,
}

impl NativeMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always open this device instead of matching on the facing mode.
    pub fn with_device_index(mut self, index: Option<u32>) -> Self {
        self.device_index = index;
        self
    }

    /// Report a different user agent.
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

#[async_trait]
impl MediaDevices for NativeMediaDevices {
    fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(native_user_agent)
    }

    fn has_get_user_media(&self) -> bool {
        nokhwa::native_api_backend().is_some()
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        if constraints.audio {
            return Err(MediaError::new(
                MediaErrorKind::NotSupported,
                "audio capture is not supported",
            ));
        }

        let devices = tokio::task::spawn_blocking(list_devices)
            .await
            .map_err(|e| MediaError::new(MediaErrorKind::Abort, e.to_string()))??;
        let index = select_device(&devices, constraints.video.facing_mode, self.device_index)?;
        let label = devices
            .iter()
            .find(|d| d.index == index)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| format!("camera {}", index));

        log::info!("Opening camera {} ({})", index, label);

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let constraints = *constraints;

        thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || run_capture_loop(index, constraints, frame_tx, thread_stop, ready_tx))
            .map_err(|e| MediaError::new(MediaErrorKind::NotReadable, e.to_string()))?;

        let settings = ready_rx.await.map_err(|_| {
            MediaError::new(
                MediaErrorKind::Abort,
                "Capture thread terminated unexpectedly",
            )
        })??;

        Ok(MediaStream::new(label, settings, frame_rx).with_stop_signal(stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cams() -> Vec<CameraInfo> {
        vec![
            CameraInfo {
                index: 0,
                name: "USB Capture Card".to_string(),
                description: "external".to_string(),
            },
            CameraInfo {
                index: 1,
                name: "FaceTime HD Camera".to_string(),
                description: "built-in".to_string(),
            },
            CameraInfo {
                index: 2,
                name: "Rear Camera".to_string(),
                description: "built-in".to_string(),
            },
        ]
    }

    #[test]
    fn test_select_front_camera_by_name() {
        assert_eq!(select_device(&cams(), FacingMode::User, None).unwrap(), 1);
    }

    #[test]
    fn test_select_rear_camera_by_name() {
        assert_eq!(
            select_device(&cams(), FacingMode::Environment, None).unwrap(),
            2
        );
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let cams = vec![CameraInfo {
            index: 4,
            name: "Generic".to_string(),
            description: String::new(),
        }];
        assert_eq!(select_device(&cams, FacingMode::User, None).unwrap(), 4);
    }

    #[test]
    fn test_select_preferred_index() {
        assert_eq!(select_device(&cams(), FacingMode::User, Some(0)).unwrap(), 0);
        let err = select_device(&cams(), FacingMode::User, Some(999)).unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::NotFound);
        assert!(err.message.contains("999"));
    }

    #[test]
    fn test_select_no_devices() {
        let err = select_device(&[], FacingMode::User, None).unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::NotFound);
    }

    #[test]
    fn test_native_user_agent_is_desktop_on_desktop_targets() {
        let ua = native_user_agent();
        assert!(ua.starts_with("absence-capture/"));
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
            assert!(!crate::device::is_mobile(&ua));
        }
    }

    #[test]
    fn test_list_devices_does_not_panic() {
        // Headless machines may have no backend at all
        let _ = list_devices();
    }
}
