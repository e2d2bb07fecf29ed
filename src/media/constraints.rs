//! Stream request constraints.

use serde::Serialize;

use super::types::Resolution;
use crate::device::DeviceClass;

/// Frame rate the camera is asked to aim for.
pub const IDEAL_FRAME_RATE: u32 = 60;

/// Which camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the person being photographed
    User,
    /// Rear camera
    Environment,
}

/// Frame-rate hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameRateHint {
    pub ideal: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub facing_mode: FacingMode,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRateHint,
}

impl VideoConstraints {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// A video-only stream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: VideoConstraints,
}

impl MediaConstraints {
    /// Constraints for the front camera, sized for the device class.
    pub fn for_device(class: DeviceClass) -> Self {
        let resolution = match class {
            DeviceClass::Mobile => Resolution::MOBILE,
            DeviceClass::Desktop => Resolution::DESKTOP,
        };
        Self {
            audio: false,
            video: VideoConstraints {
                facing_mode: FacingMode::User,
                width: resolution.width,
                height: resolution.height,
                frame_rate: FrameRateHint {
                    ideal: IDEAL_FRAME_RATE,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_constraints() {
        let c = MediaConstraints::for_device(DeviceClass::Mobile);
        assert!(!c.audio);
        assert_eq!(c.video.resolution(), Resolution::MOBILE);
        assert_eq!(c.video.facing_mode, FacingMode::User);
        assert_eq!(c.video.frame_rate.ideal, 60);
    }

    #[test]
    fn test_desktop_constraints() {
        let c = MediaConstraints::for_device(DeviceClass::Desktop);
        assert_eq!(c.video.width, 640);
        assert_eq!(c.video.height, 480);
    }

    #[test]
    fn test_serializes_like_a_media_request() {
        let c = MediaConstraints::for_device(DeviceClass::Mobile);
        let json = serde_json::to_value(c).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "audio": false,
                "video": {
                    "facingMode": "user",
                    "width": 360,
                    "height": 270,
                    "frameRate": { "ideal": 60 }
                }
            })
        );
    }
}
