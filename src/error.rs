//! Capture session errors and the result shape reported to callers.

use std::time::Duration;

use serde::Serialize;

use crate::media::MediaError;

/// Errors that can occur while enabling the camera or capturing a photo.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No camera acquisition API on this platform
    #[error("Browser API navigator.mediaDevices.getUserMedia not available")]
    UnsupportedBrowser,

    /// The acquisition API refused or failed the request
    #[error("The following error occurred: {0}")]
    Acquisition(#[from] MediaError),

    /// The video never produced frame data within the configured bound
    #[error("Video did not load data within {0:?}")]
    LoadTimeout(Duration),
}

/// `{success, error}` outcome handed back for every completed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaResult {
    pub success: bool,
    pub error: Option<String>,
}

impl MediaResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<(), CaptureError>> for MediaResult {
    fn from(result: Result<(), CaptureError>) -> Self {
        match result {
            Ok(()) => MediaResult::ok(),
            Err(e) => MediaResult::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaErrorKind;

    #[test]
    fn test_acquisition_message() {
        let err = CaptureError::from(MediaError::new(
            MediaErrorKind::NotAllowed,
            "Permission denied",
        ));
        assert_eq!(
            err.to_string(),
            "The following error occurred: NotAllowedError: Permission denied"
        );
    }

    #[test]
    fn test_media_result_from_result() {
        assert_eq!(MediaResult::from(Ok(())), MediaResult::ok());
        let failed = MediaResult::from(Err(CaptureError::UnsupportedBrowser));
        assert!(!failed.success);
        assert_eq!(
            failed.error.as_deref(),
            Some("Browser API navigator.mediaDevices.getUserMedia not available")
        );
    }

    #[test]
    fn test_media_result_json_shape() {
        let json = serde_json::to_value(MediaResult::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "error": null}));
    }
}
