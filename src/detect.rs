//! Face detection on captured frames.
//!
//! The detector is an external service: it receives a frame and answers
//! with the faces it found. [`RemoteDetector`] talks to one over HTTP.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::media::Frame;

/// Path of the bundled MediaPipe solution, relative to the site base URL.
pub const LOCAL_SOLUTION_PATH: &str = "assets/vendor/mediapipe/face_detection";

/// Hosted copy of the MediaPipe face detection solution.
pub const CDN_SOLUTION_PATH: &str = "https://cdn.jsdelivr.net/npm/@mediapipe/face_detection";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Detection models the service can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SupportedModel {
    #[default]
    MediaPipeFaceDetector,
}

impl SupportedModel {
    pub fn name(&self) -> &'static str {
        match self {
            SupportedModel::MediaPipeFaceDetector => "MediaPipeFaceDetector",
        }
    }
}

/// Runtime the detection model executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorRuntime {
    #[default]
    Mediapipe,
    Tfjs,
}

impl DetectorRuntime {
    pub fn name(&self) -> &'static str {
        match self {
            DetectorRuntime::Mediapipe => "mediapipe",
            DetectorRuntime::Tfjs => "tfjs",
        }
    }
}

/// Detector configuration: which model, which runtime, where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    pub model: SupportedModel,
    pub runtime: DetectorRuntime,
    pub solution_path: String,
    pub max_faces: u32,
}

impl DetectorConfig {
    /// Solution served next to the application at `base_url`.
    pub fn local(base_url: &str) -> Self {
        Self {
            solution_path: format!("{}{}", with_trailing_slash(base_url), LOCAL_SOLUTION_PATH),
            ..Self::cdn()
        }
    }

    /// Solution served from the public CDN.
    pub fn cdn() -> Self {
        Self {
            model: SupportedModel::default(),
            runtime: DetectorRuntime::default(),
            solution_path: CDN_SOLUTION_PATH.to_string(),
            max_faces: 1,
        }
    }
}

pub(crate) fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub name: Option<String>,
}

/// A detected face.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Face {
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
    #[serde(default)]
    pub score: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct EstimateResponse {
    #[serde(default)]
    faces: Vec<Face>,
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Detector error: {0}")]
    ApiError(String),

    #[error("Failed to encode frame: {0}")]
    EncodeError(String),
}

/// Something that finds faces in a frame.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn estimate_faces(&self, frame: &Frame) -> Result<Vec<Face>, DetectError>;

    /// Release resources held by the detector.
    fn dispose(&self) {}
}

/// Encode a frame as PNG.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, DetectError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| DetectError::EncodeError("pixel buffer does not match size".to_string()))?;
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| DetectError::EncodeError(e.to_string()))?;
    Ok(bytes.into_inner())
}

/// Detector reached over HTTP at `<solution_path>/estimate`.
pub struct RemoteDetector {
    config: DetectorConfig,
    http_client: reqwest::Client,
}

impl RemoteDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn estimate_url(&self) -> String {
        format!(
            "{}/estimate?model={}&runtime={}&maxFaces={}",
            self.config.solution_path.trim_end_matches('/'),
            self.config.model.name(),
            self.config.runtime.name(),
            self.config.max_faces
        )
    }
}

#[async_trait]
impl FaceDetector for RemoteDetector {
    async fn estimate_faces(&self, frame: &Frame) -> Result<Vec<Face>, DetectError> {
        let body = encode_png(frame)?;

        let response = self
            .http_client
            .post(self.estimate_url())
            .header("Content-Type", "image/png")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DetectError::ApiError(format!(
                "request failed with status {}: {}",
                status, error_text
            )));
        }

        let parsed: EstimateResponse = response.json().await?;
        log::debug!("Detector returned {} face(s)", parsed.faces.len());
        Ok(parsed.faces)
    }
}
