//! Configuration file handling for absence-capture.
//!
//! Loads configuration from `~/.config/absence-capture/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorConfig, DetectorRuntime, SupportedModel, CDN_SOLUTION_PATH, LOCAL_SOLUTION_PATH};
use crate::device::DeviceClassSetting;
use crate::session::SessionOptions;

/// Environment variable overriding `model.base_url`.
pub const BASE_URL_ENV: &str = "ABSENCE_BASE_URL";

/// Default site the model and detector assets are served from.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

/// Configuration file structure for absence-capture.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detector: DetectorSection,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize)]
pub struct CameraConfig {
    /// Fixed device index; otherwise the front camera is picked by name
    #[serde(default)]
    pub device: Option<u32>,
    #[serde(default = "default_true")]
    pub mirror: bool,
    #[serde(default)]
    pub device_class: DeviceClassSetting,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            mirror: true,
            device_class: DeviceClassSetting::Auto,
            user_agent: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CaptureConfig {
    /// Upper bound on waiting for the first frame; unset waits forever
    #[serde(default)]
    pub load_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DetectorSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub runtime: DetectorRuntime,
    /// `local`, `cdn`, or an explicit URL
    #[serde(default)]
    pub solution_path: Option<String>,
    #[serde(default = "default_max_faces")]
    pub max_faces: u32,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            enabled: false,
            runtime: DetectorRuntime::default(),
            solution_path: None,
            max_faces: default_max_faces(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_input_size")]
    pub input_width: usize,
    #[serde(default = "default_input_size")]
    pub input_height: usize,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            input_width: default_input_size(),
            input_height: default_input_size(),
            cache: true,
            cache_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_faces() -> u32 {
    1
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_input_size() -> usize {
    224
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Apply overrides from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.trim().is_empty() {
                self.model.base_url = base_url;
            }
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            device_class: self.camera.device_class.forced(),
            load_timeout: self.capture.load_timeout_ms.map(Duration::from_millis),
            mirror_preview: self.camera.mirror,
        }
    }

    /// Detector settings, or `None` when detection is disabled.
    pub fn detector_config(&self) -> Option<DetectorConfig> {
        if !self.detector.enabled {
            return None;
        }
        let base = crate::detect::with_trailing_slash(&self.model.base_url);
        let solution_path = match self.detector.solution_path.as_deref() {
            None | Some("local") => format!("{}{}", base, LOCAL_SOLUTION_PATH),
            Some("cdn") => CDN_SOLUTION_PATH.to_string(),
            Some(url) => url.to_string(),
        };
        Some(DetectorConfig {
            model: SupportedModel::MediaPipeFaceDetector,
            runtime: self.detector.runtime,
            solution_path,
            max_faces: self.detector.max_faces,
        })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("absence-capture").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/absence-capture/config.toml")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert!(config.camera.mirror);
        assert_eq!(config.camera.device, None);
        assert_eq!(config.capture.load_timeout_ms, None);
        assert!(!config.detector.enabled);
        assert_eq!(config.model.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model.input_width, 224);
        assert!(config.model.cache);
    }

    #[test]
    fn test_parse_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[camera]
device = 2
mirror = false
device_class = "mobile"

[capture]
load_timeout_ms = 1500

[detector]
enabled = true
runtime = "tfjs"
solution_path = "cdn"

[model]
base_url = "https://absence.example/"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.camera.device, Some(2));
        assert!(!config.camera.mirror);

        let options = config.session_options();
        assert_eq!(options.device_class, Some(DeviceClass::Mobile));
        assert_eq!(options.load_timeout, Some(Duration::from_millis(1500)));
        assert!(!options.mirror_preview);

        let detector = config.detector_config().unwrap();
        assert_eq!(detector.runtime, DetectorRuntime::Tfjs);
        assert_eq!(detector.solution_path, CDN_SOLUTION_PATH);
    }

    #[test]
    fn test_local_detector_uses_base_url() {
        let mut config = Config::default();
        config.detector.enabled = true;
        config.model.base_url = "https://absence.example".to_string();
        let detector = config.detector_config().unwrap();
        assert_eq!(
            detector.solution_path,
            "https://absence.example/assets/vendor/mediapipe/face_detection"
        );
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[camera]\nmirror = \"yes\"").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_env_overrides_base_url() {
        let mut config = Config::default();
        std::env::set_var(BASE_URL_ENV, "https://from-env.example/");
        config.apply_env();
        std::env::remove_var(BASE_URL_ENV);
        assert_eq!(config.model.base_url, "https://from-env.example/");
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = default_path();
        assert!(path.ends_with("absence-capture/config.toml"));
    }
}
