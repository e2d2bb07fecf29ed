//! Media types and data structures.

use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// Information about an available camera device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)
    }
}

/// Stream resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Requested on phones and tablets (360x270)
    pub const MOBILE: Resolution = Resolution {
        width: 360,
        height: 270,
    };

    /// Requested on desktops (640x480)
    pub const DESKTOP: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::DESKTOP
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
}

/// A single video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Build an RGB frame from raw pixel data.
    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }

    /// A frame where every pixel has the same color.
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        let data = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::rgb(width, height, data)
    }

    /// Get the number of bytes per pixel (3 for RGB).
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            FrameFormat::Rgb => 3,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds or the buffer is short.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        let px = self.data.get(offset..offset + 3)?;
        Some([px[0], px[1], px[2]])
    }
}

/// DOM-style name of a media acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorKind {
    /// Permission to use the camera was refused
    NotAllowed,
    /// No device matches the request
    NotFound,
    /// The device exists but could not be opened
    NotReadable,
    /// The requested constraints cannot be satisfied
    Overconstrained,
    /// Acquisition was interrupted
    Abort,
    /// The operation is not available on this platform
    NotSupported,
}

impl MediaErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            MediaErrorKind::NotAllowed => "NotAllowedError",
            MediaErrorKind::NotFound => "NotFoundError",
            MediaErrorKind::NotReadable => "NotReadableError",
            MediaErrorKind::Overconstrained => "OverconstrainedError",
            MediaErrorKind::Abort => "AbortError",
            MediaErrorKind::NotSupported => "NotSupportedError",
        }
    }
}

/// Error reported by a media acquisition API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {message}", .kind.name())]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

impl MediaError {
    pub fn new(kind: MediaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_info_display() {
        let info = CameraInfo {
            index: 0,
            name: "Test Camera".to_string(),
            description: "Built-in".to_string(),
        };
        assert_eq!(format!("{}", info), "[0] Test Camera (Built-in)");
    }

    #[test]
    fn test_resolution_constants() {
        assert_eq!(Resolution::MOBILE, Resolution::new(360, 270));
        assert_eq!(Resolution::DESKTOP, Resolution::new(640, 480));
        assert_eq!(Resolution::default(), Resolution::DESKTOP);
        assert_eq!(Resolution::MOBILE.to_string(), "360x270");
    }

    #[test]
    fn test_solid_frame() {
        let frame = Frame::solid(3, 2, [10, 20, 30]);
        assert_eq!(frame.data.len(), 18);
        assert_eq!(frame.pixel(2, 1), Some([10, 20, 30]));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.bytes_per_pixel(), 3);
    }

    #[test]
    fn test_media_error_display() {
        let err = MediaError::new(MediaErrorKind::NotAllowed, "Permission denied");
        assert_eq!(err.to_string(), "NotAllowedError: Permission denied");
        assert_eq!(err.name(), "NotAllowedError");
    }
}
