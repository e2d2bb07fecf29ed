//! absence-capture library crate.
//!
//! Camera capture for attendance photos: acquire the front camera, mirror it
//! onto a preview canvas and capture still frames for face detection and
//! feature extraction.

pub mod config;
pub mod detect;
pub mod device;
pub mod error;
pub mod media;
pub mod model;
pub mod session;
pub mod surface;

pub use error::{CaptureError, MediaResult};
pub use session::{CaptureSession, SessionOptions, SessionState};
