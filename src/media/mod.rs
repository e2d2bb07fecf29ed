//! Camera acquisition: request constraints, the acquisition API seam, live
//! streams and the nokhwa-backed native implementation.

mod capture_loop;
mod constraints;
mod devices;
mod native;
mod stream;
mod types;

pub use capture_loop::classify_open_error;
pub use constraints::{FacingMode, FrameRateHint, MediaConstraints, VideoConstraints, IDEAL_FRAME_RATE};
pub use devices::{AcquisitionApi, ErrorCallback, MediaDevices, SuccessCallback};
pub use native::{list_devices, native_user_agent, select_device, NativeMediaDevices};
pub use stream::{MediaStream, TrackSettings};
pub use types::{CameraInfo, Frame, FrameFormat, MediaError, MediaErrorKind, Resolution};
