//! Drawing surfaces: the video sink a stream plays into and the canvases
//! frames are drawn onto.

mod canvas;
mod video;

pub use canvas::{Canvas, ImageData, Transform};
pub use video::{Playback, ReadyState, VideoElement};
