//! Fixed-size RGB drawing surface with a 2D transform.

use std::sync::{Mutex, MutexGuard, PoisonError};

use image::RgbImage;

use crate::media::Frame;

/// 2D affine transform `[a c e; b d f; 0 0 1]`.
///
/// A point `(x, y)` maps to `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Left-right flip of a surface `width` pixels wide.
    pub fn mirror(width: u32) -> Self {
        Transform {
            a: -1.0,
            e: f64::from(width),
            ..Self::IDENTITY
        }
    }

    /// `self * other`: `other` is applied to points first.
    pub fn multiply(&self, other: &Transform) -> Transform {
        Transform {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Inverse transform, `None` when the matrix is singular.
    pub fn invert(&self) -> Option<Transform> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        Some(Transform {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Raw RGB pixels copied out of a canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

struct CanvasState {
    pixels: Vec<u8>,
    transform: Transform,
}

/// An RGB canvas with a current drawing transform.
///
/// Shared between the session's redraw loop and its owner, so all drawing
/// goes through `&self`.
pub struct Canvas {
    width: u32,
    height: u32,
    state: Mutex<CanvasState>,
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("transform", &self.transform())
            .finish_non_exhaustive()
    }
}

impl Canvas {
    /// Create a black canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: Mutex::new(CanvasState {
                pixels: vec![0; width as usize * height as usize * 3],
                transform: Transform::IDENTITY,
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn lock(&self) -> MutexGuard<'_, CanvasState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transform(&self) -> Transform {
        self.lock().transform
    }

    pub fn set_transform(&self, transform: Transform) {
        self.lock().transform = transform;
    }

    pub fn reset_transform(&self) {
        self.set_transform(Transform::IDENTITY);
    }

    pub fn translate(&self, tx: f64, ty: f64) {
        let mut state = self.lock();
        state.transform = state.transform.multiply(&Transform {
            e: tx,
            f: ty,
            ..Transform::IDENTITY
        });
    }

    pub fn scale(&self, sx: f64, sy: f64) {
        let mut state = self.lock();
        state.transform = state.transform.multiply(&Transform {
            a: sx,
            d: sy,
            ..Transform::IDENTITY
        });
    }

    /// Draw `frame` stretched over the whole canvas, through the current
    /// transform. Uses nearest-neighbour sampling.
    pub fn draw_frame(&self, frame: &Frame) {
        if frame.width == 0 || frame.height == 0 || self.width == 0 || self.height == 0 {
            return;
        }

        let mut state = self.lock();
        let Some(inverse) = state.transform.invert() else {
            return;
        };

        let dw = f64::from(self.width);
        let dh = f64::from(self.height);
        let sx_scale = f64::from(frame.width) / dw;
        let sy_scale = f64::from(frame.height) / dh;
        let row_len = self.width as usize * 3;

        for py in 0..self.height {
            for px in 0..self.width {
                let (ux, uy) = inverse.apply(f64::from(px) + 0.5, f64::from(py) + 0.5);
                if ux < 0.0 || uy < 0.0 || ux >= dw || uy >= dh {
                    continue;
                }
                let sx = ((ux * sx_scale) as u32).min(frame.width - 1);
                let sy = ((uy * sy_scale) as u32).min(frame.height - 1);
                if let Some(rgb) = frame.pixel(sx, sy) {
                    let offset = py as usize * row_len + px as usize * 3;
                    state.pixels[offset..offset + 3].copy_from_slice(&rgb);
                }
            }
        }
    }

    /// Copy out the current pixels.
    pub fn image_data(&self) -> ImageData {
        ImageData {
            width: self.width,
            height: self.height,
            data: self.lock().pixels.clone(),
        }
    }

    /// Write pixels at `(dx, dy)`, ignoring the transform. Pixels falling
    /// outside the canvas are clipped.
    pub fn put_image_data(&self, image: &ImageData, dx: u32, dy: u32) {
        let mut state = self.lock();
        let row_len = self.width as usize * 3;
        for y in 0..image.height {
            let Some(ty) = dy.checked_add(y).filter(|&ty| ty < self.height) else {
                break;
            };
            let visible = image.width.min(self.width.saturating_sub(dx)) as usize;
            if visible == 0 {
                break;
            }
            let src = y as usize * image.width as usize * 3;
            let dst = ty as usize * row_len + dx as usize * 3;
            if let Some(row) = image.data.get(src..src + visible * 3) {
                state.pixels[dst..dst + visible * 3].copy_from_slice(row);
            }
        }
    }

    /// Fill the canvas with black.
    pub fn clear(&self) {
        self.lock().pixels.fill(0);
    }

    /// Whether any pixel differs from black.
    pub fn is_blank(&self) -> bool {
        self.lock().pixels.iter().all(|&b| b == 0)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let state = self.lock();
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        let px = &state.pixels[offset..offset + 3];
        Some([px[0], px[1], px[2]])
    }

    /// Snapshot as an `image` buffer, e.g. for PNG export.
    pub fn to_image(&self) -> RgbImage {
        let data = self.image_data();
        RgbImage::from_raw(data.width, data.height, data.data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}
