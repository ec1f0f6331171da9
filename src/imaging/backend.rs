//! Compositing backend trait.
//!
//! The [`CompositeBackend`] trait is the capability set every execution
//! strategy provides: move a raster in and out of its working buffer, and
//! resize, rotate, fade, and blend those buffers. The pipeline in
//! [`operations`](super::operations) is written once against this trait.
//!
//! | Backend | Working buffer | Notes |
//! |---|---|---|
//! | [`SoftwareBackend`](super::software_backend::SoftwareBackend) | `RgbaImage` (u8) | exact right-angle rotations |
//! | [`TensorBackend`](super::tensor_backend::TensorBackend) | `Rgba32FImage` (f32) | row kernels run in parallel on rayon |
//!
//! Both resize with the same Lanczos3 kernel and blend with the same
//! source-over formula, so their output differs only by float rounding.
//! Every method returns a new buffer; inputs are never mutated.

use image::{ImageBuffer, Pixel, RgbaImage, imageops};

/// Execution strategy for the compositing pipeline.
pub trait CompositeBackend: Sync {
    /// Working representation of a raster.
    type Buffer: Send + Sync;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Load an RGBA8 raster into a working buffer.
    fn upload(&self, image: &RgbaImage) -> Self::Buffer;

    /// Convert a working buffer back to RGBA8.
    fn download(&self, buffer: &Self::Buffer) -> RgbaImage;

    /// `(width, height)` of a working buffer.
    fn dimensions(&self, buffer: &Self::Buffer) -> (u32, u32);

    /// Resample to exactly `width` x `height` with Lanczos3.
    fn resize(&self, buffer: &Self::Buffer, width: u32, height: u32) -> Self::Buffer;

    /// Rotate clockwise by `degrees` about the center onto a `canvas`-sized
    /// buffer. Uncovered pixels are fully transparent.
    fn rotate(&self, buffer: &Self::Buffer, degrees: f64, canvas: (u32, u32)) -> Self::Buffer;

    /// Multiply the alpha channel by `opacity` (already clamped to `[0, 1]`).
    fn scale_alpha(&self, buffer: &Self::Buffer, opacity: f32) -> Self::Buffer;

    /// Source-over blend of `overlay` onto a copy of `base` with its top-left
    /// at `offset`. Parts of the overlay outside `base` are dropped.
    fn blend(&self, base: &Self::Buffer, overlay: &Self::Buffer, offset: (i64, i64))
    -> Self::Buffer;
}

/// Intersection of an overlay placed at `offset` with the base bounds.
///
/// Returns `(base_x, base_y, overlay_x, overlay_y, width, height)` or `None`
/// when the overlay misses the base entirely.
pub(crate) fn overlap(
    base: (u32, u32),
    overlay: (u32, u32),
    offset: (i64, i64),
) -> Option<(u32, u32, u32, u32, u32, u32)> {
    let x0 = offset.0.max(0);
    let y0 = offset.1.max(0);
    let x1 = offset.0.saturating_add(overlay.0 as i64).min(base.0 as i64);
    let y1 = offset.1.saturating_add(overlay.1 as i64).min(base.1 as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((
        x0 as u32,
        y0 as u32,
        (x0 - offset.0) as u32,
        (y0 - offset.1) as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    ))
}

/// Maps destination canvas pixels back to source coordinates for a
/// clockwise rotation about both centers.
///
/// Coordinates are pixel indices; the returned position is in the source's
/// index space, so `(0.0, 0.0)` is the center of the top-left source pixel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InverseRotation {
    sin: f64,
    cos: f64,
    src_center: (f64, f64),
    dst_center: (f64, f64),
}

impl InverseRotation {
    pub(crate) fn new(source: (u32, u32), degrees: f64, canvas: (u32, u32)) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            sin,
            cos,
            src_center: (source.0 as f64 / 2.0, source.1 as f64 / 2.0),
            dst_center: (canvas.0 as f64 / 2.0, canvas.1 as f64 / 2.0),
        }
    }

    #[inline]
    pub(crate) fn source_of(&self, x: u32, y: u32) -> (f64, f64) {
        let dx = x as f64 + 0.5 - self.dst_center.0;
        let dy = y as f64 + 0.5 - self.dst_center.1;
        (
            dx * self.cos + dy * self.sin + self.src_center.0 - 0.5,
            -dx * self.sin + dy * self.cos + self.src_center.1 - 0.5,
        )
    }
}

/// Bilinear taps around a source position: `(x, y, weight)` for the four
/// neighbours. Taps may fall outside the image; callers treat those as
/// transparent.
#[inline]
pub(crate) fn bilinear_taps(sx: f64, sy: f64) -> [(i64, i64, f64); 4] {
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ]
}

/// Lossless rotation for exact quarter turns, when the canvas matches.
pub(crate) fn rotate_quarter_turns<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    degrees: f64,
    canvas: (u32, u32),
) -> Option<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel + 'static,
{
    let (w, h) = image.dimensions();
    if degrees == 90.0 && canvas == (h, w) {
        Some(imageops::rotate90(image))
    } else if degrees == 180.0 && canvas == (w, h) {
        Some(imageops::rotate180(image))
    } else if degrees == 270.0 && canvas == (h, w) {
        Some(imageops::rotate270(image))
    } else {
        None
    }
}
