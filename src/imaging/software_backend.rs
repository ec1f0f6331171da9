//! Pure Rust RGBA8 backend built on the `image` crate.
//!
//! ## Operation mapping
//!
//! | Operation | Implementation |
//! |---|---|
//! | Resize | `fast_image_resize` Lanczos3 on premultiplied alpha |
//! | Rotate 90/180/270 | `image::imageops::rotate90` / `rotate180` / `rotate270` (lossless) |
//! | Rotate, other angles | inverse-mapped bilinear sampling with premultiplied alpha |
//! | Opacity | per-pixel alpha multiply, truncated |
//! | Blend | source-over on the overlap rectangle, alpha = max |
//!
//! Work happens on the calling thread; batch parallelism comes from the
//! compositor's pool running many units at once.

use super::backend::{
    CompositeBackend, InverseRotation, bilinear_taps, overlap, rotate_quarter_turns,
};
use fast_image_resize::{self as fr, MulDiv, PixelType, ResizeOptions};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Scalar backend working directly on `RgbaImage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Source-over for one pixel: `rgb = o·a + b·(1 − a)`, `alpha = max(ba, oa)`.
#[inline]
pub(crate) fn blend_pixel(base: Rgba<u8>, over: Rgba<u8>) -> Rgba<u8> {
    match over[3] {
        0 => base,
        255 => Rgba([over[0], over[1], over[2], 255]),
        oa => {
            let a = oa as f32 / 255.0;
            let mix = |o: u8, b: u8| (o as f32 * a + b as f32 * (1.0 - a)).round() as u8;
            Rgba([
                mix(over[0], base[0]),
                mix(over[1], base[1]),
                mix(over[2], base[2]),
                base[3].max(oa),
            ])
        }
    }
}

/// Lanczos3 resize with alpha premultiplied around the convolution, so
/// transparent pixels do not bleed their colour into visible edges.
fn resize_premultiplied(src: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, String> {
    let mut src_image =
        fr::images::Image::from_vec_u8(src.width(), src.height(), src.as_raw().clone(), PixelType::U8x4)
            .map_err(|e| format!("source buffer: {e}"))?;
    let mut dst_image = fr::images::Image::new(width, height, PixelType::U8x4);

    let mul_div = MulDiv::default();
    mul_div
        .multiply_alpha_inplace(&mut src_image)
        .map_err(|e| format!("premultiply: {e}"))?;
    let options =
        ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    fr::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("resize: {e}"))?;
    mul_div
        .divide_alpha_inplace(&mut dst_image)
        .map_err(|e| format!("unpremultiply: {e}"))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| "resized buffer has the wrong length".to_string())
}

fn sample_bilinear(src: &RgbaImage, sx: f64, sy: f64) -> Rgba<u8> {
    let (w, h) = src.dimensions();
    let mut alpha = 0.0f64;
    let mut rgb = [0.0f64; 3];
    for (x, y, weight) in bilinear_taps(sx, sy) {
        if weight == 0.0 || x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            continue;
        }
        let p = src.get_pixel(x as u32, y as u32);
        let a = p[3] as f64 * weight;
        alpha += a;
        for c in 0..3 {
            rgb[c] += p[c] as f64 * a;
        }
    }
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let un = |v: f64| (v / alpha).round().clamp(0.0, 255.0) as u8;
    Rgba([
        un(rgb[0]),
        un(rgb[1]),
        un(rgb[2]),
        alpha.round().clamp(0.0, 255.0) as u8,
    ])
}

impl CompositeBackend for SoftwareBackend {
    type Buffer = RgbaImage;

    fn name(&self) -> &'static str {
        "software"
    }

    fn upload(&self, image: &RgbaImage) -> RgbaImage {
        image.clone()
    }

    fn download(&self, buffer: &RgbaImage) -> RgbaImage {
        buffer.clone()
    }

    fn dimensions(&self, buffer: &RgbaImage) -> (u32, u32) {
        buffer.dimensions()
    }

    fn resize(&self, buffer: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        if buffer.dimensions() == (width, height) {
            return buffer.clone();
        }
        resize_premultiplied(buffer, width, height).unwrap_or_else(|e| {
            log::warn!("premultiplied resize failed ({e}), using image::imageops");
            imageops::resize(buffer, width, height, FilterType::Lanczos3)
        })
    }

    fn rotate(&self, buffer: &RgbaImage, degrees: f64, canvas: (u32, u32)) -> RgbaImage {
        if degrees == 0.0 && canvas == buffer.dimensions() {
            return buffer.clone();
        }
        if let Some(turned) = rotate_quarter_turns(buffer, degrees, canvas) {
            return turned;
        }
        let inverse = InverseRotation::new(buffer.dimensions(), degrees, canvas);
        RgbaImage::from_fn(canvas.0, canvas.1, |x, y| {
            let (sx, sy) = inverse.source_of(x, y);
            sample_bilinear(buffer, sx, sy)
        })
    }

    fn scale_alpha(&self, buffer: &RgbaImage, opacity: f32) -> RgbaImage {
        let mut out = buffer.clone();
        if opacity >= 1.0 {
            return out;
        }
        for pixel in out.pixels_mut() {
            pixel[3] = (pixel[3] as f32 * opacity) as u8;
        }
        out
    }

    fn blend(&self, base: &RgbaImage, overlay: &RgbaImage, offset: (i64, i64)) -> RgbaImage {
        let mut out = base.clone();
        let Some((bx, by, ox, oy, w, h)) = overlap(base.dimensions(), overlay.dimensions(), offset)
        else {
            return out;
        };
        for row in 0..h {
            for col in 0..w {
                let over = *overlay.get_pixel(ox + col, oy + row);
                let dst = out.get_pixel_mut(bx + col, by + row);
                *dst = blend_pixel(*dst, over);
            }
        }
        out
    }
}
