//! Normalized-float backend with data-parallel row kernels.
//!
//! Rasters live as `Rgba32FImage` with every channel in `[0, 1]`. Upload,
//! download, rotation, opacity, and blending are written as kernels over
//! rows (or channel runs) and executed with rayon, so a single large
//! composite spreads across the current pool. Resize runs the same Lanczos3
//! kernel as the software backend on premultiplied float pixels.
//!
//! Values are only quantized back to 8 bits in [`download`], which rounds and
//! clamps.
//!
//! [`download`]: CompositeBackend::download

use super::backend::{
    CompositeBackend, InverseRotation, bilinear_taps, overlap, rotate_quarter_turns,
};
use image::imageops::{self, FilterType};
use image::{Rgba32FImage, RgbaImage};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct TensorBackend;

impl TensorBackend {
    pub fn new() -> Self {
        Self
    }
}

#[inline]
fn blend_texel(base: &mut [f32], over: &[f32]) {
    let a = over[3];
    for c in 0..3 {
        base[c] = over[c] * a + base[c] * (1.0 - a);
    }
    base[3] = base[3].max(a);
}

fn premultiply(image: &mut Rgba32FImage) {
    image.par_chunks_mut(4).for_each(|texel| {
        let a = texel[3];
        texel[0] *= a;
        texel[1] *= a;
        texel[2] *= a;
    });
}

fn unpremultiply(image: &mut Rgba32FImage) {
    image.par_chunks_mut(4).for_each(|texel| {
        let a = texel[3];
        if a > 0.0 {
            for c in &mut texel[..3] {
                *c = (*c / a).clamp(0.0, 1.0);
            }
        } else {
            texel.fill(0.0);
        }
    });
}

fn sample_bilinear(src: &Rgba32FImage, sx: f64, sy: f64) -> [f32; 4] {
    let (w, h) = src.dimensions();
    let mut alpha = 0.0f32;
    let mut rgb = [0.0f32; 3];
    for (x, y, weight) in bilinear_taps(sx, sy) {
        if weight == 0.0 || x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            continue;
        }
        let p = src.get_pixel(x as u32, y as u32).0;
        let a = p[3] * weight as f32;
        alpha += a;
        for c in 0..3 {
            rgb[c] += p[c] * a;
        }
    }
    if alpha <= 0.0 {
        return [0.0; 4];
    }
    [rgb[0] / alpha, rgb[1] / alpha, rgb[2] / alpha, alpha.min(1.0)]
}

impl CompositeBackend for TensorBackend {
    type Buffer = Rgba32FImage;

    fn name(&self) -> &'static str {
        "tensor"
    }

    fn upload(&self, image: &RgbaImage) -> Rgba32FImage {
        let (w, h) = image.dimensions();
        let mut out = Rgba32FImage::new(w, h);
        let texels: &mut [f32] = &mut out;
        texels
            .par_iter_mut()
            .zip(image.as_raw().par_iter())
            .for_each(|(dst, &src)| *dst = src as f32 / 255.0);
        out
    }

    fn download(&self, buffer: &Rgba32FImage) -> RgbaImage {
        let (w, h) = buffer.dimensions();
        let mut out = RgbaImage::new(w, h);
        let bytes: &mut [u8] = &mut out;
        bytes
            .par_iter_mut()
            .zip(buffer.as_raw().par_iter())
            .for_each(|(dst, &src)| *dst = (src.clamp(0.0, 1.0) * 255.0).round() as u8);
        out
    }

    fn dimensions(&self, buffer: &Rgba32FImage) -> (u32, u32) {
        buffer.dimensions()
    }

    fn resize(&self, buffer: &Rgba32FImage, width: u32, height: u32) -> Rgba32FImage {
        if buffer.dimensions() == (width, height) {
            return buffer.clone();
        }
        let mut premultiplied = buffer.clone();
        premultiply(&mut premultiplied);
        let mut out = imageops::resize(&premultiplied, width, height, FilterType::Lanczos3);
        unpremultiply(&mut out);
        out
    }

    fn rotate(&self, buffer: &Rgba32FImage, degrees: f64, canvas: (u32, u32)) -> Rgba32FImage {
        if degrees == 0.0 && canvas == buffer.dimensions() {
            return buffer.clone();
        }
        if let Some(turned) = rotate_quarter_turns(buffer, degrees, canvas) {
            return turned;
        }

        let mut out = Rgba32FImage::new(canvas.0, canvas.1);
        if canvas.0 == 0 || canvas.1 == 0 {
            return out;
        }
        let inverse = InverseRotation::new(buffer.dimensions(), degrees, canvas);
        out.par_chunks_mut(canvas.0 as usize * 4)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, texel) in row.chunks_exact_mut(4).enumerate() {
                    let (sx, sy) = inverse.source_of(x as u32, y as u32);
                    texel.copy_from_slice(&sample_bilinear(buffer, sx, sy));
                }
            });
        out
    }

    fn scale_alpha(&self, buffer: &Rgba32FImage, opacity: f32) -> Rgba32FImage {
        let mut out = buffer.clone();
        if opacity >= 1.0 {
            return out;
        }
        out.par_chunks_mut(4).for_each(|texel| texel[3] *= opacity);
        out
    }

    fn blend(
        &self,
        base: &Rgba32FImage,
        overlay: &Rgba32FImage,
        offset: (i64, i64),
    ) -> Rgba32FImage {
        let mut out = base.clone();
        let Some((bx, by, ox, oy, w, h)) = overlap(base.dimensions(), overlay.dimensions(), offset)
        else {
            return out;
        };
        let stride = base.width() as usize * 4;
        out.par_chunks_mut(stride)
            .enumerate()
            .skip(by as usize)
            .take(h as usize)
            .for_each(|(y, row)| {
                let src_y = oy + (y as u32 - by);
                for col in 0..w {
                    let start = (bx + col) as usize * 4;
                    let over = overlay.get_pixel(ox + col, src_y).0;
                    blend_texel(&mut row[start..start + 4], &over);
                }
            });
        out
    }
}
