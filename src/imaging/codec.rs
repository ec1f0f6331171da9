//! Encoding finished composites to PNG or JPEG bytes.
//!
//! | Format | Encoder | Notes |
//! |---|---|---|
//! | PNG | `PngEncoder`, default compression, adaptive filtering | `optimize_size` switches to best compression |
//! | JPEG | `jpeg_encoder::Encoder` at [`Quality`](super::Quality) | alpha is discarded; `optimize_size` builds optimized Huffman tables |

use super::params::EncodeParams;
use crate::types::OutputFormat;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use jpeg_encoder::{ColorType, Encoder as JpegEncoder};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot encode an empty {width}x{height} image")]
    Empty { width: u32, height: u32 },
    #[error("{width}x{height} exceeds the JPEG limit of 65535px per edge")]
    JpegTooLarge { width: u32, height: u32 },
    #[error("png encoding failed: {0}")]
    Png(#[source] image::ImageError),
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[source] jpeg_encoder::EncodingError),
}

/// Serialize `image` according to `params`.
pub fn encode(image: &RgbaImage, params: &EncodeParams) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodeError::Empty { width, height });
    }

    match params.format {
        OutputFormat::Png => encode_png(image, params.optimize_size),
        OutputFormat::Jpeg => encode_jpeg(image, params),
    }
}

fn encode_png(image: &RgbaImage, optimize_size: bool) -> Result<Vec<u8>, EncodeError> {
    let compression = if optimize_size {
        CompressionType::Best
    } else {
        CompressionType::Default
    };
    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(Cursor::new(&mut bytes), compression, FilterType::Adaptive)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(EncodeError::Png)?;
    Ok(bytes)
}

fn encode_jpeg(image: &RgbaImage, params: &EncodeParams) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = image.dimensions();
    let too_large = || EncodeError::JpegTooLarge { width, height };
    let w = u16::try_from(width).map_err(|_| too_large())?;
    let h = u16::try_from(height).map_err(|_| too_large())?;

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new(&mut bytes, params.quality.value());
    encoder.set_optimized_huffman_tables(params.optimize_size);
    // Rgba input: the encoder ignores the alpha channel.
    encoder
        .encode(image.as_raw(), w, h, ColorType::Rgba)
        .map_err(EncodeError::Jpeg)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{checker, noise, solid};
    use image::{ImageFormat, Rgba};

    #[test]
    fn png_is_lossless_with_alpha() {
        let mut img = checker(24, 16, 4);
        img.put_pixel(3, 3, Rgba([10, 20, 30, 40]));

        let bytes = encode(&img, &EncodeParams::png()).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn optimized_png_decodes_identically() {
        let img = noise(64, 64, 7);
        let params = EncodeParams {
            optimize_size: true,
            ..EncodeParams::png()
        };
        let bytes = encode(&img, &params).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn jpeg_has_magic_and_dimensions() {
        let img = solid(30, 20, Rgba([200, 10, 10, 255]));
        let bytes = encode(&img, &EncodeParams::jpeg(90)).unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 20));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn jpeg_quality_changes_size() {
        let img = noise(96, 96, 3);
        let low = encode(&img, &EncodeParams::jpeg(10)).unwrap();
        let high = encode(&img, &EncodeParams::jpeg(95)).unwrap();
        assert!(low.len() < high.len(), "{} >= {}", low.len(), high.len());
    }

    #[test]
    fn optimized_jpeg_is_smaller_and_decodes() {
        let img = noise(128, 128, 11);
        let plain = encode(&img, &EncodeParams::jpeg(90)).unwrap();
        let optimized = encode(
            &img,
            &EncodeParams {
                optimize_size: true,
                ..EncodeParams::jpeg(90)
            },
        )
        .unwrap();

        assert!(optimized.len() < plain.len(), "{} >= {}", optimized.len(), plain.len());
        let decoded = image::load_from_memory(&optimized).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (128, 128));
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = encode(&RgbaImage::new(0, 5), &EncodeParams::png()).unwrap_err();
        assert!(matches!(err, EncodeError::Empty { width: 0, height: 5 }));
    }
}
