//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They sit between
//! the [`operations`](super::operations) layer (which decides what to draw
//! where) and the [`backend`](super::backend) / [`codec`](super::codec) layers
//! (which touch pixels and bytes).
//!
//! - [`Quality`]: lossy encoding quality (1-100, default 90). Clamped on construction.
//! - [`EncodeParams`]: output format, quality, size/speed trade-off.

use crate::types::{CompositeOptions, OutputFormat};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// How to serialize a finished composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    /// Only meaningful for JPEG.
    pub quality: Quality,
    /// Slower encode for smaller output.
    pub optimize_size: bool,
}

impl EncodeParams {
    pub fn png() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: Quality::default(),
            optimize_size: false,
        }
    }

    pub fn jpeg(quality: u32) -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: Quality::new(quality),
            optimize_size: false,
        }
    }
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self::png()
    }
}

impl From<&CompositeOptions> for EncodeParams {
    fn from(options: &CompositeOptions) -> Self {
        Self {
            format: options.output_format,
            quality: Quality::new(options.quality),
            optimize_size: options.optimize_size,
        }
    }
}
