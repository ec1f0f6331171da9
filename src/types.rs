//! Value types shared by the engine, the CLI, and the template store boundary.
//!
//! Everything here is plain data: read-only once constructed, serialized in
//! camelCase because that is how the template store hands it over.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target rectangle on a mockup where the design is placed.
///
/// Coordinates are in mockup pixel space with a top-left origin. Rotation is
/// in degrees, clockwise, and may be any real value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignArea {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub center_in_area: bool,
}

fn default_opacity() -> f64 {
    1.0
}

impl DesignArea {
    /// Axis-aligned area with no rotation, full opacity, top-left aligned.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            rotation: 0.0,
            opacity: 1.0,
            center_in_area: false,
        }
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn centered(mut self) -> Self {
        self.center_in_area = true;
        self
    }

    /// Opacity clamped to `[0, 1]`. Non-finite values mean "fully opaque".
    pub fn effective_opacity(&self) -> f32 {
        if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0) as f32
        } else {
            1.0
        }
    }
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "PNG")]
    Png,
    #[serde(alias = "JPEG", alias = "jpg", alias = "JPG")]
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Png => f.write_str("png"),
            OutputFormat::Jpeg => f.write_str("jpeg"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

/// Per-call compositing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompositeOptions {
    /// Center the design in every area, regardless of the area's own flag.
    pub center_design: bool,
    /// Fit inside the area keeping aspect ratio; `false` stretches to fill it.
    pub maintain_aspect: bool,
    pub output_format: OutputFormat,
    /// Encoder quality 0–100, only used for JPEG.
    pub quality: u32,
    /// Trade encode time for smaller output.
    pub optimize_size: bool,
    /// Worker count for a batch. `None` uses the compositor's own pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            center_design: false,
            maintain_aspect: true,
            output_format: OutputFormat::Png,
            quality: 90,
            optimize_size: false,
            concurrency: None,
        }
    }
}

/// A named design-area configuration belonging to a template.
///
/// Only `image_url` and `design_area` reach the engine; `id` and `name` ride
/// along so callers can label results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub image_url: String,
    pub design_area: DesignArea,
}

/// One `(mockup, area)` pair inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUnit {
    pub mockup: String,
    pub area: DesignArea,
}

/// An ordered set of units sharing one design image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub design: String,
    pub units: Vec<BatchUnit>,
    #[serde(default)]
    pub options: CompositeOptions,
}

impl BatchJob {
    pub fn from_variants(
        design: impl Into<String>,
        variants: &[Variant],
        options: CompositeOptions,
    ) -> Self {
        Self {
            design: design.into(),
            units: variants
                .iter()
                .map(|v| BatchUnit {
                    mockup: v.image_url.clone(),
                    area: v.design_area,
                })
                .collect(),
            options,
        }
    }

    pub fn mockups(&self) -> Vec<String> {
        self.units.iter().map(|u| u.mockup.clone()).collect()
    }

    pub fn areas(&self) -> Vec<DesignArea> {
        self.units.iter().map(|u| u.area).collect()
    }
}

/// Batch request as stored in a job file: one design, many template variants.
///
/// ```json
/// {
///   "design": "https://cdn.example.com/logo.png",
///   "variants": [
///     {"id": "front", "name": "Front", "imageUrl": "https://cdn.example.com/tee-front.png",
///      "designArea": {"x": 310, "y": 220, "width": 400, "height": 400}}
///   ],
///   "options": {"outputFormat": "jpeg"}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    pub design: String,
    pub variants: Vec<Variant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<CompositeOptions>,
}

impl JobFile {
    /// Expand into a [`BatchJob`], using `fallback` when the file has no options.
    pub fn to_batch_job(&self, fallback: &CompositeOptions) -> BatchJob {
        let options = self.options.clone().unwrap_or_else(|| fallback.clone());
        BatchJob::from_variants(self.design.clone(), &self.variants, options)
    }
}
