//! Pure geometry for placing a design inside a design area.
//!
//! All functions here are pure and testable without any I/O or pixels.
//! The pipeline order is fixed: resize first, then rotate about the center
//! onto a larger canvas, then position that canvas on the mockup.

use crate::types::DesignArea;
use thiserror::Error;

/// Largest edge, in pixels, any resolved buffer may have.
pub const MAX_EDGE: u32 = 32_768;

/// Slack used when rounding rotated extents up, so right angles stay exact.
const EXTENT_EPSILON: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("design area must have a positive width and height (got {width}x{height})")]
    NonPositiveArea { width: f64, height: f64 },
    #[error("design area position must be finite (got {x}, {y})")]
    NonFinitePosition { x: f64, y: f64 },
    #[error("overlay image has no pixels ({width}x{height})")]
    EmptyOverlay { width: u32, height: u32 },
    #[error("resolved size {width}x{height} exceeds the 32768px edge limit")]
    TooLarge { width: u64, height: u64 },
}

/// Fully resolved geometry for one overlay on one mockup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Overlay size after resizing.
    pub resized: (u32, u32),
    /// Canvas size after rotation (equals `resized` when not rotated).
    pub canvas: (u32, u32),
    /// Top-left of the canvas on the mockup. May be negative or off-canvas.
    pub offset: (i64, i64),
    /// Clockwise rotation in `[0, 360)`.
    pub rotation: f64,
}

impl Placement {
    pub fn is_rotated(&self) -> bool {
        self.rotation != 0.0
    }
}

/// Reject areas that cannot hold anything or cannot be placed.
pub fn validate_area(area: &DesignArea) -> Result<(), GeometryError> {
    let positive = area.width > 0.0 && area.height > 0.0;
    if !positive || area.width.is_infinite() || area.height.is_infinite() {
        return Err(GeometryError::NonPositiveArea {
            width: area.width,
            height: area.height,
        });
    }
    if !area.x.is_finite() || !area.y.is_finite() {
        return Err(GeometryError::NonFinitePosition {
            x: area.x,
            y: area.y,
        });
    }
    Ok(())
}

/// Largest size with the source aspect ratio that fits inside the target box.
///
/// One dimension matches the box, the other is at most the box. Both are at
/// least 1px.
///
/// # Examples
/// ```
/// # use mockup_press::imaging::calculate_fit_dimensions;
/// assert_eq!(calculate_fit_dimensions((400, 400), (200.0, 100.0)), (100, 100));
/// assert_eq!(calculate_fit_dimensions((1600, 900), (320.0, 320.0)), (320, 180));
/// ```
pub fn calculate_fit_dimensions(source: (u32, u32), target: (f64, f64)) -> (u32, u32) {
    let (src_w, src_h) = (source.0 as f64, source.1 as f64);
    let (tgt_w, tgt_h) = target;

    let scale = (tgt_w / src_w).min(tgt_h / src_h);
    let w = (src_w * scale).round().clamp(1.0, tgt_w.round().max(1.0));
    let h = (src_h * scale).round().clamp(1.0, tgt_h.round().max(1.0));
    (w as u32, h as u32)
}

/// Exact box size, ignoring the source aspect ratio.
pub fn calculate_stretch_dimensions(target: (f64, f64)) -> (u32, u32) {
    (target.0.round().max(1.0) as u32, target.1.round().max(1.0) as u32)
}

/// Normalize degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can land on 360.0 for tiny negative inputs
    if d >= 360.0 { 0.0 } else { d }
}

/// Smallest axis-aligned box holding a `size` rectangle rotated by `degrees`.
///
/// # Examples
/// ```
/// # use mockup_press::imaging::calculate_rotated_bounds;
/// assert_eq!(calculate_rotated_bounds((200, 100), 0.0), (200, 100));
/// assert_eq!(calculate_rotated_bounds((200, 100), 90.0), (100, 200));
/// assert_eq!(calculate_rotated_bounds((200, 200), 45.0), (283, 283));
/// ```
pub fn calculate_rotated_bounds(size: (u32, u32), degrees: f64) -> (u32, u32) {
    let theta = normalize_degrees(degrees);
    if theta == 0.0 {
        return size;
    }
    let (w, h) = (size.0 as f64, size.1 as f64);
    let (sin, cos) = theta.to_radians().sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());

    let bw = (w * cos + h * sin - EXTENT_EPSILON).ceil().max(1.0);
    let bh = (w * sin + h * cos - EXTENT_EPSILON).ceil().max(1.0);
    (bw as u32, bh as u32)
}

/// Where the top-left of a `canvas`-sized overlay lands on the mockup.
///
/// Centered placement aligns the canvas center with the area center;
/// otherwise the canvas starts at the area's top-left.
pub fn calculate_paste_offset(area: &DesignArea, canvas: (u32, u32), center: bool) -> (i64, i64) {
    if center {
        let px = area.x + (area.width - canvas.0 as f64) / 2.0;
        let py = area.y + (area.height - canvas.1 as f64) / 2.0;
        (px.round() as i64, py.round() as i64)
    } else {
        (area.x.round() as i64, area.y.round() as i64)
    }
}

/// Resolve resize, rotation canvas, and offset for one overlay.
pub fn resolve_placement(
    overlay: (u32, u32),
    area: &DesignArea,
    maintain_aspect: bool,
    center: bool,
) -> Result<Placement, GeometryError> {
    validate_area(area)?;
    if overlay.0 == 0 || overlay.1 == 0 {
        return Err(GeometryError::EmptyOverlay {
            width: overlay.0,
            height: overlay.1,
        });
    }
    check_edge(area.width.round() as u64, area.height.round() as u64)?;

    let target = (area.width, area.height);
    let resized = if maintain_aspect {
        calculate_fit_dimensions(overlay, target)
    } else {
        calculate_stretch_dimensions(target)
    };

    let rotation = normalize_degrees(area.rotation);
    let canvas = calculate_rotated_bounds(resized, rotation);
    check_edge(canvas.0 as u64, canvas.1 as u64)?;

    let offset = calculate_paste_offset(area, canvas, center || area.center_in_area);

    Ok(Placement {
        resized,
        canvas,
        offset,
        rotation,
    })
}

fn check_edge(width: u64, height: u64) -> Result<(), GeometryError> {
    if width > MAX_EDGE as u64 || height > MAX_EDGE as u64 {
        return Err(GeometryError::TooLarge { width, height });
    }
    Ok(())
}
