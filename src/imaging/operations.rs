//! High-level compositing operations.
//!
//! These functions combine geometry from [`calculations`](super::calculations)
//! with backend execution. They decide what to draw where; the backend
//! decides how pixels move.
//!
//! Pipeline for one overlay: resize → rotate (skipped at 0°) → fade
//! (skipped at full opacity) → source-over blend at the resolved offset.

use super::backend::CompositeBackend;
use super::calculations::{GeometryError, Placement, resolve_placement};
use crate::types::{CompositeOptions, DesignArea};
use image::RgbaImage;

/// Result type for compositing operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

/// One overlay to apply in [`composite_layers`].
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    pub image: &'a RgbaImage,
    pub area: DesignArea,
}

/// Resolve where and how large `overlay` lands for `area`.
///
/// Centering applies when either the area or the options ask for it.
pub fn plan_placement(
    overlay: (u32, u32),
    area: &DesignArea,
    options: &CompositeOptions,
) -> Result<Placement> {
    resolve_placement(
        overlay,
        area,
        options.maintain_aspect,
        options.center_design,
    )
}

/// Resize, rotate, and fade an overlay buffer according to `placement`.
pub fn transform_overlay<B: CompositeBackend>(
    backend: &B,
    overlay: &B::Buffer,
    placement: &Placement,
    opacity: f32,
) -> B::Buffer {
    let (w, h) = placement.resized;
    let mut buffer = backend.resize(overlay, w, h);
    if placement.is_rotated() {
        buffer = backend.rotate(&buffer, placement.rotation, placement.canvas);
    }
    if opacity < 1.0 {
        buffer = backend.scale_alpha(&buffer, opacity);
    }
    buffer
}

/// Composite an already-uploaded overlay onto `base`.
///
/// Lets a batch upload the shared design once and reuse it per mockup.
pub fn composite_onto<B: CompositeBackend>(
    backend: &B,
    base: &RgbaImage,
    overlay: &B::Buffer,
    area: &DesignArea,
    options: &CompositeOptions,
) -> Result<RgbaImage> {
    let placement = plan_placement(backend.dimensions(overlay), area, options)?;
    log::debug!(
        "{}: overlay {:?} -> {:?} at {:?} ({}°)",
        backend.name(),
        placement.resized,
        placement.canvas,
        placement.offset,
        placement.rotation
    );

    let transformed = transform_overlay(backend, overlay, &placement, area.effective_opacity());
    let base = backend.upload(base);
    let blended = backend.blend(&base, &transformed, placement.offset);
    Ok(backend.download(&blended))
}

/// Composite one overlay onto one base image. Neither input is modified.
pub fn composite_area<B: CompositeBackend>(
    backend: &B,
    base: &RgbaImage,
    overlay: &RgbaImage,
    area: &DesignArea,
    options: &CompositeOptions,
) -> Result<RgbaImage> {
    // Validate before paying for the upload.
    plan_placement(overlay.dimensions(), area, options)?;
    let overlay = backend.upload(overlay);
    composite_onto(backend, base, &overlay, area, options)
}

/// Apply several overlays to one base in order; later layers draw on top.
///
/// Every placement is resolved before any pixels move, so one bad area
/// fails the whole call without partial work.
pub fn composite_layers<B: CompositeBackend>(
    backend: &B,
    base: &RgbaImage,
    layers: &[Layer<'_>],
    options: &CompositeOptions,
) -> Result<RgbaImage> {
    let placements = layers
        .iter()
        .map(|layer| plan_placement(layer.image.dimensions(), &layer.area, options))
        .collect::<Result<Vec<_>>>()?;

    let mut canvas = backend.upload(base);
    for (layer, placement) in layers.iter().zip(&placements) {
        let overlay = backend.upload(layer.image);
        let transformed =
            transform_overlay(backend, &overlay, placement, layer.area.effective_opacity());
        canvas = backend.blend(&canvas, &transformed, placement.offset);
    }
    Ok(backend.download(&canvas))
}
