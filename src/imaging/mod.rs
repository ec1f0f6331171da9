//! Image compositing: geometry, pixel backends, and encoding.
//!
//! | Step | Implementation |
//! |---|---|
//! | **Fit / stretch** | pure math in `calculations` |
//! | **Resize** | `image::imageops::resize`, Lanczos3 |
//! | **Rotate** | clockwise about the center, expanded canvas, transparent fill |
//! | **Blend** | source-over, alpha = max(base, overlay) |
//! | **Encode** | PNG (adaptive filtering) or JPEG (quality 90 by default) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for placement math (unit testable)
//! - **Parameters**: Encoder settings
//! - **Backend**: [`CompositeBackend`] trait + [`SoftwareBackend`] and [`TensorBackend`]
//! - **Operations**: High-level functions combining calculations + backend
//! - **Codec**: [`encode`] to PNG or JPEG bytes

pub mod backend;
mod calculations;
mod codec;
pub mod operations;
mod params;
pub mod software_backend;
pub mod tensor_backend;

pub use backend::CompositeBackend;
pub use calculations::{
    GeometryError, MAX_EDGE, Placement, calculate_fit_dimensions, calculate_rotated_bounds,
    normalize_degrees, resolve_placement, validate_area,
};
pub use codec::{EncodeError, encode};
pub use operations::{Layer, composite_area, composite_layers, composite_onto, plan_placement};
pub use params::{EncodeParams, Quality};
pub use software_backend::SoftwareBackend;
pub use tensor_backend::TensorBackend;
