//! # mockup-press
//!
//! Composites design artwork onto product mockup photos. Given a mockup, a
//! design, and a *design area* (rectangle, rotation, opacity), it produces an
//! encoded PNG or JPEG of the mockup wearing the design. Batches apply one
//! design to many mockups in parallel, each with its own area.
//!
//! # Pipeline
//!
//! ```text
//! fetch      mockup + design  →  RGBA8 rasters        (HTTP or local file)
//! place      design area      →  Placement            (fit, rotate bounds, offset)
//! transform  design           →  overlay canvas       (resize → rotate → fade)
//! blend      overlay + mockup →  composite            (source-over, alpha = max)
//! encode     composite        →  bytes                (PNG or JPEG)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`compositor`] | Engine entry point: single composites, batches, worker pool |
//! | [`fetch`] | Loads and decodes images from URLs or files |
//! | [`imaging`] | Placement math, pixel backends, compositing operations, encoding |
//! | [`config`] | `config.toml` loading, validation, merging, stock defaults |
//! | [`types`] | Shared request types (`DesignArea`, `CompositeOptions`, `BatchJob`) |
//! | [`output`] | CLI output formatting for progress and summaries |
//!
//! # Design Decisions
//!
//! ## One Pipeline, Pluggable Backends
//!
//! The compositing pipeline is written once in [`imaging::operations`] against
//! the [`imaging::CompositeBackend`] trait. [`imaging::SoftwareBackend`] works
//! on 8-bit rasters; [`imaging::TensorBackend`] works on normalized floats
//! and runs its per-row kernels in parallel. Both share the same resize
//! filter and blend formula, so switching backends changes speed, not output.
//!
//! ## Failures Are Results
//!
//! In a batch, one unreachable mockup must not cost the other ninety-nine.
//! Each unit's outcome is a `Result` inside [`compositor::BatchReport`]; only
//! malformed requests fail the whole call.
//!
//! ## No Globals
//!
//! The HTTP client and the rayon pool belong to a [`compositor::Compositor`]
//! and are dropped with it. Two compositors with different limits can live in
//! the same process.

pub mod compositor;
pub mod config;
pub mod fetch;
pub mod imaging;
pub mod output;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
