//! Engine configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! serialized to a TOML table, the user's file is merged over it, and the
//! result is deserialized with unknown keys rejected.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [fetch]
//! timeout_secs = 30            # Per-request HTTP timeout
//! max_bytes = 52428800         # Largest accepted image payload (50 MiB)
//! user_agent = "mockup-press/<version>"
//!
//! [engine]
//! backend = "software"         # "software" (u8 raster) or "tensor" (f32, parallel kernels)
//!
//! [output]
//! format = "png"               # "png" or "jpeg"
//! quality = 90                 # JPEG quality (1-100)
//! optimize_size = false        # Slower encode, smaller PNGs
//!
//! [batch]
//! concurrency = 4              # Worker pool size (omit for auto)
//! ```
//!
//! Config files are sparse; override only what you need. Unknown keys are
//! rejected to catch typos early.

use crate::types::{CompositeOptions, OutputFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Upper bound on batch workers, whatever the config or call asks for.
pub const MAX_CONCURRENCY: usize = 64;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompositorConfig {
    /// Image loading (timeouts, size limit).
    pub fetch: FetchConfig,
    /// Pixel backend selection.
    pub engine: EngineConfig,
    /// Default encoder settings for the CLI.
    pub output: OutputConfig,
    /// Batch worker pool.
    pub batch: BatchConfig,
}

impl CompositorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.timeout_secs must be at least 1".into(),
            ));
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "fetch.max_bytes must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self
            .batch
            .concurrency
            .is_some_and(|n| !(1..=MAX_CONCURRENCY).contains(&n))
        {
            return Err(ConfigError::Validation(format!(
                "batch.concurrency must be 1-{MAX_CONCURRENCY}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_bytes: 50 * 1024 * 1024,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("mockup-press/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Which [`CompositeBackend`](crate::imaging::CompositeBackend) runs the pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Software,
    Tensor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub backend: BackendKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub quality: u32,
    pub optimize_size: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: 90,
            optimize_size: false,
        }
    }
}

impl OutputConfig {
    /// Compositing options seeded with these encoder defaults.
    pub fn to_options(&self) -> CompositeOptions {
        CompositeOptions {
            output_format: self.format,
            quality: self.quality,
            optimize_size: self.optimize_size,
            ..CompositeOptions::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Worker count. When absent, `clamp(cores, 4, 8)`.
    pub concurrency: Option<usize>,
}

/// Resolve a worker count.
///
/// - `None` → available cores, kept within 4..=8 (fetches block on I/O, so
///   small machines still get a few workers)
/// - `Some(n)` → `n`, kept within 1..=[`MAX_CONCURRENCY`]
pub fn effective_concurrency(requested: Option<usize>) -> usize {
    match requested {
        Some(n) => n.clamp(1, MAX_CONCURRENCY),
        None => {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            cores.clamp(4, 8)
        }
    }
}

/// Stock defaults as a `toml::Value::Table`, the base layer for merging.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CompositorConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut table), toml::Value::Table(overrides)) => {
            for (key, value) in overrides {
                let merged = match table.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                table.insert(key, merged);
            }
            toml::Value::Table(table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CompositorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CompositorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`, or stock defaults when `path` is `None`.
///
/// An explicitly named file that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<CompositorConfig, ConfigError> {
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(stock_defaults_value(), overlay)
}

/// Fully-commented stock `config.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    concat!(
        r##"# mockup-press configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Image loading
# ---------------------------------------------------------------------------
[fetch]
# Seconds before an HTTP request for a mockup or design is abandoned.
timeout_secs = 30

# Largest accepted image payload in bytes (50 MiB).
max_bytes = 52428800

# User-Agent header sent with every request.
user_agent = "mockup-press/"##,
        env!("CARGO_PKG_VERSION"),
        r##""

# ---------------------------------------------------------------------------
# Engine
# ---------------------------------------------------------------------------
[engine]
# "software": 8-bit raster, one unit per worker.
# "tensor":   normalized float buffers, row kernels run in parallel.
backend = "software"

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# "png" keeps transparency; "jpeg" is smaller and drops it.
format = "png"

# JPEG quality (1 = worst, 100 = best). Ignored for PNG.
quality = 90

# Spend more time compressing PNG output.
optimize_size = false

# ---------------------------------------------------------------------------
# Batch
# ---------------------------------------------------------------------------
[batch]
# Parallel workers for batch jobs (1-64).
# Omit or comment out to auto-detect (= CPU cores, kept within 4-8).
# concurrency = 4
"##
    )
}
