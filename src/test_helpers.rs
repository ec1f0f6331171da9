//! Shared test utilities.
//!
//! Synthetic rasters with predictable pixels and an in-memory
//! [`ImageFetcher`] so compositor tests never touch the network.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let fetcher = InMemoryFetcher::new()
//!     .with_image("mockup", solid(800, 600, WHITE))
//!     .with_image("design", solid(400, 400, RED))
//!     .with_failure("broken", LoadReason::Timeout);
//! ```

use crate::fetch::{ImageFetcher, LoadError, LoadReason};
use crate::imaging::{EncodeParams, encode};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::Mutex;

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

// =========================================================================
// Rasters
// =========================================================================

pub fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color)
}

/// Opaque black/white checkerboard with `cell`-sized squares.
pub fn checker(width: u32, height: u32, cell: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgba([0, 0, 0, 255])
        } else {
            WHITE
        }
    })
}

/// `color` disc on fully transparent black, touching all four edges.
pub fn disc(size: u32, color: Rgba<u8>) -> RgbaImage {
    let r = size as f32 / 2.0;
    RgbaImage::from_fn(size, size, |x, y| {
        let (dx, dy) = (x as f32 + 0.5 - r, y as f32 + 0.5 - r);
        if dx * dx + dy * dy <= r * r {
            color
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Deterministic opaque noise (xorshift), hard to compress.
pub fn noise(width: u32, height: u32, seed: u32) -> RgbaImage {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    RgbaImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, 255])
    })
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    encode(image, &EncodeParams::png()).unwrap()
}

// =========================================================================
// Fetcher
// =========================================================================

enum Entry {
    Image(RgbaImage),
    Fail(LoadReason),
    Panic,
}

/// Fetcher serving prepared rasters and failures from a map.
///
/// Unknown references fail with a network error. Every call is recorded.
#[derive(Default)]
pub struct InMemoryFetcher {
    entries: HashMap<String, Entry>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, reference: &str, image: RgbaImage) -> Self {
        self.entries.insert(reference.to_string(), Entry::Image(image));
        self
    }

    pub fn with_failure(mut self, reference: &str, reason: LoadReason) -> Self {
        self.entries.insert(reference.to_string(), Entry::Fail(reason));
        self
    }

    /// Fetching `reference` panics, simulating a bug inside one unit.
    pub fn with_panic(mut self, reference: &str) -> Self {
        self.entries.insert(reference.to_string(), Entry::Panic);
        self
    }

    pub fn calls_for(&self, reference: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == reference)
            .count()
    }
}

fn error_for(reference: &str, reason: LoadReason) -> LoadError {
    let reference = reference.to_string();
    match reason {
        LoadReason::Network => LoadError::Network {
            url: reference,
            message: "connection refused".into(),
        },
        LoadReason::Timeout => LoadError::Timeout {
            url: reference,
            secs: 30,
        },
        LoadReason::Decode => LoadError::Decode {
            reference,
            message: "unrecognized image data".into(),
        },
        LoadReason::Io => LoadError::Io {
            path: reference,
            message: "No such file or directory".into(),
        },
        LoadReason::TooLarge => LoadError::TooLarge {
            reference,
            limit: 1024,
        },
    }
}

impl ImageFetcher for InMemoryFetcher {
    fn fetch(&self, reference: &str) -> Result<RgbaImage, LoadError> {
        self.calls.lock().unwrap().push(reference.to_string());
        match self.entries.get(reference) {
            Some(Entry::Image(img)) => Ok(img.clone()),
            Some(Entry::Fail(reason)) => Err(error_for(reference, *reason)),
            Some(Entry::Panic) => panic!("fetcher exploded on {reference}"),
            None => Err(error_for(reference, LoadReason::Network)),
        }
    }
}
