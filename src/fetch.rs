//! Loading mockup and design images from URLs or local files.
//!
//! [`HttpFetcher`] owns one blocking `reqwest` client with the configured
//! timeout. The client pools connections internally and is shared by
//! reference across every worker of a batch; it is dropped with the fetcher.
//!
//! References are resolved by prefix:
//!
//! | Reference | Source |
//! |---|---|
//! | `http://…`, `https://…` | HTTP GET, 2xx only |
//! | `file:///path` | local file |
//! | anything else | treated as a local path |
//!
//! Bytes are sniffed with `image::guess_format`, checked against
//! [`ALLOWED_FORMATS`], decoded, and normalized to RGBA8.

use crate::config::FetchConfig;
use image::{ImageFormat, RgbaImage};
use reqwest::blocking::Client;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Input formats accepted for mockups and designs.
pub const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// Coarse failure category, stable across error message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReason {
    Network,
    Timeout,
    Decode,
    Io,
    TooLarge,
}

impl LoadReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadReason::Network => "network",
            LoadReason::Timeout => "timeout",
            LoadReason::Decode => "decode",
            LoadReason::Io => "io",
            LoadReason::TooLarge => "too-large",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("fetching {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("cannot decode {reference}: {message}")]
    Decode { reference: String, message: String },
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
    #[error("{reference} exceeds the {limit} byte limit")]
    TooLarge { reference: String, limit: u64 },
}

impl LoadError {
    pub fn reason(&self) -> LoadReason {
        match self {
            LoadError::Network { .. } | LoadError::Status { .. } => LoadReason::Network,
            LoadError::Timeout { .. } => LoadReason::Timeout,
            LoadError::Decode { .. } => LoadReason::Decode,
            LoadError::Io { .. } => LoadReason::Io,
            LoadError::TooLarge { .. } => LoadReason::TooLarge,
        }
    }
}

/// Source of decoded images for the compositor.
///
/// Implementations must be shareable across batch workers.
pub trait ImageFetcher: Sync {
    fn fetch(&self, reference: &str) -> Result<RgbaImage, LoadError>;
}

/// Fetcher for HTTP(S) URLs and local files.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout_secs: u64,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            timeout_secs: config.timeout_secs,
            max_bytes: config.max_bytes,
        })
    }

    /// Raw bytes behind `reference`, size-limited but not decoded.
    pub fn fetch_bytes(&self, reference: &str) -> Result<Vec<u8>, LoadError> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            self.fetch_http(reference)
        } else {
            let path = reference.strip_prefix("file://").unwrap_or(reference);
            read_file(Path::new(path), self.max_bytes)
        }
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.map_reqwest_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large(url));
        }

        // Content-Length may be absent or wrong; cap the read itself.
        let mut bytes = Vec::new();
        response
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    LoadError::Timeout {
                        url: url.to_string(),
                        secs: self.timeout_secs,
                    }
                } else {
                    LoadError::Network {
                        url: url.to_string(),
                        message: format!("reading body: {e}"),
                    }
                }
            })?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(self.too_large(url));
        }
        log::debug!("fetched {} bytes from {url}", bytes.len());
        Ok(bytes)
    }

    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> LoadError {
        if e.is_timeout() {
            LoadError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            LoadError::Network {
                url: url.to_string(),
                message: format!("cannot connect: {e}"),
            }
        } else {
            LoadError::Network {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }

    fn too_large(&self, reference: &str) -> LoadError {
        LoadError::TooLarge {
            reference: reference.to_string(),
            limit: self.max_bytes,
        }
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, reference: &str) -> Result<RgbaImage, LoadError> {
        let bytes = self.fetch_bytes(reference)?;
        decode_image(reference, &bytes)
    }
}

fn read_file(path: &Path, max_bytes: u64) -> Result<Vec<u8>, LoadError> {
    let io_error = |e: std::io::Error| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let len = fs::metadata(path).map_err(io_error)?.len();
    if len > max_bytes {
        return Err(LoadError::TooLarge {
            reference: path.display().to_string(),
            limit: max_bytes,
        });
    }
    fs::read(path).map_err(io_error)
}

/// Sniff, check, and decode `bytes` into an RGBA8 raster.
pub fn decode_image(reference: &str, bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    let decode_error = |message: String| LoadError::Decode {
        reference: reference.to_string(),
        message,
    };

    let format = image::guess_format(bytes)
        .map_err(|_| decode_error("unrecognized image data".to_string()))?;
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(decode_error(format!("{format:?} is not an accepted format")));
    }

    let rgba = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| decode_error(e.to_string()))?
        .into_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(decode_error("image has no pixels".to_string()));
    }
    Ok(rgba)
}
