//! CLI output formatting.
//!
//! Every function here is pure: it turns engine data into lines of text and
//! leaves printing to the caller (or the thin `print_*` wrappers). Units are
//! identified by their 1-based position in the job, zero-padded, with the
//! mockup reference as secondary context.
//!
//! # Output Format
//!
//! ## Batch progress
//!
//! ```text
//! Design https://cdn.example.com/logo.png (1200x1200)
//! 001 https://cdn.example.com/tee-front.png
//!     ok: 412.3 KB
//! 002 https://cdn.example.com/tee-back.png
//!     FAILED: image load failed: https://cdn.example.com/tee-back.png answered HTTP 404
//! ```
//!
//! ## Batch summary
//!
//! ```text
//! Batch: 2 units, 1 succeeded, 1 failed
//!     Wrote out/001-front.png
//! ```

use crate::compositor::{BatchEvent, BatchReport};
use crate::types::OutputFormat;
use std::path::{Path, PathBuf};

/// Human-readable byte count.
pub fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn unit_header(index: usize, mockup: &str) -> String {
    format!("{:03} {}", index + 1, mockup)
}

/// File name for a batch result: `NNN-<id>.<ext>`, or `NNN.<ext>` without an id.
///
/// Characters outside `[A-Za-z0-9_-]` in the id become `-`.
pub fn batch_file_name(index: usize, id: &str, format: OutputFormat) -> String {
    let slug: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        format!("{:03}.{}", index + 1, format.extension())
    } else {
        format!("{:03}-{}.{}", index + 1, slug, format.extension())
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Lines for one progress event.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::DesignLoaded {
            reference,
            width,
            height,
        } => vec![format!("Design {reference} ({width}x{height})")],
        BatchEvent::UnitFinished {
            index,
            mockup,
            ok,
            error,
            bytes,
        } => {
            let status = if *ok {
                format!("    ok: {}", format_bytes(*bytes))
            } else {
                format!("    FAILED: {}", error.as_deref().unwrap_or("unknown error"))
            };
            vec![unit_header(*index, mockup), status]
        }
    }
}

/// Closing lines for a finished batch: counts, written files, failures.
pub fn format_batch_summary(report: &BatchReport, written: &[PathBuf]) -> Vec<String> {
    let mut lines = vec![format!(
        "Batch: {} units, {} succeeded, {} failed",
        report.results.len(),
        report.succeeded,
        report.failed()
    )];
    for path in written {
        lines.push(format!("    Wrote {}", path.display()));
    }
    for result in &report.results {
        if let Err(e) = &result.outcome {
            lines.push(format!(
                "    Failed {}: {}",
                unit_header(result.index, &result.mockup),
                e
            ));
        }
    }
    lines
}

pub fn print_batch_summary(report: &BatchReport, written: &[PathBuf]) {
    for line in format_batch_summary(report, written) {
        println!("{line}");
    }
}

// ============================================================================
// Single composite
// ============================================================================

pub fn format_composite_output(path: &Path, bytes: usize) -> Vec<String> {
    vec![format!("Wrote {} ({})", path.display(), format_bytes(bytes))]
}

pub fn print_composite_output(path: &Path, bytes: usize) {
    for line in format_composite_output(path, bytes) {
        println!("{line}");
    }
}
