//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Identify
//!
//! ```text
//! photos/dawn.jpg
//!     Name: dawn
//!     Size: 4000x3000
//!     Format: jpeg
//!     Density: 300x300 dpi
//! ```
//!
//! The density line only appears when the source declares one.
//!
//! `--json` prints the same records as a JSON array.
//!
//! ## Jobs
//!
//! ```text
//! [1/2] photos/dawn.jpg → out/dawn-thumb.jpg
//!     4000x3000 → 300x300 jpeg (18.4 KB)
//! [2/2] photos/broken.png failed
//!     Image processing failed: Could not read image: broken: unrecognized image format
//!
//! Wrote 1 image, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::imaging::{Density, DensityUnit, ImageDimensions};
use crate::jobs::{BatchReport, Identified, JobEvent};

// ============================================================================
// Shared helpers
// ============================================================================

fn dims(d: ImageDimensions) -> String {
    format!("{}x{}", d.width(), d.height())
}

fn density(d: Density) -> String {
    let unit = match d.unit {
        DensityUnit::Inch => "dpi",
        DensityUnit::Centimeter => "px/cm",
    };
    format!("{}x{} {}", d.x, d.y, unit)
}

/// Human-readable byte count.
pub fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

// ============================================================================
// Identify
// ============================================================================

/// Format identify results, one block per image.
pub fn format_identify(images: &[Identified]) -> Vec<String> {
    let mut lines = Vec::new();
    for image in images {
        lines.push(image.input.clone());
        lines.push(format!("    Name: {}", image.name));
        lines.push(format!("    Size: {}", dims(image.dimensions)));
        let format = image
            .format
            .map(|f| f.to_string())
            .unwrap_or_else(|| "read-only".to_string());
        lines.push(format!("    Format: {}", format));
        if let Some(d) = image.density {
            lines.push(format!("    Density: {}", density(d)));
        }
    }
    lines
}

/// Format identify results as a pretty JSON array.
pub fn format_identify_json(images: &[Identified]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(images)
}

/// Print identify results to stdout.
pub fn print_identify(images: &[Identified]) {
    for line in format_identify(images) {
        println!("{}", line);
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Format a single job progress event as display lines.
pub fn format_job_event(event: &JobEvent) -> Vec<String> {
    match event {
        JobEvent::Finished {
            index,
            total,
            outcome,
        } => vec![
            format!(
                "[{}/{}] {} \u{2192} {}",
                index,
                total,
                outcome.input,
                outcome.output.display()
            ),
            format!(
                "    {} \u{2192} {} {} ({})",
                dims(outcome.original),
                dims(outcome.dimensions),
                outcome.format,
                human_bytes(outcome.bytes)
            ),
        ],
        JobEvent::Failed {
            index,
            total,
            input,
            error,
        } => vec![
            format!("[{}/{}] {} failed", index, total, input),
            format!("    {}", error),
        ],
    }
}

/// Format the closing line of a batch.
pub fn format_batch_summary(report: &BatchReport) -> Vec<String> {
    let mut line = format!("Wrote {}", plural(report.finished.len(), "image"));
    if !report.failed.is_empty() {
        line.push_str(&format!(", {} failed", report.failed.len()));
    }
    vec![String::new(), line]
}

/// Print the closing line of a batch to stdout.
pub fn print_batch_summary(report: &BatchReport) {
    for line in format_batch_summary(report) {
        println!("{}", line);
    }
}
