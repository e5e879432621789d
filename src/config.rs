//! Processing configuration.
//!
//! Handles loading, validating, and merging `pixfit.toml`. Stock defaults
//! are serialized to a TOML table and the user's file is merged on top, so
//! a config file only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! `pixfit` reads `pixfit.toml` from the current directory when present.
//! `--config <file>` points at a different file, which must exist.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! # format = "jpeg"       # Omit to keep the source format
//! # quality = 90          # 1-100, omit for the encoder default
//! # colorspace = "srgb"   # No default, omit to skip conversion
//! # dpi = 300             # Written into JPEG output
//!
//! [alpha]
//! remove = true
//! background = "white"    # Name, #rgb or #rrggbb
//!
//! [layers]
//! flatten = true
//!
//! [metadata]
//! strip = true
//!
//! [resize]
//! filter = "lanczos3"     # nearest, triangle, catmull-rom, gaussian, lanczos3
//! best_fit = true
//!
//! [thumbnail]
//! size = 300
//!
//! [processing]
//! max_processes = 4       # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Background, ColorSpace, OutputFormat, Quality, ResizeFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "pixfit.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `pixfit.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PixfitConfig {
    /// Output encoding settings.
    pub output: OutputConfig,
    /// Alpha channel removal.
    pub alpha: AlphaConfig,
    /// Layer flattening.
    pub layers: LayersConfig,
    /// Metadata stripping.
    pub metadata: MetadataConfig,
    /// Resampling settings for scale and thumbnail.
    pub resize: ResizeConfig,
    /// Thumbnail settings.
    pub thumbnail: ThumbnailConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl PixfitConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(quality) = self.output.quality {
            Quality::try_from(quality).map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        if self.output.dpi == Some(0) {
            return Err(ConfigError::Validation(
                "output.dpi must be positive".into(),
            ));
        }
        self.alpha
            .background()
            .map_err(|e| ConfigError::Validation(format!("alpha.background: {e}")))?;
        if self.thumbnail.size == 0 {
            return Err(ConfigError::Validation(
                "thumbnail.size must be positive".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Output encoding settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Target format. When absent the source format is kept.
    pub format: Option<OutputFormat>,
    /// Compression quality, 1-100.
    pub quality: Option<u32>,
    /// Target colorspace. When absent no conversion happens.
    pub colorspace: Option<ColorSpace>,
    /// Pixel density in dots per inch.
    pub dpi: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlphaConfig {
    pub remove: bool,
    /// Color the image is composited onto.
    pub background: String,
}

impl AlphaConfig {
    pub fn background(&self) -> Result<Background, crate::imaging::ImagingError> {
        self.background.parse()
    }
}

impl Default for AlphaConfig {
    fn default() -> Self {
        Self {
            remove: true,
            background: "white".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayersConfig {
    pub flatten: bool,
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self { flatten: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub strip: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self { strip: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub filter: ResizeFilter,
    /// Fit inside the computed box rather than forcing it exactly.
    pub best_fit: bool,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            filter: ResizeFilter::default(),
            best_fit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    /// Edge length of square thumbnails, in pixels.
    pub size: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { size: 300 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PixfitConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(file: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(file)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PixfitConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PixfitConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective config.
///
/// An explicit `file` must exist. Otherwise `pixfit.toml` in `dir` is used
/// when present, and stock defaults when not.
pub fn load_config(file: Option<&Path>, dir: &Path) -> Result<PixfitConfig, ConfigError> {
    let overlay = match file {
        Some(file) => Some(load_raw_config(file)?),
        None => {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                Some(load_raw_config(&candidate)?)
            } else {
                None
            }
        }
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `pixfit.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixfit configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# pixfit reads ./pixfit.toml, or the file given with --config.
# Command-line flags override anything set here.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[output]
# Output format: jpeg, png, tiff, webp or avif.
# Omit to keep the source format (JPEG when the source can't be written back).
# format = "jpeg"

# Compression quality, 1 (smallest) to 100 (best).
# Omit to use the encoder default of 90.
# quality = 90

# Target colorspace: rgb (linear) or srgb.
# There is no default; omit to leave pixel values as decoded.
# colorspace = "srgb"

# Pixel density in dots per inch, written into JPEG headers.
# dpi = 300

# ---------------------------------------------------------------------------
# Alpha channel
# ---------------------------------------------------------------------------
[alpha]
# Composite transparent images onto a solid background.
remove = true

# Background color: a name (white, black, gray, red, green, blue),
# #rgb or #rrggbb.
background = "white"

# ---------------------------------------------------------------------------
# Layers
# ---------------------------------------------------------------------------
[layers]
# Merge multi-frame images (animated GIF) into a single picture.
flatten = true

# ---------------------------------------------------------------------------
# Metadata
# ---------------------------------------------------------------------------
[metadata]
# Drop embedded color profiles and other metadata.
strip = true

# ---------------------------------------------------------------------------
# Resizing
# ---------------------------------------------------------------------------
[resize]
# Resampling filter: nearest, triangle, catmull-rom, gaussian, lanczos3.
filter = "lanczos3"

# Fit inside the computed box keeping aspect ratio (true),
# or stretch to it exactly (false). Thumbnails are always exact.
best_fit = true

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnail]
# Edge length of square thumbnails, in pixels.
size = 300

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
