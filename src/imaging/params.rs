//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. They are the
//! interface between the [`Processor`](super::processor::Processor) (which
//! decides what happens to an image) and the [`backend`](super::backend)
//! (which does the actual pixel work). Every knob is a closed enum or a
//! validated newtype, so backends map them to library constants at compile
//! time instead of looking anything up by name.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90).
//! - [`OutputFormat`]: Encodable container formats.
//! - [`ColorSpace`]: Target colorspace. Has no default.
//! - [`ResizeFilter`]: Resampling filter for resizes.
//! - [`Background`]: Opaque color used when removing alpha or flattening layers.
//! - [`Density`]: Pixel density read from JPEG sources and written into JPEG output.
//! - [`ResizeParams`] / [`EncodeParams`]: Full specification for a resize or an encode.

use super::backend::ImagingError;
use super::geometry::ImageDimensions;
use image::ImageFormat;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    /// Clamp any value into the valid range.
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl TryFrom<u32> for Quality {
    type Error = ImagingError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if !(1..=100).contains(&value) {
            return Err(ImagingError::InvalidQuality(value));
        }
        Ok(Self(value as u8))
    }
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Tiff,
    Webp,
    Avif,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    /// File extension used for generated files.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Tiff => "tif",
            other => other.name(),
        }
    }

    /// Whether the encoder honours [`Quality`].
    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Avif)
    }

    /// Map a decoded format to an output format, if we can encode it.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::Tiff => Some(OutputFormat::Tiff),
            ImageFormat::WebP => Some(OutputFormat::Webp),
            ImageFormat::Avif => Some(OutputFormat::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "tiff" | "tif" => Ok(OutputFormat::Tiff),
            "webp" => Ok(OutputFormat::Webp),
            "avif" => Ok(OutputFormat::Avif),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

/// Colorspace of the stored pixel values.
///
/// Decoded images are assumed to be sRGB. `Rgb` means linear-light RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Rgb,
    Srgb,
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColorSpace::Rgb => "rgb",
            ColorSpace::Srgb => "srgb",
        })
    }
}

impl FromStr for ColorSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ColorSpace::Rgb),
            "srgb" => Ok(ColorSpace::Srgb),
            other => Err(format!("unknown colorspace: {other}")),
        }
    }
}

/// Resampling filter for resizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl ResizeFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(ResizeFilter::Nearest),
            "triangle" => Ok(ResizeFilter::Triangle),
            "catmull-rom" | "catmullrom" => Ok(ResizeFilter::CatmullRom),
            "gaussian" => Ok(ResizeFilter::Gaussian),
            "lanczos3" | "lanczos" => Ok(ResizeFilter::Lanczos3),
            other => Err(format!("unknown resize filter: {other}")),
        }
    }
}

/// Opaque background color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Background(pub [u8; 3]);

impl Background {
    pub const WHITE: Background = Background([255, 255, 255]);

    pub fn rgb(self) -> [u8; 3] {
        self.0
    }
}

impl Default for Background {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for Background {
    type Err = ImagingError;

    /// Accepts a handful of color names, `#rgb` and `#rrggbb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ImagingError::InvalidColor(s.to_string());
        let value = s.trim().to_ascii_lowercase();

        let named = match value.as_str() {
            "white" => Some([255, 255, 255]),
            "black" => Some([0, 0, 0]),
            "gray" | "grey" => Some([128, 128, 128]),
            "red" => Some([255, 0, 0]),
            "green" => Some([0, 128, 0]),
            "blue" => Some([0, 0, 255]),
            _ => None,
        };
        if let Some(rgb) = named {
            return Ok(Background(rgb));
        }

        let hex = value.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (slot, i) in rgb.iter_mut().zip(0..3) {
                    *slot = channel(&hex[i..i + 1])? * 17;
                }
                Ok(Background(rgb))
            }
            6 => Ok(Background([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            ])),
            _ => Err(invalid()),
        }
    }
}

/// Unit of a [`Density`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityUnit {
    #[default]
    Inch,
    Centimeter,
}

/// Pixel density of an image. Read from and written into JPEG (JFIF)
/// headers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Density {
    pub x: u16,
    pub y: u16,
    pub unit: DensityUnit,
}

impl Density {
    pub fn dpi(dots: u16) -> Self {
        Self {
            x: dots,
            y: dots,
            unit: DensityUnit::Inch,
        }
    }
}

/// Parameters for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeParams {
    pub dimensions: ImageDimensions,
    pub filter: ResizeFilter,
    /// Fit inside `dimensions` keeping the aspect ratio, instead of
    /// stretching to exactly `dimensions`.
    pub best_fit: bool,
}

/// Parameters for encoding the final blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Option<Quality>,
    pub density: Option<Density>,
}
