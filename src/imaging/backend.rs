//! Image processing backend trait and shared error type.
//!
//! The [`ImageBackend`] trait is the seam between pipeline logic and pixel
//! work. The [`Processor`](super::processor::Processor) decides what happens
//! (geometry, ordering, defaults); a backend only executes single steps on
//! its own image representation.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` in this module.

use super::geometry::{CropRegion, ImageDimensions};
use super::params::{Background, ColorSpace, Density, EncodeParams, OutputFormat, ResizeParams};
use super::source::ReadSource;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid {axis}: {value} (must be positive)")]
    InvalidDimension { axis: &'static str, value: u32 },
    #[error("Invalid compression quality {0} (must be 1-100)")]
    InvalidQuality(u32),
    #[error("Invalid color: {0:?}")]
    InvalidColor(String),
    #[error("File path is not readable: {}", .0.display())]
    NotReadable(PathBuf),
    #[error("A name is required when reading binary image data")]
    MissingName,
    #[error("Could not {operation}: {message}")]
    OperationFailed {
        operation: Operation,
        message: String,
    },
}

impl ImagingError {
    pub fn failed(operation: Operation, message: impl fmt::Display) -> Self {
        ImagingError::OperationFailed {
            operation,
            message: message.to_string(),
        }
    }
}

/// Backend step that failed, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    RemoveAlpha,
    FlattenLayers,
    StripMetadata,
    ConvertColorSpace,
    Crop,
    Resize,
    Encode,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read image",
            Operation::RemoveAlpha => "remove alpha channel",
            Operation::FlattenLayers => "remove layers",
            Operation::StripMetadata => "remove image metadata",
            Operation::ConvertColorSpace => "modify image color-space",
            Operation::Crop => "crop image",
            Operation::Resize => "resize image",
            Operation::Encode => "encode image",
        })
    }
}

/// Trait for image processing backends.
///
/// Transformations take the image by value and hand back the result, so a
/// backend never has to share or lock pixel buffers.
pub trait ImageBackend: Sync {
    type Image;

    /// Decode an image.
    fn read(&self, source: ReadSource) -> Result<Self::Image, ImagingError>;

    /// Current pixel extents.
    fn dimensions(&self, image: &Self::Image) -> Result<ImageDimensions, ImagingError>;

    /// Format the image was decoded from, when it can also be written.
    fn source_format(&self, image: &Self::Image) -> Option<OutputFormat>;

    /// Pixel density declared by the source, when it carries one.
    fn density(&self, image: &Self::Image) -> Option<Density>;

    /// Composite onto `background` and drop the alpha channel.
    fn remove_alpha(
        &self,
        image: Self::Image,
        background: Background,
    ) -> Result<Self::Image, ImagingError>;

    /// Merge all layers/frames onto a `background` canvas.
    fn flatten_layers(
        &self,
        image: Self::Image,
        background: Background,
    ) -> Result<Self::Image, ImagingError>;

    /// Drop embedded profiles and metadata.
    fn strip_metadata(&self, image: Self::Image) -> Result<Self::Image, ImagingError>;

    /// Transform pixel values into `space`.
    fn convert_colorspace(
        &self,
        image: Self::Image,
        space: ColorSpace,
    ) -> Result<Self::Image, ImagingError>;

    /// Extract `region`, which must lie inside the image.
    fn crop(&self, image: Self::Image, region: CropRegion) -> Result<Self::Image, ImagingError>;

    /// Resample to `params.dimensions`.
    fn resize(&self, image: Self::Image, params: &ResizeParams)
    -> Result<Self::Image, ImagingError>;

    /// Encode to a blob.
    fn encode(&self, image: &Self::Image, params: &EncodeParams) -> Result<Vec<u8>, ImagingError>;
}
