//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (GIF frames via `GifDecoder`) |
//! | **Remove alpha / layers** | `imageops::overlay` onto a background canvas |
//! | **Colorspace** | sRGB transfer lookup tables |
//! | **Scale / thumbnail** | `resize` / `resize_exact` with the chosen filter |
//! | **Encode** | JPEG, PNG, TIFF, WebP (lossless), AVIF |
//!
//! The module is split into:
//! - **Geometry**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Closed enums and newtypes describing operations
//! - **Source**: Where an image is read from
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Processor**: The pipeline combining geometry + backend

pub mod backend;
pub mod geometry;
mod params;
pub mod processor;
pub mod rust_backend;
mod source;

pub use backend::{ImageBackend, ImagingError, Operation};
pub use geometry::{
    CropRegion, ImageDimensions, ScaleTarget, center_square_crop, center_square_crop_raw,
    scale_to_fit, scale_to_fit_raw,
};
pub use params::{
    Background, ColorSpace, Density, DensityUnit, EncodeParams, OutputFormat, Quality,
    ResizeFilter, ResizeParams,
};
pub use processor::{EncodedImage, Processor};
pub use rust_backend::{RasterImage, RustBackend, supported_input_extensions};
pub use source::{ReadSource, STREAM_NAME};
