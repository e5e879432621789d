//! The image pipeline.
//!
//! A [`Processor`] owns one decoded image plus the settings it will be
//! encoded with. Every transformation consumes the processor and returns a
//! new one, so a pipeline reads top to bottom and there is no shared state
//! to get out of order:
//!
//! ```no_run
//! # use pixfit::imaging::{Background, ColorSpace, OutputFormat, Processor, ReadSource, ResizeFilter, RustBackend};
//! # fn main() -> Result<(), pixfit::imaging::ImagingError> {
//! let backend = RustBackend::new();
//! let thumb = Processor::read(&backend, ReadSource::file("icon.png"))?
//!     .convert_format(OutputFormat::Jpeg, None)
//!     .remove_alpha(Background::WHITE)?
//!     .remove_layers(Background::WHITE)?
//!     .remove_meta()?
//!     .convert_colorspace(ColorSpace::Srgb)?
//!     .thumbnail(300, ResizeFilter::Lanczos3)?
//!     .encode()?;
//! thumb.write_to("icon-thumb.jpg".as_ref())?;
//! # Ok(())
//! # }
//! ```
//!
//! Geometry comes from [`geometry`](super::geometry); pixels are touched only
//! through the [`ImageBackend`].

use super::backend::{ImageBackend, ImagingError};
use super::geometry::{self, ImageDimensions, ScaleTarget};
use super::params::{
    Background, ColorSpace, Density, EncodeParams, OutputFormat, Quality, ResizeFilter,
    ResizeParams,
};
use super::source::ReadSource;
use std::path::Path;
use tracing::debug;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ImagingError>;

/// An image moving through the pipeline.
pub struct Processor<'b, B: ImageBackend> {
    backend: &'b B,
    image: B::Image,
    name: String,
    encode: EncodeParams,
}

/// Encoded output of a [`Processor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    format: OutputFormat,
}

impl EncodedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Size of the encoded blob in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

impl<'b, B: ImageBackend> Processor<'b, B> {
    /// Decode `source`. The output format starts out as the source format
    /// when it can be written back, JPEG otherwise. Density starts out as
    /// whatever the source declares.
    pub fn read(backend: &'b B, source: ReadSource) -> Result<Self> {
        let name = source.name();
        let image = backend.read(source)?;
        let format = backend.source_format(&image).unwrap_or(OutputFormat::Jpeg);
        let density = backend.density(&image);
        debug!(name = %name, %format, ?density, "read image");
        Ok(Self {
            backend,
            image,
            name,
            encode: EncodeParams {
                format,
                quality: None,
                density,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> Result<ImageDimensions> {
        self.backend.dimensions(&self.image)
    }

    pub fn format(&self) -> OutputFormat {
        self.encode.format
    }

    pub fn quality(&self) -> Option<Quality> {
        self.encode.quality
    }

    /// Density the output will carry: the source's until
    /// [`with_density`](Self::with_density) replaces it.
    pub fn density(&self) -> Option<Density> {
        self.encode.density
    }

    /// The backend's image, for callers that need to inspect pixels.
    pub fn image(&self) -> &B::Image {
        &self.image
    }

    /// Choose the output format, optionally with a compression quality.
    pub fn convert_format(mut self, format: OutputFormat, quality: Option<Quality>) -> Self {
        debug!(name = %self.name, %format, "convert format");
        self.encode.format = format;
        if quality.is_some() {
            self.encode.quality = quality;
        }
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.encode.quality = Some(quality);
        self
    }

    pub fn with_density(mut self, density: Density) -> Self {
        self.encode.density = Some(density);
        self
    }

    fn map_image(
        self,
        step: &str,
        f: impl FnOnce(&'b B, B::Image) -> Result<B::Image>,
    ) -> Result<Self> {
        debug!(name = %self.name, step, "apply");
        let Self {
            backend,
            image,
            name,
            encode,
        } = self;
        let image = f(backend, image)?;
        Ok(Self {
            backend,
            image,
            name,
            encode,
        })
    }

    /// Composite onto `background` and drop the alpha channel.
    pub fn remove_alpha(self, background: Background) -> Result<Self> {
        self.map_image("remove_alpha", |b, img| b.remove_alpha(img, background))
    }

    /// Merge every layer onto a `background` canvas.
    pub fn remove_layers(self, background: Background) -> Result<Self> {
        self.map_image("remove_layers", |b, img| b.flatten_layers(img, background))
    }

    /// Drop embedded metadata.
    pub fn remove_meta(self) -> Result<Self> {
        self.map_image("remove_meta", |b, img| b.strip_metadata(img))
    }

    pub fn convert_colorspace(self, space: ColorSpace) -> Result<Self> {
        self.map_image("convert_colorspace", |b, img| {
            b.convert_colorspace(img, space)
        })
    }

    /// Scale proportionally into `target`, see [`geometry::scale_to_fit`].
    /// Images already inside it are untouched.
    pub fn scale_to_fit(self, target: ScaleTarget, filter: ResizeFilter) -> Result<Self> {
        let current = self.dimensions()?;
        let fitted = geometry::scale_to_fit(current, target);
        if fitted == current {
            debug!(name = %self.name, "already within bound");
            return Ok(self);
        }
        let params = ResizeParams {
            dimensions: fitted,
            filter,
            best_fit: target.best_fit,
        };
        self.map_image("scale_to_fit", |b, img| b.resize(img, &params))
    }

    /// Crop to the centered square, then scale it to `size` x `size`.
    pub fn thumbnail(self, size: u32, filter: ResizeFilter) -> Result<Self> {
        let current = self.dimensions()?;
        let (crop, _) = geometry::thumbnail(current, size)?;
        let cropped = if crop.covers(current) {
            self
        } else {
            self.map_image("crop", |b, img| b.crop(img, crop))?
        };
        cropped.scale_to_fit(ScaleTarget::square(size)?, filter)
    }

    /// Encode with the current settings.
    pub fn encode(&self) -> Result<EncodedImage> {
        let bytes = self.backend.encode(&self.image, &self.encode)?;
        debug!(
            name = %self.name,
            format = %self.encode.format,
            len = bytes.len(),
            "encoded image"
        );
        Ok(EncodedImage {
            bytes,
            format: self.encode.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::Operation;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::geometry::CropRegion;

    fn read(backend: &MockBackend) -> Processor<'_, MockBackend> {
        Processor::read(backend, ReadSource::binary(vec![1, 2, 3], "hero.jpg")).unwrap()
    }

    #[test]
    fn read_resolves_name_and_source_format() {
        let backend = MockBackend::with_dimensions(800, 600);
        let p = read(&backend);
        assert_eq!(p.name(), "hero.jpg");
        assert_eq!(p.format(), OutputFormat::Png);
        assert_eq!(p.quality(), None);
    }

    #[test]
    fn read_unknown_source_format_defaults_to_jpeg() {
        let mut backend = MockBackend::with_dimensions(10, 10);
        backend.format = None;
        assert_eq!(read(&backend).format(), OutputFormat::Jpeg);
    }

    #[test]
    fn read_takes_density_from_source() {
        let mut backend = MockBackend::with_dimensions(10, 10);
        backend.density = Some(Density::dpi(72));
        let p = read(&backend);
        assert_eq!(p.density(), Some(Density::dpi(72)));

        let p = p.with_density(Density::dpi(300));
        assert_eq!(p.density(), Some(Density::dpi(300)));
    }

    #[test]
    fn convert_format_keeps_quality_when_none_given() {
        let backend = MockBackend::with_dimensions(10, 10);
        let p = read(&backend)
            .with_quality(Quality::new(50))
            .convert_format(OutputFormat::Webp, None);
        assert_eq!(p.format(), OutputFormat::Webp);
        assert_eq!(p.quality(), Some(Quality::new(50)));

        let p = p.convert_format(OutputFormat::Jpeg, Some(Quality::new(80)));
        assert_eq!(p.quality(), Some(Quality::new(80)));
    }

    #[test]
    fn pipeline_runs_steps_in_order() {
        let backend = MockBackend::with_dimensions(1200, 617);
        let encoded = read(&backend)
            .convert_format(OutputFormat::Jpeg, None)
            .remove_alpha(Background::WHITE)
            .unwrap()
            .remove_layers(Background::WHITE)
            .unwrap()
            .remove_meta()
            .unwrap()
            .convert_colorspace(ColorSpace::Srgb)
            .unwrap()
            .thumbnail(300, ResizeFilter::Lanczos3)
            .unwrap()
            .encode()
            .unwrap();

        assert_eq!(encoded.format(), OutputFormat::Jpeg);
        assert_eq!(encoded.len(), 300 * 300);

        let ops = backend.get_operations();
        assert_eq!(
            ops,
            vec![
                RecordedOp::Read("hero.jpg".into()),
                RecordedOp::RemoveAlpha([255, 255, 255]),
                RecordedOp::FlattenLayers([255, 255, 255]),
                RecordedOp::StripMetadata,
                RecordedOp::ConvertColorSpace(ColorSpace::Srgb),
                RecordedOp::Crop(CropRegion {
                    width: 617,
                    height: 617,
                    offset_x: 291,
                    offset_y: 0
                }),
                RecordedOp::Resize {
                    width: 300,
                    height: 300,
                    best_fit: false
                },
                RecordedOp::Encode(EncodeParams {
                    format: OutputFormat::Jpeg,
                    quality: None,
                    density: None
                }),
            ]
        );
    }

    #[test]
    fn scale_within_bound_skips_resize() {
        let backend = MockBackend::with_dimensions(1200, 617);
        let p = read(&backend)
            .scale_to_fit(
                ScaleTarget::new(1200, 1200, true).unwrap(),
                ResizeFilter::Lanczos3,
            )
            .unwrap();
        assert_eq!(p.dimensions().unwrap(), ImageDimensions::new(1200, 617).unwrap());
        assert_eq!(backend.get_operations().len(), 1);
    }

    #[test]
    fn scale_passes_best_fit_through() {
        let backend = MockBackend::with_dimensions(1600, 900);
        read(&backend)
            .scale_to_fit(
                ScaleTarget::new(800, 800, true).unwrap(),
                ResizeFilter::Lanczos3,
            )
            .unwrap();
        assert_eq!(
            backend.get_operations()[1],
            RecordedOp::Resize {
                width: 800,
                height: 450,
                best_fit: true
            }
        );
    }

    #[test]
    fn thumbnail_of_square_skips_crop() {
        let backend = MockBackend::with_dimensions(500, 500);
        let p = read(&backend).thumbnail(100, ResizeFilter::Nearest).unwrap();
        assert_eq!(p.dimensions().unwrap(), ImageDimensions::new(100, 100).unwrap());
        let ops = backend.get_operations();
        assert!(!ops.iter().any(|op| matches!(op, RecordedOp::Crop(_))));
    }

    #[test]
    fn thumbnail_portrait_crops_vertically() {
        let backend = MockBackend::with_dimensions(600, 800);
        read(&backend).thumbnail(300, ResizeFilter::Nearest).unwrap();
        assert_eq!(
            backend.get_operations()[1],
            RecordedOp::Crop(CropRegion {
                width: 600,
                height: 600,
                offset_x: 0,
                offset_y: 100
            })
        );
    }

    #[test]
    fn thumbnail_zero_size_is_invalid() {
        let backend = MockBackend::with_dimensions(600, 800);
        let err = read(&backend)
            .thumbnail(0, ResizeFilter::Nearest)
            .err()
            .unwrap();
        assert!(matches!(err, ImagingError::InvalidDimension { .. }));
    }

    #[test]
    fn backend_failure_propagates() {
        let backend = MockBackend::with_dimensions(10, 10).failing_on(Operation::RemoveAlpha);
        let err = read(&backend)
            .remove_alpha(Background::WHITE)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ImagingError::OperationFailed {
                operation: Operation::RemoveAlpha,
                ..
            }
        ));
    }

    #[test]
    fn density_reaches_encoder() {
        let backend = MockBackend::with_dimensions(10, 10);
        let p = read(&backend).with_density(Density::dpi(300));
        assert_eq!(p.density(), Some(Density::dpi(300)));
        p.encode().unwrap();
        assert!(matches!(
            backend.get_operations().last(),
            Some(RecordedOp::Encode(EncodeParams {
                density: Some(_),
                ..
            }))
        ));
    }
}
