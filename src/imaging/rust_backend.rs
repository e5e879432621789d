//! Pure Rust image processing backend built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` (format sniffed from content) |
//! | Decode (GIF, all frames) | `image::codecs::gif::GifDecoder` + `AnimationDecoder` |
//! | Remove alpha | per-pixel blend onto the background color |
//! | Flatten layers | `image::imageops::overlay` onto a background canvas |
//! | Colorspace | sRGB transfer curve via lookup tables |
//! | Crop | `DynamicImage::crop_imm` |
//! | Resize | `DynamicImage::resize` (best fit) / `resize_exact` |
//! | Encode | `JpegEncoder`, `PngEncoder`, `TiffEncoder`, `WebPEncoder` (lossless), `AvifEncoder` (rav1e, speed 6) |

use super::backend::{ImageBackend, ImagingError, Operation};
use super::geometry::{CropRegion, ImageDimensions};
use super::params::{
    Background, ColorSpace, Density, DensityUnit, EncodeParams, OutputFormat, ResizeParams,
};
use super::source::ReadSource;
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::{JpegEncoder, PixelDensity, PixelDensityUnit};
use image::{
    AnimationDecoder, ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageFormat,
    ImageReader, Rgb, RgbImage, Rgba, RgbaImage,
};
use std::io::Cursor;
use std::sync::LazyLock;
use tracing::debug;

/// Extensions whose decoders are compiled in and known to work.
///
/// AVIF is excluded: the `image` crate's `"avif"` feature only enables the
/// **encoder** (rav1e). The decoder requires `"avif-native"` (a C library).
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

static SRGB_TO_LINEAR: LazyLock<[u8; 256]> = LazyLock::new(|| {
    transfer_table(|v| {
        if v <= 0.04045 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    })
});

static LINEAR_TO_SRGB: LazyLock<[u8; 256]> = LazyLock::new(|| {
    transfer_table(|v| {
        if v <= 0.003_130_8 {
            v * 12.92
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        }
    })
});

fn transfer_table(curve: fn(f64) -> f64) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let mapped = curve(i as f64 / 255.0) * 255.0;
        *slot = mapped.round().clamp(0.0, 255.0) as u8;
    }
    table
}

/// A decoded image as held by [`RustBackend`].
///
/// Most formats decode to a single layer; animated GIFs keep every frame
/// until [`ImageBackend::flatten_layers`] merges them.
#[derive(Debug, Clone)]
pub struct RasterImage {
    layers: Vec<DynamicImage>,
    source_format: ImageFormat,
    icc_profile: Option<Vec<u8>>,
    density: Option<Density>,
    colorspace: ColorSpace,
}

impl RasterImage {
    fn primary(&self) -> &DynamicImage {
        &self.layers[0]
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn has_alpha(&self) -> bool {
        self.layers.iter().any(|l| l.color().has_alpha())
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    pub fn colorspace(&self) -> ColorSpace {
        self.colorspace
    }

    /// Pixel data of the first layer.
    pub fn to_dynamic(&self) -> DynamicImage {
        self.primary().clone()
    }

    fn map_layers(
        self,
        mut f: impl FnMut(DynamicImage) -> DynamicImage,
    ) -> RasterImage {
        RasterImage {
            layers: self.layers.into_iter().map(&mut f).collect(),
            ..self
        }
    }
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode every frame of a GIF as a full-canvas RGBA layer.
fn decode_gif_layers(bytes: &[u8]) -> image::ImageResult<Vec<DynamicImage>> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok(frames
        .into_iter()
        .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
        .collect())
}

/// Blend every pixel onto `background` and return an opaque RGB image.
fn composite_onto(layer: &DynamicImage, background: Background) -> DynamicImage {
    let rgba = layer.to_rgba8();
    let bg = background.rgb();
    let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let a = a as u32;
        let blend =
            |c: u8, under: u8| ((c as u32 * a + under as u32 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r, bg[0]), blend(g, bg[1]), blend(b, bg[2])])
    });
    DynamicImage::ImageRgb8(rgb)
}

/// Apply a transfer table to the color channels, keeping alpha untouched.
fn apply_transfer(layer: DynamicImage, table: &[u8; 256]) -> DynamicImage {
    if layer.color().has_alpha() {
        let mut rgba = layer.to_rgba8();
        for Rgba([r, g, b, _]) in rgba.pixels_mut() {
            *r = table[*r as usize];
            *g = table[*g as usize];
            *b = table[*b as usize];
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        let mut rgb = layer.to_rgb8();
        for Rgb([r, g, b]) in rgb.pixels_mut() {
            *r = table[*r as usize];
            *g = table[*g as usize];
            *b = table[*b as usize];
        }
        DynamicImage::ImageRgb8(rgb)
    }
}

/// 8-bit RGB or RGBA, whichever keeps the alpha channel.
fn rgb8_keep_alpha(layer: &DynamicImage) -> DynamicImage {
    if layer.color().has_alpha() {
        DynamicImage::ImageRgba8(layer.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(layer.to_rgb8())
    }
}

/// Density from the JFIF APP0 segment that opens a JPEG stream.
///
/// Unit code 0 only gives an aspect ratio and reads as no density.
fn jfif_density(bytes: &[u8]) -> Option<Density> {
    let header = bytes.get(..18)?;
    if header[..4] != [0xFF, 0xD8, 0xFF, 0xE0] || &header[6..11] != b"JFIF\0" {
        return None;
    }
    let unit = match header[13] {
        1 => DensityUnit::Inch,
        2 => DensityUnit::Centimeter,
        _ => return None,
    };
    let x = u16::from_be_bytes([header[14], header[15]]);
    let y = u16::from_be_bytes([header[16], header[17]]);
    if x == 0 || y == 0 {
        return None;
    }
    Some(Density { x, y, unit })
}

fn pixel_density(density: Density) -> PixelDensity {
    PixelDensity {
        density: (density.x, density.y),
        unit: match density.unit {
            DensityUnit::Inch => PixelDensityUnit::Inches,
            DensityUnit::Centimeter => PixelDensityUnit::Centimeters,
        },
    }
}

/// Embed the ICC profile when the encoder supports it, then write pixels.
fn write_with_profile(
    mut encoder: impl ImageEncoder,
    pixels: &DynamicImage,
    icc_profile: Option<&[u8]>,
) -> Result<(), ImagingError> {
    if let Some(profile) = icc_profile {
        if let Err(e) = encoder.set_icc_profile(profile.to_vec()) {
            debug!("ICC profile not embedded: {e}");
        }
    }
    encoder
        .write_image(
            pixels.as_bytes(),
            pixels.width(),
            pixels.height(),
            pixels.color().into(),
        )
        .map_err(|e| ImagingError::failed(Operation::Encode, e))
}

impl ImageBackend for RustBackend {
    type Image = RasterImage;

    fn read(&self, source: ReadSource) -> Result<RasterImage, ImagingError> {
        let (name, bytes) = source.into_bytes()?;
        let fail = |e: &dyn std::fmt::Display| {
            ImagingError::failed(Operation::Read, format!("{name}: {e}"))
        };

        let reader = ImageReader::new(Cursor::new(bytes.as_slice())).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| fail(&"unrecognized image format"))?;

        let (layers, icc_profile) = if format == ImageFormat::Gif {
            let layers = decode_gif_layers(&bytes).map_err(|e| fail(&e))?;
            (layers, None)
        } else {
            let mut decoder = reader.into_decoder().map_err(|e| fail(&e))?;
            let icc_profile = decoder.icc_profile().ok().flatten();
            let image = DynamicImage::from_decoder(decoder).map_err(|e| fail(&e))?;
            (vec![image], icc_profile)
        };

        if layers.is_empty() {
            return Err(fail(&"image has no frames"));
        }
        let density = match format {
            ImageFormat::Jpeg => jfif_density(&bytes),
            _ => None,
        };
        debug!(
            name = %name,
            format = ?format,
            layers = layers.len(),
            density = ?density,
            "decoded image"
        );

        Ok(RasterImage {
            layers,
            source_format: format,
            icc_profile,
            density,
            colorspace: ColorSpace::Srgb,
        })
    }

    fn dimensions(&self, image: &RasterImage) -> Result<ImageDimensions, ImagingError> {
        let primary = image.primary();
        ImageDimensions::new(primary.width(), primary.height())
    }

    fn source_format(&self, image: &RasterImage) -> Option<OutputFormat> {
        OutputFormat::from_image_format(image.source_format)
    }

    fn density(&self, image: &RasterImage) -> Option<Density> {
        image.density
    }

    fn remove_alpha(
        &self,
        image: RasterImage,
        background: Background,
    ) -> Result<RasterImage, ImagingError> {
        Ok(image.map_layers(|layer| {
            if layer.color().has_alpha() {
                composite_onto(&layer, background)
            } else {
                layer
            }
        }))
    }

    fn flatten_layers(
        &self,
        image: RasterImage,
        background: Background,
    ) -> Result<RasterImage, ImagingError> {
        let primary = image.primary();
        let [r, g, b] = background.rgb();
        let mut canvas =
            RgbaImage::from_pixel(primary.width(), primary.height(), Rgba([r, g, b, 255]));
        for layer in &image.layers {
            image::imageops::overlay(&mut canvas, &layer.to_rgba8(), 0, 0);
        }
        let flat = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8());
        Ok(RasterImage {
            layers: vec![flat],
            ..image
        })
    }

    fn strip_metadata(&self, image: RasterImage) -> Result<RasterImage, ImagingError> {
        // Decoding keeps nothing but the ICC profile.
        Ok(RasterImage {
            icc_profile: None,
            ..image
        })
    }

    fn convert_colorspace(
        &self,
        image: RasterImage,
        space: ColorSpace,
    ) -> Result<RasterImage, ImagingError> {
        if image.colorspace == space {
            return Ok(image.map_layers(|layer| match layer.color() {
                ColorType::Rgb8 | ColorType::Rgba8 => layer,
                _ => rgb8_keep_alpha(&layer),
            }));
        }
        let table: &[u8; 256] = match space {
            ColorSpace::Rgb => &SRGB_TO_LINEAR,
            ColorSpace::Srgb => &LINEAR_TO_SRGB,
        };
        let converted = image.map_layers(|layer| apply_transfer(layer, table));
        Ok(RasterImage {
            colorspace: space,
            ..converted
        })
    }

    fn crop(&self, image: RasterImage, region: CropRegion) -> Result<RasterImage, ImagingError> {
        let current = self.dimensions(&image)?;
        let right = region.offset_x as u64 + region.width as u64;
        let bottom = region.offset_y as u64 + region.height as u64;
        if right > current.width() as u64 || bottom > current.height() as u64 {
            return Err(ImagingError::failed(
                Operation::Crop,
                format!(
                    "region {}x{}+{}+{} exceeds {}x{}",
                    region.width,
                    region.height,
                    region.offset_x,
                    region.offset_y,
                    current.width(),
                    current.height()
                ),
            ));
        }
        Ok(image.map_layers(|layer| {
            layer.crop_imm(region.offset_x, region.offset_y, region.width, region.height)
        }))
    }

    fn resize(
        &self,
        image: RasterImage,
        params: &ResizeParams,
    ) -> Result<RasterImage, ImagingError> {
        let (width, height) = (params.dimensions.width(), params.dimensions.height());
        let filter = params.filter.filter_type();
        Ok(image.map_layers(|layer| {
            if params.best_fit {
                layer.resize(width, height, filter)
            } else {
                layer.resize_exact(width, height, filter)
            }
        }))
    }

    fn encode(&self, image: &RasterImage, params: &EncodeParams) -> Result<Vec<u8>, ImagingError> {
        let layer = image.primary();
        let icc = image.icc_profile();
        let quality = params.quality.unwrap_or_default().value();
        let mut buffer = Vec::new();

        if params.density.is_some() && params.format != OutputFormat::Jpeg {
            debug!(format = %params.format, "pixel density is only written for JPEG");
        }
        if params.quality.is_some() && !params.format.is_lossy() {
            debug!(format = %params.format, "quality has no effect on lossless output");
        }

        match params.format {
            OutputFormat::Jpeg => {
                let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                if let Some(density) = params.density {
                    encoder.set_pixel_density(pixel_density(density));
                }
                let pixels = match layer.color() {
                    ColorType::L8 | ColorType::Rgb8 => layer.clone(),
                    _ => DynamicImage::ImageRgb8(layer.to_rgb8()),
                };
                write_with_profile(encoder, &pixels, icc)?;
            }
            OutputFormat::Png => {
                let pixels = match layer.color() {
                    ColorType::Rgb32F | ColorType::Rgba32F => rgb8_keep_alpha(layer),
                    _ => layer.clone(),
                };
                write_with_profile(
                    image::codecs::png::PngEncoder::new(&mut buffer),
                    &pixels,
                    icc,
                )?;
            }
            OutputFormat::Tiff => {
                write_with_profile(
                    image::codecs::tiff::TiffEncoder::new(Cursor::new(&mut buffer)),
                    &rgb8_keep_alpha(layer),
                    icc,
                )?;
            }
            OutputFormat::Webp => {
                write_with_profile(
                    image::codecs::webp::WebPEncoder::new_lossless(&mut buffer),
                    &rgb8_keep_alpha(layer),
                    icc,
                )?;
            }
            OutputFormat::Avif => {
                write_with_profile(
                    image::codecs::avif::AvifEncoder::new_with_speed_quality(
                        &mut buffer,
                        6,
                        quality,
                    ),
                    &rgb8_keep_alpha(layer),
                    icc,
                )?;
            }
        }

        Ok(buffer)
    }
}
