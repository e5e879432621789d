//! End-to-end runs of the image pipeline through the public API, with the
//! real `image`-crate backend and synthetic inputs written to a temp dir.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use pixfit::config::{self, PixfitConfig};
use pixfit::imaging::{
    Background, ColorSpace, Density, ImageDimensions, ImagingError, OutputFormat, Processor,
    Quality, ReadSource, ResizeFilter, RustBackend, ScaleTarget,
};
use pixfit::jobs::{self, JobInput, JobSettings, Transform};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

/// A landscape PNG with a transparent right half.
fn write_icon(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let alpha = if x < width / 2 { 255 } else { 0 };
        Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 90, alpha])
    });
    DynamicImage::ImageRgba8(img)
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

fn decode(bytes: &[u8]) -> DynamicImage {
    image::load_from_memory(bytes).unwrap()
}

#[test]
fn thumbnail_pipeline_produces_square_jpeg() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("icon.png");
    write_icon(&source, 1200, 617);

    let backend = RustBackend::new();
    let processor = Processor::read(&backend, ReadSource::file(&source))
        .unwrap()
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
        .unwrap();

    assert_eq!(processor.name(), "icon");
    assert_eq!(
        processor.dimensions().unwrap(),
        ImageDimensions::new(300, 300).unwrap()
    );

    let encoded = processor.encode().unwrap();
    assert_eq!(encoded.format(), OutputFormat::Jpeg);
    assert!(!encoded.is_empty());
    assert_eq!(
        image::guess_format(encoded.bytes()).unwrap(),
        ImageFormat::Jpeg
    );
    let decoded = decode(encoded.bytes());
    assert_eq!((decoded.width(), decoded.height()), (300, 300));

    // The transparent half was composited onto white
    let rgb = decoded.to_rgb8();
    let right = rgb.get_pixel(290, 150);
    assert!(right.0.iter().all(|&c| c > 230), "got {:?}", right);
}

#[test]
fn scale_pipeline_keeps_aspect_ratio() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("wide.png");
    write_icon(&source, 2400, 1234);

    let backend = RustBackend::new();
    let bytes = std::fs::read(&source).unwrap();
    let encoded = Processor::read(&backend, ReadSource::binary(bytes, "wide.png"))
        .unwrap()
        .convert_format(OutputFormat::Png, None)
        .scale_to_fit(
            ScaleTarget::new(1200, 1200, true).unwrap(),
            ResizeFilter::Lanczos3,
        )
        .unwrap()
        .encode()
        .unwrap();

    let decoded = decode(encoded.bytes());
    assert_eq!((decoded.width(), decoded.height()), (1200, 617));
    // Alpha was not removed, so PNG keeps it
    assert!(decoded.color().has_alpha());
}

#[test]
fn small_image_is_not_upscaled() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("small.png");
    write_icon(&source, 120, 80);

    let backend = RustBackend::new();
    let processor = Processor::read(&backend, ReadSource::file(&source))
        .unwrap()
        .scale_to_fit(
            ScaleTarget::new(1200, 1200, true).unwrap(),
            ResizeFilter::Lanczos3,
        )
        .unwrap();
    assert_eq!(
        processor.dimensions().unwrap(),
        ImageDimensions::new(120, 80).unwrap()
    );
}

#[test]
fn stream_source_reads_and_names() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("s.png");
    write_icon(&source, 64, 48);
    let bytes = std::fs::read(&source).unwrap();

    let backend = RustBackend::new();
    let processor = Processor::read(&backend, ReadSource::stream(Cursor::new(bytes))).unwrap();
    assert_eq!(processor.name(), "stream");
    assert_eq!(processor.format(), OutputFormat::Png);
}

#[test]
fn empty_binary_read_fails() {
    let backend = RustBackend::new();
    let result = Processor::read(&backend, ReadSource::binary(Vec::new(), "empty.jpg"));
    assert!(matches!(
        result.err(),
        Some(ImagingError::OperationFailed { .. })
    ));
}

#[test]
fn unreadable_path_fails() {
    let backend = RustBackend::new();
    let result = Processor::read(&backend, ReadSource::file("not-a-valid-file-path"));
    assert!(matches!(result.err(), Some(ImagingError::NotReadable(_))));
}

#[test]
fn quality_changes_file_size() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("q.png");
    write_icon(&source, 400, 300);

    let backend = RustBackend::new();
    let encode = |q: u32| {
        Processor::read(&backend, ReadSource::file(&source))
            .unwrap()
            .convert_format(OutputFormat::Jpeg, Some(Quality::try_from(q).unwrap()))
            .remove_alpha(Background::WHITE)
            .unwrap()
            .encode()
            .unwrap()
            .len()
    };
    assert!(encode(20) < encode(95));
}

#[test]
fn batch_from_config_writes_outputs() {
    let tmp = TempDir::new().unwrap();
    let photos = tmp.path().join("photos");
    std::fs::create_dir_all(photos.join("nested")).unwrap();
    write_icon(&photos.join("a.png"), 800, 600);
    write_icon(&photos.join("nested/b.png"), 300, 900);
    std::fs::write(photos.join("readme.txt"), "not an image").unwrap();

    std::fs::write(
        tmp.path().join(config::CONFIG_FILE_NAME),
        r#"
[output]
format = "webp"

[thumbnail]
size = 128
"#,
    )
    .unwrap();
    let cfg: PixfitConfig = config::load_config(None, tmp.path()).unwrap();
    let settings = JobSettings::from_config(&cfg).unwrap();

    let inputs = jobs::collect_inputs(&[photos.clone()]).unwrap();
    assert_eq!(inputs.len(), 2);

    let out = tmp.path().join("out");
    let report = jobs::run_batch(
        &RustBackend::new(),
        &inputs,
        &out,
        Transform::Thumbnail {
            size: cfg.thumbnail.size,
        },
        &settings,
        None,
    );
    assert!(report.is_success());
    assert_eq!(report.finished.len(), 2);

    for name in ["a-thumb.webp", "b-thumb.webp"] {
        let written = image::open(out.join(name)).unwrap();
        assert_eq!((written.width(), written.height()), (128, 128));
    }
    assert!(
        report
            .finished
            .iter()
            .all(|o| o.format == OutputFormat::Webp)
    );
}

#[test]
fn identify_reports_dimensions() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("id.png");
    write_icon(&source, 77, 55);

    let info = jobs::identify(&RustBackend::new(), &JobInput::File(source)).unwrap();
    assert_eq!(info.name, "id");
    assert_eq!(info.dimensions, ImageDimensions::new(77, 55).unwrap());
    assert_eq!(info.format, Some(OutputFormat::Png));
}

#[test]
fn identify_reads_back_jpeg_density() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("flyer.png");
    write_icon(&source, 64, 48);

    let backend = RustBackend::new();
    let print = tmp.path().join("flyer.jpg");
    Processor::read(&backend, ReadSource::file(&source))
        .unwrap()
        .convert_format(OutputFormat::Jpeg, None)
        .with_density(Density::dpi(300))
        .remove_alpha(Background::WHITE)
        .unwrap()
        .encode()
        .unwrap()
        .write_to(&print)
        .unwrap();

    let info = jobs::identify(&backend, &JobInput::File(print.clone())).unwrap();
    assert_eq!(info.format, Some(OutputFormat::Jpeg));
    assert_eq!(info.density, Some(Density::dpi(300)));

    // A plain re-encode carries the source density over
    let out = tmp.path().join("out");
    let outcome = jobs::run_job(
        &backend,
        &JobInput::File(print),
        &out,
        Transform::ScaleToFit {
            target: ScaleTarget::new(32, 32, true).unwrap(),
        },
        &JobSettings::default(),
    )
    .unwrap();
    let scaled = jobs::identify(&backend, &JobInput::File(outcome.output)).unwrap();
    assert_eq!(scaled.density, Some(Density::dpi(300)));
}
