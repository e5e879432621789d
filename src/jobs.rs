//! Batch jobs: run the image pipeline over files on disk.
//!
//! A job reads one input, applies the configured clean-up steps, one
//! [`Transform`], and writes the result next to the other outputs:
//!
//! ```text
//! read → format/quality/density → remove alpha → flatten layers
//!      → strip metadata → colorspace → transform → encode → write
//! ```
//!
//! ## Output Naming
//!
//! ```text
//! out/
//! ├── dawn-thumb.jpg    # pixfit thumbnail photos/dawn.png --format jpeg
//! ├── dawn-fit.png      # pixfit scale photos/dawn.png --max 1200x1200
//! └── dawn.webp         # pixfit convert photos/dawn.png --format webp
//! ```
//!
//! Names come from the file stem only, so `a/dawn.png` and `b/dawn.png`
//! want the same output. Within a batch the first input (in sorted order)
//! keeps the path and the others fail with [`JobError::OutputCollision`].
//!
//! ## Parallel Processing
//!
//! [`run_batch`] processes inputs in parallel using
//! [rayon](https://docs.rs/rayon). One failing input is reported and
//! skipped; the rest of the batch still runs.

use crate::config::{ConfigError, PixfitConfig};
use crate::imaging::{
    Background, ColorSpace, Density, ImageBackend, ImageDimensions, ImagingError, OutputFormat,
    Processor, Quality, ReadSource, ResizeFilter, STREAM_NAME, ScaleTarget,
    supported_input_extensions,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] ImagingError),
    #[error("Source image not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("Refusing to overwrite source image: {}", .0.display())]
    WouldOverwrite(PathBuf),
    #[error("Output path already claimed by another input: {}", .0.display())]
    OutputCollision(PathBuf),
}

/// One image to process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobInput {
    File(PathBuf),
    /// Image bytes on standard input, written as `-` on the command line.
    Stdin,
}

impl JobInput {
    /// Name used for output files.
    pub fn stem(&self) -> String {
        match self {
            JobInput::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| STREAM_NAME.to_string()),
            JobInput::Stdin => STREAM_NAME.to_string(),
        }
    }

    fn source(&self) -> Result<ReadSource, JobError> {
        match self {
            JobInput::File(path) => {
                if !path.is_file() {
                    return Err(JobError::SourceNotFound(path.clone()));
                }
                Ok(ReadSource::file(path))
            }
            JobInput::Stdin => Ok(ReadSource::stream(std::io::stdin())),
        }
    }
}

impl fmt::Display for JobInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobInput::File(path) => write!(f, "{}", path.display()),
            JobInput::Stdin => f.write_str("<stdin>"),
        }
    }
}

/// What a job does to the geometry of each image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Centered square crop scaled to `size` x `size`.
    Thumbnail { size: u32 },
    /// Proportional scale with the longer side set to its bound in `target`.
    ScaleToFit { target: ScaleTarget },
    /// Re-encode only.
    Convert,
}

impl Transform {
    fn suffix(self) -> &'static str {
        match self {
            Transform::Thumbnail { .. } => "-thumb",
            Transform::ScaleToFit { .. } => "-fit",
            Transform::Convert => "",
        }
    }
}

/// Everything a job needs besides its input and transform.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    /// Output format. `None` keeps the source format.
    pub format: Option<OutputFormat>,
    pub quality: Option<Quality>,
    /// Target colorspace. `None` skips conversion.
    pub colorspace: Option<ColorSpace>,
    pub density: Option<Density>,
    pub remove_alpha: bool,
    pub flatten_layers: bool,
    pub strip_metadata: bool,
    pub background: Background,
    pub filter: ResizeFilter,
}

impl JobSettings {
    /// Build job settings from a validated config.
    pub fn from_config(config: &PixfitConfig) -> Result<Self, ConfigError> {
        let invalid = |e: ImagingError| ConfigError::Validation(e.to_string());
        Ok(Self {
            format: config.output.format,
            quality: config
                .output
                .quality
                .map(Quality::try_from)
                .transpose()
                .map_err(invalid)?,
            colorspace: config.output.colorspace,
            density: config.output.dpi.map(Density::dpi),
            remove_alpha: config.alpha.remove,
            flatten_layers: config.layers.flatten,
            strip_metadata: config.metadata.strip,
            background: config.alpha.background().map_err(invalid)?,
            filter: config.resize.filter,
        })
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            format: None,
            quality: None,
            colorspace: None,
            density: None,
            remove_alpha: true,
            flatten_layers: true,
            strip_metadata: true,
            background: Background::WHITE,
            filter: ResizeFilter::default(),
        }
    }
}

/// Result of one finished job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub input: String,
    pub output: PathBuf,
    pub original: ImageDimensions,
    pub dimensions: ImageDimensions,
    pub format: OutputFormat,
    /// Size of the written file in bytes.
    pub bytes: usize,
}

/// Progress events sent while a batch runs.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Finished {
        index: usize,
        total: usize,
        outcome: JobOutcome,
    },
    Failed {
        index: usize,
        total: usize,
        input: String,
        error: String,
    },
}

/// A job that did not complete.
#[derive(Debug)]
pub struct JobFailure {
    pub input: String,
    pub error: JobError,
}

/// Everything a batch produced, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub finished: Vec<JobOutcome>,
    pub failed: Vec<JobFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What `identify` reports about an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identified {
    pub input: String,
    pub name: String,
    pub dimensions: ImageDimensions,
    /// Source format, when it is one pixfit can also write.
    pub format: Option<OutputFormat>,
    /// Pixel density declared by the source.
    pub density: Option<Density>,
}

// ============================================================================
// Input collection
// ============================================================================

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            supported_input_extensions().contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Expand command-line paths into job inputs.
///
/// Files are taken as given. Directories are walked recursively for files
/// with a supported image extension. `-` reads from standard input. The
/// result is sorted with duplicates removed.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<JobInput>, JobError> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.as_os_str() == "-" {
            inputs.push(JobInput::Stdin);
        } else if path.is_dir() {
            for entry in walkdir::WalkDir::new(path).follow_links(true) {
                let entry = entry.map_err(|e| JobError::Io(e.into()))?;
                if entry.file_type().is_file() && has_supported_extension(entry.path()) {
                    inputs.push(JobInput::File(entry.into_path()));
                }
            }
        } else if path.is_file() {
            inputs.push(JobInput::File(path.clone()));
        } else {
            return Err(JobError::SourceNotFound(path.clone()));
        }
    }
    inputs.sort();
    inputs.dedup();
    Ok(inputs)
}

/// Where a job writes its result: `{stem}{suffix}.{ext}` inside `out_dir`.
pub fn output_path(
    input: &JobInput,
    out_dir: &Path,
    transform: Transform,
    format: OutputFormat,
) -> PathBuf {
    out_dir.join(format!(
        "{}{}.{}",
        input.stem(),
        transform.suffix(),
        format.extension()
    ))
}

/// Format a job is expected to write, judged before its input is decoded:
/// the configured format, else the one its extension names, else JPEG.
fn planned_format(input: &JobInput, settings: &JobSettings) -> OutputFormat {
    if let Some(format) = settings.format {
        return format;
    }
    match input {
        JobInput::File(path) => image::ImageFormat::from_path(path)
            .ok()
            .and_then(OutputFormat::from_image_format)
            .unwrap_or(OutputFormat::Jpeg),
        JobInput::Stdin => OutputFormat::Jpeg,
    }
}

/// Output paths of a batch and the index of the input that owns each.
type OutputClaims = Mutex<HashMap<PathBuf, usize>>;

/// Assign planned output paths in input order. Returns the claims plus,
/// for each input, the path it lost to an earlier input.
fn plan_outputs(
    inputs: &[JobInput],
    out_dir: &Path,
    transform: Transform,
    settings: &JobSettings,
) -> (OutputClaims, Vec<Option<PathBuf>>) {
    let mut owners = HashMap::new();
    let collisions = inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let path = output_path(input, out_dir, transform, planned_format(input, settings));
            match owners.entry(path) {
                Entry::Occupied(owner) => Some(owner.key().clone()),
                Entry::Vacant(slot) => {
                    slot.insert(index);
                    None
                }
            }
        })
        .collect();
    (Mutex::new(owners), collisions)
}

/// Take `output` for input `index`, unless another input owns it.
fn claim_output(claims: &OutputClaims, output: &Path, index: usize) -> Result<(), JobError> {
    let mut owners = claims.lock().unwrap_or_else(|e| e.into_inner());
    match owners.entry(output.to_path_buf()) {
        Entry::Occupied(owner) if *owner.get() != index => {
            Err(JobError::OutputCollision(output.to_path_buf()))
        }
        Entry::Occupied(_) => Ok(()),
        Entry::Vacant(slot) => {
            slot.insert(index);
            Ok(())
        }
    }
}

// ============================================================================
// Running jobs
// ============================================================================

/// Run the pipeline for one input and write the result into `out_dir`.
pub fn run_job<B: ImageBackend>(
    backend: &B,
    input: &JobInput,
    out_dir: &Path,
    transform: Transform,
    settings: &JobSettings,
) -> Result<JobOutcome, JobError> {
    run_claimed_job(backend, input, out_dir, transform, settings, |_| Ok(()))
}

/// [`run_job`], with `claim` asked for the output path before anything is
/// written.
fn run_claimed_job<B: ImageBackend>(
    backend: &B,
    input: &JobInput,
    out_dir: &Path,
    transform: Transform,
    settings: &JobSettings,
    claim: impl Fn(&Path) -> Result<(), JobError>,
) -> Result<JobOutcome, JobError> {
    let mut processor = Processor::read(backend, input.source()?)?;
    let original = processor.dimensions()?;

    if let Some(format) = settings.format {
        processor = processor.convert_format(format, None);
    }
    if let Some(quality) = settings.quality {
        processor = processor.with_quality(quality);
    }
    if let Some(density) = settings.density {
        processor = processor.with_density(density);
    }
    if settings.remove_alpha {
        processor = processor.remove_alpha(settings.background)?;
    }
    if settings.flatten_layers {
        processor = processor.remove_layers(settings.background)?;
    }
    if settings.strip_metadata {
        processor = processor.remove_meta()?;
    }
    if let Some(space) = settings.colorspace {
        processor = processor.convert_colorspace(space)?;
    }
    processor = match transform {
        Transform::Thumbnail { size } => processor.thumbnail(size, settings.filter)?,
        Transform::ScaleToFit { target } => processor.scale_to_fit(target, settings.filter)?,
        Transform::Convert => processor,
    };

    let output = output_path(input, out_dir, transform, processor.format());
    claim(&output)?;
    if let JobInput::File(source) = input {
        if output.exists() && std::fs::canonicalize(source)? == std::fs::canonicalize(&output)? {
            return Err(JobError::WouldOverwrite(output));
        }
    }

    let dimensions = processor.dimensions()?;
    let encoded = processor.encode()?;
    std::fs::create_dir_all(out_dir)?;
    encoded.write_to(&output)?;

    info!(
        input = %input,
        output = %output.display(),
        width = dimensions.width(),
        height = dimensions.height(),
        bytes = encoded.len(),
        "wrote image"
    );

    Ok(JobOutcome {
        input: input.to_string(),
        output,
        original,
        dimensions,
        format: encoded.format(),
        bytes: encoded.len(),
    })
}

/// Run jobs for all `inputs` in parallel.
///
/// Progress is reported through `events` as jobs complete. Failures are
/// collected rather than aborting the batch. No two inputs write the same
/// output path. Paths are planned in input order before the run and
/// claimed again once each job knows its real output format; an input
/// that finds its path taken fails with [`JobError::OutputCollision`].
pub fn run_batch<B: ImageBackend>(
    backend: &B,
    inputs: &[JobInput],
    out_dir: &Path,
    transform: Transform,
    settings: &JobSettings,
    events: Option<Sender<JobEvent>>,
) -> BatchReport {
    let total = inputs.len();
    let (claims, collisions) = plan_outputs(inputs, out_dir, transform, settings);
    let results: Vec<(String, Result<JobOutcome, JobError>)> = inputs
        .par_iter()
        .enumerate()
        .map(|(i, input)| {
            let index = i + 1;
            let result = match &collisions[i] {
                Some(path) => Err(JobError::OutputCollision(path.clone())),
                None => {
                    run_claimed_job(backend, input, out_dir, transform, settings, |output| {
                        claim_output(&claims, output, i)
                    })
                }
            };
            let event = match &result {
                Ok(outcome) => JobEvent::Finished {
                    index,
                    total,
                    outcome: outcome.clone(),
                },
                Err(error) => {
                    warn!(input = %input, %error, "job failed");
                    JobEvent::Failed {
                        index,
                        total,
                        input: input.to_string(),
                        error: error.to_string(),
                    }
                }
            };
            if let Some(tx) = &events {
                tx.send(event).ok();
            }
            (input.to_string(), result)
        })
        .collect();

    let mut report = BatchReport::default();
    for (input, result) in results {
        match result {
            Ok(outcome) => report.finished.push(outcome),
            Err(error) => report.failed.push(JobFailure { input, error }),
        }
    }
    report
}

/// Decode an input and report its name, size, format, and density.
pub fn identify<B: ImageBackend>(backend: &B, input: &JobInput) -> Result<Identified, JobError> {
    let processor = Processor::read(backend, input.source()?)?;
    Ok(Identified {
        input: input.to_string(),
        name: processor.name().to_string(),
        dimensions: processor.dimensions()?,
        format: backend.source_format(processor.image()),
        density: processor.density(),
    })
}
