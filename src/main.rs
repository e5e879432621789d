use clap::{Parser, Subcommand};
use pixfit::config::{self, PixfitConfig};
use pixfit::imaging::{
    Background, ColorSpace, Density, OutputFormat, Quality, ResizeFilter, RustBackend, ScaleTarget,
};
use pixfit::jobs::{self, JobSettings, Transform};
use pixfit::output;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "pixfit")]
#[command(about = "Normalize, convert, and fit images for the web")]
#[command(long_about = "\
Normalize, convert, and fit images for the web

Every command runs the same clean-up pipeline before its own step:

  read → format → remove alpha → flatten layers → strip metadata → colorspace

The clean-up steps are on by default and configured in pixfit.toml;
--keep-alpha, --keep-layers and --keep-meta turn them off for one run.

Inputs can be files, directories (searched recursively for images),
or '-' for standard input.

Run 'pixfit gen-config' to generate a documented pixfit.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./pixfit.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Shared flags for commands that write images.
#[derive(clap::Args, Clone)]
struct ProcessArgs {
    /// Input files, directories, or '-' for stdin
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(long, short, default_value = ".")]
    out: PathBuf,

    /// Output format: jpeg, png, tiff, webp, avif
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Compression quality (1-100)
    #[arg(long)]
    quality: Option<u32>,

    /// Target colorspace: rgb, srgb
    #[arg(long)]
    colorspace: Option<ColorSpace>,

    /// Background for alpha removal and flattening (name, #rgb, #rrggbb)
    #[arg(long)]
    background: Option<Background>,

    /// Resampling filter: nearest, triangle, catmull-rom, gaussian, lanczos3
    #[arg(long)]
    filter: Option<ResizeFilter>,

    /// Pixel density in dots per inch
    #[arg(long)]
    dpi: Option<u16>,

    /// Keep the alpha channel
    #[arg(long)]
    keep_alpha: bool,

    /// Keep all layers/frames
    #[arg(long)]
    keep_layers: bool,

    /// Keep embedded metadata and color profiles
    #[arg(long)]
    keep_meta: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print dimensions and format of images
    Identify {
        /// Input files, directories, or '-' for stdin
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Crop to a centered square and scale to a fixed size
    Thumbnail {
        #[command(flatten)]
        args: ProcessArgs,

        /// Edge length in pixels (default from config: 300)
        #[arg(long)]
        size: Option<u32>,
    },
    /// Scale proportionally so the longer side meets the bounding box
    Scale {
        #[command(flatten)]
        args: ProcessArgs,

        /// Bounding box as WIDTHxHEIGHT, or a single number for a square
        #[arg(long, value_parser = parse_bound)]
        max: (u32, u32),

        /// Resize exactly to the computed size instead of best fit
        #[arg(long)]
        exact: bool,
    },
    /// Re-encode without changing geometry
    Convert {
        #[command(flatten)]
        args: ProcessArgs,
    },
    /// Print a stock pixfit.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Identify { inputs, json } => {
            let (_, backend) = setup(cli.config.as_deref())?;
            let inputs = jobs::collect_inputs(&inputs)?;
            let mut identified = Vec::new();
            let mut failed = 0;
            for input in &inputs {
                match jobs::identify(&backend, input) {
                    Ok(info) => identified.push(info),
                    Err(e) => {
                        eprintln!("{}: {}", input, e);
                        failed += 1;
                    }
                }
            }
            if json {
                println!("{}", output::format_identify_json(&identified)?);
            } else {
                output::print_identify(&identified);
            }
            if failed > 0 {
                return Err(format!("{} of {} images could not be read", failed, inputs.len()).into());
            }
        }
        Command::Thumbnail { args, size } => {
            let (config, backend) = setup(cli.config.as_deref())?;
            let size = size.unwrap_or(config.thumbnail.size);
            ScaleTarget::square(size)?;
            run(&backend, &config, &args, Transform::Thumbnail { size })?;
        }
        Command::Scale { args, max, exact } => {
            let (config, backend) = setup(cli.config.as_deref())?;
            let best_fit = config.resize.best_fit && !exact;
            let target = ScaleTarget::new(max.0, max.1, best_fit)?;
            run(&backend, &config, &args, Transform::ScaleToFit { target })?;
        }
        Command::Convert { args } => {
            let (config, backend) = setup(cli.config.as_deref())?;
            run(&backend, &config, &args, Transform::Convert)?;
        }
    }

    Ok(())
}

/// Load config and set up the worker pool for commands that read images.
fn setup(
    file: Option<&std::path::Path>,
) -> Result<(PixfitConfig, RustBackend), Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let config = config::load_config(file, &cwd)?;
    init_thread_pool(&config.processing);
    Ok((config, RustBackend::new()))
}

/// Run a batch, printing progress as jobs finish.
fn run(
    backend: &RustBackend,
    config: &PixfitConfig,
    args: &ProcessArgs,
    transform: Transform,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = job_settings(config, args)?;
    let inputs = jobs::collect_inputs(&args.inputs)?;

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_job_event(&event) {
                println!("{}", line);
            }
        }
    });
    let report = jobs::run_batch(backend, &inputs, &args.out, transform, &settings, Some(tx));
    printer.join().map_err(|_| "progress printer panicked")?;
    output::print_batch_summary(&report);

    if !report.is_success() {
        return Err(format!("{} of {} images failed", report.failed.len(), inputs.len()).into());
    }
    Ok(())
}

/// Config values with command-line overrides applied.
fn job_settings(
    config: &PixfitConfig,
    args: &ProcessArgs,
) -> Result<JobSettings, Box<dyn std::error::Error>> {
    let mut settings = JobSettings::from_config(config)?;
    if let Some(format) = args.format {
        settings.format = Some(format);
    }
    if let Some(quality) = args.quality {
        settings.quality = Some(Quality::try_from(quality)?);
    }
    if let Some(space) = args.colorspace {
        settings.colorspace = Some(space);
    }
    if let Some(background) = args.background {
        settings.background = background;
    }
    if let Some(filter) = args.filter {
        settings.filter = filter;
    }
    if let Some(dpi) = args.dpi {
        if dpi == 0 {
            return Err("--dpi must be positive".into());
        }
        settings.density = Some(Density::dpi(dpi));
    }
    settings.remove_alpha &= !args.keep_alpha;
    settings.flatten_layers &= !args.keep_layers;
    settings.strip_metadata &= !args.keep_meta;
    Ok(settings)
}

/// Parse `1200x800`, or `1200` for a square bound.
fn parse_bound(s: &str) -> Result<(u32, u32), String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid size {:?}", v))
    };
    match s.split_once(['x', 'X']) {
        Some((w, h)) => Ok((parse(w)?, parse(h)?)),
        None => {
            let side = parse(s)?;
            Ok((side, side))
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
