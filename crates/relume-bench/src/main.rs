//! relume-bench: CLI tool for transform experimentation and diagnostics.
//!
//! Decodes an image file, hands it to the result processor as a pooled
//! buffer, and prints what the transform did. Useful for:
//!
//! - Comparing resize filters and low-quality output
//! - Measuring transform durations across repeated runs
//! - Watching buffer pool reuse when the same image is processed again
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin relume-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` to see pool reuse and skip decisions.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use relume_pipeline::{
    DecodeResult, ImageInfo, LoadRequest, PixelFormat, PoolConfig, ProcessDiagnostics,
    ProcessOutcome, ProcessorConfig, RequestState, Resize, ResizeFilter, ResultProcessor,
    RgbaImage, TransformKind,
};

/// Default blur sigma when `--transform blur` is selected.
const DEFAULT_BLUR_SIGMA: f32 = 2.0;

/// Default corner radius when `--transform rounded-corners` is selected.
const DEFAULT_CORNER_RADIUS: u32 = 16;

/// Transform experimentation and diagnostics for relume.
///
/// Runs a decoded image through the result processor with a configurable
/// transform and prints timing, buffer and pool diagnostics.
#[derive(Parser)]
#[command(name = "relume-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Transform to apply.
    #[arg(long, value_enum, default_value_t = TransformArg::Resize)]
    transform: TransformArg,

    /// Resize target width in pixels.
    #[arg(long, requires = "height", value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    width: Option<u32>,

    /// Resize target height in pixels.
    #[arg(long, requires = "width", value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    height: Option<u32>,

    /// Stretch to exactly the target size instead of fitting inside it.
    #[arg(long)]
    exact: bool,

    /// Resize filter (nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    filter: Filter,

    /// Gaussian blur sigma.
    #[arg(long, default_value_t = DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Corner radius in pixels.
    #[arg(long, default_value_t = DEFAULT_CORNER_RADIUS)]
    corner_radius: u32,

    /// Prefer lower memory use (RGB565 for opaque outputs).
    #[arg(long)]
    low_quality: bool,

    /// Upper bound on idle pooled bytes.
    #[arg(long, default_value_t = PoolConfig::DEFAULT_MAX_BYTES)]
    pool_max_bytes: usize,

    /// Largest single buffer the pool hands out, in bytes.
    #[arg(long, default_value_t = PoolConfig::DEFAULT_MAX_BUFFER_BYTES)]
    max_buffer_bytes: usize,

    /// Disable buffer pooling.
    #[arg(long)]
    no_pool: bool,

    /// Write the processed image to a PNG file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full processor config as a JSON string.
    ///
    /// When provided, all other processing flags are ignored.
    /// The JSON must be a valid `ProcessorConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Transform selection.
#[derive(Clone, Copy, ValueEnum)]
enum TransformArg {
    /// Pass results through untouched.
    None,
    /// Resize to `--width` x `--height`.
    Resize,
    /// Convert to grayscale in place.
    Grayscale,
    /// Gaussian blur with `--blur-sigma`.
    Blur,
    /// Centered circle crop.
    CircleCrop,
    /// Rounded corners with `--corner-radius`.
    RoundedCorners,
}

/// Resize filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for ResizeFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Build a [`ProcessorConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual processing flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<ProcessorConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        let resize = match (cli.width, cli.height) {
            (Some(width), Some(height)) if cli.exact => Some(Resize::exact(width, height)),
            (Some(width), Some(height)) => Some(Resize::fit(width, height)),
            _ => None,
        };
        ProcessorConfig {
            pool: PoolConfig {
                enabled: !cli.no_pool,
                max_bytes: cli.pool_max_bytes,
                max_buffer_bytes: cli.max_buffer_bytes,
                ..PoolConfig::default()
            },
            transform: match cli.transform {
                TransformArg::None => None,
                TransformArg::Resize => Some(TransformKind::Resize {
                    filter: cli.filter.into(),
                }),
                TransformArg::Grayscale => Some(TransformKind::Grayscale),
                TransformArg::Blur => Some(TransformKind::Blur {
                    sigma: cli.blur_sigma,
                }),
                TransformArg::CircleCrop => Some(TransformKind::CircleCrop),
                TransformArg::RoundedCorners => Some(TransformKind::RoundedCorners {
                    radius: cli.corner_radius,
                }),
            },
            resize,
            low_quality: cli.low_quality,
        }
    };

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let mime_type = image::guess_format(&image_bytes)
        .map_or("application/octet-stream", |format| format.to_mime_type());
    let decoded = match image::load_from_memory(&image_bytes) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("Error decoding {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes, {mime_type}, {}x{})",
        cli.image_path.display(),
        image_bytes.len(),
        decoded.width(),
        decoded.height(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let processor = ResultProcessor::new(config.build_pool());
    let options = config.transform_options();
    let request_key = cli.image_path.display().to_string();
    let info = ImageInfo::new(decoded.width(), decoded.height(), mime_type);

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let buffer = match processor.pool().acquire_rgba(&decoded, PixelFormat::Rgba8) {
            Ok(buffer) => buffer,
            Err(e) => {
                eprintln!("Error acquiring buffer: {e}");
                return ExitCode::FAILURE;
            }
        };
        let mut result = DecodeResult::bitmap(buffer, info.clone());
        let mut request = LoadRequest::new(request_key.clone(), options.clone());
        if let Err(e) = request.transition(RequestState::Decoding) {
            eprintln!("Request error: {e}");
            return ExitCode::FAILURE;
        }

        match processor.process(&mut request, &mut result) {
            Ok(ProcessOutcome::Processed(diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
            }
            Ok(ProcessOutcome::Skipped(reason)) => {
                eprintln!("Result passed through untouched: {reason}");
            }
            Ok(ProcessOutcome::Failed(failure)) => {
                eprintln!("Processing error: {failure}");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Buffer misuse: {e}");
                return ExitCode::FAILURE;
            }
        }

        // Write the image on the first run only.
        if run == 0
            && let Some(ref output_path) = cli.output
            && let Some(buffer) = result.buffer()
        {
            match buffer.to_rgba_image().map(|img| write_png(&img, output_path)) {
                Ok(Ok(())) => eprintln!("Image written to {}", output_path.display()),
                Ok(Err(e)) => eprintln!("Error writing {}: {e}", output_path.display()),
                Err(e) => eprintln!("Buffer misuse: {e}"),
            }
        }

        if let Err(e) = request.transition(RequestState::Completed) {
            eprintln!("Request error: {e}");
            return ExitCode::FAILURE;
        }
        // Display is done; hand the pixels back for the next run.
        if let Some(buffer) = result.buffer()
            && let Err(e) = processor.pool().release(buffer)
        {
            eprintln!("Buffer misuse: {e}");
            return ExitCode::FAILURE;
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn write_png(image: &RgbaImage, path: &std::path::Path) -> Result<(), image::ImageError> {
    image.save_with_format(path, image::ImageFormat::Png)
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[ProcessDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(last) = all_diagnostics.last() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Transform: {}", last.transform);
    println!("Duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    let reused = all_diagnostics
        .iter()
        .filter(|d| d.reclaimed.is_some())
        .count();
    println!(
        "Inputs reclaimed: {reused}/{}  |  Pool hits: {}  misses: {}  evicted: {}",
        all_diagnostics.len(),
        last.pool.hits,
        last.pool.misses,
        last.pool.evicted,
    );
}
