//! tessella: find a photographed tile in a reference gallery.
//!
//! Loads the gallery listed in a JSON manifest, reads the query photo,
//! and prints the exact and similar matches. Thresholds and edge
//! detection parameters can be tuned from the command line; with
//! `--diagnostics` per-stage timings and counts are printed as well.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin tessella -- --manifest gallery.json photo.jpg
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tessella_io::{FileUpload, MatchSession, QueryOutcome, render};
use tessella_match::diagnostics::{MatchDiagnostics, SystemClock};
use tessella_match::{GradientNorm, MatchConfig, MatchResult, ResizeFilter};
use tracing_subscriber::EnvFilter;

/// Find a photographed tile in a reference gallery.
///
/// Ranks every gallery tile by dominant-color distance to the photo,
/// reports tiles below the exact-match threshold, and lists the closest
/// tiles whose edge structure also resembles the photo.
#[derive(Parser)]
#[command(name = "tessella", version)]
struct Cli {
    /// Query photo (PNG, JPEG, BMP, WebP).
    query: PathBuf,

    /// Gallery manifest: a JSON array of `{ "path", "name" }` records.
    #[arg(long, short)]
    manifest: PathBuf,

    /// Color distance below which a tile counts as identical.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_EXACT_MATCH_THRESHOLD)]
    exact_threshold: f64,

    /// Summed edge-map difference below which a tile counts as similar.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_EDGE_DIFFERENCE_THRESHOLD)]
    edge_threshold: u64,

    /// Maximum number of similar tiles to report.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_MAX_SIMILAR)]
    max_similar: usize,

    /// Canny low threshold.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_CANNY_LOW)]
    canny_low: f32,

    /// Canny high threshold.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_CANNY_HIGH)]
    canny_high: f32,

    /// Gradient magnitude norm for edge detection.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_NORM)]
    gradient_norm: Norm,

    /// Gaussian blur sigma before edge detection (0 disables).
    #[arg(long, default_value_t = MatchConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Filter used to resize gallery tiles to the photo's size.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    resize_filter: Filter,

    /// Sample every n-th pixel when extracting colors.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_COLOR_SAMPLE_STRIDE, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    color_stride: usize,

    /// Bits per channel when bucketing colors (1-8).
    #[arg(long, default_value_t = MatchConfig::DEFAULT_COLOR_QUANTIZATION_BITS, value_parser = clap::value_parser!(u8).range(1..=8))]
    color_bits: u8,

    /// Full match config as a JSON string.
    ///
    /// When provided, all other match parameter flags are ignored.
    /// Missing fields take their default values.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the result as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Print per-stage timings and counts.
    #[arg(long)]
    diagnostics: bool,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short)]
    verbose: bool,
}

/// Gradient norm selection.
#[derive(Clone, Copy, ValueEnum)]
enum Norm {
    /// `|gx| + |gy|` (fast).
    L1,
    /// `sqrt(gx² + gy²)` (more accurate).
    L2,
}

/// Resampling filter selection.
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

const fn norm_from_config(n: GradientNorm) -> Norm {
    match n {
        GradientNorm::L1 => Norm::L1,
        GradientNorm::L2 => Norm::L2,
    }
}

const fn filter_from_config(f: ResizeFilter) -> Filter {
    match f {
        ResizeFilter::Nearest => Filter::Nearest,
        ResizeFilter::Triangle => Filter::Triangle,
        ResizeFilter::CatmullRom => Filter::CatmullRom,
        ResizeFilter::Gaussian => Filter::Gaussian,
        ResizeFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// CLI defaults derived from the config defaults so the two cannot
/// silently diverge.
const CLI_DEFAULT_NORM: Norm = norm_from_config(MatchConfig::DEFAULT_GRADIENT_NORM);
const CLI_DEFAULT_FILTER: Filter = filter_from_config(MatchConfig::DEFAULT_RESIZE_FILTER);

/// Build a [`MatchConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<MatchConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        MatchConfig {
            exact_match_threshold: cli.exact_threshold,
            edge_difference_threshold: cli.edge_threshold,
            max_similar: cli.max_similar,
            canny_low: cli.canny_low,
            canny_high: cli.canny_high,
            gradient_norm: match cli.gradient_norm {
                Norm::L1 => GradientNorm::L1,
                Norm::L2 => GradientNorm::L2,
            },
            blur_sigma: cli.blur_sigma,
            resize_filter: match cli.resize_filter {
                Filter::Nearest => ResizeFilter::Nearest,
                Filter::Triangle => ResizeFilter::Triangle,
                Filter::CatmullRom => ResizeFilter::CatmullRom,
                Filter::Gaussian => ResizeFilter::Gaussian,
                Filter::Lanczos3 => ResizeFilter::Lanczos3,
            },
            color_sample_stride: cli.color_stride,
            color_quantization_bits: cli.color_bits,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    // Read the photo while the gallery decodes.
    let pending = tessella_io::spawn_capture(FileUpload::new(&cli.query));

    let load = match tessella_io::load(&cli.manifest) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error loading gallery: {e}");
            return ExitCode::FAILURE;
        }
    };
    if !load.is_complete() {
        tracing::warn!(
            loaded = load.gallery.len(),
            skipped = load.failures.len(),
            "gallery is incomplete, matching against the tiles that loaded"
        );
    }

    let query = match pending.wait() {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.query.display());
            return ExitCode::FAILURE;
        }
    };

    let session = match MatchSession::new(load.gallery, config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (result, diagnostics) = if cli.diagnostics {
        match tessella_match::diagnostics::match_tile_with_diagnostics(
            &query,
            session.gallery(),
            session.config(),
            &SystemClock,
        ) {
            Ok((result, diagnostics)) => (result, Some(diagnostics)),
            Err(e) => {
                eprintln!("Match error: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        match session.run(session.begin(), &query) {
            QueryOutcome::Matched(result) => (result, None),
            QueryOutcome::Failed(e) => {
                eprintln!("Match error: {e}");
                return ExitCode::FAILURE;
            }
            QueryOutcome::Superseded => {
                eprintln!("Match error: query was superseded");
                return ExitCode::FAILURE;
            }
        }
    };

    print_result(&result, diagnostics.as_ref(), cli.json)
}

/// Print the match and optional diagnostics. No match is a successful
/// run with its own message.
fn print_result(
    result: &MatchResult<'_>,
    diagnostics: Option<&MatchDiagnostics>,
    json: bool,
) -> ExitCode {
    if json {
        match render::json(result, diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing result: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", render::text(result));
        if let Some(diagnostics) = diagnostics {
            eprintln!();
            eprintln!("{}", diagnostics.report());
        }
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(
            ["tessella", "--manifest", "gallery.json", "photo.jpg"]
                .iter()
                .chain(args)
                .copied(),
        )
        .unwrap()
    }

    #[test]
    fn flags_default_to_config_defaults() {
        let config = config_from_cli(&parse(&[])).unwrap();
        assert_eq!(config, MatchConfig::default());
    }

    #[test]
    fn flags_override_fields() {
        let cli = parse(&[
            "--exact-threshold",
            "4",
            "--max-similar",
            "2",
            "--gradient-norm",
            "l2",
            "--resize-filter",
            "lanczos3",
            "--color-bits",
            "8",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.exact_match_threshold - 4.0).abs() < f64::EPSILON);
        assert_eq!(config.max_similar, 2);
        assert_eq!(config.gradient_norm, GradientNorm::L2);
        assert_eq!(config.resize_filter, ResizeFilter::Lanczos3);
        assert_eq!(config.color_quantization_bits, 8);
    }

    #[test]
    fn config_json_replaces_flags() {
        let cli = parse(&["--max-similar", "9", "--config-json", r#"{"max_similar": 1}"#]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.max_similar, 1);
        assert_eq!(config.canny_high, MatchConfig::DEFAULT_CANNY_HIGH);
    }

    #[test]
    fn invalid_config_is_reported() {
        let cli = parse(&["--canny-low", "120", "--canny-high", "100"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("canny_low"));
        let cli = parse(&["--config-json", "{not json"]);
        assert!(config_from_cli(&cli).unwrap_err().starts_with("Error parsing --config-json"));
    }

    #[test]
    fn color_bits_outside_range_are_rejected_by_clap() {
        let result = Cli::try_parse_from([
            "tessella",
            "--manifest",
            "g.json",
            "q.png",
            "--color-bits",
            "9",
        ]);
        assert!(result.is_err());
    }
}
