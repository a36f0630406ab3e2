//! cellflood-bench: CLI tool for segmentation parameter experimentation.
//!
//! Loads one intensity image, either from a path or through the dataset
//! layout, and runs the segmentation core on it. Useful for:
//!
//! - Measuring per-stage durations of graph construction and extraction
//! - Tuning pixel, edge, size and merge thresholds
//! - Inspecting cluster-count curves and automatic threshold estimates
//! - Locating nuclei and counting nucleus-sized pixels
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin cellflood-bench -- [OPTIONS] [IMAGE_PATH]
//! cargo run --release --bin cellflood-bench -- --data-dir input --id-code U2OS-03_4_O19 --mode nuclei
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod dataset;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use cellflood_segment::diagnostics::{self, Clock, SegmentDiagnostics};
use cellflood_segment::nucleus::{self, NucleusConfig};
use cellflood_segment::{PixelGrid, SegmentConfig, Thresholds, sweep, threshold};
use clap::{Parser, ValueEnum};
use flexi_logger::{Logger, LoggerHandle};
use log::info;

use crate::dataset::SiteImage;

/// Segmentation parameter experimentation and diagnostics for cellflood.
///
/// Runs the watershed segmentation core on one image with configurable
/// thresholds and prints per-stage diagnostics, count curves, threshold
/// estimates or located nuclei.
#[derive(Parser)]
#[command(name = "cellflood-bench", version)]
struct Cli {
    /// Path to the input image (PNG or TIFF). Omit when using --id-code.
    image_path: Option<PathBuf>,

    /// Dataset root directory holding `<set>/<batch>/Plate<n>/...`.
    #[arg(long, default_value = "input")]
    data_dir: PathBuf,

    /// Dataset split (`train` or `test`).
    #[arg(long, default_value = "train")]
    set: String,

    /// Dataset id code `<batch>_<plate>_<well>`, e.g. `U2OS-03_4_O19`.
    #[arg(long, conflicts_with = "image_path")]
    id_code: Option<String>,

    /// Site within the well (1 or 2).
    #[arg(long, default_value_t = 1)]
    site: u8,

    /// Imaging channel (1-6; 1 is the nuclear stain).
    #[arg(long, default_value_t = 1)]
    channel: u8,

    /// What to run.
    #[arg(long, value_enum, default_value_t = Mode::Segment)]
    mode: Mode,

    /// Pixel threshold (flooding cut-off and cluster membership).
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_PIXEL_THRESHOLD)]
    pixel_threshold: f64,

    /// Edge threshold for cluster connectivity (defaults to the pixel threshold).
    #[arg(long)]
    edge_threshold: Option<f64>,

    /// Minimum cluster size in pixels.
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_SIZE_THRESHOLD)]
    size_threshold: usize,

    /// Merge cap: two components of at least this size never merge.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    merge_threshold: Option<usize>,

    /// Tie-break seed (0 = deterministic index order).
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_TIE_BREAK_SEED)]
    seed: u64,

    /// Comma-separated thresholds for sweep and mask modes
    /// (default: 255 levels `(0.5 + k) / 256`).
    #[arg(long, value_delimiter = ',')]
    thresholds: Vec<f64>,

    /// Smallest component size marked in mask mode.
    #[arg(long, default_value_t = NucleusConfig::DEFAULT_SIZE_THRESHOLD)]
    size_min: usize,

    /// Largest component size marked in mask mode.
    #[arg(long, default_value_t = DEFAULT_SIZE_MAX)]
    size_max: usize,

    /// Number of runs for averaging (segment mode).
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full segmentation config as a JSON string.
    ///
    /// When provided, all other threshold flags are ignored.
    /// The JSON must be a valid `SegmentConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Log level filter (overridden by `RUST_LOG`).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Default upper bound of the nucleus size band.
const DEFAULT_SIZE_MAX: usize = 5000;

/// Operation selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Watershed graph + clusters + ellipses with per-stage diagnostics.
    Segment,
    /// Cluster counts across thresholds.
    Sweep,
    /// Automatic threshold estimates.
    Estimate,
    /// Nuclei located at a given or estimated threshold.
    Nuclei,
    /// Pixels belonging to nucleus-sized components at any threshold.
    Mask,
}

/// Build a [`SegmentConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual threshold flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<SegmentConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        SegmentConfig {
            pixel_threshold: cli.pixel_threshold,
            edge_threshold: cli.edge_threshold,
            size_threshold: cli.size_threshold,
            merge_threshold: cli.merge_threshold,
            tie_break_seed: cli.seed,
        }
    };
    config
        .validate()
        .map_err(|e| format!("Invalid config: {e}"))?;
    Ok(config)
}

/// Resolve the image path from the positional argument or dataset flags.
fn image_path(cli: &Cli) -> Result<PathBuf, String> {
    match (&cli.image_path, &cli.id_code) {
        (Some(path), _) => Ok(path.clone()),
        (None, Some(id_code)) => {
            let image =
                SiteImage::parse(id_code, cli.site, cli.channel).map_err(|e| e.to_string())?;
            let well = dataset::well_index(&image.well).map_err(|e| e.to_string())?;
            info!(
                "{} plate {} well {} (index {well}) site {} channel {}",
                image.cell_type(),
                image.plate,
                image.well,
                image.site,
                image.channel,
            );
            Ok(image.path(&cli.data_dir, &cli.set))
        }
        (None, None) => Err("Either IMAGE_PATH or --id-code is required".to_string()),
    }
}

fn init_logging(level: &str) -> Result<LoggerHandle, String> {
    Logger::try_with_env_or_str(level)
        .map_err(|e| format!("Invalid log level {level:?}: {e}"))?
        .log_to_stderr()
        .start()
        .map_err(|e| format!("Logger initialization failed: {e}"))
}

fn thresholds_from_cli(cli: &Cli) -> Thresholds {
    if cli.thresholds.is_empty() {
        Thresholds::default()
    } else {
        Thresholds::from(cli.thresholds.as_slice())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match init_logging(&cli.log_level) {
        Ok(handle) => handle,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let path = match image_path(&cli) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let grid = match PixelGrid::decode(&image_bytes) {
        Ok(grid) => grid,
        Err(e) => {
            eprintln!("Error decoding {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    info!(
        "loaded {} ({} bytes) as a {}x{} grid",
        path.display(),
        image_bytes.len(),
        grid.nx(),
        grid.ny(),
    );

    eprintln!(
        "Image: {} ({} bytes, {}x{})",
        path.display(),
        image_bytes.len(),
        grid.nx(),
        grid.ny(),
    );

    let result = match cli.mode {
        Mode::Segment => {
            eprintln!("Config: {config:#?}");
            eprintln!("Runs: {}", cli.runs);
            eprintln!();
            run_segment(&cli, &grid, &config)
        }
        Mode::Sweep => run_sweep(&cli, &grid, &config),
        Mode::Estimate => run_estimate(&cli, &grid),
        Mode::Nuclei => run_nuclei(&cli, &grid, &config),
        Mode::Mask => run_mask(&cli, &grid),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("Error serializing output: {e}"))?;
    println!("{json}");
    Ok(())
}

fn run_segment(cli: &Cli, grid: &PixelGrid, config: &SegmentConfig) -> Result<(), String> {
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (segmentation, diagnostics) =
            diagnostics::segment_with_diagnostics(grid, config, &StdClock)
                .map_err(|e| format!("Segmentation error: {e}"))?;

        if cli.json {
            print_json(&diagnostics)?;
        } else {
            println!("{}", diagnostics.report());
            if run == 0 {
                print_largest_clusters(&segmentation);
            }
        }
        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }
    Ok(())
}

/// Number of clusters listed after the report.
const LISTED_CLUSTERS: usize = 10;

fn print_largest_clusters(segmentation: &cellflood_segment::Segmentation) {
    let mut ranked: Vec<usize> = (0..segmentation.clusters.len()).collect();
    let clusters = segmentation.clusters.as_slice();
    ranked.sort_by(|&i, &j| cellflood_segment::by_size_descending(&clusters[i], &clusters[j]));

    println!();
    println!(
        "{:>8} {:>9} {:>9} {:>8} {:>8} {:>8}",
        "Size", "x", "y", "a", "b", "theta"
    );
    for &i in ranked.iter().take(LISTED_CLUSTERS) {
        let e = &segmentation.ellipses[i];
        println!(
            "{:>8} {:>9.2} {:>9.2} {:>8.2} {:>8.2} {:>7.1}°",
            e.size,
            e.x,
            e.y,
            e.a,
            e.b,
            e.theta_degrees(),
        );
    }
}

fn run_sweep(cli: &Cli, grid: &PixelGrid, config: &SegmentConfig) -> Result<(), String> {
    let clock = StdClock;
    let start = clock.now();
    let counts = sweep::count_clusters(
        grid,
        thresholds_from_cli(cli),
        config.size_threshold,
        config.tie_break_seed,
    );
    let elapsed = clock.elapsed(&start);

    if cli.json {
        return print_json(&counts);
    }
    println!(
        "Cluster counts (size >= {}), {} thresholds in {:.3}ms",
        config.size_threshold,
        counts.thresholds.len(),
        diagnostics::duration_ms(elapsed),
    );
    println!("{:>10} {:>8} {:>8}", "Threshold", "Count", "Largest");
    println!("{}", "-".repeat(28));
    for ((t, count), largest) in counts.iter().zip(&counts.largest) {
        println!("{t:>10.5} {count:>8} {largest:>8}");
    }
    Ok(())
}

fn run_estimate(cli: &Cli, grid: &PixelGrid) -> Result<(), String> {
    let median = threshold::median_quarter_maximum(grid)
        .map_err(|e| format!("Threshold estimation failed: {e}"))?;
    let mean = threshold::iterative_mean(grid, threshold::DEFAULT_MEAN_ITERATIONS)
        .map_err(|e| format!("Threshold estimation failed: {e}"))?;

    if cli.json {
        return print_json(&serde_json::json!({
            "median_quarter_maximum": median,
            "iterative_mean": mean,
        }));
    }
    println!("Median quarter maximum: {median:.5}");
    println!("Iterative mean:         {mean:.5}");
    Ok(())
}

fn run_nuclei(cli: &Cli, grid: &PixelGrid, config: &SegmentConfig) -> Result<(), String> {
    // A non-zero pixel threshold on the command line fixes the threshold.
    let nucleus_config = NucleusConfig {
        threshold: (config.pixel_threshold > 0.0).then_some(config.pixel_threshold),
        size_threshold: config
            .size_threshold
            .max(NucleusConfig::DEFAULT_SIZE_THRESHOLD),
    };
    let nuclei = nucleus::locate(grid, &nucleus_config)
        .map_err(|e| format!("Nucleus location failed: {e}"))?;

    if cli.json {
        return print_json(&nuclei);
    }
    println!(
        "{} nuclei at threshold {:.5}",
        nuclei.ellipses.len(),
        nuclei.threshold
    );
    println!(
        "{:>8} {:>9} {:>9} {:>8} {:>8} {:>8}",
        "Size", "x", "y", "a95", "b95", "theta"
    );
    for e in &nuclei.ellipses {
        let contour = e.scaled(cellflood_segment::Ellipse::CHI2_95);
        println!(
            "{:>8} {:>9.2} {:>9.2} {:>8.2} {:>8.2} {:>7.1}°",
            e.size,
            e.x,
            e.y,
            contour.a,
            contour.b,
            e.theta_degrees(),
        );
    }
    Ok(())
}

fn run_mask(cli: &Cli, grid: &PixelGrid) -> Result<(), String> {
    let mask = nucleus::nucleus_mask(grid, thresholds_from_cli(cli), cli.size_min, cli.size_max)
        .map_err(|e| format!("Mask failed: {e}"))?;
    let marked = mask.iter().filter(|&&m| m).count();

    if cli.json {
        return print_json(&serde_json::json!({
            "size_min": cli.size_min,
            "size_max": cli.size_max,
            "marked_pixels": marked,
            "pixel_count": mask.len(),
        }));
    }
    #[allow(clippy::cast_precision_loss)]
    let fraction = marked as f64 / mask.len() as f64 * 100.0;
    println!(
        "Nucleus-sized pixels [{}, {}]: {marked} of {} ({fraction:.2}%)",
        cli.size_min,
        cli.size_max,
        mask.len(),
    );
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&SegmentDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[SegmentDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| diagnostics::duration_ms(d.total_duration))
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Construct", |d| d.construct.duration),
        ("Extract", |d| d.extract.duration),
        ("Fit", |d| d.fit.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| diagnostics::duration_ms(extractor(d)))
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
