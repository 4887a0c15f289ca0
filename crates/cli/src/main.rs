//! TerraStamp CLI - stamp elevation rings onto surface rasters

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use terrastamp_algorithms::profile::{resolve_profile, Expression, StairPolicy};
use terrastamp_algorithms::stamp::{raster_stamp_files, StampParams};
use terrastamp_core::io::read_geotiff;
use terrastamp_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "terrastamp")]
#[command(author, version, about = "Stamp distance-ring elevations onto surface rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Resolve and print the elevation of every ring
    Profile {
        /// Ring distances, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        distances: Vec<f64>,
        /// Height function of the distance `d`, e.g. "d*d" or "10 - sqrt(d)"
        #[arg(short, long, default_value = "d")]
        function: String,
        /// Sample point inside each ring: inner, outer, mid
        #[arg(short, long, default_value = "mid")]
        stair: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Build rings around features and stamp them onto a surface
    Stamp(StampArgs),
}

#[derive(clap::Args)]
struct StampArgs {
    /// Input features (GeoJSON)
    features: PathBuf,
    /// Input surface raster (GeoTIFF)
    surface: PathBuf,
    /// Output raster
    output: PathBuf,
    /// JSON job file with stamp parameters; flags below override it
    #[arg(long)]
    job: Option<PathBuf>,
    /// Operation: add, subtract, multiply, divide
    #[arg(long)]
    op: Option<String>,
    /// Ring distances, comma separated
    #[arg(short, long, value_delimiter = ',')]
    distances: Option<Vec<f64>>,
    /// Height function of the distance `d`
    #[arg(short, long)]
    function: Option<String>,
    /// Sample point inside each ring: inner, outer, mid
    #[arg(short, long)]
    stair: Option<String>,
    /// Unit of the distances (meters, feet, kilometers, ...)
    #[arg(long)]
    unit: Option<String>,
    /// Unit of the map coordinates
    #[arg(long)]
    map_unit: Option<String>,
    /// Ring dissolve: none, all
    #[arg(long)]
    dissolve: Option<String>,
    /// Keep rings outside input polygons
    #[arg(long)]
    outside_only: bool,
    /// Cell assignment: cell_center, maximum_area, maximum_combined_area
    #[arg(long)]
    cell_assignment: Option<String>,
    /// DIVIDE by a zero stamp cell: fail, nodata, infinity
    #[arg(long)]
    zero_division: Option<String>,
    /// Segments per full circle when buffering
    #[arg(long)]
    segments: Option<usize>,
    /// Sub-cell samples per axis for area based cell assignment
    #[arg(long)]
    subcell_samples: Option<usize>,
    /// Directory for per-run scratch files (default: system temp dir)
    #[arg(long)]
    scratch: Option<PathBuf>,
    /// Keep intermediate rings and stamp raster
    #[arg(long)]
    keep_intermediates: bool,
}

impl StampArgs {
    fn params(&self) -> Result<StampParams> {
        let mut params = match &self.job {
            Some(path) => StampParams::from_json_file(path)
                .with_context(|| format!("Failed to load job file {}", path.display()))?,
            None => StampParams::default(),
        };

        if let Some(op) = &self.op {
            params.operation = op.parse()?;
        }
        if let Some(distances) = &self.distances {
            params.distances = distances.clone();
        }
        if let Some(function) = &self.function {
            params.height_function = function.clone();
        }
        if let Some(stair) = &self.stair {
            params.stair_policy = stair.parse()?;
        }
        if let Some(unit) = &self.unit {
            params.buffer_unit = unit.parse()?;
        }
        if let Some(unit) = &self.map_unit {
            params.map_unit = unit.parse()?;
        }
        if let Some(dissolve) = &self.dissolve {
            params.dissolve = dissolve.parse()?;
        }
        if let Some(method) = &self.cell_assignment {
            params.cell_assignment = method.parse()?;
        }
        if let Some(policy) = &self.zero_division {
            params.zero_division = policy.parse()?;
        }
        if let Some(segments) = self.segments {
            params.arc_segments = segments;
        }
        if let Some(samples) = self.subcell_samples {
            params.subcell_samples = samples;
        }
        params.outside_polygons_only |= self.outside_only;
        params.keep_intermediates |= self.keep_intermediates;

        if params.distances.is_empty() {
            bail!("No ring distances given (use --distances or a job file)");
        }
        Ok(params)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_surface(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path, None).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let raster = read_surface(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            if !raster.is_empty() {
                println!(
                    "  Valid cells: {} ({:.1}%)",
                    stats.valid_count,
                    100.0 * stats.valid_count as f64 / raster.len() as f64
                );
            }
        }

        Commands::Profile {
            distances,
            function,
            stair,
            json,
        } => {
            let policy: StairPolicy = stair.parse()?;
            let f = Expression::compile(&function).context("Failed to parse height function")?;
            let profile = resolve_profile(&distances, policy, &f).context("Failed to resolve profile")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                println!("f(d) = {}  [{}]", f, policy);
                println!("{:>12} {:>12} {:>14}", "distance", "sample", "elevation");
                for entry in profile.iter() {
                    println!(
                        "{:>12} {:>12} {:>14.4}",
                        entry.distance, entry.sample, entry.elevation
                    );
                }
            }
        }

        Commands::Stamp(args) => {
            let params = args.params()?;
            let scratch_root = args.scratch.clone().unwrap_or_else(std::env::temp_dir);

            let start = Instant::now();
            let pb = spinner("Stamping surface...");
            let result = raster_stamp_files(
                &args.features,
                &args.surface,
                &args.output,
                &params,
                &scratch_root,
            );
            pb.finish_and_clear();
            let output = result.context("Raster stamp failed")?;
            done("Stamped surface", &output, start.elapsed());
        }
    }

    Ok(())
}
