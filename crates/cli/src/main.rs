//! hrudel CLI - HRU delineation from five factor rasters

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hrudel_algorithms::{EncodingConfig, Factor};
use hrudel_core::io::read_geotiff;
use hrudel_core::Raster;
use hrudel_pipeline::{run_pipeline_with, PipelineConfig, PipelineError, PipelineInputs, PipelineReport};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hrudel")]
#[command(author, version, about = "Hydrologic Response Unit delineation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delineate HRUs: encode, polygonize, dissolve and compute areas
    Run {
        /// Watershed raster
        watershed: PathBuf,
        /// Grid (climate model cell) raster
        grid: PathBuf,
        /// Elevation class raster
        elevation: PathBuf,
        /// Land cover class raster
        landcover: PathBuf,
        /// Radiation class raster
        radiation: PathBuf,
        /// Output directory; products go to its Results sub-folder
        output_dir: PathBuf,
        /// Base name of the output files
        hru_name: String,
        /// Fail instead of replacing outputs of an earlier run
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Split an HRU code into its factor values
    Decode {
        /// Encoded HRU value, e.g. 100203045
        code: i64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &PathBuf) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> =
        read_geotiff(path).with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn done(report: &PipelineReport) {
    println!("HRU layer saved to: {}", report.layout.dissolved.display());
    println!("  Coded raster: {}", report.layout.raster.display());
    println!("  Polygons:     {}", report.layout.polygons.display());
    println!(
        "  {} x {} cells ({} valid), {} polygons, {} HRUs, {:.4} km2",
        report.cols, report.rows, report.valid_cells, report.polygons, report.hrus, report.total_area_km2
    );
    println!("  Processing time: {:.2?}", report.elapsed);
}

/// Exit code for a failed command, taken from the pipeline error when there is one
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<PipelineError>())
        .map_or(1, PipelineError::exit_code)
}

// ─── Commands ───────────────────────────────────────────────────────────

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            watershed,
            grid,
            elevation,
            landcover,
            radiation,
            output_dir,
            hru_name,
            no_overwrite,
        } => {
            let inputs = PipelineInputs {
                watershed,
                grid,
                elevation,
                landcover,
                radiation,
            };
            let config = PipelineConfig {
                overwrite: !no_overwrite,
                ..PipelineConfig::default()
            };

            info!("Delineating HRUs into {}", output_dir.display());
            let pb = spinner("Starting...");
            let result = run_pipeline_with(&inputs, &output_dir, &hru_name, &config, |stage| {
                pb.set_message(format!("[{}/5] {}...", stage.number(), stage.name()));
            });
            pb.finish_and_clear();

            let report = result.context("HRU delineation failed")?;
            done(&report);
        }

        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {} (cell area {})", raster.cell_size(), raster.cell_area());
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
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        Commands::Decode { code } => {
            if code < 0 {
                bail!("HRU codes are non-negative, got {code}");
            }
            let config = EncodingConfig::default();
            let hru = config.decode(code);
            if hru.watershed >= config.watershed.limit {
                bail!("{code} is beyond the largest code of the default encoding layout");
            }
            println!("HRU {code}");
            for (factor, value) in Factor::ALL.iter().zip([
                hru.watershed,
                hru.grid,
                hru.elevation,
                hru.landcover,
                hru.radiation,
            ]) {
                println!("  {:<10} {}", factor.name(), value);
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
