//! agbmap CLI - multi-year above-ground biomass estimation

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use agbmap_core::io::read_geotiff;
use agbmap_pipeline::{run, write_outputs, FileSource, RunConfig, RunReport};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "agbmap")]
#[command(author, version, about = "Multi-year above-ground biomass estimation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over every year of the analysis window
    Run {
        /// Run configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Input manifest listing the GeoTIFF sources (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "agbmap-out")]
        output: PathBuf,
        /// Worker threads (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Override analysis.start_year
        #[arg(long)]
        start_year: Option<i32>,
        /// Override analysis.end_year
        #[arg(long)]
        end_year: Option<i32>,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Validate a run configuration and print the resulting grid
    CheckConfig {
        /// Run configuration (TOML)
        config: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(path: &PathBuf) -> Result<RunConfig> {
    RunConfig::from_path(path).with_context(|| format!("Failed to load config: {}", path.display()))
}

fn print_report(report: &RunReport) {
    println!("\nPeriods:");
    for result in report.completed() {
        println!(
            "  {}  total AGB {:.2} over {:.2} ha  (RMSE {:.3}, {} training rows)",
            result.year,
            result.aggregate.total_agb,
            result.aggregate.valid_area_ha,
            result.evaluation.rmse,
            result.training_rows
        );
    }
    for (year, reason) in report.skipped() {
        println!("  {}  skipped: {}", year, reason);
    }
    for (year, reason) in report.failed() {
        println!("  {}  FAILED: {}", year, reason);
    }

    if !report.changes.is_empty() {
        println!("\nYear-over-year change:");
        for c in &report.changes {
            println!("  {}  {:+.2}  ({}%)", c.year, c.change, c.change_percent);
        }
    }

    match &report.trend {
        Some(t) => {
            println!(
                "\nTrend {}-{} over {} periods:",
                t.summary.first_year, t.summary.last_year, t.summary.period_count
            );
            if let (Some(min), Some(max)) = (t.summary.min, t.summary.max) {
                println!("  Rate: {:.4} .. {:.4} per year", min, max);
            }
        }
        None => println!("\nTrend: not enough completed periods"),
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            manifest,
            output,
            threads,
            start_year,
            end_year,
        } => {
            let mut run_config = load_config(&config)?;
            if start_year.is_some() || end_year.is_some() {
                let start = start_year.unwrap_or(run_config.analysis.start_year);
                let end = end_year.unwrap_or(run_config.analysis.end_year);
                run_config = run_config.with_years(start, end);
            }
            if threads.is_some() {
                run_config.resources.threads = threads;
            }
            run_config.validate().context("Invalid configuration")?;

            let source = FileSource::from_manifest(&manifest)
                .with_context(|| format!("Failed to load manifest: {}", manifest.display()))?;

            let start = Instant::now();
            let pb = spinner("Running pipeline...");
            let report = run(&run_config, &source);
            pb.finish_and_clear();
            let report = report.context("Pipeline run failed")?;
            info!(elapsed = ?start.elapsed(), "pipeline finished");

            let pb = spinner("Writing outputs...");
            let written = write_outputs(&report, &output);
            pb.finish_and_clear();
            let written = written
                .with_context(|| format!("Failed to write outputs to {}", output.display()))?;

            print_report(&report);
            println!("\n{} files saved to: {}", written.len(), output.display());
            println!("  Processing time: {:.2?}", start.elapsed());

            if report.completed().next().is_none() {
                bail!("no period completed");
            }
        }

        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let raster = read_geotiff::<f64, _>(&input);
            pb.finish_and_clear();
            let raster = raster.with_context(|| format!("Failed to read: {}", input.display()))?;

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
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        Commands::CheckConfig { config } => {
            let run_config = load_config(&config)?;
            let grid = run_config.analysis_grid()?;
            let (rows, cols) = grid.shape();
            let bounds = grid.bounds();

            println!("Config: {} (valid)", config.display());
            println!(
                "Years: {}-{}",
                run_config.analysis.start_year, run_config.analysis.end_year
            );
            println!("CRS: {}", grid.crs());
            println!("Grid: {} x {} at {} m ({} cells)", cols, rows, grid.scale(), rows * cols);
            println!(
                "Bounds: ({:.3}, {:.3}) - ({:.3}, {:.3})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            println!(
                "Vegetation classes: {:?}",
                run_config.landcover.vegetation_classes
            );
            println!(
                "Sampling: {} background / {} labelled points",
                run_config.sampling.points_per_class[0], run_config.sampling.points_per_class[1]
            );
            println!(
                "Model: {} trees, min leaf {}, bag fraction {}",
                run_config.model.trees, run_config.model.min_leaf, run_config.model.bag_fraction
            );
        }
    }

    Ok(())
}
