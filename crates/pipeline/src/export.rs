//! Writing a run's rasters, tables and summaries to a directory

use crate::error::Result;
use crate::period::{DensityStatistics, PeriodOutcome, PeriodResult, SkipReason};
use crate::run::RunReport;
use agbmap_algorithms::statistics::{AggregateResult, TrendSummary, YearOverYear};
use agbmap_core::io::write_geotiff;
use agbmap_core::Raster;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-period entry of `run_summary.json`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum PeriodSummary<'a> {
    Completed {
        year: i32,
        rmse: f64,
        training_rows: usize,
        aggregate: AggregateResult,
        statistics: DensityStatistics,
        predictors: &'a [String],
    },
    Skipped {
        year: i32,
        reason: &'a SkipReason,
    },
    Failed {
        year: i32,
        reason: &'a str,
    },
}

impl<'a> From<&'a PeriodOutcome> for PeriodSummary<'a> {
    fn from(outcome: &'a PeriodOutcome) -> Self {
        match outcome {
            PeriodOutcome::Completed(r) => PeriodSummary::Completed {
                year: r.year,
                rmse: r.evaluation.rmse,
                training_rows: r.training_rows,
                aggregate: r.aggregate,
                statistics: r.statistics,
                predictors: &r.predictors,
            },
            PeriodOutcome::Skipped { year, reason } => PeriodSummary::Skipped {
                year: *year,
                reason,
            },
            PeriodOutcome::Failed { year, reason } => PeriodSummary::Failed {
                year: *year,
                reason,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    crs: String,
    scale: f64,
    rows: usize,
    cols: usize,
    bounds: [f64; 4],
    start_year: i32,
    end_year: i32,
    periods: Vec<PeriodSummary<'a>>,
    changes: &'a [YearOverYear],
    trend: Option<TrendSummary>,
}

/// Write every output of `report` into `dir`, creating it if needed.
///
/// Per completed period: `predicted_agb_<year>.tif`, `agb_<year>.tif`
/// (vegetation-masked), `observed_vs_predicted_<year>.csv` and
/// `feature_importance_<year>.csv`. Per run: `rmse_per_year.csv`,
/// `agb_per_year.csv`, `agb_diff_per_year.csv`, `run_summary.json`, and
/// `agb_trend.tif` plus `trend_summary.json` when a trend exists.
///
/// # Returns
/// Paths of the files written, in writing order
pub fn write_outputs(report: &RunReport, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    let label = report.config.model.label_band.as_str();

    for result in report.completed() {
        written.extend(write_period(result, label, dir)?);
    }

    let path = dir.join("rmse_per_year.csv");
    let mut w = csv::Writer::from_path(&path)?;
    w.write_record(["year", "rmse"])?;
    for r in report.completed() {
        w.write_record([r.year.to_string(), r.evaluation.rmse.to_string()])?;
    }
    w.flush()?;
    written.push(path);

    let path = dir.join("agb_per_year.csv");
    let mut w = csv::Writer::from_path(&path)?;
    w.write_record(["year", "total_agb", "valid_area_ha"])?;
    for r in report.completed() {
        w.write_record([
            r.year.to_string(),
            r.aggregate.total_agb.to_string(),
            r.aggregate.valid_area_ha.to_string(),
        ])?;
    }
    w.flush()?;
    written.push(path);

    let path = dir.join("agb_diff_per_year.csv");
    let mut w = csv::Writer::from_path(&path)?;
    w.write_record(["year", "change", "change_percent"])?;
    for c in &report.changes {
        w.write_record([
            c.year.to_string(),
            c.change.to_string(),
            c.change_percent.to_string(),
        ])?;
    }
    w.flush()?;
    written.push(path);

    if let Some(trend) = &report.trend {
        let path = dir.join("agb_trend.tif");
        write_raster(&trend.raster, &path)?;
        written.push(path);
        let path = dir.join("trend_summary.json");
        write_json(&trend.summary, &path)?;
        written.push(path);
    }

    let (min_x, min_y, max_x, max_y) = report.grid.bounds();
    let (rows, cols) = report.grid.shape();
    let summary = RunSummary {
        crs: report.grid.crs().identifier(),
        scale: report.grid.scale(),
        rows,
        cols,
        bounds: [min_x, min_y, max_x, max_y],
        start_year: report.config.analysis.start_year,
        end_year: report.config.analysis.end_year,
        periods: report.outcomes.iter().map(PeriodSummary::from).collect(),
        changes: &report.changes,
        trend: report.trend.as_ref().map(|t| t.summary),
    };
    let path = dir.join("run_summary.json");
    write_json(&summary, &path)?;
    written.push(path);

    info!(files = written.len(), dir = %dir.display(), "outputs written");
    Ok(written)
}

fn write_period(result: &PeriodResult, label: &str, dir: &Path) -> Result<Vec<PathBuf>> {
    let year = result.year;
    let mut written = Vec::with_capacity(4);

    if let Some(band) = result.predicted.bands().first() {
        let path = dir.join(format!("predicted_agb_{}.tif", year));
        write_raster(&band.raster, &path)?;
        written.push(path);
    }

    let path = dir.join(format!("agb_{}.tif", year));
    write_raster(&result.masked, &path)?;
    written.push(path);

    let path = dir.join(format!("observed_vs_predicted_{}.csv", year));
    let mut w = csv::Writer::from_path(&path)?;
    w.write_record([label.to_string(), format!("{}_predicted", label)])?;
    for (observed, predicted) in &result.evaluation.observed_vs_predicted {
        w.write_record([observed.to_string(), predicted.to_string()])?;
    }
    w.flush()?;
    written.push(path);

    let path = dir.join(format!("feature_importance_{}.csv", year));
    let mut w = csv::Writer::from_path(&path)?;
    w.write_record(["band", "importance", "importance_percent"])?;
    for f in &result.evaluation.importance {
        w.write_record([f.band.clone(), f.raw.to_string(), f.percent.to_string()])?;
    }
    w.flush()?;
    written.push(path);

    debug!(year, files = written.len(), "period outputs written");
    Ok(written)
}

fn write_raster(raster: &Raster<f64>, path: &Path) -> Result<()> {
    write_geotiff(raster, path, None)?;
    Ok(())
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}
