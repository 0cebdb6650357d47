//! Run orchestration across periods

use crate::config::RunConfig;
use crate::error::{PipelineError, Result};
use crate::period::{process_period, PeriodContext, PeriodOutcome, PeriodResult, SkipReason};
use crate::source::{Lookup, RasterSource};
use agbmap_algorithms::grid::{align, pixel_area, vegetation_mask, Reducer, Resample};
use agbmap_algorithms::statistics::{
    estimate_trend, year_over_year, AnnualTotal, TrendResult, YearOverYear,
};
use agbmap_algorithms::terrain::terrain_layer;
use agbmap_core::{AnalysisGrid, Raster};
use agbmap_parallel::{CancelFlag, ParallelStrategy, ProcessingMode};
use tracing::{info, warn};

/// Everything a run produced, in period order
#[derive(Debug, Clone)]
pub struct RunReport {
    pub config: RunConfig,
    pub grid: AnalysisGrid,
    pub outcomes: Vec<PeriodOutcome>,
    /// Change between consecutive completed years
    pub changes: Vec<YearOverYear>,
    /// `None` when fewer than two periods completed
    pub trend: Option<TrendResult>,
}

impl RunReport {
    pub fn completed(&self) -> impl Iterator<Item = &PeriodResult> {
        self.outcomes.iter().filter_map(|o| o.completed())
    }

    pub fn skipped(&self) -> impl Iterator<Item = (i32, &SkipReason)> {
        self.outcomes.iter().filter_map(|o| match o {
            PeriodOutcome::Skipped { year, reason } => Some((*year, reason)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (i32, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            PeriodOutcome::Failed { year, reason } => Some((*year, reason.as_str())),
            _ => None,
        })
    }

    pub fn annual_totals(&self) -> Vec<AnnualTotal> {
        self.completed()
            .map(|r| AnnualTotal {
                year: r.year,
                total_agb: r.aggregate.total_agb,
            })
            .collect()
    }
}

/// Run every period of `config` against `source`
pub fn run(config: &RunConfig, source: &dyn RasterSource) -> Result<RunReport> {
    run_with_cancel(config, source, CancelFlag::new())
}

/// [`run`] with a cancellation flag the caller can trip from another thread.
///
/// Periods already finished when the flag is set keep their results; the
/// rest are reported as failed.
pub fn run_with_cancel(
    config: &RunConfig,
    source: &dyn RasterSource,
    cancel: CancelFlag,
) -> Result<RunReport> {
    config.validate()?;
    let grid = config.analysis_grid()?;
    let region = config.region()?;
    let budget = config.resources.budget(cancel);
    let (rows, cols) = grid.shape();
    info!(
        crs = %grid.crs(),
        rows,
        cols,
        years = ?config.years(),
        "starting run"
    );

    // Time-invariant inputs
    let dem = required(source.elevation(&grid)?, "elevation")?;
    let terrain = align(&terrain_layer(&dem)?, &grid, Resample::Bilinear, Reducer::Mean)?;
    let land_cover = required(source.land_cover(&grid)?, "land cover")?;
    let vegetation = vegetation_mask(&land_cover, &grid, &config.landcover.vegetation_classes)?;
    let area = pixel_area(&grid)?;

    let ctx = PeriodContext {
        config,
        grid: &grid,
        region: &region,
        terrain: &terrain,
        vegetation: &vegetation,
        pixel_area: &area,
        budget: &budget,
    };

    let years: Vec<i32> = config.years().collect();
    let period_mode = if config.resources.parallel_periods {
        budget.mode
    } else {
        ProcessingMode::Sequential
    };
    let outcomes = period_mode
        .par_map(0..years.len(), |i| process_period(years[i], source, &ctx))
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    let report_years = |pred: fn(&PeriodOutcome) -> bool| -> Vec<i32> {
        outcomes.iter().filter(|o| pred(o)).map(|o| o.year()).collect()
    };
    info!(
        completed = ?report_years(|o| matches!(o, PeriodOutcome::Completed(_))),
        skipped = ?report_years(|o| matches!(o, PeriodOutcome::Skipped { .. })),
        failed = ?report_years(|o| matches!(o, PeriodOutcome::Failed { .. })),
        "periods done"
    );

    let mut report = RunReport {
        config: config.clone(),
        grid,
        outcomes,
        changes: Vec::new(),
        trend: None,
    };
    report.changes = year_over_year(&report.annual_totals());

    let masked: Vec<(i32, &Raster<f64>)> = report.completed().map(|r| (r.year, &r.masked)).collect();
    let trend = estimate_trend(&masked, (config.analysis.start_year, config.analysis.end_year))?;
    match &trend {
        Some(t) => info!(
            first_year = t.summary.first_year,
            last_year = t.summary.last_year,
            period_count = t.summary.period_count,
            "trend estimated"
        ),
        None => warn!(completed = masked.len(), "fewer than two completed periods, no trend"),
    }
    report.trend = trend;
    Ok(report)
}

fn required<T>(lookup: Lookup<T>, what: &str) -> Result<T> {
    lookup
        .found()
        .ok_or_else(|| PipelineError::MissingInput(format!("no {} raster covers the grid", what)))
}
