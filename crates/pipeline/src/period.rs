//! One analysis period: composite, sample, train, predict, aggregate
//!
//! Periods are independent of each other. Each reads its own optical and
//! biomass acquisitions, shares the terrain layer, vegetation mask and
//! pixel areas computed once per run, and ends in a [`PeriodOutcome`].

use crate::config::RunConfig;
use crate::error::{PipelineError, Result};
use crate::source::{Lookup, Query, RasterSource};
use agbmap_algorithms::grid::{align, Reducer, Resample};
use agbmap_algorithms::imagery::{
    add_spectral_indices, biomass_quality_mask, median, mosaic, prepare_optical, slope_mask,
};
use agbmap_algorithms::regression::{evaluate, train, Evaluation};
use agbmap_algorithms::sampling::stratified_sample;
use agbmap_algorithms::statistics::{aggregate, apply_mask, AggregateResult};
use agbmap_core::{AnalysisGrid, Error, Raster, RasterLayer, Region};
use agbmap_parallel::ComputeBudget;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Run-wide inputs shared by every period
#[derive(Debug, Clone, Copy)]
pub struct PeriodContext<'a> {
    pub config: &'a RunConfig,
    pub grid: &'a AnalysisGrid,
    pub region: &'a Region,
    /// `dem` and `slope` bands on the grid
    pub terrain: &'a RasterLayer,
    pub vegetation: &'a Raster<u8>,
    /// Square metres per pixel
    pub pixel_area: &'a Raster<f64>,
    pub budget: &'a ComputeBudget,
}

/// Summary statistics of a masked density raster
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DensityStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub sum: f64,
    pub valid_pixels: usize,
}

impl DensityStatistics {
    pub fn of(raster: &Raster<f64>) -> Self {
        let stats = raster.statistics();
        Self {
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
            sum: stats.sum,
            valid_pixels: stats.valid_count,
        }
    }
}

/// Everything a completed period produced
#[derive(Debug, Clone)]
pub struct PeriodResult {
    pub year: i32,
    /// Full-coverage prediction, one band named after the model output
    pub predicted: RasterLayer,
    /// Prediction restricted to the vegetation mask
    pub masked: Raster<f64>,
    pub evaluation: Evaluation,
    pub aggregate: AggregateResult,
    pub statistics: DensityStatistics,
    pub training_rows: usize,
    pub predictors: Vec<String>,
}

/// Why a period produced no result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A dataset had nothing for the period, or no observation survived screening
    MissingPeriodData { detail: String },
    /// Too few labelled rows to train on
    DegenerateTrainingSet { rows: usize, min: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPeriodData { detail } => write!(f, "missing period data: {}", detail),
            SkipReason::DegenerateTrainingSet { rows, min } => write!(
                f,
                "degenerate training set: {} labelled rows, at least {} required",
                rows, min
            ),
        }
    }
}

/// Result of processing one period
#[derive(Debug, Clone)]
pub enum PeriodOutcome {
    Completed(Box<PeriodResult>),
    Skipped { year: i32, reason: SkipReason },
    /// The period hit the resource budget or was cancelled
    Failed { year: i32, reason: String },
}

impl PeriodOutcome {
    pub fn year(&self) -> i32 {
        match self {
            PeriodOutcome::Completed(r) => r.year,
            PeriodOutcome::Skipped { year, .. } | PeriodOutcome::Failed { year, .. } => *year,
        }
    }

    pub fn completed(&self) -> Option<&PeriodResult> {
        match self {
            PeriodOutcome::Completed(r) => Some(r.as_ref()),
            _ => None,
        }
    }
}

fn missing(year: i32, detail: impl Into<String>) -> PeriodOutcome {
    let reason = SkipReason::MissingPeriodData {
        detail: detail.into(),
    };
    warn!(year, %reason, "period skipped");
    PeriodOutcome::Skipped { year, reason }
}

fn degenerate(year: i32, rows: usize, min: usize) -> PeriodOutcome {
    let reason = SkipReason::DegenerateTrainingSet { rows, min };
    warn!(year, %reason, "period skipped");
    PeriodOutcome::Skipped { year, reason }
}

/// Process one period end to end.
///
/// Absent data and untrainable sample sets become
/// [`PeriodOutcome::Skipped`]; budget and cancellation errors become
/// [`PeriodOutcome::Failed`]. Any other error, such as a source read
/// failure, is returned unchanged.
pub fn process_period(
    year: i32,
    source: &dyn RasterSource,
    ctx: &PeriodContext<'_>,
) -> Result<PeriodOutcome> {
    info!(year, "processing period");
    match run_period(year, source, ctx) {
        Err(e) if e.is_budget() => {
            warn!(year, error = %e, "period failed");
            Ok(PeriodOutcome::Failed {
                year,
                reason: e.to_string(),
            })
        }
        other => other,
    }
}

fn run_period(year: i32, source: &dyn RasterSource, ctx: &PeriodContext<'_>) -> Result<PeriodOutcome> {
    ctx.budget.ensure_active()?;
    let config = ctx.config;
    let label_band = config.model.label_band.as_str();
    let query = Query::for_year(year, ctx.grid)?;

    // Optical composite
    let optical = match source.optical(&query)? {
        Lookup::Found(c) => c,
        Lookup::NotFound => return Ok(missing(year, "no optical imagery")),
    };
    let optical_params = config.quality.optical_params();
    let prepared = optical.try_map(|layer| {
        let reflectance = prepare_optical(layer, &optical_params)?;
        let with_indices = add_spectral_indices(&reflectance, &config.quality.spectral_bands)?;
        align(&with_indices, ctx.grid, Resample::Bilinear, Reducer::Mean)
    })?;
    let Some(composite) = median(&prepared)? else {
        return Ok(missing(year, "no optical imagery"));
    };
    debug!(year, images = prepared.len(), bands = composite.len(), "optical composite");

    // Biomass labels
    let biomass = match source.biomass(&query)? {
        Lookup::Found(c) => c,
        Lookup::NotFound => return Ok(missing(year, "no biomass observations")),
    };
    let quality = config.quality.biomass_quality(label_band);
    let screened = biomass.try_map(|layer| {
        let kept = biomass_quality_mask(layer, &quality)?;
        align(&kept, ctx.grid, Resample::Bilinear, Reducer::Mean)
    })?;
    let Some(labels) = mosaic(&screened)? else {
        return Ok(missing(year, "no biomass observations"));
    };
    let slope = ctx.terrain.require_band("slope")?;
    let labels = slope_mask(&labels, slope, config.quality.max_slope_deg)?;
    let observed = labels.require_band(label_band)?.statistics().valid_count;
    if observed == 0 {
        return Ok(missing(year, "no biomass observation passed screening"));
    }
    debug!(year, observed, "biomass labels");

    // Training set
    let predictors: Vec<String> = composite
        .band_names()
        .into_iter()
        .chain(ctx.terrain.band_names())
        .collect();
    let stack = composite.add_bands(ctx.terrain)?.add_bands(&labels)?;
    let samples = stratified_sample(
        &stack,
        &predictors,
        label_band,
        ctx.region,
        &config.sampling,
        ctx.budget,
    )?;
    let forest = config.model.forest_params();
    let min_rows = forest.min_training_rows.max(1);
    if samples.labeled_count() == 0 {
        return Ok(degenerate(year, 0, min_rows));
    }

    // Model
    let model = match train(&samples, &forest, ctx.budget) {
        Ok(m) => m,
        Err(Error::InsufficientTrainingData { rows, min }) => return Ok(degenerate(year, rows, min)),
        Err(e) => return Err(PipelineError::from(e)),
    };
    let evaluation = evaluate(&model, &samples)?;
    info!(year, rows = samples.labeled_count(), rmse = evaluation.rmse, "model trained");

    // Prediction and aggregation
    let predicted = model.predict_layer(&stack, ctx.budget)?;
    let density = predicted.require_band(model.output_name())?;
    let masked = apply_mask(density, ctx.vegetation)?;
    let totals = aggregate(density, ctx.vegetation, ctx.pixel_area, ctx.region, ctx.budget)?;
    info!(
        year,
        total_agb = totals.total_agb,
        valid_area_ha = totals.valid_area_ha,
        "period aggregated"
    );

    Ok(PeriodOutcome::Completed(Box::new(PeriodResult {
        year,
        statistics: DensityStatistics::of(&masked),
        predicted,
        masked,
        evaluation,
        aggregate: totals,
        training_rows: samples.labeled_count(),
        predictors,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use agbmap_algorithms::grid::pixel_area;
    use agbmap_algorithms::terrain::terrain_layer;
    use agbmap_core::{GeoTransform, CRS};
    use chrono::NaiveDate;

    const SIZE: usize = 8;

    fn grid() -> AnalysisGrid {
        AnalysisGrid::new(
            CRS::from_epsg(32749),
            GeoTransform::north_up(500_000.0, 9_000_000.0, 100.0),
            SIZE,
            SIZE,
        )
        .unwrap()
    }

    fn band(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut r = grid().empty_raster(f64::NAN);
        for row in 0..SIZE {
            for col in 0..SIZE {
                r.set(row, col, f(row, col)).unwrap();
            }
        }
        r
    }

    fn date(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 6, 1).unwrap()
    }

    fn optical(year: i32) -> RasterLayer {
        let dn = |base: f64| band(move |r, c| base + 40.0 * (r + c) as f64);
        RasterLayer::from_band("B2", dn(400.0))
            .with_band("B3", dn(600.0))
            .unwrap()
            .with_band("B4", dn(500.0))
            .unwrap()
            .with_band("B8", dn(3000.0))
            .unwrap()
            .with_band("B11", dn(1500.0))
            .unwrap()
            .with_band("cs", band(|_, _| 0.9))
            .unwrap()
            .with_acquired(date(year))
    }

    fn biomass(year: i32) -> RasterLayer {
        RasterLayer::from_band(
            "agbd",
            band(|r, c| if (r + c) % 2 == 0 { 50.0 + 10.0 * r as f64 } else { f64::NAN }),
        )
        .with_acquired(date(year))
    }

    struct Fixture {
        config: RunConfig,
        grid: AnalysisGrid,
        region: Region,
        terrain: RasterLayer,
        vegetation: Raster<u8>,
        area: Raster<f64>,
        budget: ComputeBudget,
    }

    impl Fixture {
        fn new(budget: ComputeBudget) -> Self {
            let grid = grid();
            let mut config = RunConfig::default().with_region({
                let (a, b, c, d) = grid.bounds();
                [a, b, c, d]
            });
            config.model.trees = 10;
            Self {
                region: config.region().unwrap(),
                terrain: terrain_layer(&band(|r, _| 100.0 + r as f64)).unwrap(),
                vegetation: grid.empty_raster(1u8),
                area: pixel_area(&grid).unwrap(),
                config,
                grid,
                budget,
            }
        }

        fn ctx(&self) -> PeriodContext<'_> {
            PeriodContext {
                config: &self.config,
                grid: &self.grid,
                region: &self.region,
                terrain: &self.terrain,
                vegetation: &self.vegetation,
                pixel_area: &self.area,
                budget: &self.budget,
            }
        }
    }

    #[test]
    fn test_completed_period() {
        let fx = Fixture::new(ComputeBudget::default());
        let source = MemorySource::new()
            .with_optical(optical(2021))
            .with_biomass(biomass(2021));

        let outcome = process_period(2021, &source, &fx.ctx()).unwrap();
        let result = outcome.completed().expect("period should complete");
        assert_eq!(result.training_rows, 32);
        assert!(result.predictors.contains(&"ndvi".to_string()));
        assert!(result.predictors.contains(&"slope".to_string()));
        assert!(!result.predictors.contains(&"cs".to_string()));
        assert!(result.evaluation.rmse >= 0.0);
        assert!(fx.grid.conforms(result.predicted.band("agbd").unwrap()));
        assert!(result.aggregate.total_agb > 0.0);
        assert_eq!(result.statistics.valid_pixels, SIZE * SIZE);
    }

    #[test]
    fn test_missing_labels_skip() {
        let fx = Fixture::new(ComputeBudget::default());
        let source = MemorySource::new().with_optical(optical(2022));
        let outcome = process_period(2022, &source, &fx.ctx()).unwrap();
        assert!(matches!(
            outcome,
            PeriodOutcome::Skipped {
                year: 2022,
                reason: SkipReason::MissingPeriodData { .. }
            }
        ));
    }

    #[test]
    fn test_screened_out_labels_skip() {
        let fx = Fixture::new(ComputeBudget::default());
        let heavy = RasterLayer::from_band("agbd", band(|_, _| 900.0)).with_acquired(date(2021));
        let source = MemorySource::new().with_optical(optical(2021)).with_biomass(heavy);
        let outcome = process_period(2021, &source, &fx.ctx()).unwrap();
        assert!(matches!(outcome, PeriodOutcome::Skipped { .. }));
    }

    #[test]
    fn test_too_few_rows_is_degenerate() {
        let fx = Fixture::new(ComputeBudget::default());
        let sparse = RasterLayer::from_band("agbd", band(|r, c| if r == 0 && c < 2 { 80.0 } else { f64::NAN }))
            .with_acquired(date(2021));
        let source = MemorySource::new().with_optical(optical(2021)).with_biomass(sparse);
        let outcome = process_period(2021, &source, &fx.ctx()).unwrap();
        match outcome {
            PeriodOutcome::Skipped {
                reason: SkipReason::DegenerateTrainingSet { rows, min },
                ..
            } => {
                assert_eq!(rows, 2);
                assert_eq!(min, 5);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_budget_marks_period_failed() {
        let fx = Fixture::new(ComputeBudget::with_max_pixels(10));
        let source = MemorySource::new()
            .with_optical(optical(2021))
            .with_biomass(biomass(2021));
        let outcome = process_period(2021, &source, &fx.ctx()).unwrap();
        assert!(matches!(outcome, PeriodOutcome::Failed { year: 2021, .. }));
    }

    #[test]
    fn test_skip_reason_display() {
        let r = SkipReason::DegenerateTrainingSet { rows: 2, min: 5 };
        assert_eq!(
            r.to_string(),
            "degenerate training set: 2 labelled rows, at least 5 required"
        );
    }
}
