//! Full runs over synthetic 10x10 inputs on a 100 m UTM 49S grid

use agbmap_core::{GeoTransform, Raster, RasterLayer, CRS};
use agbmap_parallel::CancelFlag;
use agbmap_pipeline::{
    run, run_with_cancel, write_outputs, MemorySource, PeriodOutcome, PipelineError, RunConfig,
    SkipReason,
};
use approx::assert_relative_eq;
use chrono::NaiveDate;

const SIZE: usize = 10;

fn config() -> RunConfig {
    let mut config = RunConfig::default()
        .with_years(2021, 2023)
        .with_grid("EPSG:32749", 100.0)
        .with_region([500_000.0, 8_999_000.0, 501_000.0, 9_000_000.0]);
    config.model.trees = 20;
    config
}

fn band(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let mut r = Raster::filled(SIZE, SIZE, f64::NAN);
    r.set_transform(GeoTransform::north_up(500_000.0, 9_000_000.0, 100.0));
    r.set_crs(Some(CRS::from_epsg(32749)));
    for row in 0..SIZE {
        for col in 0..SIZE {
            r.set(row, col, f(row, col)).unwrap();
        }
    }
    r
}

fn date(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 7, 1).unwrap()
}

fn optical(year: i32) -> RasterLayer {
    let shift = (year - 2021) as f64 * 100.0;
    let dn = |base: f64| band(move |r, c| base + shift + 30.0 * r as f64 + 10.0 * c as f64);
    RasterLayer::from_band("B2", dn(400.0))
        .with_band("B3", dn(600.0))
        .unwrap()
        .with_band("B4", dn(500.0))
        .unwrap()
        .with_band("B8", dn(3000.0))
        .unwrap()
        .with_band("B11", dn(1500.0))
        .unwrap()
        .with_band("cs", band(|_, _| 0.95))
        .unwrap()
        .with_acquired(date(year))
}

fn biomass(year: i32, base: f64) -> RasterLayer {
    RasterLayer::from_band(
        "agbd",
        band(move |r, c| if (r + c) % 2 == 0 { base + 5.0 * r as f64 } else { f64::NAN }),
    )
    .with_acquired(date(year))
}

/// Labels in 2021 and 2023 only; vegetation on the western half
fn source() -> MemorySource {
    MemorySource::new()
        .with_optical(optical(2021))
        .with_optical(optical(2022))
        .with_optical(optical(2023))
        .with_biomass(biomass(2021, 50.0))
        .with_biomass(biomass(2023, 80.0))
        .with_elevation(band(|r, c| 200.0 + 2.0 * r as f64 + c as f64))
        .with_land_cover(band(|_, c| if c < SIZE / 2 { 10.0 } else { 60.0 }))
}

#[test]
fn skips_unlabelled_year_and_trends_over_span() {
    let report = run(&config(), &source()).unwrap();

    assert_eq!(report.outcomes.len(), 3);
    let years: Vec<i32> = report.completed().map(|r| r.year).collect();
    assert_eq!(years, vec![2021, 2023]);
    let skipped: Vec<(i32, &SkipReason)> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, 2022);
    assert!(matches!(skipped[0].1, SkipReason::MissingPeriodData { .. }));
    assert_eq!(report.failed().count(), 0);

    // 2021 and 2023 are not consecutive
    assert!(report.changes.is_empty());

    let first = &report.completed().next().unwrap().masked;
    let last = &report.completed().nth(1).unwrap().masked;
    let trend = report.trend.as_ref().expect("two completed periods");
    assert_eq!(trend.summary.first_year, 2021);
    assert_eq!(trend.summary.last_year, 2023);
    assert_eq!(trend.summary.period_count, 3);

    for r in 0..SIZE {
        for c in 0..SIZE {
            let t = trend.raster.get(r, c).unwrap();
            if c < SIZE / 2 {
                let expected = (last.get(r, c).unwrap() - first.get(r, c).unwrap()) / 3.0;
                assert_relative_eq!(t, expected, epsilon = 1e-9);
            } else {
                assert!(t.is_nan(), "non-vegetated pixel ({}, {}) has a trend", r, c);
            }
        }
    }

    for result in report.completed() {
        assert!(result.evaluation.rmse >= 0.0);
        let pct: f64 = result.evaluation.importance.iter().map(|f| f.percent).sum();
        assert_relative_eq!(pct, 100.0, epsilon = 1e-6);
        assert_eq!(result.statistics.valid_pixels, SIZE * SIZE / 2);
        assert!(result.aggregate.valid_area_ha > 0.0);
        assert!(report.grid.conforms(&result.masked));
    }
}

#[test]
fn writes_all_outputs() {
    let report = run(&config(), &source()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let written = write_outputs(&report, dir.path()).unwrap();

    for name in [
        "predicted_agb_2021.tif",
        "agb_2021.tif",
        "observed_vs_predicted_2021.csv",
        "feature_importance_2023.csv",
        "rmse_per_year.csv",
        "agb_per_year.csv",
        "agb_diff_per_year.csv",
        "agb_trend.tif",
        "trend_summary.json",
        "run_summary.json",
    ] {
        let path = dir.path().join(name);
        assert!(path.exists(), "{} missing", name);
        assert!(written.contains(&path));
    }
    assert!(!dir.path().join("agb_2022.tif").exists());

    let pairs = std::fs::read_to_string(dir.path().join("observed_vs_predicted_2021.csv")).unwrap();
    assert_eq!(pairs.lines().next(), Some("agbd,agbd_predicted"));
    assert_eq!(pairs.lines().count(), 1 + SIZE * SIZE / 2);

    let totals = std::fs::read_to_string(dir.path().join("agb_per_year.csv")).unwrap();
    assert_eq!(totals.lines().count(), 3);

    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("run_summary.json")).unwrap(),
    )
    .unwrap();
    let periods = summary["periods"].as_array().unwrap();
    assert_eq!(periods.len(), 3);
    assert_eq!(periods[1]["status"], "skipped");
    assert_eq!(periods[1]["reason"]["kind"], "missing_period_data");
    assert_eq!(summary["trend"]["period_count"], 3);
}

#[test]
fn missing_elevation_is_an_error() {
    let source = MemorySource::new()
        .with_optical(optical(2021))
        .with_land_cover(band(|_, _| 10.0));
    let err = run(&config(), &source).unwrap_err();
    assert!(matches!(err, PipelineError::MissingInput(_)));
}

#[test]
fn cancelled_run_fails_every_period() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = run_with_cancel(&config(), &source(), cancel).unwrap();
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, PeriodOutcome::Failed { .. })));
    assert!(report.trend.is_none());
}

#[test]
fn config_without_region_is_rejected() {
    let mut config = config();
    config.analysis.region = None;
    assert!(matches!(run(&config, &source()), Err(PipelineError::Config(_))));
}
