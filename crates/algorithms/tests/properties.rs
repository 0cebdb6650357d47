//! Cross-module properties of the estimation stages.
//!
//! Synthetic rasters on a 100 m UTM zone 49S grid stand in for real inputs.

use agbmap_algorithms::grid::{align_raster, Reducer, Resample};
use agbmap_algorithms::regression::{evaluate, train, ForestParams};
use agbmap_algorithms::sampling::{stratified_sample, StratifiedParams};
use agbmap_algorithms::statistics::{
    aggregate, estimate_trend, percent_change, year_over_year, AnnualTotal, Ratio,
};
use agbmap_core::{AnalysisGrid, GeoTransform, Raster, RasterLayer, Region, CRS};
use agbmap_parallel::ComputeBudget;
use approx::assert_relative_eq;
use proptest::prelude::*;

const ORIGIN_X: f64 = 500_000.0;
const ORIGIN_Y: f64 = 9_000_000.0;

fn utm() -> CRS {
    CRS::from_epsg(32749)
}

fn grid(size: usize) -> AnalysisGrid {
    AnalysisGrid::new(utm(), GeoTransform::north_up(ORIGIN_X, ORIGIN_Y, 100.0), size, size).unwrap()
}

fn whole(grid: &AnalysisGrid) -> Region {
    Region::from_bounds(utm(), grid.bounds())
}

/// ndvi/slope predictors and a label on every third pixel
fn training_stack(grid: &AnalysisGrid) -> RasterLayer {
    let (rows, cols) = grid.shape();
    let mut ndvi = grid.empty_raster(f64::NAN);
    let mut slope = grid.empty_raster(f64::NAN);
    let mut agbd = grid.empty_raster(f64::NAN);
    for r in 0..rows {
        for c in 0..cols {
            let v = (r * cols + c) as f64 / (rows * cols) as f64;
            ndvi.set(r, c, v).unwrap();
            slope.set(r, c, ((r * 3 + c) % 11) as f64).unwrap();
            if (r + c) % 3 == 0 {
                agbd.set(r, c, 50.0 + 100.0 * v).unwrap();
            }
        }
    }
    RasterLayer::from_band("ndvi", ndvi)
        .with_band("slope", slope)
        .unwrap()
        .with_band("agbd", agbd)
        .unwrap()
}

#[test]
fn rmse_non_negative_and_importance_sums_to_100() {
    let grid = grid(20);
    let budget = ComputeBudget::default();
    let samples = stratified_sample(
        &training_stack(&grid),
        &["ndvi", "slope"],
        "agbd",
        &whole(&grid),
        &StratifiedParams {
            points_per_class: [0, 80],
            seed: 3,
            background_label: None,
        },
        &budget,
    )
    .unwrap();
    assert_eq!(samples.labeled_count(), 80);

    let model = train(&samples, &ForestParams::default(), &budget).unwrap();
    let eval = evaluate(&model, &samples).unwrap();

    assert!(eval.rmse >= 0.0);
    let raw: f64 = eval.importance.iter().map(|f| f.raw).sum();
    assert!(raw > 0.0);
    let total: f64 = eval.importance.iter().map(|f| f.percent).sum();
    assert_relative_eq!(total, 100.0, epsilon = 1e-6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn aligned_output_matches_grid_geometry(
        rows in 1usize..40,
        cols in 1usize..40,
        scale in 5.0f64..400.0,
        dx in -2_000.0f64..2_000.0,
        dy in -2_000.0f64..2_000.0,
        geographic in any::<bool>(),
        mode in any::<bool>(),
    ) {
        let target = grid(10);
        let mut source = Raster::filled(rows, cols, 42.0);
        if geographic {
            // ~111.0 E, 9.04 S is the grid origin in WGS84
            let deg = scale / 111_320.0;
            source.set_transform(GeoTransform::north_up(111.0 + dx / 111_320.0, -9.04 + dy / 111_320.0, deg));
            source.set_crs(Some(CRS::wgs84()));
        } else {
            source.set_transform(GeoTransform::north_up(ORIGIN_X + dx, ORIGIN_Y + dy, scale));
            source.set_crs(Some(utm()));
        }

        let reducer = if mode { Reducer::Mode } else { Reducer::Mean };
        let out = align_raster(&source, &target, Resample::Bilinear, reducer).unwrap();

        prop_assert_eq!(out.shape(), target.shape());
        prop_assert!(target.conforms(&out));
        for v in out.data().iter() {
            prop_assert!(v.is_nan() || (*v - 42.0).abs() < 1e-9);
        }
    }
}

#[test]
fn aggregate_is_idempotent() {
    let grid = grid(16);
    let predicted = training_stack(&grid).band("ndvi").unwrap().map(|v| 100.0 * v);
    let mut mask = grid.empty_raster(0u8);
    for r in 0..16 {
        for c in (r % 2..16).step_by(2) {
            mask.set(r, c, 1).unwrap();
        }
    }
    let area = grid.empty_raster(10_000.0);
    let budget = ComputeBudget::default();

    let first = aggregate(&predicted, &mask, &area, &whole(&grid), &budget).unwrap();
    let second = aggregate(&predicted, &mask, &area, &whole(&grid), &budget).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.pixel_count, 128);
}

#[test]
fn zero_previous_total_is_undefined() {
    assert_eq!(percent_change(0.0, 12.0), Ratio::Undefined);
    let yoy = year_over_year(&[
        AnnualTotal { year: 2021, total_agb: 0.0 },
        AnnualTotal { year: 2022, total_agb: 12.0 },
    ]);
    assert_eq!(yoy.len(), 1);
    assert_eq!(yoy[0].change_percent, Ratio::Undefined);
    assert_relative_eq!(yoy[0].change, 12.0);
}

#[test]
fn trend_is_endpoint_difference_over_period_count() {
    let grid = grid(10);
    let first = training_stack(&grid).band("ndvi").unwrap().map(|v| 80.0 + v);
    let mut last = first.map(|v| v * 1.5);
    last.set(2, 2, f64::NAN).unwrap();

    let trend = estimate_trend(&[(2021, &first), (2023, &last)], (2021, 2023))
        .unwrap()
        .unwrap();
    for r in 0..10 {
        for c in 0..10 {
            let t = trend.raster.get(r, c).unwrap();
            if (r, c) == (2, 2) {
                assert!(t.is_nan());
            } else {
                let expected = (last.get(r, c).unwrap() - first.get(r, c).unwrap()) / 3.0;
                assert_relative_eq!(t, expected, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn half_vegetated_uniform_density() {
    // 10x10 pixels of 10 m x 10 m = 100 m²
    let grid =
        AnalysisGrid::new(utm(), GeoTransform::north_up(ORIGIN_X, ORIGIN_Y, 10.0), 10, 10).unwrap();
    let predicted = grid.empty_raster(10.0);
    let mut mask = grid.empty_raster(0u8);
    for r in 0..5 {
        for c in 0..10 {
            mask.set(r, c, 1).unwrap();
        }
    }
    let area = grid.empty_raster(100.0);

    let result = aggregate(&predicted, &mask, &area, &whole(&grid), &ComputeBudget::default()).unwrap();
    assert_relative_eq!(result.total_agb, 10.0 * (100.0 * 50.0 / 10_000.0), epsilon = 1e-12);
    assert_relative_eq!(result.valid_area_ha, 0.5, epsilon = 1e-12);
}
