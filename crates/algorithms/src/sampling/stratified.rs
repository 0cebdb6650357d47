//! Stratified sampling of training rows from a predictor stack
//!
//! Label observations are sparse and clustered, so pixels are split into two
//! validity classes (1 = label present, 0 = background) and a fixed number of
//! points is drawn uniformly from each class inside the region.

use agbmap_core::raster::{Raster, RasterLayer};
use agbmap_core::{Error, Region, Result};
use agbmap_parallel::ComputeBudget;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters for [`stratified_sample`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratifiedParams {
    /// Points drawn from class 0 (background) and class 1 (labelled)
    pub points_per_class: [usize; 2],
    /// RNG seed; equal seeds give identical samples
    pub seed: u64,
    /// Label assigned to background rows. `None` keeps them unlabelled.
    pub background_label: Option<f64>,
}

impl Default for StratifiedParams {
    fn default() -> Self {
        Self {
            points_per_class: [0, 1000],
            seed: 0,
            background_label: None,
        }
    }
}

/// One sampled pixel
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    /// Predictor values in [`SampleSet::predictors`] order
    pub features: Vec<f64>,
    /// Observed label; always `Some` for class 1
    pub label: Option<f64>,
    /// Validity class, 1 where the label was present
    pub class: u8,
    pub row: usize,
    pub col: usize,
}

/// Training rows of one period, bound to the predictor order they were read in
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleSet {
    pub predictors: Vec<String>,
    pub label: String,
    pub samples: Vec<TrainingSample>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Rows that carry a label, as (features, label)
    pub fn labeled(&self) -> impl Iterator<Item = (&[f64], f64)> + '_ {
        self.samples
            .iter()
            .filter_map(|s| s.label.map(|l| (s.features.as_slice(), l)))
    }

    pub fn labeled_count(&self) -> usize {
        self.samples.iter().filter(|s| s.label.is_some()).count()
    }

    /// Number of rows in class 0 and class 1
    pub fn class_counts(&self) -> [usize; 2] {
        let ones = self.samples.iter().filter(|s| s.class == 1).count();
        [self.samples.len() - ones, ones]
    }
}

/// Validity class band: 1 where `label_band` holds a finite value, else 0
pub fn validity_class(stack: &RasterLayer, label_band: &str) -> Result<Raster<u8>> {
    let label = stack.require_band(label_band)?;
    Ok(label.map(|v| u8::from(v.is_finite())))
}

/// Draw a class-balanced training set from `stack`.
///
/// Candidates are pixels whose centre lies inside `region` and whose
/// predictors are all finite. Up to `points_per_class[c]` candidates of
/// class `c` are drawn without replacement; a class with fewer candidates
/// contributes all of them. When no labelled candidate exists the result is
/// empty, background included.
///
/// # Arguments
/// * `stack` - Predictor bands plus the label band, on the analysis grid
/// * `predictors` - Feature bands, in model order
/// * `label_band` - Sparse label band, NaN where unobserved
/// * `region` - Sampling region, in the stack's CRS
/// * `params` - Point counts, seed and background label
/// * `budget` - Pixel ceiling and cancellation
pub fn stratified_sample<S: AsRef<str>>(
    stack: &RasterLayer,
    predictors: &[S],
    label_band: &str,
    region: &Region,
    params: &StratifiedParams,
    budget: &ComputeBudget,
) -> Result<SampleSet> {
    let predictor_names: Vec<String> = predictors.iter().map(|p| p.as_ref().to_string()).collect();
    if predictor_names.is_empty() {
        return Err(Error::InvalidParameter {
            name: "predictors",
            value: "[]".into(),
            reason: "at least one predictor band is required".into(),
        });
    }
    if predictor_names.iter().any(|p| p == label_band) {
        return Err(Error::InvalidParameter {
            name: "predictors",
            value: label_band.to_string(),
            reason: "the label band cannot be a predictor".into(),
        });
    }
    if let Some(crs) = stack.crs() {
        if !crs.is_equivalent(region.crs()) {
            return Err(Error::CrsMismatch(
                crs.identifier(),
                region.crs().identifier(),
            ));
        }
    }

    let label = stack.require_band(label_band)?;
    let bands: Vec<&Raster<f64>> = predictor_names
        .iter()
        .map(|name| stack.require_band(name))
        .collect::<Result<_>>()?;

    let (rows, cols) = label.shape();
    budget.check("stratified_sample", (rows as u64) * (cols as u64))?;

    let candidates: Vec<(usize, usize, u8)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = Vec::new();
            if budget.ensure_active().is_err() {
                return row_data;
            }
            for col in 0..cols {
                let complete = bands
                    .iter()
                    .all(|b| unsafe { b.get_unchecked(row, col) }.is_finite());
                if !complete {
                    continue;
                }
                let (x, y) = label.pixel_to_geo(col, row);
                if !region.contains(x, y) {
                    continue;
                }
                let class = u8::from(unsafe { label.get_unchecked(row, col) }.is_finite());
                row_data.push((row, col, class));
            }
            row_data
        })
        .collect();
    budget.ensure_active()?;

    let mut set = SampleSet {
        predictors: predictor_names,
        label: label_band.to_string(),
        samples: Vec::new(),
    };

    let by_class: [Vec<(usize, usize)>; 2] = [0u8, 1u8].map(|c| {
        candidates
            .iter()
            .filter(|(_, _, class)| *class == c)
            .map(|&(r, col, _)| (r, col))
            .collect()
    });
    debug!(
        background = by_class[0].len(),
        labeled = by_class[1].len(),
        "sampling candidates"
    );
    if by_class[1].is_empty() {
        return Ok(set);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    for class in [1u8, 0u8] {
        let pool = &by_class[class as usize];
        let wanted = params.points_per_class[class as usize].min(pool.len());
        if wanted == 0 {
            continue;
        }
        let mut picks = index::sample(&mut rng, pool.len(), wanted).into_vec();
        picks.sort_unstable();

        for i in picks {
            let (row, col) = pool[i];
            let features = bands
                .iter()
                .map(|b| unsafe { b.get_unchecked(row, col) })
                .collect();
            let label_value = if class == 1 {
                Some(unsafe { label.get_unchecked(row, col) })
            } else {
                params.background_label
            };
            set.samples.push(TrainingSample {
                features,
                label: label_value,
                class,
                row,
                col,
            });
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agbmap_core::{GeoTransform, CRS};

    /// 10x10 stack on a 100 m UTM grid; labels on the diagonal
    fn stack() -> RasterLayer {
        let crs = CRS::from_epsg(32749);
        let gt = GeoTransform::north_up(500_000.0, 9_000_000.0, 100.0);
        let mut ndvi = Raster::filled(10, 10, 0.5);
        let mut label = Raster::filled(10, 10, f64::NAN);
        for i in 0..10 {
            label.set(i, i, 100.0 + i as f64).unwrap();
            ndvi.set(i, i, 0.8).unwrap();
        }
        for r in [&mut ndvi, &mut label] {
            r.set_transform(gt);
            r.set_crs(Some(crs.clone()));
        }
        RasterLayer::from_band("ndvi", ndvi)
            .with_band("agbd", label)
            .unwrap()
    }

    fn region() -> Region {
        Region::from_bounds(
            CRS::from_epsg(32749),
            (500_000.0, 8_999_000.0, 501_000.0, 9_000_000.0),
        )
    }

    #[test]
    fn test_validity_class() {
        let class = validity_class(&stack(), "agbd").unwrap();
        assert_eq!(class.get(3, 3).unwrap(), 1);
        assert_eq!(class.get(3, 4).unwrap(), 0);
    }

    #[test]
    fn test_draws_per_class() {
        let params = StratifiedParams {
            points_per_class: [20, 5],
            seed: 7,
            background_label: None,
        };
        let set = stratified_sample(
            &stack(),
            &["ndvi"],
            "agbd",
            &region(),
            &params,
            &ComputeBudget::default(),
        )
        .unwrap();
        assert_eq!(set.class_counts(), [20, 5]);
        assert_eq!(set.labeled_count(), 5);
        for (features, label) in set.labeled() {
            assert_eq!(features, &[0.8]);
            assert!((100.0..110.0).contains(&label));
        }
    }

    #[test]
    fn test_class_smaller_than_request_is_taken_whole() {
        let set = stratified_sample(
            &stack(),
            &["ndvi"],
            "agbd",
            &region(),
            &StratifiedParams::default(),
            &ComputeBudget::default(),
        )
        .unwrap();
        assert_eq!(set.class_counts(), [0, 10]);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let params = StratifiedParams {
            points_per_class: [10, 3],
            seed: 42,
            background_label: Some(0.0),
        };
        let run = || {
            stratified_sample(&stack(), &["ndvi"], "agbd", &region(), &params, &ComputeBudget::default())
                .unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a, b);
        assert_eq!(a.labeled_count(), 13);
    }

    #[test]
    fn test_region_restricts_candidates() {
        // top-left 300 m x 300 m: diagonal pixels 0..3
        let small = Region::from_bounds(
            CRS::from_epsg(32749),
            (500_000.0, 8_999_700.0, 500_300.0, 9_000_000.0),
        );
        let set = stratified_sample(
            &stack(),
            &["ndvi"],
            "agbd",
            &small,
            &StratifiedParams::default(),
            &ComputeBudget::default(),
        )
        .unwrap();
        assert_eq!(set.labeled_count(), 3);
        assert!(set.samples.iter().all(|s| s.row < 3 && s.col < 3));
    }

    #[test]
    fn test_no_labels_gives_empty_set() {
        let mut layer = stack();
        let blank = layer.template().unwrap().like(f64::NAN);
        layer = layer.select(&["ndvi"]).unwrap().with_band("agbd", blank).unwrap();
        let params = StratifiedParams {
            points_per_class: [50, 50],
            ..Default::default()
        };
        let set = stratified_sample(&layer, &["ndvi"], "agbd", &region(), &params, &ComputeBudget::default())
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_budget_and_crs_checks() {
        let err = stratified_sample(
            &stack(),
            &["ndvi"],
            "agbd",
            &region(),
            &StratifiedParams::default(),
            &ComputeBudget::with_max_pixels(99),
        )
        .unwrap_err();
        assert!(err.is_budget());

        let wrong = Region::from_bounds(CRS::wgs84(), (0.0, 0.0, 1.0, 1.0));
        let err = stratified_sample(
            &stack(),
            &["ndvi"],
            "agbd",
            &wrong,
            &StratifiedParams::default(),
            &ComputeBudget::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CrsMismatch(_, _)));
    }
}
