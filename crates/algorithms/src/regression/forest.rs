//! Random forest regression
//!
//! An ensemble of CART trees, each grown on a bootstrap draw of the
//! labelled rows with a random feature subset per split. Predictions are
//! the mean over trees. Trees are grown in parallel with independent,
//! per-tree seeded RNGs, so a fixed seed gives the same forest at any
//! thread count.

use super::tree::{RegressionTree, TreeParams};
use crate::sampling::SampleSet;
use crate::util::build_output;
use agbmap_core::raster::{Raster, RasterLayer};
use agbmap_core::{Error, Result};
use agbmap_parallel::{ComputeBudget, ParallelStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random forest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees (default 50)
    pub n_trees: usize,
    /// Features tried per split; `None` uses floor(sqrt(p))
    pub max_features: Option<usize>,
    /// Minimum rows per leaf (default 1)
    pub min_leaf: usize,
    /// Bootstrap size as a fraction of the labelled rows (default 0.5)
    pub bag_fraction: f64,
    /// Maximum tree depth, unlimited by default
    pub max_depth: Option<usize>,
    pub seed: u64,
    /// Fewer labelled rows than this fail with `InsufficientTrainingData`
    pub min_training_rows: usize,
    /// Name of the predicted band
    pub output_name: String,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_features: None,
            min_leaf: 1,
            bag_fraction: 0.5,
            max_depth: None,
            seed: 0,
            min_training_rows: 5,
            output_name: "agbd".into(),
        }
    }
}

/// A trained forest bound to its predictor band order
#[derive(Debug, Clone)]
pub struct TrainedModel {
    predictors: Vec<String>,
    output_name: String,
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
}

/// Train a forest on the labelled rows of `samples`.
///
/// # Arguments
/// * `samples` - Sampled rows; rows without a label are ignored
/// * `params` - Forest parameters
/// * `budget` - Row ceiling, thread usage and cancellation
///
/// # Returns
/// The trained model, or `InsufficientTrainingData` when fewer than
/// `params.min_training_rows` (and at least one) labelled rows exist
pub fn train(samples: &SampleSet, params: &ForestParams, budget: &ComputeBudget) -> Result<TrainedModel> {
    if params.n_trees == 0 {
        return Err(Error::InvalidParameter {
            name: "n_trees",
            value: "0".into(),
            reason: "a forest needs at least one tree".into(),
        });
    }
    if !(params.bag_fraction > 0.0 && params.bag_fraction <= 1.0) {
        return Err(Error::InvalidParameter {
            name: "bag_fraction",
            value: params.bag_fraction.to_string(),
            reason: "must be in (0, 1]".into(),
        });
    }

    let n_features = samples.predictors.len();
    let (x, y): (Vec<&[f64]>, Vec<f64>) = samples
        .labeled()
        .filter(|(_, label)| label.is_finite())
        .unzip();

    let min = params.min_training_rows.max(1);
    if y.len() < min {
        return Err(Error::InsufficientTrainingData { rows: y.len(), min });
    }
    if n_features == 0 {
        return Err(Error::InvalidParameter {
            name: "predictors",
            value: "[]".into(),
            reason: "at least one predictor band is required".into(),
        });
    }
    if let Some(bad) = x.iter().find(|f| f.len() != n_features) {
        return Err(Error::InvalidParameter {
            name: "features",
            value: bad.len().to_string(),
            reason: format!("expected {} predictor values per row", n_features),
        });
    }
    budget.check("train", y.len() as u64)?;

    let n = y.len();
    let bag = ((n as f64 * params.bag_fraction).round() as usize).max(1);
    let tree_params = TreeParams {
        max_features: params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
            .clamp(1, n_features),
        min_leaf: params.min_leaf.max(1),
        max_depth: params.max_depth,
    };

    let grow = |t: usize| -> Result<(RegressionTree, Vec<f64>)> {
        budget.ensure_active()?;
        let mut rng = StdRng::seed_from_u64(tree_seed(params.seed, t));
        let rows: Vec<usize> = (0..bag).map(|_| rng.gen_range(0..n)).collect();
        let mut importance = vec![0.0; n_features];
        let tree = RegressionTree::fit(&x, &y, rows, &tree_params, &mut rng, &mut importance);
        Ok((tree, importance))
    };

    let grown = budget.mode.par_map(0..params.n_trees, grow);

    let mut trees = Vec::with_capacity(params.n_trees);
    let mut importance = vec![0.0; n_features];
    for result in grown {
        let (tree, imp) = result?;
        for (total, v) in importance.iter_mut().zip(imp) {
            *total += v;
        }
        trees.push(tree);
    }

    debug!(trees = trees.len(), rows = n, bag, "forest trained");
    Ok(TrainedModel {
        predictors: samples.predictors.clone(),
        output_name: params.output_name.clone(),
        trees,
        importance,
    })
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(tree as u64)
}

impl TrainedModel {
    /// Predictor band names in training order
    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean prediction over trees for one feature vector
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len() as f64
    }

    /// One prediction per sample, in sample order.
    ///
    /// The sample set must have been read with the training predictor order.
    pub fn predict_samples(&self, samples: &SampleSet) -> Result<Vec<f64>> {
        if samples.predictors != self.predictors {
            return Err(Error::InvalidParameter {
                name: "predictors",
                value: samples.predictors.join(","),
                reason: format!("model was trained on [{}]", self.predictors.join(",")),
            });
        }
        Ok(samples
            .samples
            .iter()
            .map(|s| self.predict_row(&s.features))
            .collect())
    }

    /// Predict every pixel of `layer`.
    ///
    /// Predictor bands are looked up by name, so extra bands and band order
    /// in `layer` do not matter. Pixels with any non-finite predictor are
    /// NaN. Returns a single band named after the model output.
    pub fn predict_layer(&self, layer: &RasterLayer, budget: &ComputeBudget) -> Result<RasterLayer> {
        let bands: Vec<&Raster<f64>> = self
            .predictors
            .iter()
            .map(|name| layer.require_band(name))
            .collect::<Result<_>>()?;
        let template = bands[0];
        for band in &bands[1..] {
            template.ensure_same_shape(band)?;
        }
        let (rows, cols) = template.shape();
        budget.check("predict", (rows as u64) * (cols as u64))?;

        let predict_rows = || -> Vec<f64> {
            (0..rows)
                .into_par_iter()
                .flat_map(|row| {
                    let mut row_data = vec![f64::NAN; cols];
                    let mut features = vec![0.0; bands.len()];
                    for (col, cell) in row_data.iter_mut().enumerate() {
                        let mut complete = true;
                        for (f, band) in features.iter_mut().zip(&bands) {
                            *f = unsafe { band.get_unchecked(row, col) };
                            complete &= f.is_finite();
                        }
                        if complete {
                            *cell = self.predict_row(&features);
                        }
                    }
                    row_data
                })
                .collect()
        };
        let data = budget.mode.install(predict_rows);
        budget.ensure_active()?;

        let predicted = build_output(template, rows, cols, data)?;
        Ok(RasterLayer::from_band(self.output_name.clone(), predicted))
    }

    /// Raw importance per predictor: total SSE decrease of its splits
    pub fn explain(&self) -> Vec<(String, f64)> {
        self.predictors
            .iter()
            .cloned()
            .zip(self.importance.iter().copied())
            .collect()
    }
}
