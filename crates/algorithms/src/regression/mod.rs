//! Random forest regression of biomass density
//!
//! - `train`: grow a forest from a [`SampleSet`](crate::sampling::SampleSet)
//! - [`TrainedModel`]: predictions over samples or whole layers, raw importance
//! - `evaluate`: in-sample RMSE and normalized importance

mod evaluate;
mod forest;
mod tree;

pub use evaluate::{evaluate, normalize_importance, rmse, Evaluation, FeatureImportance};
pub use forest::{train, ForestParams, TrainedModel};
pub use tree::RegressionTree;
