//! # agbmap algorithms
//!
//! Raster and model algorithms for the biomass pipeline.
//!
//! ## Categories
//!
//! - **grid**: projection, alignment onto the analysis grid, pixel area,
//!   vegetation mask
//! - **imagery**: spectral indices, quality masks, composites
//! - **terrain**: slope and the terrain predictor layer
//! - **sampling**: stratified training-set extraction
//! - **regression**: random forest regressor and evaluation
//! - **statistics**: masked aggregation, year-over-year change, trend

pub mod grid;
pub mod imagery;
pub mod regression;
pub mod sampling;
pub mod statistics;
pub mod terrain;

mod util;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::grid::{align, align_raster, pixel_area, vegetation_mask, Reducer, Resample};
    pub use crate::imagery::{
        add_spectral_indices, biomass_quality_mask, cloud_mask, median, mosaic, slope_mask,
        BiomassQuality,
    };
    pub use crate::regression::{evaluate, train, Evaluation, ForestParams, TrainedModel};
    pub use crate::sampling::{stratified_sample, SampleSet, StratifiedParams, TrainingSample};
    pub use crate::statistics::{
        aggregate, apply_mask, estimate_trend, year_over_year, AggregateResult, Ratio,
        TrendResult,
    };
    pub use crate::terrain::{slope, terrain_layer, SlopeParams};
    pub use agbmap_core::prelude::*;
}
