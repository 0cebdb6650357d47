//! Terrain analysis
//!
//! - Slope: Horn (1981) rate of change of elevation
//! - Terrain predictor layer (`dem`, `slope`)

mod slope;

pub use slope::{slope, terrain_layer, SlopeParams, SlopeUnits};
