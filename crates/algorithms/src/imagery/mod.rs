//! Imagery algorithms
//!
//! - Spectral indices: NDVI, MNDWI, NDBI, EVI, BSI
//! - Quality masks: cloud score, reflectance scaling, biomass observation
//!   screening, slope ceiling
//! - Composites: median and last-on-top mosaic of a collection

mod composite;
mod indices;
mod quality;

pub use composite::{median, mosaic};
pub use indices::{
    add_spectral_indices, bsi, compute_index, evi, mndwi, ndbi, ndvi, normalized_difference,
    EviParams, SpectralBands, SpectralIndex,
};
pub use quality::{
    biomass_quality_mask, cloud_mask, prepare_optical, scale_reflectance, slope_mask,
    BiomassQuality, OpticalParams,
};
