//! Vegetation mask from a land-cover classification

use super::align::{align_raster, Reducer, Resample};
use agbmap_core::raster::{AnalysisGrid, Raster};
use agbmap_core::Result;
use tracing::debug;

/// Boolean vegetation mask on `grid`.
///
/// The classification is resampled by majority vote, then a pixel is 1 iff
/// its class is one of `vegetation_classes`. Pixels without a class are 0.
/// Land cover is time-invariant over a run, so callers build this once.
pub fn vegetation_mask(
    classification: &Raster<f64>,
    grid: &AnalysisGrid,
    vegetation_classes: &[i64],
) -> Result<Raster<u8>> {
    let classes = align_raster(classification, grid, Resample::Nearest, Reducer::Mode)?;
    let mask = classes.map(|v| {
        u8::from(v.is_finite() && vegetation_classes.contains(&(v.round() as i64)))
    });
    debug!(
        vegetated = mask.data().iter().filter(|&&m| m == 1).count(),
        total = mask.len(),
        "vegetation mask built"
    );
    Ok(mask)
}
