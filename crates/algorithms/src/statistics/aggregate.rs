//! Masked, area-weighted totals
//!
//! Converts a biomass density raster (Mg/ha) into an absolute total (Mg)
//! over a region, weighting every valid pixel by its area.

use agbmap_core::raster::Raster;
use agbmap_core::{Error, Region, Result};
use agbmap_parallel::{reduce_tiles, ComputeBudget};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Square metres per hectare
pub const M2_PER_HA: f64 = 10_000.0;

/// Totals of one masked density raster
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Sum of density x area, in Mg
    pub total_agb: f64,
    /// Area of pixels with a strictly positive density, in ha
    pub valid_area_ha: f64,
    /// Pixels contributing to `total_agb`
    pub pixel_count: usize,
}

impl AggregateResult {
    fn combine(self, other: Self) -> Self {
        Self {
            total_agb: self.total_agb + other.total_agb,
            valid_area_ha: self.valid_area_ha + other.valid_area_ha,
            pixel_count: self.pixel_count + other.pixel_count,
        }
    }
}

/// Invalidate pixels where `mask` is 0
pub fn apply_mask(raster: &Raster<f64>, mask: &Raster<u8>) -> Result<Raster<f64>> {
    raster.ensure_same_shape(mask)?;
    let mut out = raster.clone();
    out.set_nodata(Some(f64::NAN));
    out.data_mut().zip_mut_with(mask.data(), |v, &m| {
        if m == 0 || raster.is_nodata(*v) {
            *v = f64::NAN;
        }
    });
    Ok(out)
}

/// Sum `predicted x pixel_area` over the vegetated pixels inside `region`.
///
/// A pixel counts when `mask` is 1, its centre lies in `region`, and both
/// its density and its area are finite. No valid pixel gives zeros.
///
/// # Arguments
/// * `predicted` - Density raster on the analysis grid (Mg/ha)
/// * `mask` - Vegetation mask on the same grid
/// * `pixel_area` - Pixel areas in m²
/// * `region` - Aggregation region, in the grid CRS
/// * `budget` - Pixel ceiling, tiling and cancellation
pub fn aggregate(
    predicted: &Raster<f64>,
    mask: &Raster<u8>,
    pixel_area: &Raster<f64>,
    region: &Region,
    budget: &ComputeBudget,
) -> Result<AggregateResult> {
    predicted.ensure_same_shape(mask)?;
    predicted.ensure_same_shape(pixel_area)?;
    if let Some(crs) = predicted.crs() {
        if !crs.is_equivalent(region.crs()) {
            return Err(Error::CrsMismatch(crs.identifier(), region.crs().identifier()));
        }
    }

    let (rows, cols) = predicted.shape();
    let result = reduce_tiles(
        "aggregate",
        rows,
        cols,
        budget,
        AggregateResult::default(),
        |tile| {
            let mut acc = AggregateResult::default();
            for (row, col) in tile.cells() {
                if unsafe { mask.get_unchecked(row, col) } == 0 {
                    continue;
                }
                let density = unsafe { predicted.get_unchecked(row, col) };
                let area_ha = unsafe { pixel_area.get_unchecked(row, col) } / M2_PER_HA;
                if predicted.is_nodata(density) || !area_ha.is_finite() {
                    continue;
                }
                let (x, y) = predicted.pixel_to_geo(col, row);
                if !region.contains(x, y) {
                    continue;
                }
                acc.total_agb += density * area_ha;
                acc.pixel_count += 1;
                if density > 0.0 {
                    acc.valid_area_ha += area_ha;
                }
            }
            acc
        },
        AggregateResult::combine,
    )?;

    debug!(
        total_agb = result.total_agb,
        valid_area_ha = result.valid_area_ha,
        pixels = result.pixel_count,
        "aggregated"
    );
    Ok(result)
}
