//! Slope calculation from DEMs
//!
//! Calculates the rate of change of elevation using the Horn (1981) method,
//! which uses a 3x3 neighborhood to compute partial derivatives.

use crate::grid::projection::METRES_PER_DEGREE;
use crate::util::{build_output, is_nodata_f64};
use agbmap_core::raster::{Raster, RasterLayer};
use agbmap_core::Result;
use rayon::prelude::*;

/// Units for slope output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeUnits {
    /// Degrees (0-90)
    #[default]
    Degrees,
    /// Percent (0-infinity, typically 0-100+)
    Percent,
    /// Radians (0-π/2)
    Radians,
}

/// Parameters for slope calculation
#[derive(Debug, Clone)]
pub struct SlopeParams {
    /// Output units
    pub units: SlopeUnits,
    /// Horizontal unit to elevation unit factor (default 1.0).
    /// Use ~111320 for lat/lon DEMs with meters elevation
    pub z_factor: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            units: SlopeUnits::Degrees,
            z_factor: 1.0,
        }
    }
}

/// Calculate slope from a DEM
///
/// Uses Horn's (1981) method with a 3x3 neighborhood:
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
///
/// dz/dx = ((c + 2f + i) - (a + 2d + g)) / (8 * cellsize_x)
/// dz/dy = ((g + 2h + i) - (a + 2b + c)) / (8 * cellsize_y)
/// slope = atan(sqrt(dz/dx² + dz/dy²))
///
/// Edge cells replicate their nearest interior neighbours, so the output
/// covers the whole DEM. On a clamped axis the difference spans one cell
/// instead of two and the divisor shrinks to match. A nodata cell anywhere
/// in the window gives NaN.
///
/// # Arguments
/// * `dem` - Input DEM raster
/// * `params` - Slope calculation parameters
///
/// # Returns
/// Raster with slope values in the specified units
pub fn slope(dem: &Raster<f64>, params: SlopeParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let gt = dem.transform();
    let four_dx = 4.0 * gt.pixel_width.abs() * params.z_factor;
    let four_dy = 4.0 * gt.pixel_height.abs() * params.z_factor;
    let nodata = dem.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let up = row.saturating_sub(1);
            let down = (row + 1).min(rows - 1);

            for (col, cell) in row_data.iter_mut().enumerate() {
                let e = unsafe { dem.get_unchecked(row, col) };
                if is_nodata_f64(e, nodata) {
                    continue;
                }

                let left = col.saturating_sub(1);
                let right = (col + 1).min(cols - 1);

                let z = |r: usize, c: usize| unsafe { dem.get_unchecked(r, c) };
                let (a, b, c) = (z(up, left), z(up, col), z(up, right));
                let (d, f) = (z(row, left), z(row, right));
                let (g, h, i) = (z(down, left), z(down, col), z(down, right));

                if [a, b, c, d, f, g, h, i]
                    .iter()
                    .any(|&v| is_nodata_f64(v, nodata))
                {
                    continue;
                }

                // spans in cells: 2 inside, 1 on an edge, 0 on a single row/column
                let span_x = (right - left) as f64;
                let span_y = (down - up) as f64;
                let dz_dx = if span_x > 0.0 {
                    ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / (four_dx * span_x)
                } else {
                    0.0
                };
                let dz_dy = if span_y > 0.0 {
                    ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / (four_dy * span_y)
                } else {
                    0.0
                };
                let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();

                *cell = match params.units {
                    SlopeUnits::Degrees => slope_rad.to_degrees(),
                    SlopeUnits::Percent => slope_rad.tan() * 100.0,
                    SlopeUnits::Radians => slope_rad,
                };
            }

            row_data
        })
        .collect();

    build_output(dem, rows, cols, data)
}

/// Terrain predictors: bands `dem` (elevation) and `slope` (degrees).
///
/// Geographic DEMs get the degree-to-metre z-factor automatically.
pub fn terrain_layer(dem: &Raster<f64>) -> Result<RasterLayer> {
    let z_factor = if dem.crs().is_some_and(|c| c.is_geographic()) {
        METRES_PER_DEGREE
    } else {
        1.0
    };
    let slope_deg = slope(
        dem,
        SlopeParams {
            units: SlopeUnits::Degrees,
            z_factor,
        },
    )?;
    RasterLayer::from_band("dem", dem.clone()).with_band("slope", slope_deg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agbmap_core::{GeoTransform, CRS};
    use approx::assert_relative_eq;

    /// Plane rising 1 m per 1 m eastwards: slope 45°
    fn ramp() -> Raster<f64> {
        let mut dem = Raster::new(10, 10);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        for row in 0..10 {
            for col in 0..10 {
                dem.set(row, col, col as f64).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_slope_flat() {
        let mut dem: Raster<f64> = Raster::filled(10, 10, 100.0);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        let result = slope(&dem, SlopeParams::default()).unwrap();
        assert!(result.get(5, 5).unwrap().abs() < 1e-9);
        assert!(result.get(0, 0).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_slope_ramp_interior() {
        let result = slope(&ramp(), SlopeParams::default()).unwrap();
        assert_relative_eq!(result.get(5, 5).unwrap(), 45.0, epsilon = 1e-9);
        // replicated rows keep the east-west gradient on the top edge
        assert_relative_eq!(result.get(0, 5).unwrap(), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_slope_ramp_edges() {
        let result = slope(&ramp(), SlopeParams::default()).unwrap();
        assert_relative_eq!(result.get(5, 0).unwrap(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(result.get(5, 9).unwrap(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(result.get(0, 0).unwrap(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(result.get(9, 9).unwrap(), 45.0, epsilon = 1e-9);

        // same ramp facing north
        let mut dem = Raster::new(10, 10);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        for row in 0..10 {
            for col in 0..10 {
                dem.set(row, col, (10 - row) as f64).unwrap();
            }
        }
        let result = slope(&dem, SlopeParams::default()).unwrap();
        assert_relative_eq!(result.get(0, 4).unwrap(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(result.get(9, 4).unwrap(), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_row_dem() {
        let mut dem = Raster::new(1, 5);
        dem.set_transform(GeoTransform::new(0.0, 1.0, 1.0, -1.0));
        for col in 0..5 {
            dem.set(0, col, col as f64).unwrap();
        }
        let result = slope(&dem, SlopeParams::default()).unwrap();
        assert_relative_eq!(result.get(0, 2).unwrap(), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_slope_units() {
        let dem = ramp();
        let deg = slope(&dem, SlopeParams { units: SlopeUnits::Degrees, z_factor: 1.0 }).unwrap();
        let rad = slope(&dem, SlopeParams { units: SlopeUnits::Radians, z_factor: 1.0 }).unwrap();
        let pct = slope(&dem, SlopeParams { units: SlopeUnits::Percent, z_factor: 1.0 }).unwrap();

        let rad_val = rad.get(5, 5).unwrap();
        assert!((deg.get(5, 5).unwrap() - rad_val.to_degrees()).abs() < 1e-9);
        assert!((pct.get(5, 5).unwrap() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_nodata_window() {
        let mut dem = ramp();
        dem.set(4, 4, f64::NAN).unwrap();
        let result = slope(&dem, SlopeParams::default()).unwrap();
        assert!(result.get(5, 5).unwrap().is_nan());
        assert!(result.get(4, 4).unwrap().is_nan());
        assert!(result.get(7, 7).unwrap().is_finite());
    }

    #[test]
    fn test_terrain_layer_geographic_z_factor() {
        let mut dem = ramp();
        dem.set_crs(Some(CRS::wgs84()));
        let layer = terrain_layer(&dem).unwrap();
        assert_eq!(layer.band_names(), vec!["dem", "slope"]);
        // 1 m per degree is nearly flat
        assert!(layer.band("slope").unwrap().get(5, 5).unwrap() < 0.01);
    }
}
