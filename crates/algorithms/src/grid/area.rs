//! Per-pixel ground area of the analysis grid

use super::projection::geographic_converter;
use crate::util::build_output;
use agbmap_core::raster::{AnalysisGrid, Raster};
use agbmap_core::Result;
use geo::{GeodesicArea, LineString, Polygon};
use rayon::prelude::*;

/// Ground area of every grid pixel in m² on the WGS84 ellipsoid.
///
/// Each pixel outline (corners plus edge midpoints) is taken to geographic
/// coordinates and measured as a geodesic polygon. Grids in a CRS that
/// cannot be related to WGS84 fall back to the planar cell area.
///
/// # Returns
/// Raster conforming to `grid` with areas in square metres
pub fn pixel_area(grid: &AnalysisGrid) -> Result<Raster<f64>> {
    let template = grid.empty_raster(f64::NAN);
    let (rows, cols) = grid.shape();
    let gt = *grid.transform();

    let Some(to_lonlat) = geographic_converter(grid.crs()) else {
        let planar = gt.cell_area();
        return build_output(&template, rows, cols, vec![planar; rows * cols]);
    };

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let (c, r) = (col as f64, row as f64);
                let outline: Option<Vec<(f64, f64)>> = PIXEL_OUTLINE
                    .iter()
                    .map(|&(dc, dr)| {
                        let (x, y) = gt.fractional_to_geo(c + dc, r + dr);
                        to_lonlat(x, y)
                    })
                    .collect();
                if let Some(points) = outline {
                    *cell = Polygon::new(LineString::from(points), vec![]).geodesic_area_unsigned();
                }
            }
            row_data
        })
        .collect();

    build_output(&template, rows, cols, data)
}

/// Pixel outline in fractional pixel offsets, counter-clockwise on a north-up grid
const PIXEL_OUTLINE: [(f64, f64); 8] = [
    (0.0, 1.0),
    (0.5, 1.0),
    (1.0, 1.0),
    (1.0, 0.5),
    (1.0, 0.0),
    (0.5, 0.0),
    (0.0, 0.0),
    (0.0, 0.5),
];

#[cfg(test)]
mod tests {
    use super::*;
    use agbmap_core::{GeoTransform, CRS};
    use approx::assert_relative_eq;

    #[test]
    fn test_utm_pixel_at_equator_central_meridian() {
        // 100 m UTM cell, scale factor 0.9996 on the central meridian
        let grid = AnalysisGrid::new(
            CRS::from_epsg(32749),
            GeoTransform::north_up(499_950.0, 10_000_050.0, 100.0),
            1,
            1,
        )
        .unwrap();
        let area = pixel_area(&grid).unwrap().get(0, 0).unwrap();
        assert_relative_eq!(area, 10_008.0, max_relative = 0.005);
    }

    #[test]
    fn test_geographic_cells_shrink_with_latitude() {
        let grid = AnalysisGrid::new(
            CRS::wgs84(),
            GeoTransform::north_up(10.0, 61.0, 0.01),
            100,
            1,
        )
        .unwrap();
        let areas = pixel_area(&grid).unwrap();
        let north = areas.get(0, 0).unwrap();
        let south = areas.get(99, 0).unwrap();
        assert!(south > north);

        // cos(60°) · 0.01° · 0.01° ≈ 0.5 · 1113 m · 1113 m
        let at_60 = areas.get(50, 0).unwrap();
        assert_relative_eq!(at_60, 0.5 * 1113.0 * 1113.0, max_relative = 0.02);
    }

    #[test]
    fn test_web_mercator_pixel_at_equator() {
        // within the pseudo-Mercator north-south stretch a / M(0)
        let grid = AnalysisGrid::new(
            CRS::from_epsg(3857),
            GeoTransform::north_up(0.0, 30.0, 30.0),
            1,
            1,
        )
        .unwrap();
        let area = pixel_area(&grid).unwrap().get(0, 0).unwrap();
        assert_relative_eq!(area, 900.0, max_relative = 0.01);
    }

    #[test]
    fn test_unknown_crs_is_planar() {
        let grid = AnalysisGrid::new(
            CRS::from_wkt("LOCAL_CS[\"site\"]"),
            GeoTransform::north_up(0.0, 0.0, 30.0),
            2,
            2,
        )
        .unwrap();
        let areas = pixel_area(&grid).unwrap();
        assert_relative_eq!(areas.get(1, 1).unwrap(), 900.0);
    }
}
