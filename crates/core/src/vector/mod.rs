//! Vector geometry: the study region

use crate::crs::CRS;
use geo::{BoundingRect, Contains};
use geo_types::{coord, Point, Polygon, Rect};

/// Polygon that sampling and aggregation are restricted to.
///
/// Coordinates are in `crs`, which must match the analysis grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    crs: CRS,
    polygon: Polygon<f64>,
}

impl Region {
    /// Rectangle (min_x, min_y, max_x, max_y)
    pub fn from_bounds(crs: CRS, bounds: (f64, f64, f64, f64)) -> Self {
        let (min_x, min_y, max_x, max_y) = bounds;
        let rect = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y });
        Self {
            crs,
            polygon: rect.to_polygon(),
        }
    }

    pub fn from_polygon(crs: CRS, polygon: Polygon<f64>) -> Self {
        Self { crs, polygon }
    }

    pub fn crs(&self) -> &CRS {
        &self.crs
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Whether the point lies strictly inside the region
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygon.contains(&Point::new(x, y))
    }

    /// Bounding box (min_x, min_y, max_x, max_y), `None` for an empty polygon
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.polygon
            .bounding_rect()
            .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
    }
}
