//! The analysis grid every layer is aligned onto before modeling

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use serde::{Deserialize, Serialize};

/// Tolerance (in map units) when comparing a raster transform to the grid
const TRANSFORM_TOLERANCE: f64 = 1e-6;

/// Fixed target geometry of a pipeline run: CRS, north-up transform and size.
///
/// Exactly one grid is used per run. Rasters entering the regression and
/// aggregation stages must [`conform`](AnalysisGrid::conforms) to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisGrid {
    crs: CRS,
    transform: GeoTransform,
    rows: usize,
    cols: usize,
}

impl AnalysisGrid {
    /// Create a grid from explicit geometry
    pub fn new(crs: CRS, transform: GeoTransform, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        if !transform.is_north_up() || transform.pixel_width <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "transform",
                value: format!("{:?}", transform),
                reason: "analysis grid must be north-up with positive pixel width".into(),
            });
        }
        Ok(Self {
            crs,
            transform,
            rows,
            cols,
        })
    }

    /// Grid covering `bounds` (min_x, min_y, max_x, max_y) with square cells
    /// of `scale` map units.
    ///
    /// The origin snaps outward to a multiple of `scale`, so grids built from
    /// overlapping bounds at the same scale share pixel edges.
    pub fn from_bounds(crs: CRS, bounds: (f64, f64, f64, f64), scale: f64) -> Result<Self> {
        let (min_x, min_y, max_x, max_y) = bounds;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: scale.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        if !(max_x > min_x && max_y > min_y) {
            return Err(Error::InvalidParameter {
                name: "bounds",
                value: format!("{:?}", bounds),
                reason: "max must exceed min on both axes".into(),
            });
        }

        let origin_x = (min_x / scale).floor() * scale;
        let origin_y = (max_y / scale).ceil() * scale;
        let cols = ((max_x - origin_x) / scale).ceil().max(1.0) as usize;
        let rows = ((origin_y - min_y) / scale).ceil().max(1.0) as usize;

        Self::new(crs, GeoTransform::north_up(origin_x, origin_y, scale), rows, cols)
    }

    pub fn crs(&self) -> &CRS {
        &self.crs
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Pixel size in CRS units
    pub fn scale(&self) -> f64 {
        self.transform.pixel_width
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of pixels
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extent (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    /// Map coordinates of a pixel centre
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Whether `raster` has exactly this grid's geometry.
    ///
    /// A raster without CRS is accepted when shape and transform match.
    pub fn conforms<T: RasterElement>(&self, raster: &Raster<T>) -> bool {
        raster.shape() == self.shape()
            && raster
                .transform()
                .approx_eq(&self.transform, TRANSFORM_TOLERANCE)
            && raster.crs().map_or(true, |c| c.is_equivalent(&self.crs))
    }

    /// Fails with [`Error::GridMismatch`] unless `raster` conforms
    pub fn ensure_conforms<T: RasterElement>(&self, raster: &Raster<T>) -> Result<()> {
        if self.conforms(raster) {
            return Ok(());
        }
        Err(Error::GridMismatch(format!(
            "raster {:?} at {:?} ({}) vs grid {:?} at {:?} ({})",
            raster.shape(),
            raster.transform(),
            raster
                .crs()
                .map_or_else(|| "no CRS".to_string(), |c| c.identifier()),
            self.shape(),
            self.transform,
            self.crs
        )))
    }

    /// A raster with this grid's geometry filled with `fill`
    pub fn empty_raster<T: RasterElement>(&self, fill: T) -> Raster<T> {
        let mut raster = Raster::filled(self.rows, self.cols, fill);
        raster.set_transform(self.transform);
        raster.set_crs(Some(self.crs.clone()));
        raster
    }
}
