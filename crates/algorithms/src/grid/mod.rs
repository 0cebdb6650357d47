//! Analysis-grid algorithms
//!
//! - Coordinate transforms between WGS84 and UTM
//! - Alignment of arbitrary rasters onto the analysis grid
//! - Geodesic pixel area
//! - Vegetation mask from land cover

mod align;
mod area;
mod landcover;
pub mod projection;

pub use align::{
    align, align_raster, footprint_intersects, subsample_count, Reducer, Resample,
    MAX_SUBSAMPLES,
};
pub use area::pixel_area;
pub use landcover::vegetation_mask;
pub use projection::{parse_utm_epsg, to_geographic, CoordTransform};
