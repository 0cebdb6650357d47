//! # agbmap core
//!
//! Core types and I/O for the agbmap biomass pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced grid
//! - `RasterLayer`: Named bands sharing one grid geometry
//! - `ImageCollection`: Dated layers from one dataset
//! - `AnalysisGrid`: The single target geometry of a run
//! - `Region`: Polygon the sampling and aggregation steps are restricted to
//! - `CRS`: Coordinate Reference System handling
//! - GeoTIFF reading and writing

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{
    AnalysisGrid, Band, GeoTransform, ImageCollection, Raster, RasterElement, RasterLayer,
};
pub use vector::Region;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{
        AnalysisGrid, GeoTransform, ImageCollection, Raster, RasterElement, RasterLayer,
    };
    pub use crate::vector::Region;
}
