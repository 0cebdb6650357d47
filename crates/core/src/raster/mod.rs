//! Raster data structures and operations

mod analysis_grid;
mod collection;
mod element;
mod geotransform;
mod grid;
mod layer;

pub use analysis_grid::AnalysisGrid;
pub use collection::ImageCollection;
pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use layer::{Band, RasterLayer};
