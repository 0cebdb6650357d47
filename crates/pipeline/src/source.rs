//! Raster inputs of a run
//!
//! A [`RasterSource`] hands out the four datasets the pipeline reads:
//! optical imagery and biomass observations per period, and the
//! time-invariant elevation and land-cover rasters. An absent dataset is a
//! [`Lookup::NotFound`] value, not an error; read failures are errors.

use crate::error::{PipelineError, Result};
use agbmap_algorithms::grid::footprint_intersects;
use agbmap_core::raster::{AnalysisGrid, ImageCollection, Raster, RasterLayer};
use chrono::NaiveDate;

/// Outcome of a dataset lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Lookup::NotFound, Lookup::Found)
    }
}

/// Time window and grid of one period's lookups
#[derive(Debug, Clone)]
pub struct Query {
    pub year: i32,
    /// First day of the window
    pub start: NaiveDate,
    /// First day after the window
    pub end: NaiveDate,
    pub grid: AnalysisGrid,
}

impl Query {
    /// The calendar year `year`
    pub fn for_year(year: i32, grid: &AnalysisGrid) -> Result<Self> {
        let day_one = |y: i32| {
            NaiveDate::from_ymd_opt(y, 1, 1)
                .ok_or_else(|| PipelineError::Config(format!("year {} out of range", y)))
        };
        Ok(Self {
            year,
            start: day_one(year)?,
            end: day_one(year + 1)?,
            grid: grid.clone(),
        })
    }

    /// Layers acquired inside the window whose footprint overlaps the grid
    pub fn select(&self, collection: &ImageCollection) -> Result<ImageCollection> {
        let mut kept = Vec::new();
        for layer in collection.filter_date(self.start, self.end).into_layers() {
            let overlaps = match layer.template() {
                Some(t) => footprint_intersects(t, &self.grid)?,
                None => false,
            };
            if overlaps {
                kept.push(layer);
            }
        }
        Ok(ImageCollection::new(kept))
    }
}

/// Provider of the datasets a run reads
pub trait RasterSource: Send + Sync {
    /// Optical acquisitions of one period, in native projection
    fn optical(&self, query: &Query) -> Result<Lookup<ImageCollection>>;

    /// Biomass observations (density plus quality bands) of one period
    fn biomass(&self, query: &Query) -> Result<Lookup<ImageCollection>>;

    /// Elevation model covering the grid
    fn elevation(&self, grid: &AnalysisGrid) -> Result<Lookup<Raster<f64>>>;

    /// Land-cover classification covering the grid
    fn land_cover(&self, grid: &AnalysisGrid) -> Result<Lookup<Raster<f64>>>;
}

fn non_empty(collection: ImageCollection) -> Lookup<ImageCollection> {
    if collection.is_empty() {
        Lookup::NotFound
    } else {
        Lookup::Found(collection)
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Source backed by layers already in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    optical: Vec<RasterLayer>,
    biomass: Vec<RasterLayer>,
    elevation: Option<Raster<f64>>,
    land_cover: Option<Raster<f64>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dated optical acquisition
    pub fn with_optical(mut self, layer: RasterLayer) -> Self {
        self.optical.push(layer);
        self
    }

    /// Add a dated biomass acquisition
    pub fn with_biomass(mut self, layer: RasterLayer) -> Self {
        self.biomass.push(layer);
        self
    }

    pub fn with_elevation(mut self, dem: Raster<f64>) -> Self {
        self.elevation = Some(dem);
        self
    }

    pub fn with_land_cover(mut self, classes: Raster<f64>) -> Self {
        self.land_cover = Some(classes);
        self
    }
}

impl RasterSource for MemorySource {
    fn optical(&self, query: &Query) -> Result<Lookup<ImageCollection>> {
        Ok(non_empty(query.select(&ImageCollection::new(self.optical.clone()))?))
    }

    fn biomass(&self, query: &Query) -> Result<Lookup<ImageCollection>> {
        Ok(non_empty(query.select(&ImageCollection::new(self.biomass.clone()))?))
    }

    fn elevation(&self, _grid: &AnalysisGrid) -> Result<Lookup<Raster<f64>>> {
        Ok(self.elevation.clone().into())
    }

    fn land_cover(&self, _grid: &AnalysisGrid) -> Result<Lookup<Raster<f64>>> {
        Ok(self.land_cover.clone().into())
    }
}
