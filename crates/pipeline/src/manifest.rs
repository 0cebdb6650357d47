//! GeoTIFF-backed source described by a TOML manifest
//!
//! ```toml
//! [elevation]
//! path = "dem.tif"
//!
//! [land_cover]
//! path = "worldcover.tif"
//!
//! [[optical]]
//! date = "2021-06-14"
//! bands = [
//!     { name = "B4", path = "s2/20210614_B4.tif" },
//!     { name = "B8", path = "s2/20210614_B8.tif" },
//! ]
//!
//! [[biomass]]
//! date = "2021-07-02"
//! crs = "EPSG:4326"
//! bands = [{ name = "agbd", path = "gedi/20210702_agbd.tif", nodata = -9999.0 }]
//! ```
//!
//! Relative paths resolve against the manifest's directory. Each band file
//! is a single-band GeoTIFF; `crs` overrides the CRS stored in the files and
//! `nodata` the GDAL_NODATA value. Cells equal to the nodata value load as
//! NaN. Files are read when a query selects their acquisition.

use crate::error::{PipelineError, Result};
use crate::source::{Lookup, Query, RasterSource};
use agbmap_core::io::read_geotiff;
use agbmap_core::raster::{AnalysisGrid, ImageCollection, Raster, RasterElement, RasterLayer};
use agbmap_core::CRS;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One band file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandFile {
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
}

/// One dated acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    pub bands: Vec<BandFile>,
}

/// A single time-invariant raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFile {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
}

/// Manifest document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub elevation: Option<StaticFile>,
    pub land_cover: Option<StaticFile>,
    pub optical: Vec<Acquisition>,
    pub biomass: Vec<Acquisition>,
}

impl Manifest {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Rewrite relative paths against `base`
    fn resolve(mut self, base: &Path) -> Self {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for f in self.elevation.iter_mut().chain(self.land_cover.iter_mut()) {
            fix(&mut f.path);
        }
        for acq in self.optical.iter_mut().chain(self.biomass.iter_mut()) {
            for band in &mut acq.bands {
                fix(&mut band.path);
            }
        }
        self
    }
}

/// Source reading GeoTIFF files listed in a [`Manifest`]
#[derive(Debug, Clone)]
pub struct FileSource {
    manifest: Manifest,
}

impl FileSource {
    /// Load a manifest file; relative paths resolve against its directory
    pub fn from_manifest(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(Manifest::from_toml_str(&text)?, base))
    }

    pub fn new(manifest: Manifest, base: &Path) -> Self {
        Self {
            manifest: manifest.resolve(base),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn collection(&self, acquisitions: &[Acquisition], query: &Query) -> Result<Lookup<ImageCollection>> {
        let mut layers = Vec::new();
        for acq in acquisitions
            .iter()
            .filter(|a| a.date >= query.start && a.date < query.end)
        {
            layers.push(read_acquisition(acq)?);
        }
        let selected = query.select(&ImageCollection::new(layers))?;
        debug!(year = query.year, layers = selected.len(), "manifest lookup");
        Ok(if selected.is_empty() {
            Lookup::NotFound
        } else {
            Lookup::Found(selected)
        })
    }
}

fn parse_crs(crs: &Option<String>) -> Result<Option<CRS>> {
    crs.as_deref()
        .map(|s| s.parse::<CRS>().map_err(PipelineError::from))
        .transpose()
}

fn read_band(path: &Path, crs: &Option<CRS>, nodata: Option<f64>) -> Result<Raster<f64>> {
    let mut raster: Raster<f64> = read_geotiff(path).map_err(|source| PipelineError::Source {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(crs) = crs {
        raster.set_crs(Some(crs.clone()));
    }
    if let Some(nodata) = nodata {
        raster.set_nodata(Some(nodata));
    }
    Ok(nodata_to_nan(raster))
}

/// Replace the nodata sentinel with NaN so every downstream step sees it
fn nodata_to_nan(mut raster: Raster<f64>) -> Raster<f64> {
    if let Some(nodata) = raster.nodata() {
        let sentinel = Some(nodata);
        raster
            .data_mut()
            .mapv_inplace(|v| if v.is_nodata(sentinel) { f64::NAN } else { v });
        raster.set_nodata(None);
    }
    raster
}

fn read_acquisition(acq: &Acquisition) -> Result<RasterLayer> {
    let crs = parse_crs(&acq.crs)?;
    let mut layer = RasterLayer::new();
    for band in &acq.bands {
        layer = layer.with_band(band.name.clone(), read_band(&band.path, &crs, band.nodata)?)?;
    }
    Ok(layer.with_acquired(acq.date))
}

fn read_static(file: &Option<StaticFile>) -> Result<Lookup<Raster<f64>>> {
    match file {
        Some(f) => Ok(Lookup::Found(read_band(&f.path, &parse_crs(&f.crs)?, f.nodata)?)),
        None => Ok(Lookup::NotFound),
    }
}

impl RasterSource for FileSource {
    fn optical(&self, query: &Query) -> Result<Lookup<ImageCollection>> {
        self.collection(&self.manifest.optical, query)
    }

    fn biomass(&self, query: &Query) -> Result<Lookup<ImageCollection>> {
        self.collection(&self.manifest.biomass, query)
    }

    fn elevation(&self, _grid: &AnalysisGrid) -> Result<Lookup<Raster<f64>>> {
        read_static(&self.manifest.elevation)
    }

    fn land_cover(&self, _grid: &AnalysisGrid) -> Result<Lookup<Raster<f64>>> {
        read_static(&self.manifest.land_cover)
    }
}
