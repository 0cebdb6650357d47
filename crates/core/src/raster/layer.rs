//! Multi-band raster layers
//!
//! A [`RasterLayer`] is an ordered set of named `f64` bands that share one
//! grid geometry. Layers are values: every operation returns a new layer.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use chrono::NaiveDate;

/// A named band of a [`RasterLayer`]
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub raster: Raster<f64>,
}

/// Ordered named bands sharing the same shape, transform and CRS.
///
/// Invalid cells are `NaN`. An optional acquisition date places the layer
/// inside an [`ImageCollection`](crate::ImageCollection).
#[derive(Debug, Clone, Default)]
pub struct RasterLayer {
    bands: Vec<Band>,
    acquired: Option<NaiveDate>,
}

impl RasterLayer {
    /// Empty layer with no bands
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer with a single band
    pub fn from_band(name: impl Into<String>, raster: Raster<f64>) -> Self {
        Self {
            bands: vec![Band {
                name: name.into(),
                raster,
            }],
            acquired: None,
        }
    }

    /// Append a band. Fails if the name is taken or the geometry differs.
    pub fn with_band(mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<Self> {
        let name = name.into();
        if self.band(&name).is_some() {
            return Err(Error::InvalidParameter {
                name: "band",
                value: name,
                reason: "duplicate band name".into(),
            });
        }
        if let Some(first) = self.bands.first() {
            if !first.raster.same_geometry(&raster) {
                return Err(Error::GridMismatch(format!(
                    "band '{}' has geometry {:?} {:?}, layer has {:?} {:?}",
                    name,
                    raster.shape(),
                    raster.transform(),
                    first.raster.shape(),
                    first.raster.transform()
                )));
            }
        }
        self.bands.push(Band { name, raster });
        Ok(self)
    }

    /// Tag the layer with an acquisition date
    pub fn with_acquired(mut self, date: NaiveDate) -> Self {
        self.acquired = Some(date);
        self
    }

    pub fn acquired(&self) -> Option<NaiveDate> {
        self.acquired
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Raster<f64>> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.raster)
    }

    /// Like [`band`](Self::band) but fails with [`Error::MissingBand`]
    pub fn require_band(&self, name: &str) -> Result<&Raster<f64>> {
        self.band(name)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    /// (rows, cols) of the layer, `None` when it has no bands
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.bands.first().map(|b| b.raster.shape())
    }

    pub fn transform(&self) -> Option<&GeoTransform> {
        self.bands.first().map(|b| b.raster.transform())
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.bands.first().and_then(|b| b.raster.crs())
    }

    /// Any band, used as the geometry template
    pub fn template(&self) -> Option<&Raster<f64>> {
        self.bands.first().map(|b| &b.raster)
    }

    /// New layer with the named bands, in the requested order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut bands = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            bands.push(Band {
                name: name.to_string(),
                raster: self.require_band(name)?.clone(),
            });
        }
        Ok(Self {
            bands,
            acquired: self.acquired,
        })
    }

    /// New layer with the bands whose name satisfies `keep`
    pub fn select_where<F: Fn(&str) -> bool>(&self, keep: F) -> Self {
        Self {
            bands: self
                .bands
                .iter()
                .filter(|b| keep(&b.name))
                .cloned()
                .collect(),
            acquired: self.acquired,
        }
    }

    /// Append all bands of `other`
    pub fn add_bands(self, other: &RasterLayer) -> Result<Self> {
        other
            .bands
            .iter()
            .try_fold(self, |layer, b| layer.with_band(b.name.clone(), b.raster.clone()))
    }

    /// Rename a band
    pub fn rename(mut self, from: &str, to: impl Into<String>) -> Result<Self> {
        let to = to.into();
        if from != to && self.band(&to).is_some() {
            return Err(Error::InvalidParameter {
                name: "band",
                value: to,
                reason: "duplicate band name".into(),
            });
        }
        let band = self
            .bands
            .iter_mut()
            .find(|b| b.name == from)
            .ok_or_else(|| Error::MissingBand(from.to_string()))?;
        band.name = to;
        Ok(self)
    }

    /// Apply `f` to every band, keeping names and order
    pub fn map_bands<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&str, &Raster<f64>) -> Result<Raster<f64>>,
    {
        let mut out = Self {
            bands: Vec::with_capacity(self.bands.len()),
            acquired: self.acquired,
        };
        for b in &self.bands {
            out = out.with_band(b.name.clone(), f(&b.name, &b.raster)?)?;
        }
        Ok(out)
    }

    /// Invalidate every band where `mask` is 0
    pub fn update_mask(&self, mask: &Raster<u8>) -> Result<Self> {
        self.map_bands(|_, raster| {
            raster.ensure_same_shape(mask)?;
            let mut out = raster.clone();
            out.data_mut().zip_mut_with(mask.data(), |v, &m| {
                if m == 0 {
                    *v = f64::NAN;
                }
            });
            Ok(out)
        })
    }

    /// Valid where every band is finite
    pub fn validity(&self) -> Option<Raster<u8>> {
        let template = self.template()?;
        let mut mask = template.map(|_| 1u8);
        for b in &self.bands {
            mask.data_mut().zip_mut_with(b.raster.data(), |m, &v| {
                if !v.is_finite() {
                    *m = 0;
                }
            });
        }
        Some(mask)
    }
}
