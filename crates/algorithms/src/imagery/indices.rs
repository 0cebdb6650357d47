//! Spectral indices used as biomass predictors
//!
//! All indices operate on single-band reflectance rasters and return NaN
//! wherever an input is invalid or the denominator vanishes.

use crate::util::{build_output, check_dimensions, is_nodata_f64};
use agbmap_core::raster::{Raster, RasterLayer};
use agbmap_core::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Indices appended to the optical composite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Modified Normalized Difference Water Index (uses SWIR)
    Mndwi,
    /// Normalized Difference Built-up Index
    Ndbi,
    /// Enhanced Vegetation Index
    Evi,
    /// Bare Soil Index
    Bsi,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 5] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Mndwi,
        SpectralIndex::Ndbi,
        SpectralIndex::Evi,
        SpectralIndex::Bsi,
    ];

    /// Output band name
    pub fn band_name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Mndwi => "mndwi",
            SpectralIndex::Ndbi => "ndbi",
            SpectralIndex::Evi => "evi",
            SpectralIndex::Bsi => "bsi",
        }
    }
}

/// Names of the reflectance bands the indices read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralBands {
    pub blue: String,
    pub green: String,
    pub red: String,
    pub nir: String,
    pub swir: String,
}

impl Default for SpectralBands {
    /// Sentinel-2 MSI band names
    fn default() -> Self {
        Self {
            blue: "B2".into(),
            green: "B3".into(),
            red: "B4".into(),
            nir: "B8".into(),
            swir: "B11".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Result is in the range [-1, 1]. Pixels where both bands are zero
/// or either is nodata are set to NaN.
///
/// # Arguments
/// * `band_a` - Numerator positive band
/// * `band_b` - Numerator negative band
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    check_dimensions(band_a, band_b)?;

    let (rows, cols) = band_a.shape();
    let nodata_a = band_a.nodata();
    let nodata_b = band_b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if is_nodata_f64(a, nodata_a) || is_nodata_f64(b, nodata_b) {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < 1e-10 {
                    continue; // Avoid division by zero
                }

                row_data[col] = (a - b) / sum;
            }
            row_data
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

/// `NDVI = (NIR - Red) / (NIR + Red)`
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// Modified Normalized Difference Water Index (Xu, 2006)
///
/// `MNDWI = (Green - SWIR) / (Green + SWIR)`
pub fn mndwi(green: &Raster<f64>, swir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(green, swir)
}

/// Normalized Difference Built-up Index (Zha et al., 2003)
///
/// `NDBI = (SWIR - NIR) / (SWIR + NIR)`
///
/// Positive over built-up and bare surfaces, negative over vegetation.
pub fn ndbi(swir: &Raster<f64>, nir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(swir, nir)
}

// ---------------------------------------------------------------------------
// EVI
// ---------------------------------------------------------------------------

/// Parameters for EVI
#[derive(Debug, Clone)]
pub struct EviParams {
    /// Gain factor (default: 2.5)
    pub g: f64,
    /// Aerosol coefficient for red band (default: 6.0)
    pub c1: f64,
    /// Aerosol coefficient for blue band (default: 7.5)
    pub c2: f64,
    /// Canopy background adjustment (default: 1.0)
    pub l: f64,
}

impl Default for EviParams {
    fn default() -> Self {
        Self {
            g: 2.5,
            c1: 6.0,
            c2: 7.5,
            l: 1.0,
        }
    }
}

/// Enhanced Vegetation Index (Huete et al., 2002)
///
/// `EVI = G * (NIR - Red) / (NIR + C1 * Red - C2 * Blue + L)`
///
/// Less prone to saturation than NDVI over dense canopy, which matters
/// for high-biomass forest.
pub fn evi(
    nir: &Raster<f64>,
    red: &Raster<f64>,
    blue: &Raster<f64>,
    params: EviParams,
) -> Result<Raster<f64>> {
    check_dimensions(nir, red)?;
    check_dimensions(nir, blue)?;

    let (rows, cols) = nir.shape();
    let (nd_nir, nd_red, nd_blue) = (nir.nodata(), red.nodata(), blue.nodata());

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };
                let b = unsafe { blue.get_unchecked(row, col) };

                if is_nodata_f64(n, nd_nir) || is_nodata_f64(r, nd_red) || is_nodata_f64(b, nd_blue)
                {
                    continue;
                }

                let denom = n + params.c1 * r - params.c2 * b + params.l;
                if denom.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = params.g * (n - r) / denom;
            }
            row_data
        })
        .collect();

    build_output(nir, rows, cols, data)
}

/// Bare Soil Index
///
/// `BSI = ((SWIR + Red) - (NIR + Blue)) / ((SWIR + Red) + (NIR + Blue))`
pub fn bsi(
    swir: &Raster<f64>,
    red: &Raster<f64>,
    nir: &Raster<f64>,
    blue: &Raster<f64>,
) -> Result<Raster<f64>> {
    check_dimensions(swir, red)?;
    check_dimensions(swir, nir)?;
    check_dimensions(swir, blue)?;

    let (rows, cols) = swir.shape();
    let nd = [swir.nodata(), red.nodata(), nir.nodata(), blue.nodata()];

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let v = unsafe {
                    [
                        swir.get_unchecked(row, col),
                        red.get_unchecked(row, col),
                        nir.get_unchecked(row, col),
                        blue.get_unchecked(row, col),
                    ]
                };
                if v.iter().zip(nd.iter()).any(|(&x, &n)| is_nodata_f64(x, n)) {
                    continue;
                }

                let soil = v[0] + v[1];
                let veg = v[2] + v[3];
                let denom = soil + veg;
                if denom.abs() < 1e-10 {
                    continue;
                }
                row_data[col] = (soil - veg) / denom;
            }
            row_data
        })
        .collect();

    build_output(swir, rows, cols, data)
}

/// Compute one index from the reflectance bands of `layer`
pub fn compute_index(
    layer: &RasterLayer,
    bands: &SpectralBands,
    index: SpectralIndex,
) -> Result<Raster<f64>> {
    let band = |name: &str| layer.require_band(name);
    match index {
        SpectralIndex::Ndvi => ndvi(band(&bands.nir)?, band(&bands.red)?),
        SpectralIndex::Mndwi => mndwi(band(&bands.green)?, band(&bands.swir)?),
        SpectralIndex::Ndbi => ndbi(band(&bands.swir)?, band(&bands.nir)?),
        SpectralIndex::Evi => evi(
            band(&bands.nir)?,
            band(&bands.red)?,
            band(&bands.blue)?,
            EviParams::default(),
        ),
        SpectralIndex::Bsi => bsi(
            band(&bands.swir)?,
            band(&bands.red)?,
            band(&bands.nir)?,
            band(&bands.blue)?,
        ),
    }
}

/// Append `ndvi`, `mndwi`, `ndbi`, `evi` and `bsi` bands to a reflectance layer
pub fn add_spectral_indices(layer: &RasterLayer, bands: &SpectralBands) -> Result<RasterLayer> {
    SpectralIndex::ALL
        .iter()
        .try_fold(layer.clone(), |out, &index| {
            let raster = compute_index(layer, bands, index)?;
            out.with_band(index.band_name(), raster)
        })
}
