//! Quality masks for optical imagery and biomass observations

use crate::util::build_output;
use agbmap_core::raster::{Raster, RasterLayer};
use agbmap_core::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Optical
// ---------------------------------------------------------------------------

/// Preparation of one optical acquisition before compositing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalParams {
    /// Per-pixel clear-sky score band; `None` disables cloud masking
    pub cloud_score_band: Option<String>,
    /// Pixels with score below this are cloudy
    pub clear_threshold: f64,
    /// Digital number to reflectance factor
    pub reflectance_scale: f64,
    /// Reflectance bands are the ones whose name starts with this
    pub band_prefix: String,
}

impl Default for OpticalParams {
    fn default() -> Self {
        Self {
            cloud_score_band: Some("cs".into()),
            clear_threshold: 0.5,
            reflectance_scale: 0.0001,
            band_prefix: "B".into(),
        }
    }
}

/// Invalidate every band where `score_band < threshold`
pub fn cloud_mask(layer: &RasterLayer, score_band: &str, threshold: f64) -> Result<RasterLayer> {
    let score = layer.require_band(score_band)?;
    let clear = score.map(|s| u8::from(s.is_finite() && s >= threshold));
    layer.update_mask(&clear)
}

/// Multiply every band by `scale`
pub fn scale_reflectance(layer: &RasterLayer, scale: f64) -> Result<RasterLayer> {
    layer.map_bands(|_, raster| Ok(raster.map(|v| v * scale)))
}

/// Cloud mask, reflectance band selection and scaling of one acquisition
pub fn prepare_optical(layer: &RasterLayer, params: &OpticalParams) -> Result<RasterLayer> {
    let masked = match &params.cloud_score_band {
        Some(band) => cloud_mask(layer, band, params.clear_threshold)?,
        None => layer.clone(),
    };
    let reflectance = masked.select_where(|name| name.starts_with(&params.band_prefix));
    if reflectance.is_empty() {
        return Err(Error::MissingBand(format!("{}*", params.band_prefix)));
    }
    scale_reflectance(&reflectance, params.reflectance_scale)
}

// ---------------------------------------------------------------------------
// Biomass observations
// ---------------------------------------------------------------------------

/// Quality screening of sparse biomass-density observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomassQuality {
    /// Density band, kept in the output
    pub label_band: String,
    /// Standard-error band of the density
    pub error_band: String,
    /// Must equal 1 where present
    pub quality_flag_band: String,
    /// Must equal 0 where present
    pub degrade_flag_band: String,
    /// Ceiling on `error / label`
    pub max_relative_error: f64,
    /// Observations at or above this density are rejected
    pub max_label: f64,
}

impl Default for BiomassQuality {
    fn default() -> Self {
        Self {
            label_band: "agbd".into(),
            error_band: "agbd_se".into(),
            quality_flag_band: "l4_quality_flag".into(),
            degrade_flag_band: "degrade_flag".into(),
            max_relative_error: 0.5,
            max_label: 650.0,
        }
    }
}

/// Screen one biomass acquisition.
///
/// Returns a single-band layer named after `label_band` where rejected
/// observations are NaN. A flag or error band absent from `layer` skips
/// that check; the label band itself is required.
pub fn biomass_quality_mask(layer: &RasterLayer, quality: &BiomassQuality) -> Result<RasterLayer> {
    let label = layer.require_band(&quality.label_band)?;
    let error = layer.band(&quality.error_band);
    let quality_flag = layer.band(&quality.quality_flag_band);
    let degrade_flag = layer.band(&quality.degrade_flag_band);

    for band in [error, quality_flag, degrade_flag].into_iter().flatten() {
        label.ensure_same_shape(band)?;
    }

    let (rows, cols) = label.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let agbd = unsafe { label.get_unchecked(row, col) };
                if label.is_nodata(agbd) || agbd >= quality.max_label {
                    continue;
                }
                if let Some(flag) = quality_flag {
                    if unsafe { flag.get_unchecked(row, col) } != 1.0 {
                        continue;
                    }
                }
                if let Some(flag) = degrade_flag {
                    if unsafe { flag.get_unchecked(row, col) } != 0.0 {
                        continue;
                    }
                }
                if let Some(se) = error {
                    let relative = unsafe { se.get_unchecked(row, col) } / agbd;
                    if relative.is_nan() || relative > quality.max_relative_error {
                        continue;
                    }
                }
                *cell = agbd;
            }
            row_data
        })
        .collect();

    let screened = build_output(label, rows, cols, data)?;
    let out = RasterLayer::from_band(quality.label_band.clone(), screened);
    Ok(match layer.acquired() {
        Some(date) => out.with_acquired(date),
        None => out,
    })
}

/// Invalidate every band where `slope >= max_slope_deg` or slope is unknown
pub fn slope_mask(layer: &RasterLayer, slope: &Raster<f64>, max_slope_deg: f64) -> Result<RasterLayer> {
    let keep = slope.map(|s| u8::from(s.is_finite() && s < max_slope_deg));
    layer.update_mask(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(values: &[f64]) -> Raster<f64> {
        Raster::from_vec(values.to_vec(), 1, values.len()).unwrap()
    }

    #[test]
    fn test_cloud_mask_threshold_inclusive() {
        let layer = RasterLayer::from_band("B4", band(&[1000.0, 1000.0, 1000.0]))
            .with_band("cs", band(&[0.49, 0.5, f64::NAN]))
            .unwrap();
        let out = cloud_mask(&layer, "cs", 0.5).unwrap();
        let b4 = out.band("B4").unwrap();
        assert!(b4.get(0, 0).unwrap().is_nan());
        assert_eq!(b4.get(0, 1).unwrap(), 1000.0);
        assert!(b4.get(0, 2).unwrap().is_nan());
    }

    #[test]
    fn test_prepare_optical_selects_and_scales() {
        let layer = RasterLayer::from_band("B4", band(&[1000.0, 2000.0]))
            .with_band("B8", band(&[3000.0, 4000.0]))
            .unwrap()
            .with_band("cs", band(&[0.9, 0.1]))
            .unwrap();
        let out = prepare_optical(&layer, &OpticalParams::default()).unwrap();
        assert_eq!(out.band_names(), vec!["B4", "B8"]);
        assert!((out.band("B8").unwrap().get(0, 0).unwrap() - 0.3).abs() < 1e-12);
        assert!(out.band("B8").unwrap().get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_prepare_optical_requires_score_band_when_configured() {
        let layer = RasterLayer::from_band("B4", band(&[1000.0]));
        assert!(matches!(
            prepare_optical(&layer, &OpticalParams::default()),
            Err(Error::MissingBand(_))
        ));
    }

    #[test]
    fn test_biomass_quality_rules() {
        // ok, bad flag, degraded, high error, too large, missing
        let layer = RasterLayer::from_band("agbd", band(&[100.0, 100.0, 100.0, 100.0, 700.0, f64::NAN]))
            .with_band("agbd_se", band(&[20.0, 20.0, 20.0, 60.0, 10.0, 1.0]))
            .unwrap()
            .with_band("l4_quality_flag", band(&[1.0, 0.0, 1.0, 1.0, 1.0, 1.0]))
            .unwrap()
            .with_band("degrade_flag", band(&[0.0, 0.0, 1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        let out = biomass_quality_mask(&layer, &BiomassQuality::default()).unwrap();
        assert_eq!(out.band_names(), vec!["agbd"]);
        let agbd = out.band("agbd").unwrap();
        assert_eq!(agbd.get(0, 0).unwrap(), 100.0);
        for col in 1..6 {
            assert!(agbd.get(0, col).unwrap().is_nan(), "col {} should be masked", col);
        }
    }

    #[test]
    fn test_biomass_quality_skips_absent_flags() {
        let layer = RasterLayer::from_band("agbd", band(&[100.0, 649.0]));
        let out = biomass_quality_mask(&layer, &BiomassQuality::default()).unwrap();
        assert_eq!(out.band("agbd").unwrap().statistics().valid_count, 2);
    }

    #[test]
    fn test_slope_mask() {
        let layer = RasterLayer::from_band("agbd", band(&[50.0, 50.0, 50.0]));
        let slope = band(&[10.0, 30.0, f64::NAN]);
        let out = slope_mask(&layer, &slope, 30.0).unwrap();
        assert_eq!(out.band("agbd").unwrap().statistics().valid_count, 1);
    }
}
