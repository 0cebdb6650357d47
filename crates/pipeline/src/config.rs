//! Run configuration
//!
//! One TOML document fixes everything a run depends on. Every field has a
//! default, so a minimal file only needs the analysis region:
//!
//! ```toml
//! [analysis]
//! start_year = 2021
//! end_year = 2023
//! crs = "EPSG:32749"
//! scale = 100.0
//! region = [500000.0, 9000000.0, 520000.0, 9020000.0]
//! ```

use crate::error::{PipelineError, Result};
use agbmap_algorithms::imagery::{BiomassQuality, OpticalParams, SpectralBands};
use agbmap_algorithms::regression::ForestParams;
use agbmap_algorithms::sampling::StratifiedParams;
use agbmap_core::{AnalysisGrid, Region, CRS};
use agbmap_parallel::{CancelFlag, ComputeBudget, ProcessingMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Time span and analysis grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub start_year: i32,
    /// Inclusive
    pub end_year: i32,
    /// CRS of the analysis grid and region, e.g. `"EPSG:32749"`
    pub crs: String,
    /// Grid pixel size in CRS units (metres for UTM)
    pub scale: f64,
    /// Region bounds `[min_x, min_y, max_x, max_y]` in `crs`
    pub region: Option<[f64; 4]>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            start_year: 2021,
            end_year: 2023,
            crs: "EPSG:32749".into(),
            scale: 100.0,
            region: None,
        }
    }
}

/// Land-cover classes treated as vegetation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandCoverConfig {
    pub vegetation_classes: Vec<i64>,
}

impl Default for LandCoverConfig {
    /// ESA WorldCover tree cover, shrubland, grassland, cropland and mangroves
    fn default() -> Self {
        Self {
            vegetation_classes: vec![10, 20, 30, 40, 95],
        }
    }
}

/// Screening thresholds for optical imagery and biomass observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub cloud_masking: bool,
    pub cloud_score_band: String,
    /// Minimum clear-sky score
    pub clear_threshold: f64,
    pub reflectance_scale: f64,
    pub reflectance_prefix: String,
    pub spectral_bands: SpectralBands,
    /// Ceiling on standard error / density
    pub max_relative_error: f64,
    /// Observations on slopes at or above this (degrees) are dropped
    pub max_slope_deg: f64,
    /// Observations at or above this density are dropped
    pub max_label: f64,
    pub error_band: String,
    pub quality_flag_band: String,
    pub degrade_flag_band: String,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let optical = OpticalParams::default();
        let biomass = BiomassQuality::default();
        Self {
            cloud_masking: true,
            cloud_score_band: optical.cloud_score_band.unwrap_or_else(|| "cs".into()),
            clear_threshold: optical.clear_threshold,
            reflectance_scale: optical.reflectance_scale,
            reflectance_prefix: optical.band_prefix,
            spectral_bands: SpectralBands::default(),
            max_relative_error: biomass.max_relative_error,
            max_slope_deg: 30.0,
            max_label: biomass.max_label,
            error_band: biomass.error_band,
            quality_flag_band: biomass.quality_flag_band,
            degrade_flag_band: biomass.degrade_flag_band,
        }
    }
}

impl QualityConfig {
    pub fn optical_params(&self) -> OpticalParams {
        OpticalParams {
            cloud_score_band: self.cloud_masking.then(|| self.cloud_score_band.clone()),
            clear_threshold: self.clear_threshold,
            reflectance_scale: self.reflectance_scale,
            band_prefix: self.reflectance_prefix.clone(),
        }
    }

    pub fn biomass_quality(&self, label_band: &str) -> BiomassQuality {
        BiomassQuality {
            label_band: label_band.to_string(),
            error_band: self.error_band.clone(),
            quality_flag_band: self.quality_flag_band.clone(),
            degrade_flag_band: self.degrade_flag_band.clone(),
            max_relative_error: self.max_relative_error,
            max_label: self.max_label,
        }
    }
}

/// Random forest settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub trees: usize,
    pub min_leaf: usize,
    pub bag_fraction: f64,
    /// `None` tries floor(sqrt(p)) features per split
    pub features_per_split: Option<usize>,
    pub max_depth: Option<usize>,
    pub seed: u64,
    pub min_training_rows: usize,
    /// Biomass density band of the observations
    pub label_band: String,
    /// Name of the predicted band
    pub output_name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let forest = ForestParams::default();
        Self {
            trees: forest.n_trees,
            min_leaf: forest.min_leaf,
            bag_fraction: forest.bag_fraction,
            features_per_split: forest.max_features,
            max_depth: forest.max_depth,
            seed: forest.seed,
            min_training_rows: forest.min_training_rows,
            label_band: "agbd".into(),
            output_name: forest.output_name,
        }
    }
}

impl ModelConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.trees,
            max_features: self.features_per_split,
            min_leaf: self.min_leaf,
            bag_fraction: self.bag_fraction,
            max_depth: self.max_depth,
            seed: self.seed,
            min_training_rows: self.min_training_rows,
            output_name: self.output_name.clone(),
        }
    }
}

/// Compute limits and concurrency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Ceiling on pixels (or rows) touched by one reduction
    pub max_pixels: u64,
    pub tile_size: usize,
    /// Worker threads, all cores when unset
    pub threads: Option<usize>,
    /// Process periods concurrently
    pub parallel_periods: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        let budget = ComputeBudget::default();
        Self {
            max_pixels: budget.max_pixels,
            tile_size: budget.tile_size,
            threads: None,
            parallel_periods: false,
        }
    }
}

impl ResourceConfig {
    pub fn budget(&self, cancel: CancelFlag) -> ComputeBudget {
        ComputeBudget {
            max_pixels: self.max_pixels,
            tile_size: self.tile_size,
            mode: ProcessingMode::from_threads(self.threads),
            cancel,
        }
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Complete configuration of one pipeline run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub analysis: AnalysisConfig,
    pub landcover: LandCoverConfig,
    pub quality: QualityConfig,
    pub sampling: StratifiedParams,
    pub model: ModelConfig,
    pub resources: ResourceConfig,
}

impl RunConfig {
    /// Read and validate a TOML configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_years(mut self, start_year: i32, end_year: i32) -> Self {
        self.analysis.start_year = start_year;
        self.analysis.end_year = end_year;
        self
    }

    pub fn with_grid(mut self, crs: impl Into<String>, scale: f64) -> Self {
        self.analysis.crs = crs.into();
        self.analysis.scale = scale;
        self
    }

    pub fn with_region(mut self, bounds: [f64; 4]) -> Self {
        self.analysis.region = Some(bounds);
        self
    }

    /// Years processed by the run, in order
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.analysis.start_year..=self.analysis.end_year
    }

    pub fn crs(&self) -> Result<CRS> {
        self.analysis
            .crs
            .parse()
            .map_err(|_| PipelineError::Config(format!("analysis.crs: cannot parse '{}'", self.analysis.crs)))
    }

    fn region_bounds(&self) -> Result<(f64, f64, f64, f64)> {
        let [min_x, min_y, max_x, max_y] = self
            .analysis
            .region
            .ok_or_else(|| PipelineError::Config("analysis.region is required".into()))?;
        Ok((min_x, min_y, max_x, max_y))
    }

    /// Region polygon in the grid CRS
    pub fn region(&self) -> Result<Region> {
        Ok(Region::from_bounds(self.crs()?, self.region_bounds()?))
    }

    /// Analysis grid covering the region at `analysis.scale`
    pub fn analysis_grid(&self) -> Result<AnalysisGrid> {
        Ok(AnalysisGrid::from_bounds(
            self.crs()?,
            self.region_bounds()?,
            self.analysis.scale,
        )?)
    }

    /// Check ranges and cross-field consistency
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PipelineError::Config(msg));
        let a = &self.analysis;

        if a.end_year < a.start_year {
            return fail(format!(
                "analysis.end_year ({}) precedes start_year ({})",
                a.end_year, a.start_year
            ));
        }
        if !(a.scale.is_finite() && a.scale > 0.0) {
            return fail(format!("analysis.scale must be positive, got {}", a.scale));
        }
        self.crs()?;
        let (min_x, min_y, max_x, max_y) = self.region_bounds()?;
        if !(min_x < max_x && min_y < max_y) {
            return fail("analysis.region must have min < max on both axes".into());
        }
        if self.landcover.vegetation_classes.is_empty() {
            return fail("landcover.vegetation_classes is empty".into());
        }

        let q = &self.quality;
        if !(q.reflectance_scale.is_finite() && q.reflectance_scale > 0.0) {
            return fail("quality.reflectance_scale must be positive".into());
        }
        if !(q.max_relative_error > 0.0) || !(q.max_slope_deg > 0.0) || !(q.max_label > 0.0) {
            return fail("quality ceilings must be positive".into());
        }

        if self.sampling.points_per_class[1] == 0 {
            return fail("sampling.points_per_class[1] must be positive".into());
        }

        let m = &self.model;
        if m.trees == 0 {
            return fail("model.trees must be positive".into());
        }
        if !(m.bag_fraction > 0.0 && m.bag_fraction <= 1.0) {
            return fail(format!("model.bag_fraction must be in (0, 1], got {}", m.bag_fraction));
        }
        if m.features_per_split == Some(0) {
            return fail("model.features_per_split must be positive".into());
        }
        if m.label_band.is_empty() || m.output_name.is_empty() {
            return fail("model.label_band and model.output_name must be set".into());
        }

        let r = &self.resources;
        if r.max_pixels == 0 || r.tile_size == 0 {
            return fail("resources.max_pixels and resources.tile_size must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[analysis]
start_year = 2021
end_year = 2023
region = [500000.0, 9000000.0, 501000.0, 9001000.0]
"#;

    #[test]
    fn test_minimal_uses_defaults() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.analysis.crs, "EPSG:32749");
        assert_eq!(config.analysis.scale, 100.0);
        assert_eq!(config.landcover.vegetation_classes, vec![10, 20, 30, 40, 95]);
        assert_eq!(config.sampling.points_per_class, [0, 1000]);
        assert_eq!(config.model.trees, 50);
        assert_eq!(config.quality.max_slope_deg, 30.0);
        assert_eq!(config.years().count(), 3);

        let grid = config.analysis_grid().unwrap();
        assert_eq!(grid.shape(), (10, 10));
    }

    #[test]
    fn test_sections_override() {
        let text = format!(
            "{}\n[model]\ntrees = 10\nseed = 4\n\n[sampling]\npoints_per_class = [20, 200]\n\n[quality]\ncloud_masking = false\n",
            MINIMAL
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.model.forest_params().n_trees, 10);
        assert_eq!(config.sampling.points_per_class, [20, 200]);
        assert!(config.quality.optical_params().cloud_score_band.is_none());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            RunConfig::from_toml_str("[analysis]\nstart_year = 2021\n"),
            Err(PipelineError::Config(_))
        ));

        let base = RunConfig::default().with_region([0.0, 0.0, 100.0, 100.0]);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_years(2023, 2021).validate().is_err());
        assert!(base.clone().with_grid("EPSG:32749", 0.0).validate().is_err());
        assert!(base.clone().with_grid("not a crs", 100.0).validate().is_err());

        let mut no_trees = base.clone();
        no_trees.model.trees = 0;
        assert!(no_trees.validate().is_err());
    }

    #[test]
    fn test_unknown_toml_is_an_error() {
        assert!(matches!(
            RunConfig::from_toml_str("[analysis\n"),
            Err(PipelineError::Toml(_))
        ));
    }
}
