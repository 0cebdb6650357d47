//! # agbmap pipeline
//!
//! Multi-year above-ground biomass estimation as a batch job.
//!
//! A run reads a [`RunConfig`], builds one [`AnalysisGrid`](agbmap_core::AnalysisGrid)
//! and processes every year of the analysis window independently:
//!
//! 1. optical median composite with spectral indices, aligned to the grid
//! 2. screened biomass observations as labels
//! 3. stratified training sample over optical and terrain predictors
//! 4. random forest fit, in-sample RMSE and feature importance
//! 5. full-grid prediction, vegetation mask and area-weighted totals
//!
//! Periods without data are skipped, periods over budget fail, and the
//! completed ones feed the year-over-year change and the endpoint trend.
//!
//! ```no_run
//! use agbmap_pipeline::{run, write_outputs, FileSource, RunConfig};
//!
//! # fn main() -> agbmap_pipeline::Result<()> {
//! let config = RunConfig::from_path("agbmap.toml")?;
//! let source = FileSource::from_manifest("inputs/manifest.toml")?;
//! let report = run(&config, &source)?;
//! write_outputs(&report, "out")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod manifest;
pub mod period;
pub mod run;
pub mod source;

pub use config::RunConfig;
pub use error::{PipelineError, Result};
pub use export::write_outputs;
pub use manifest::{FileSource, Manifest};
pub use period::{process_period, PeriodContext, PeriodOutcome, PeriodResult, SkipReason};
pub use run::{run, run_with_cancel, RunReport};
pub use source::{Lookup, MemorySource, Query, RasterSource};
