//! Error types for pipeline runs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while configuring or running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("core error: {0}")]
    Core(#[from] agbmap_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("cannot read {path}: {source}")]
    Source {
        path: PathBuf,
        source: agbmap_core::Error,
    },
}

impl PipelineError {
    /// Budget ceiling hit or run cancelled
    pub fn is_budget(&self) -> bool {
        matches!(self, PipelineError::Core(e) if e.is_budget())
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
