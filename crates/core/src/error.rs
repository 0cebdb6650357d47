//! Error types for agbmap

use thiserror::Error;

/// Main error type for agbmap operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Raster does not conform to the analysis grid: {0}")]
    GridMismatch(String),

    #[error("Band not found: {0}")]
    MissingBand(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Insufficient training data: {rows} labeled rows, at least {min} required")]
    InsufficientTrainingData { rows: usize, min: usize },

    #[error("Resource budget exceeded in {operation}: {requested} pixels requested, limit is {limit}")]
    ResourceExceeded {
        operation: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error comes from the resource budget (ceiling or cancellation)
    /// rather than from bad input.
    pub fn is_budget(&self) -> bool {
        matches!(self, Error::ResourceExceeded { .. } | Error::Cancelled)
    }
}

/// Result type alias for agbmap operations
pub type Result<T> = std::result::Result<T, Error>;
