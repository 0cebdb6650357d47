//! # agbmap parallel
//!
//! Parallel execution for the agbmap pipeline.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential, all cores or a fixed thread count
//! - Tiled reductions with deterministic combination order
//! - `ComputeBudget`: pixel ceiling and cooperative cancellation shared by
//!   sampling, training and aggregation

pub mod budget;
pub mod strategy;
pub mod tiled;

pub use budget::{CancelFlag, ComputeBudget};
pub use strategy::{ParallelStrategy, ProcessingMode};
pub use tiled::{reduce_tiles, Tile, TileIterator};
