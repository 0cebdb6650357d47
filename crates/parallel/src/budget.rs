//! Compute budget shared by long-running reductions

use crate::strategy::ProcessingMode;
use agbmap_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag.
///
/// Clones share the same flag; cancelling one cancels all.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Resource limits and concurrency settings for one run.
///
/// Passed explicitly into sampling, training and aggregation. Any single
/// operation touching more than `max_pixels` cells (or rows) fails with
/// [`Error::ResourceExceeded`] before doing the work.
#[derive(Debug, Clone)]
pub struct ComputeBudget {
    /// Ceiling on pixels/rows processed by one operation
    pub max_pixels: u64,
    /// Tile edge length for tiled reductions
    pub tile_size: usize,
    /// Thread usage inside operations
    pub mode: ProcessingMode,
    /// Shared cancellation flag
    pub cancel: CancelFlag,
}

impl Default for ComputeBudget {
    fn default() -> Self {
        Self {
            max_pixels: 10_000_000_000,
            tile_size: 256,
            mode: ProcessingMode::Parallel,
            cancel: CancelFlag::new(),
        }
    }
}

impl ComputeBudget {
    /// Budget with a pixel ceiling and default settings otherwise
    pub fn with_max_pixels(max_pixels: u64) -> Self {
        Self {
            max_pixels,
            ..Self::default()
        }
    }

    /// Fails if cancelled or if `pixels` exceeds the ceiling
    pub fn check(&self, operation: &'static str, pixels: u64) -> Result<()> {
        self.ensure_active()?;
        if pixels > self.max_pixels {
            return Err(Error::ResourceExceeded {
                operation,
                requested: pixels,
                limit: self.max_pixels,
            });
        }
        Ok(())
    }

    /// Fails with [`Error::Cancelled`] once the flag is set
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling() {
        let budget = ComputeBudget::with_max_pixels(100);
        assert!(budget.check("aggregate", 100).is_ok());
        let err = budget.check("aggregate", 101).unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceExceeded {
                operation: "aggregate",
                requested: 101,
                limit: 100
            }
        ));
        assert!(err.is_budget());
    }

    #[test]
    fn test_cancel_is_shared() {
        let budget = ComputeBudget::default();
        let handle = budget.cancel.clone();
        assert!(budget.ensure_active().is_ok());
        handle.cancel();
        assert!(matches!(budget.check("train", 1), Err(Error::Cancelled)));
    }
}
