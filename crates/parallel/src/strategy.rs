//! Parallel processing strategies

use rayon::prelude::*;
use tracing::warn;

/// Processing mode for pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// `None` uses every core, `Some(1)` runs sequentially
    pub fn from_threads(threads: Option<usize>) -> Self {
        match threads {
            None | Some(0) => ProcessingMode::Parallel,
            Some(1) => ProcessingMode::Sequential,
            Some(n) => ProcessingMode::ParallelWith(n),
        }
    }

    /// Run `op` inside a pool sized for this mode.
    ///
    /// If a dedicated pool cannot be built, `op` runs on the global pool.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        match self {
            ProcessingMode::ParallelWith(threads) => {
                match rayon::ThreadPoolBuilder::new().num_threads(*threads).build() {
                    Ok(pool) => pool.install(op),
                    Err(e) => {
                        warn!("cannot build {}-thread pool ({}), using global pool", threads, e);
                        op()
                    }
                }
            }
            _ => op(),
        }
    }
}

/// Strategy for parallel execution
pub trait ParallelStrategy {
    /// Execute a function over indices
    fn par_for_each<F>(&self, range: std::ops::Range<usize>, f: F)
    where
        F: Fn(usize) + Sync + Send;

    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_for_each<F>(&self, range: std::ops::Range<usize>, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.for_each(f),
            _ => self.install(|| range.into_par_iter().for_each(f)),
        }
    }

    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.map(f).collect(),
            _ => self.install(|| range.into_par_iter().map(f).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_par_map_keeps_order() {
        for mode in [
            ProcessingMode::Sequential,
            ProcessingMode::Parallel,
            ProcessingMode::ParallelWith(2),
        ] {
            let out = mode.par_map(0..100, |i| i * 2);
            assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_par_for_each_visits_all() {
        let count = AtomicUsize::new(0);
        ProcessingMode::ParallelWith(3).par_for_each(0..50, |_| {
            count.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn test_from_threads() {
        assert_eq!(ProcessingMode::from_threads(None), ProcessingMode::Parallel);
        assert_eq!(ProcessingMode::from_threads(Some(1)), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::from_threads(Some(4)), ProcessingMode::ParallelWith(4));
    }
}
