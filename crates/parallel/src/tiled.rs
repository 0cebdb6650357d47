//! Tiled reductions over rasters

use crate::budget::ComputeBudget;
use crate::strategy::ProcessingMode;
use agbmap_core::Result;
use rayon::prelude::*;

/// A rectangular window of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Row offset in the source raster
    pub row_offset: usize,
    /// Column offset in the source raster
    pub col_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
    /// Number of columns in this tile
    pub cols: usize,
}

impl Tile {
    pub fn new(row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    /// Number of cells in the tile
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source-raster (row, col) of every cell, row-major
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row_offset..self.row_offset + self.rows).flat_map(move |r| {
            (self.col_offset..self.col_offset + self.cols).map(move |c| (r, c))
        })
    }
}

/// Iterator over non-overlapping tiles covering a raster, row-major
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_size: usize,
    current_row: usize,
    current_col: usize,
}

impl TileIterator {
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            tile_size: tile_size.max(1),
            current_row: 0,
            current_col: 0,
        }
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.tile_size.min(self.total_rows - self.current_row);
        let cols = self.tile_size.min(self.total_cols - self.current_col);
        let tile = Tile::new(self.current_row, self.current_col, rows, cols);

        self.current_col += self.tile_size;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_size;
        }

        Some(tile)
    }
}

/// Map every tile of a `rows` x `cols` raster and combine the partial results.
///
/// The budget is checked once for the whole raster, and cancellation is
/// checked before each tile. Partials are combined in tile order starting
/// from `identity`, so the result does not depend on the thread count.
pub fn reduce_tiles<A, M, C>(
    operation: &'static str,
    rows: usize,
    cols: usize,
    budget: &ComputeBudget,
    identity: A,
    map: M,
    combine: C,
) -> Result<A>
where
    A: Send,
    M: Fn(&Tile) -> A + Sync + Send,
    C: Fn(A, A) -> A,
{
    budget.check(operation, (rows as u64) * (cols as u64))?;

    let tiles: Vec<Tile> = TileIterator::new(rows, cols, budget.tile_size).collect();
    let run_tile = |tile: &Tile| -> Result<A> {
        budget.ensure_active()?;
        Ok(map(tile))
    };

    let partials: Vec<Result<A>> = match budget.mode {
        ProcessingMode::Sequential => tiles.iter().map(run_tile).collect(),
        mode => mode.install(|| tiles.par_iter().map(run_tile).collect()),
    };

    partials
        .into_iter()
        .try_fold(identity, |acc, part| Ok(combine(acc, part?)))
}
