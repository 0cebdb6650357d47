//! Alignment of arbitrary rasters onto the analysis grid
//!
//! Every target pixel is covered by an `n × n` lattice of sub-samples, where
//! `n` is the ratio of target to source resolution. Each sub-sample is
//! transformed into the source CRS, interpolated from the source raster, and
//! the lattice is reduced to one value (mean for continuous data, majority
//! for class codes). Pixels without any contributing source value are NaN.

use super::projection::{unit_ratio, CoordTransform};
use crate::util::build_output;
use agbmap_core::raster::{AnalysisGrid, Raster, RasterLayer};
use agbmap_core::Result;
use rayon::prelude::*;
use tracing::debug;

/// Most sub-samples per axis; 32² = 1024 source pixels per target pixel
pub const MAX_SUBSAMPLES: usize = 32;

/// Interpolation used to read the source at sub-sample positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resample {
    /// Value of the source pixel containing the point
    Nearest,
    /// Bilinear interpolation between the four surrounding pixel centres
    #[default]
    Bilinear,
}

/// Reduction of the sub-samples of one target pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reducer {
    /// Arithmetic mean of valid sub-samples
    #[default]
    Mean,
    /// Most frequent class code; ties go to the smallest code.
    /// Always reads the source with [`Resample::Nearest`].
    Mode,
}

/// Align every band of `layer` onto `grid`.
///
/// The result conforms to `grid` exactly. A layer that does not overlap the
/// grid yields all-NaN bands, not an error.
///
/// # Arguments
/// * `layer` - Source bands at native resolution and projection
/// * `grid` - Target analysis grid
/// * `resample` - Interpolation before reduction
/// * `reducer` - Reduction over the sub-samples of each target pixel
pub fn align(
    layer: &RasterLayer,
    grid: &AnalysisGrid,
    resample: Resample,
    reducer: Reducer,
) -> Result<RasterLayer> {
    let mut out = RasterLayer::new();
    for band in layer.bands() {
        out = out.with_band(
            band.name.clone(),
            align_raster(&band.raster, grid, resample, reducer)?,
        )?;
    }
    Ok(match layer.acquired() {
        Some(date) => out.with_acquired(date),
        None => out,
    })
}

/// Align one raster onto `grid`.
///
/// A source without CRS is taken to be in the grid CRS. Fails with
/// `CrsMismatch` only if a CRS cannot be resolved to a projection.
pub fn align_raster(
    source: &Raster<f64>,
    grid: &AnalysisGrid,
    resample: Resample,
    reducer: Reducer,
) -> Result<Raster<f64>> {
    let template = grid.empty_raster(f64::NAN);
    let (rows, cols) = grid.shape();

    if grid.conforms(source) {
        let mut out = source.clone();
        out.set_crs(Some(grid.crs().clone()));
        return Ok(out);
    }

    let source_crs = source.crs().unwrap_or(grid.crs());
    let to_source = CoordTransform::between(grid.crs(), source_crs)?;

    if !footprint_intersects(source, grid)? {
        debug!("source does not overlap the analysis grid, result is all invalid");
        return build_output(&template, rows, cols, vec![f64::NAN; rows * cols]);
    }

    let source_scale = source.cell_size() * unit_ratio(source_crs, grid.crs());
    let n = subsample_count(grid.scale(), source_scale);
    let resample = match reducer {
        Reducer::Mode => Resample::Nearest,
        Reducer::Mean => resample,
    };
    let gt = *grid.transform();
    let step = 1.0 / n as f64;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values = Vec::with_capacity(n * n);
            for (col, cell) in row_data.iter_mut().enumerate() {
                values.clear();
                for i in 0..n {
                    for j in 0..n {
                        let fc = col as f64 + (j as f64 + 0.5) * step;
                        let fr = row as f64 + (i as f64 + 0.5) * step;
                        let (x, y) = gt.fractional_to_geo(fc, fr);
                        let (sx, sy) = to_source.apply(x, y);
                        if let Some(v) = sample(source, sx, sy, resample) {
                            values.push(v);
                        }
                    }
                }
                *cell = match reducer {
                    Reducer::Mean => mean(&values),
                    Reducer::Mode => mode(&values),
                };
            }
            row_data
        })
        .collect();

    build_output(&template, rows, cols, data)
}

/// Whether the source footprint overlaps the grid extent.
///
/// The source outline (corners and edge midpoints) is transformed into the
/// grid CRS and its envelope compared to the grid bounds.
pub fn footprint_intersects(source: &Raster<f64>, grid: &AnalysisGrid) -> Result<bool> {
    let source_crs = source.crs().unwrap_or(grid.crs());
    let to_grid = CoordTransform::between(source_crs, grid.crs())?;
    let (rows, cols) = (source.rows() as f64, source.cols() as f64);

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for fr in [0.0, 0.5, 1.0] {
        for fc in [0.0, 0.5, 1.0] {
            let (x, y) = source.transform().fractional_to_geo(fc * cols, fr * rows);
            let (gx, gy) = to_grid.apply(x, y);
            min_x = min_x.min(gx);
            min_y = min_y.min(gy);
            max_x = max_x.max(gx);
            max_y = max_y.max(gy);
        }
    }

    let (gx0, gy0, gx1, gy1) = grid.bounds();
    Ok(min_x < gx1 && max_x > gx0 && min_y < gy1 && max_y > gy0)
}

/// Sub-samples per axis for a target/source resolution ratio
pub fn subsample_count(target_scale: f64, source_scale: f64) -> usize {
    if !(source_scale.is_finite() && source_scale > 0.0) {
        return 1;
    }
    let ratio = (target_scale / source_scale).ceil();
    if ratio.is_finite() {
        (ratio as usize).clamp(1, MAX_SUBSAMPLES)
    } else {
        MAX_SUBSAMPLES
    }
}

fn sample(source: &Raster<f64>, x: f64, y: f64, resample: Resample) -> Option<f64> {
    let (fc, fr) = source.geo_to_pixel(x, y);
    if !(fc.is_finite() && fr.is_finite()) {
        return None;
    }
    match resample {
        Resample::Nearest => nearest(source, fc, fr),
        Resample::Bilinear => bilinear(source, fc, fr).or_else(|| nearest(source, fc, fr)),
    }
}

fn valid_at(source: &Raster<f64>, row: isize, col: isize) -> Option<f64> {
    let (rows, cols) = source.shape();
    if row < 0 || col < 0 || row as usize >= rows || col as usize >= cols {
        return None;
    }
    let v = unsafe { source.get_unchecked(row as usize, col as usize) };
    if source.is_nodata(v) {
        None
    } else {
        Some(v)
    }
}

fn nearest(source: &Raster<f64>, fc: f64, fr: f64) -> Option<f64> {
    valid_at(source, fr.floor() as isize, fc.floor() as isize)
}

fn bilinear(source: &Raster<f64>, fc: f64, fr: f64) -> Option<f64> {
    // offsets relative to pixel centres
    let px = fc - 0.5;
    let py = fr - 0.5;
    let c0 = px.floor();
    let r0 = py.floor();
    let dx = px - c0;
    let dy = py - r0;
    let (c0, r0) = (c0 as isize, r0 as isize);

    let v00 = valid_at(source, r0, c0)?;
    let v01 = valid_at(source, r0, c0 + 1)?;
    let v10 = valid_at(source, r0 + 1, c0)?;
    let v11 = valid_at(source, r0 + 1, c0 + 1)?;

    let top = v00 * (1.0 - dx) + v01 * dx;
    let bottom = v10 * (1.0 - dx) + v11 * dx;
    Some(top * (1.0 - dy) + bottom * dy)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mode(values: &[f64]) -> f64 {
    let mut codes: Vec<i64> = values.iter().map(|v| v.round() as i64).collect();
    if codes.is_empty() {
        return f64::NAN;
    }
    codes.sort_unstable();

    let mut best = codes[0];
    let mut best_count = 0;
    let mut i = 0;
    while i < codes.len() {
        let code = codes[i];
        let run = codes[i..].iter().take_while(|&&c| c == code).count();
        if run > best_count {
            best = code;
            best_count = run;
        }
        i += run;
    }
    best as f64
}
