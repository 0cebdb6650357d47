//! Two-endpoint biomass trend
//!
//! The annual rate is `(last - first) / period_count`, where `first` and
//! `last` are the earliest and latest available predictions and
//! `period_count` is the number of years nominally spanned by the run.

use crate::util::build_output;
use agbmap_core::raster::Raster;
use agbmap_core::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-pixel annual rate plus its summary
#[derive(Debug, Clone)]
pub struct TrendResult {
    /// Annual rate of change (density units per year)
    pub raster: Raster<f64>,
    pub summary: TrendSummary,
}

/// Scalar description of a trend raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub first_year: i32,
    pub last_year: i32,
    pub period_count: u32,
    /// Smallest finite rate, `None` when no pixel is valid in both endpoints
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Average annual change between the first and last available period.
///
/// # Arguments
/// * `periods` - (year, predicted density) of every completed period, any order
/// * `span` - (start_year, end_year) of the run, inclusive
///
/// # Returns
/// `None` when fewer than two periods are available. Pixels invalid in
/// either endpoint are NaN.
pub fn estimate_trend(periods: &[(i32, &Raster<f64>)], span: (i32, i32)) -> Result<Option<TrendResult>> {
    let (start, end) = span;
    if end < start {
        return Err(Error::InvalidParameter {
            name: "span",
            value: format!("{}..={}", start, end),
            reason: "end year precedes start year".into(),
        });
    }
    let period_count = (end - start + 1) as u32;

    let Some(&(first_year, first)) = periods.iter().min_by_key(|(year, _)| *year) else {
        return Ok(None);
    };
    let Some(&(last_year, last)) = periods.iter().max_by_key(|(year, _)| *year) else {
        return Ok(None);
    };
    if first_year == last_year {
        return Ok(None);
    }
    first.ensure_same_shape(last)?;

    let (rows, cols) = first.shape();
    let divisor = period_count as f64;
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let a = unsafe { first.get_unchecked(row, col) };
                let b = unsafe { last.get_unchecked(row, col) };
                if first.is_nodata(a) || last.is_nodata(b) {
                    continue;
                }
                *cell = (b - a) / divisor;
            }
            row_data
        })
        .collect();

    let raster = build_output(first, rows, cols, data)?;
    let stats = raster.statistics();

    Ok(Some(TrendResult {
        raster,
        summary: TrendSummary {
            first_year,
            last_year,
            period_count,
            min: stats.min,
            max: stats.max,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_endpoints_over_nominal_span() {
        let mut y2021 = Raster::filled(2, 2, 100.0);
        let y2023 = Raster::filled(2, 2, 160.0);
        y2021.set(1, 1, f64::NAN).unwrap();

        let trend = estimate_trend(&[(2023, &y2023), (2021, &y2021)], (2021, 2023))
            .unwrap()
            .unwrap();
        assert_eq!(trend.summary.first_year, 2021);
        assert_eq!(trend.summary.last_year, 2023);
        assert_eq!(trend.summary.period_count, 3);
        assert_relative_eq!(trend.raster.get(0, 0).unwrap(), 20.0);
        assert!(trend.raster.get(1, 1).unwrap().is_nan());
        assert_eq!(trend.summary.min, Some(20.0));
        assert_eq!(trend.summary.max, Some(20.0));
    }

    #[test]
    fn test_middle_periods_ignored() {
        let a = Raster::filled(1, 1, 10.0);
        let b = Raster::filled(1, 1, 1000.0);
        let c = Raster::filled(1, 1, 30.0);
        let trend = estimate_trend(&[(2020, &a), (2021, &b), (2024, &c)], (2020, 2024))
            .unwrap()
            .unwrap();
        assert_relative_eq!(trend.raster.get(0, 0).unwrap(), 4.0);
    }

    #[test]
    fn test_single_period_has_no_trend() {
        let a = Raster::filled(1, 1, 10.0);
        assert!(estimate_trend(&[(2021, &a)], (2021, 2023)).unwrap().is_none());
        assert!(estimate_trend(&[], (2021, 2023)).unwrap().is_none());
        assert!(estimate_trend(&[(2021, &a)], (2023, 2021)).is_err());
    }
}
