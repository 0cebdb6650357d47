//! Statistics over predicted biomass
//!
//! - Masking and area-weighted aggregation
//! - Year-over-year change with explicit undefined ratios
//! - Two-endpoint trend

mod aggregate;
mod change;
mod trend;

pub use aggregate::{aggregate, apply_mask, AggregateResult, M2_PER_HA};
pub use change::{percent_change, year_over_year, AnnualTotal, Ratio, YearOverYear};
pub use trend::{estimate_trend, TrendResult, TrendSummary};
