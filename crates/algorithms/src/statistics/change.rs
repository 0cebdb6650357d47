//! Year-over-year change of annual totals

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A ratio that may be undefined (zero denominator).
///
/// Serializes as a number or the string `"undefined"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Ratio::Undefined)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Defined(v) => write!(f, "{}", v),
            Ratio::Undefined => write!(f, "undefined"),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Ratio::Defined(v) => serializer.serialize_f64(*v),
            Ratio::Undefined => serializer.serialize_str("undefined"),
        }
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RatioVisitor;

        impl<'de> Visitor<'de> for RatioVisitor {
            type Value = Ratio;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or \"undefined\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Ratio, E> {
                Ok(Ratio::Defined(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Ratio, E> {
                Ok(Ratio::Defined(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Ratio, E> {
                Ok(Ratio::Defined(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Ratio, E> {
                if v == "undefined" {
                    Ok(Ratio::Undefined)
                } else {
                    v.parse().map(Ratio::Defined).map_err(E::custom)
                }
            }
        }

        deserializer.deserialize_any(RatioVisitor)
    }
}

/// Total biomass of one year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnualTotal {
    pub year: i32,
    pub total_agb: f64,
}

/// Change between two consecutive years
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearOverYear {
    pub year: i32,
    pub change: f64,
    pub change_percent: Ratio,
}

/// `(current - previous) / previous * 100`, undefined when `previous` is 0
pub fn percent_change(previous: f64, current: f64) -> Ratio {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return Ratio::Undefined;
    }
    Ratio::Defined((current - previous) / previous * 100.0)
}

/// Change for every year whose previous calendar year also has a total.
///
/// Years after a gap have no entry.
pub fn year_over_year(totals: &[AnnualTotal]) -> Vec<YearOverYear> {
    let mut sorted = totals.to_vec();
    sorted.sort_by_key(|t| t.year);
    sorted
        .windows(2)
        .filter(|w| w[1].year == w[0].year + 1)
        .map(|w| YearOverYear {
            year: w[1].year,
            change: w[1].total_agb - w[0].total_agb,
            change_percent: percent_change(w[0].total_agb, w[1].total_agb),
        })
        .collect()
}
