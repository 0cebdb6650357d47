//! Coordinate Reference System handling

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation (primary)
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// UTM zone on the WGS84 datum (EPSG:326xx north, 327xx south)
    pub fn utm(zone: u32, north: bool) -> Self {
        Self::from_epsg(if north { 32600 + zone } else { 32700 + zone })
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326))
    }

    /// Same EPSG code, or identical WKT or PROJ text when codes are unknown
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => {
                matches!((&self.wkt, &other.wkt), (Some(a), Some(b)) if a == b)
                    || matches!((&self.proj, &other.proj), (Some(a), Some(b)) if a == b)
            }
        }
    }

    /// Short label: `EPSG:<code>`, the PROJ string, or the start of the WKT
    pub fn identifier(&self) -> String {
        match (self.epsg, &self.proj, &self.wkt) {
            (Some(code), _, _) => format!("EPSG:{}", code),
            (None, Some(proj), _) => proj.clone(),
            (None, None, Some(wkt)) => format!("WKT:{}", wkt.chars().take(50).collect::<String>()),
            (None, None, None) => "Unknown".to_string(),
        }
    }
}

/// Parses `EPSG:<code>`, a PROJ string (`+proj=...`) or a WKT definition.
impl FromStr for CRS {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((authority, code)) = s.split_once(':') {
            if authority.eq_ignore_ascii_case("epsg") {
                return code
                    .trim()
                    .parse::<u32>()
                    .map(CRS::from_epsg)
                    .map_err(|_| Error::InvalidCrs(s.to_string()));
            }
        }
        if s.starts_with("+proj") {
            return Ok(CRS::from_proj(s));
        }
        if s.contains('[') {
            return Ok(CRS::from_wkt(s));
        }
        Err(Error::InvalidCrs(s.to_string()))
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
        assert!(crs.is_geographic());
    }

    #[test]
    fn test_crs_equivalence() {
        let a = CRS::from_epsg(32749);
        let b = CRS::utm(49, false);
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&CRS::wgs84()));
    }

    #[test]
    fn test_crs_parse() {
        let crs: CRS = "EPSG:32749".parse().unwrap();
        assert_eq!(crs.epsg(), Some(32749));

        let lower: CRS = "epsg: 4326".parse().unwrap();
        assert_eq!(lower.epsg(), Some(4326));

        let proj: CRS = "+proj=utm +zone=49 +south".parse().unwrap();
        assert!(proj.proj().is_some());

        assert!("EPSG:abc".parse::<CRS>().is_err());
        assert!("mercator".parse::<CRS>().is_err());
    }
}
