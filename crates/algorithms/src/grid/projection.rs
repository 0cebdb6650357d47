//! Coordinate transforms between the CRSs of input products and the grid
//!
//! EPSG:4326 and the WGS84 UTM zones (326xx/327xx) use inline Snyder (1987)
//! formulas. Any other EPSG code, or a CRS carrying a PROJ string, goes
//! through `proj4rs`.

use agbmap_core::{Error, Result, CRS};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use std::fmt;
use std::sync::Arc;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

const WGS84_LONGLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Approximate metres per degree, for comparing resolutions across CRS kinds
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// A CRS handled by proj4rs
struct ProjFrame {
    definition: String,
    proj: Proj,
    wgs84: Proj,
    geographic: bool,
}

impl ProjFrame {
    fn of(crs: &CRS) -> Option<Self> {
        let definition = match (crs.proj(), crs.epsg()) {
            (Some(text), _) => text.to_string(),
            (None, Some(code)) => {
                let code = u16::try_from(code).ok()?;
                crs_definitions::from_code(code)?.proj4.to_string()
            }
            (None, None) => return None,
        };
        let proj = Proj::from_proj_string(&definition).ok()?;
        let wgs84 = Proj::from_proj_string(WGS84_LONGLAT).ok()?;
        let geographic = definition.contains("+proj=longlat") || definition.contains("+proj=latlong");
        Some(Self {
            definition,
            proj,
            wgs84,
            geographic,
        })
    }

    fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let mut point = if self.geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.proj, &self.wgs84, &mut point).ok()?;
        Some((point.0.to_degrees(), point.1.to_degrees()))
    }

    fn from_geographic(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&self.wgs84, &self.proj, &mut point).ok()?;
        if self.geographic {
            Some((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Some((point.0, point.1))
        }
    }
}

impl fmt::Debug for ProjFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjFrame")
            .field("definition", &self.definition)
            .field("geographic", &self.geographic)
            .finish_non_exhaustive()
    }
}

/// A supported coordinate system
#[derive(Debug, Clone)]
enum Frame {
    Geographic,
    Utm { zone: u32, north: bool },
    Proj(Arc<ProjFrame>),
}

impl Frame {
    fn of(crs: &CRS) -> Option<Self> {
        match crs.epsg() {
            Some(4326) => return Some(Frame::Geographic),
            Some(epsg) => {
                if let Some((zone, north)) = parse_utm_epsg(epsg) {
                    return Some(Frame::Utm { zone, north });
                }
            }
            None => {}
        }
        ProjFrame::of(crs).map(|p| Frame::Proj(Arc::new(p)))
    }

    fn is_geographic(&self) -> bool {
        match self {
            Frame::Geographic => true,
            Frame::Utm { .. } => false,
            Frame::Proj(p) => p.geographic,
        }
    }

    fn same_as(&self, other: &Frame) -> bool {
        match (self, other) {
            (Frame::Geographic, Frame::Geographic) => true,
            (Frame::Utm { zone: a, north: n }, Frame::Utm { zone: b, north: m }) => a == b && n == m,
            (Frame::Proj(a), Frame::Proj(b)) => a.definition == b.definition,
            _ => false,
        }
    }

    fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            Frame::Geographic => Some((x, y)),
            Frame::Utm { zone, north } => Some(utm_to_wgs84(x, y, *zone, *north)),
            Frame::Proj(p) => p.to_geographic(x, y),
        }
    }

    fn from_geographic(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match self {
            Frame::Geographic => Some((lon, lat)),
            Frame::Utm { zone, north } => Some(wgs84_to_utm(lon, lat, *zone, *north)),
            Frame::Proj(p) => p.from_geographic(lon, lat),
        }
    }
}

/// Point transform between two CRSs
#[derive(Debug, Clone)]
pub enum CoordTransform {
    /// Same CRS on both sides
    Identity,
    /// Through geographic coordinates
    Between { from: FrameId, to: FrameId },
}

/// Opaque handle for a supported CRS
#[derive(Debug, Clone)]
pub struct FrameId(Frame);

impl CoordTransform {
    /// Transform from `from` coordinates to `to` coordinates.
    ///
    /// Fails with [`Error::CrsMismatch`] when either CRS has neither a
    /// known EPSG code nor a PROJ string and the two are not equivalent.
    pub fn between(from: &CRS, to: &CRS) -> Result<Self> {
        if from.is_equivalent(to) {
            return Ok(CoordTransform::Identity);
        }
        match (Frame::of(from), Frame::of(to)) {
            (Some(a), Some(b)) if a.same_as(&b) => Ok(CoordTransform::Identity),
            (Some(a), Some(b)) => Ok(CoordTransform::Between {
                from: FrameId(a),
                to: FrameId(b),
            }),
            _ => Err(Error::CrsMismatch(from.identifier(), to.identifier())),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, CoordTransform::Identity)
    }

    /// Transform one point; NaN when the point is outside the projection
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            CoordTransform::Identity => (x, y),
            CoordTransform::Between { from, to } => from
                .0
                .to_geographic(x, y)
                .and_then(|(lon, lat)| to.0.from_geographic(lon, lat))
                .unwrap_or((f64::NAN, f64::NAN)),
        }
    }
}

/// Longitude/latitude (degrees) of a point in `crs`, `None` if unsupported
pub fn to_geographic(crs: &CRS, x: f64, y: f64) -> Option<(f64, f64)> {
    Frame::of(crs)?.to_geographic(x, y)
}

/// Geographic converter for repeated use, `None` if `crs` is unsupported
pub(crate) fn geographic_converter(crs: &CRS) -> Option<impl Fn(f64, f64) -> Option<(f64, f64)> + Sync> {
    let frame = Frame::of(crs)?;
    Some(move |x, y| frame.to_geographic(x, y))
}

fn is_geographic(crs: &CRS) -> bool {
    crs.is_geographic() || Frame::of(crs).is_some_and(|f| f.is_geographic())
}

/// Size of one `from` unit expressed in `to` units
pub fn unit_ratio(from: &CRS, to: &CRS) -> f64 {
    match (is_geographic(from), is_geographic(to)) {
        (true, false) => METRES_PER_DEGREE,
        (false, true) => 1.0 / METRES_PER_DEGREE,
        _ => 1.0,
    }
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

// ── Core projection (Snyder 1987, USGS Prof. Paper 1395, pp. 61-64) ─────

/// WGS84 (longitude, latitude) in degrees to UTM (easting, northing) in metres
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

/// UTM (easting, northing) in metres to WGS84 (longitude, latitude) in degrees
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;

    // Footpoint latitude (Snyder eq. 8-18, 7-19, 3-26)
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let sq = (1.0 - E2).sqrt();
    let e1 = (1.0 - sq) / (1.0 + sq);
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let cos1 = phi1.cos();
    let tan1 = phi1.tan();
    let c1 = E_PRIME2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let w = 1.0 - E2 * sin1 * sin1;
    let n1 = A / w.sqrt();
    let r1 = A * (1.0 - E2) / w.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d2 * d2;
    let d5 = d4 * d;
    let d6 = d4 * d2;

    // Snyder eq. 8-17
    let lat = phi1
        - (n1 * tan1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    // Snyder eq. 8-18
    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians), Snyder eq. 3-21
fn meridional_arc(lat: f64) -> f64 {
    let e2 = E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
