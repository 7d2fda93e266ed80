use geo::{coord, Coord, Point};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::error::{Result, SegError};

/// WGS84 geographic coordinates (longitude/latitude in degrees)
pub const EPSG_WGS84: i32 = 4326;
/// Spherical Web Mercator (metres)
pub const EPSG_WEB_MERCATOR: i32 = 3857;
/// Sphere radius used by Web Mercator
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    /// Create a validated point; out-of-range values are rejected, never clamped
    pub fn new(lon: f64, lat: f64) -> Result<Self> {
        let point = GeoPoint { lon, lat };
        point.validate()?;
        Ok(point)
    }

    /// Check lon ∈ [-180, 180] and lat ∈ [-90, 90]
    pub fn validate(&self) -> Result<()> {
        if !self.lon.is_finite() {
            return Err(SegError::NonFiniteInput {
                what: "longitude",
                index: 0,
            });
        }
        if !self.lat.is_finite() {
            return Err(SegError::NonFiniteInput {
                what: "latitude",
                index: 1,
            });
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(SegError::InvalidCoordinate {
                lon: self.lon,
                lat: self.lat,
                reason: "longitude outside [-180, 180]",
            });
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(SegError::InvalidCoordinate {
                lon: self.lon,
                lat: self.lat,
                reason: "latitude outside [-90, 90]",
            });
        }
        Ok(())
    }

    pub fn to_coord(&self) -> Coord<f64> {
        coord! { x: self.lon, y: self.lat }
    }

    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Point in Web Mercator metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

impl ProjectedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        ProjectedPoint { x, y }
    }
}

/// Forward spherical Web Mercator.
///
/// Longitude scales linearly; latitude goes through `ln(tan(π/4 + φ/2))`.
/// Both poles map to infinity and are rejected as `InvalidCoordinate`.
pub fn to_projected(p: &GeoPoint) -> Result<ProjectedPoint> {
    p.validate()?;
    if p.lat.abs() == 90.0 {
        return Err(SegError::InvalidCoordinate {
            lon: p.lon,
            lat: p.lat,
            reason: "pole has no finite Web Mercator y",
        });
    }

    let x = EARTH_RADIUS * p.lon.to_radians();
    let y = EARTH_RADIUS * (FRAC_PI_4 + p.lat.to_radians() / 2.0).tan().ln();
    Ok(ProjectedPoint::new(x, y))
}

/// Inverse spherical Web Mercator
pub fn to_geographic(p: &ProjectedPoint) -> GeoPoint {
    let lon = (p.x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (p.y / EARTH_RADIUS).exp().atan() - FRAC_PI_2).to_degrees();
    GeoPoint { lon, lat }
}

/// Transform coordinates from one CRS to another.
///
/// Only EPSG:4326 and EPSG:3857 are known; identical codes pass through.
pub fn transform_coords(from_epsg: i32, to_epsg: i32, x: f64, y: f64) -> Result<(f64, f64)> {
    match (from_epsg, to_epsg) {
        (a, b) if a == b => Ok((x, y)),
        (EPSG_WGS84, EPSG_WEB_MERCATOR) => {
            let p = to_projected(&GeoPoint { lon: x, lat: y })?;
            Ok((p.x, p.y))
        }
        (EPSG_WEB_MERCATOR, EPSG_WGS84) => {
            if !x.is_finite() || !y.is_finite() {
                return Err(SegError::NonFiniteInput {
                    what: "projected coordinate",
                    index: if x.is_finite() { 1 } else { 0 },
                });
            }
            let g = to_geographic(&ProjectedPoint::new(x, y));
            Ok((g.lon, g.lat))
        }
        _ => Err(SegError::InvalidParameter(format!(
            "unsupported CRS transformation EPSG:{} -> EPSG:{}",
            from_epsg, to_epsg
        ))),
    }
}

/// Pixel (column, row) on a raster of `width × height` covering `extent` to
/// geographic coordinates.
///
/// Pure affine interpolation: row 0 is the north edge, column 0 the west edge.
/// Fractional and edge coordinates (`px == width`) are allowed, which is how
/// cell corners are addressed. `width` and `height` must be non-zero.
pub fn pixel_to_geo(px: f64, py: f64, width: usize, height: usize, extent: &Extent) -> GeoPoint {
    GeoPoint {
        lon: extent.lon_at(px, width),
        lat: extent.lat_at(py, height),
    }
}

/// Inverse of [`pixel_to_geo`]: the cell (column, row) containing `point`.
///
/// Points on the east/south edge belong to the last column/row; points
/// outside the extent yield `None`.
pub fn geo_to_pixel(
    point: &GeoPoint,
    width: usize,
    height: usize,
    extent: &Extent,
) -> Option<(usize, usize)> {
    if width == 0 || height == 0 || !extent.contains(point) {
        return None;
    }
    let fx = (point.lon - extent.min_lon) / extent.width_deg() * width as f64;
    let fy = (extent.max_lat - point.lat) / extent.height_deg() * height as f64;
    let col = (fx.floor() as usize).min(width - 1);
    let row = (fy.floor() as usize).min(height - 1);
    Some((col, row))
}

/// Axis-aligned geographic extent of a selection.
///
/// Construction enforces finite, in-range corners with `min < max` on both
/// axes; the value is immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct Extent {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl Extent {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        GeoPoint {
            lon: min_lon,
            lat: min_lat,
        }
        .validate()?;
        GeoPoint {
            lon: max_lon,
            lat: max_lat,
        }
        .validate()?;

        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(SegError::InvalidExtent {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }

        Ok(Extent {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Build from the north-west and south-east corners of a selection
    pub fn from_corners(top_left: GeoPoint, bottom_right: GeoPoint) -> Result<Self> {
        Extent::new(top_left.lon, bottom_right.lat, bottom_right.lon, top_left.lat)
    }

    /// Build from a Web Mercator extent
    pub fn from_projected(extent: &ProjectedExtent) -> Result<Self> {
        let (min_lon, min_lat) =
            transform_coords(EPSG_WEB_MERCATOR, EPSG_WGS84, extent.min_x, extent.min_y)?;
        let (max_lon, max_lat) =
            transform_coords(EPSG_WEB_MERCATOR, EPSG_WGS84, extent.max_x, extent.max_y)?;
        Extent::new(min_lon, min_lat, max_lon, max_lat)
    }

    /// Square selection dragged from `start` to `end` in Web Mercator.
    ///
    /// The side is the larger of |dx| and |dy|; the square stays anchored at
    /// `start` and grows in the drag direction on each axis.
    pub fn square_from_corners(start: ProjectedPoint, end: ProjectedPoint) -> Result<Self> {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let side = dx.abs().max(dy.abs());

        let min_x = if dx < 0.0 { start.x - side } else { start.x };
        let min_y = if dy < 0.0 { start.y - side } else { start.y };

        Extent::from_projected(&ProjectedExtent {
            min_x,
            min_y,
            max_x: min_x + side,
            max_y: min_y + side,
        })
    }

    /// Transform the extent to Web Mercator
    pub fn to_projected(&self) -> Result<ProjectedExtent> {
        let (min_x, min_y) =
            transform_coords(EPSG_WGS84, EPSG_WEB_MERCATOR, self.min_lon, self.min_lat)?;
        let (max_x, max_y) =
            transform_coords(EPSG_WGS84, EPSG_WEB_MERCATOR, self.max_lon, self.max_lat)?;
        Ok(ProjectedExtent {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Boundary-inclusive containment
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lon >= self.min_lon
            && point.lon <= self.max_lon
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }

    /// Longitude of pixel column `px` on a raster `width` columns wide
    pub fn lon_at(&self, px: f64, width: usize) -> f64 {
        self.min_lon + (px / width as f64) * (self.max_lon - self.min_lon)
    }

    /// Latitude of pixel row `py` on a raster `height` rows tall (row 0 = north)
    pub fn lat_at(&self, py: f64, height: usize) -> f64 {
        self.max_lat - (py / height as f64) * (self.max_lat - self.min_lat)
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl TryFrom<[f64; 4]> for Extent {
    type Error = SegError;

    fn try_from(value: [f64; 4]) -> Result<Self> {
        Extent::new(value[0], value[1], value[2], value[3])
    }
}

impl From<Extent> for [f64; 4] {
    fn from(extent: Extent) -> Self {
        extent.to_array()
    }
}

/// Extent in Web Mercator metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}
