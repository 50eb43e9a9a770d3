//! Great-circle distance and bounding-box helpers.

use common::config::BoundsConfig;
use common::Coordinate;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometres.
///
/// Returns NaN if any input is NaN; callers filter on `is_finite`.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// `haversine_km` over two coordinates.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    haversine_km(a.lat, a.lon, b.lat, b.lon)
}

/// A south/west/north/east rectangle in degrees. Does not wrap the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south: south.min(north),
            west: west.min(east),
            north: north.max(south),
            east: east.max(west),
        }
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        point.is_valid()
            && point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }

    pub fn lat_extent(&self) -> f64 {
        self.north - self.south
    }

    pub fn lon_extent(&self) -> f64 {
        self.east - self.west
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Nearest point inside the box.
    pub fn clamp(&self, point: Coordinate) -> Coordinate {
        Coordinate::new(
            point.lat.clamp(self.south, self.north),
            point.lon.clamp(self.west, self.east),
        )
    }
}

impl From<BoundsConfig> for BoundingBox {
    fn from(b: BoundsConfig) -> Self {
        BoundingBox::new(b.south, b.west, b.north, b.east)
    }
}

/// Whether `point` lies inside `bounds`. Invalid coordinates never do.
pub fn within_bounds(point: Coordinate, bounds: &BoundingBox) -> bool {
    bounds.contains(point)
}
