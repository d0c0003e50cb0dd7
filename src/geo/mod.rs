//! Planar geometry helpers for the request-local Cartesian frame. All
//! angles are degrees with 0 = north and clockwise positive; distances are
//! meters.

pub mod frame;
pub mod line;

pub use frame::LocalFrame;

use geo::Coord;
use serde::{Deserialize, Serialize};

/// WGS84 bounding box handed to external data sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BboxWgs84 {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BboxWgs84 {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }
}

/// Bearing from one planar point to another: atan2(dx, dy) so that +y
/// (north) is 0° and +x (east) is 90°.
pub fn bearing_deg(from: Coord<f64>, to: Coord<f64>) -> f64 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    normalize_360(dx.atan2(dy).to_degrees())
}

pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Normalize an angle into [0, 360).
pub fn normalize_360(deg: f64) -> f64 {
    let mut d = deg % 360.0;
    if d < 0.0 {
        d += 360.0;
    }
    d
}

/// Normalize an angle into (-180, 180].
pub fn normalize_180(deg: f64) -> f64 {
    let mut d = deg % 360.0;
    if d > 180.0 {
        d -= 360.0;
    }
    if d <= -180.0 {
        d += 360.0;
    }
    d
}

/// Signed true wind angle for a heading and a meteorological "from" wind
/// direction. Upwind is near 0, downwind near ±180.
pub fn signed_twa(heading_deg: f64, wind_from_deg: f64) -> f64 {
    normalize_180(heading_deg - wind_from_deg)
}

/// Smallest absolute difference between two bearings, in [0, 180].
pub fn bearing_difference(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (a_deg - b_deg).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Length-weighted circular mean of bearings, normalized to [0, 360).
/// Returns 0 when all weights vanish.
pub fn weighted_circular_mean(items: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    for (bearing_deg, weight) in items {
        let rad = bearing_deg.to_radians();
        sin_sum += weight * rad.sin();
        cos_sum += weight * rad.cos();
    }
    if sin_sum == 0.0 && cos_sum == 0.0 {
        return 0.0;
    }
    normalize_360(sin_sum.atan2(cos_sum).to_degrees())
}

/// Mean resultant length of a set of directions: 1 = perfectly aligned,
/// 0 = uniformly scattered.
pub fn circular_concentration(directions_deg: &[f64]) -> f64 {
    if directions_deg.is_empty() {
        return 1.0;
    }
    let sin_sum: f64 = directions_deg.iter().map(|d| d.to_radians().sin()).sum();
    let cos_sum: f64 = directions_deg.iter().map(|d| d.to_radians().cos()).sum();
    (sin_sum * sin_sum + cos_sum * cos_sum).sqrt() / directions_deg.len() as f64
}
