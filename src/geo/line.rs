//! Polyline utilities in the local frame: arc-length parameterization,
//! nearest-point projection and lateral offsets used by the mesher, the
//! weather-point layout and the ETA seeding.

use geo::{Coord, EuclideanLength, LineInterpolatePoint, LineLocatePoint, LineString, Point};

use crate::geo::planar_distance;

pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.euclidean_length()
}

/// Arc length along the line of the point's orthogonal projection,
/// clamped to [0, length].
pub fn locate_along(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    let total = polyline_length(line);
    match line.line_locate_point(&Point::from(point)) {
        Some(fraction) => (fraction * total).clamp(0.0, total),
        None => 0.0,
    }
}

/// Point at the given arc length from the start, clamped to the ends.
pub fn point_at(line: &LineString<f64>, distance_along: f64) -> Coord<f64> {
    let total = polyline_length(line);
    if total <= 0.0 {
        return line.0.first().copied().unwrap_or(Coord { x: 0.0, y: 0.0 });
    }
    let fraction = (distance_along / total).clamp(0.0, 1.0);
    match line.line_interpolate_point(fraction) {
        Some(p) => p.into(),
        None => line.0[0],
    }
}

/// Nearest point on the line to `point`.
pub fn nearest_on_line(line: &LineString<f64>, point: Coord<f64>) -> Coord<f64> {
    point_at(line, locate_along(line, point))
}

/// Planar distance from `point` to the line.
pub fn distance_to_line(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    planar_distance(point, nearest_on_line(line, point))
}

/// Local tangent direction of the line around the given arc length, as a
/// unit vector. Uses a short chord so polyline corners do not dominate.
pub fn tangent_at(line: &LineString<f64>, distance_along: f64) -> Coord<f64> {
    let total = polyline_length(line);
    let half = 10.0_f64.min(total / 2.0);
    let ahead = point_at(line, (distance_along + half).min(total));
    let behind = point_at(line, (distance_along - half).max(0.0));
    let dx = ahead.x - behind.x;
    let dy = ahead.y - behind.y;
    let norm = (dx * dx + dy * dy).sqrt();
    if norm <= f64::EPSILON {
        Coord { x: 0.0, y: 1.0 }
    } else {
        Coord { x: dx / norm, y: dy / norm }
    }
}

/// Which side of the line a point lies on: positive left of travel
/// direction, negative right, using the tangent at the projection.
pub fn side_of(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    let s = locate_along(line, point);
    let base = point_at(line, s);
    let tangent = tangent_at(line, s);
    let px = point.x - base.x;
    let py = point.y - base.y;
    tangent.x * py - tangent.y * px
}

/// Point at arc length `distance_along`, displaced `lateral` meters
/// perpendicular to the line (positive = left of travel direction).
pub fn offset_point(line: &LineString<f64>, distance_along: f64, lateral: f64) -> Coord<f64> {
    let base = point_at(line, distance_along);
    let tangent = tangent_at(line, distance_along);
    // Left normal of (tx, ty) is (-ty, tx).
    Coord {
        x: base.x - tangent.y * lateral,
        y: base.y + tangent.x * lateral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn east_line() -> LineString<f64> {
        LineString::from(vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1000.0, y: 0.0 },
        ])
    }

    #[test]
    fn test_locate_along_orthogonal_projection() {
        let line = east_line();
        let s = locate_along(&line, coord! { x: 400.0, y: 250.0 });
        assert!((s - 400.0).abs() < 1e-9);
        // Beyond the end clamps to the total length.
        let past = locate_along(&line, coord! { x: 5000.0, y: 0.0 });
        assert!((past - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_at_interpolates() {
        let line = east_line();
        let p = point_at(&line, 250.0);
        assert!((p.x - 250.0).abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn test_side_of_east_line() {
        let line = east_line();
        // Traveling east, north is to port (left, positive).
        assert!(side_of(&line, coord! { x: 500.0, y: 100.0 }) > 0.0);
        assert!(side_of(&line, coord! { x: 500.0, y: -100.0 }) < 0.0);
    }

    #[test]
    fn test_offset_point_left_and_right() {
        let line = east_line();
        let left = offset_point(&line, 500.0, 50.0);
        let right = offset_point(&line, 500.0, -50.0);
        assert!((left.y - 50.0).abs() < 1e-9);
        assert!((right.y + 50.0).abs() < 1e-9);
        assert!((left.x - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_to_line() {
        let line = east_line();
        assert!((distance_to_line(&line, coord! { x: 300.0, y: -120.0 }) - 120.0).abs() < 1e-9);
    }
}
