//! Corridor construction: pick the local frame from
//! the route centroid, project the control polyline and buffer it into the
//! search corridor.

use geo::{BoundingRect, LineString, MultiPolygon};
use geo_offset::Offset;

use crate::error::RouteError;
use crate::geo::{BboxWgs84, LocalFrame};
use crate::model::ControlPoint;
use crate::units::nm_to_m;

/// Local frame for a control-point sequence, chosen from its centroid.
pub fn frame_for_route(points: &[ControlPoint]) -> LocalFrame {
    let n = points.len().max(1) as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    LocalFrame::for_centroid(lat, lon)
}

/// Project the control points into the frame as a polyline.
pub fn project_route(frame: &LocalFrame, points: &[ControlPoint]) -> LineString<f64> {
    frame.project_polyline(
        &points.iter().map(|p| (p.lat, p.lon)).collect::<Vec<_>>(),
    )
}

/// Buffer the projected polyline into the corridor polygon.
pub fn build_corridor(
    route_xy: &LineString<f64>,
    half_width_nm: f64,
) -> Result<MultiPolygon<f64>, RouteError> {
    route_xy
        .offset_with_arc_segments(nm_to_m(half_width_nm), 8)
        .map_err(|e| RouteError::MeshingFailed(format!("corridor buffer failed: {e:?}")))
}

/// WGS84 bounding box of the corridor with padding, for the external land
/// and bathymetry fetches.
pub fn corridor_bbox_wgs84(
    corridor: &MultiPolygon<f64>,
    frame: &LocalFrame,
    pad_m: f64,
) -> Result<BboxWgs84, RouteError> {
    let rect = corridor
        .bounding_rect()
        .ok_or(RouteError::NoNavigableArea)?;
    let (south_lat, west_lon) = frame.inverse(geo::Coord {
        x: rect.min().x - pad_m,
        y: rect.min().y - pad_m,
    });
    let (north_lat, east_lon) = frame.inverse(geo::Coord {
        x: rect.max().x + pad_m,
        y: rect.max().y + pad_m,
    });
    Ok(BboxWgs84 {
        west: west_lon.min(east_lon),
        south: south_lat.min(north_lat),
        east: west_lon.max(east_lon),
        north: south_lat.max(north_lat),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains, Point};

    fn gdansk_controls() -> Vec<ControlPoint> {
        vec![ControlPoint::new(54.52, 18.55), ControlPoint::new(54.35, 18.90)]
    }

    #[test]
    fn test_corridor_contains_route() {
        let controls = gdansk_controls();
        let frame = frame_for_route(&controls);
        let route = project_route(&frame, &controls);
        let corridor = build_corridor(&route, 3.0).expect("corridor");
        for c in &route.0 {
            assert!(corridor.contains(&Point::from(*c)));
        }
    }

    #[test]
    fn test_corridor_area_matches_width() {
        let controls = gdansk_controls();
        let frame = frame_for_route(&controls);
        let route = project_route(&frame, &controls);
        let corridor = build_corridor(&route, 3.0).expect("corridor");
        // Rectangle part alone: length * 2 * halfwidth; caps add more.
        let length = crate::geo::line::polyline_length(&route);
        let min_area = length * 2.0 * nm_to_m(3.0);
        assert!(corridor.unsigned_area() >= min_area * 0.99);
    }

    #[test]
    fn test_bbox_covers_corridor_with_padding() {
        let controls = gdansk_controls();
        let frame = frame_for_route(&controls);
        let route = project_route(&frame, &controls);
        let corridor = build_corridor(&route, 3.0).expect("corridor");
        let bbox = corridor_bbox_wgs84(&corridor, &frame, 5000.0).expect("bbox");
        for p in &controls {
            assert!(bbox.contains(p.lat, p.lon));
        }
        assert!(bbox.north > bbox.south);
        assert!(bbox.east > bbox.west);
    }
}
