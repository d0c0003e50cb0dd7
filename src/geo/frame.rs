//! Request-local Cartesian frame: a UTM zone picked from the route
//! centroid, with transverse-Mercator forward/inverse projection on the
//! WGS84 ellipsoid. Everything downstream of the corridor builder works in
//! this frame; WGS84 appears only at the interface boundaries.

use geo::{Coord, LineString, MultiPolygon, MapCoords};

// WGS84 ellipsoid.
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFrame {
    zone: u8,
    northern: bool,
}

impl LocalFrame {
    /// Frame for the UTM zone containing the given centroid.
    pub fn for_centroid(lat: f64, lon: f64) -> Self {
        let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;
        Self { zone, northern: lat >= 0.0 }
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    /// EPSG code of the frame (326xx north, 327xx south).
    pub fn epsg(&self) -> u32 {
        if self.northern {
            32_600 + self.zone as u32
        } else {
            32_700 + self.zone as u32
        }
    }

    fn central_meridian_rad(&self) -> f64 {
        ((self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
    }

    /// WGS84 (lat, lon) in degrees to local (easting, northing) in meters.
    pub fn project(&self, lat: f64, lon: f64) -> Coord<f64> {
        let e2 = F * (2.0 - F);
        let ep2 = e2 / (1.0 - e2);
        let phi = lat.to_radians();
        let lam = lon.to_radians();
        let lam0 = self.central_meridian_rad();

        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = sin_phi / cos_phi;
        let n = A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a_term = (lam - lam0) * cos_phi;
        let m = meridional_arc(e2, phi);

        let a2 = a_term * a_term;
        let a3 = a2 * a_term;
        let a4 = a2 * a2;
        let a5 = a4 * a_term;
        let a6 = a4 * a2;

        let x = FALSE_EASTING
            + K0 * n
                * (a_term
                    + (1.0 - t + c) * a3 / 6.0
                    + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0);
        let mut y = K0
            * (m
                + n * tan_phi
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));
        if !self.northern {
            y += FALSE_NORTHING_SOUTH;
        }
        Coord { x, y }
    }

    /// Local (easting, northing) back to WGS84 (lat, lon) in degrees.
    pub fn inverse(&self, point: Coord<f64>) -> (f64, f64) {
        let e2 = F * (2.0 - F);
        let ep2 = e2 / (1.0 - e2);
        let lam0 = self.central_meridian_rad();

        let y = if self.northern {
            point.y
        } else {
            point.y - FALSE_NORTHING_SOUTH
        };
        let m = y / K0;
        let mu = m / (A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin_phi1, cos_phi1) = phi1.sin_cos();
        let tan_phi1 = sin_phi1 / cos_phi1;
        let c1 = ep2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let n1 = A / (1.0 - e2 * sin_phi1 * sin_phi1).sqrt();
        let r1 = A * (1.0 - e2) / (1.0 - e2 * sin_phi1 * sin_phi1).powf(1.5);
        let d = (point.x - FALSE_EASTING) / (n1 * K0);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d2 * d2;
        let d5 = d4 * d;
        let d6 = d4 * d2;

        let phi = phi1
            - (n1 * tan_phi1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * ep2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let lam = lam0
            + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                    * d5
                    / 120.0)
                / cos_phi1;

        (phi.to_degrees(), lam.to_degrees())
    }

    /// Project an ordered (lat, lon) sequence into a local-frame polyline.
    pub fn project_polyline(&self, points: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(
            points
                .iter()
                .map(|&(lat, lon)| self.project(lat, lon))
                .collect::<Vec<_>>(),
        )
    }

    /// Project WGS84 geometry (geo convention: x = lon, y = lat) into the
    /// local frame.
    pub fn project_multipolygon(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| self.project(c.y, c.x))
    }

    /// Local-frame geometry back to WGS84 (x = lon, y = lat).
    pub fn unproject_multipolygon(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| {
            let (lat, lon) = self.inverse(c);
            Coord { x: lon, y: lat }
        })
    }
}

/// Meridional arc length from the equator, Snyder's series.
fn meridional_arc(e2: f64, phi: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::planar_distance;

    #[test]
    fn test_zone_selection() {
        // Gulf of Gdańsk sits in zone 34N.
        let frame = LocalFrame::for_centroid(54.4, 18.7);
        assert_eq!(frame.zone(), 34);
        assert_eq!(frame.epsg(), 32634);

        // Southern hemisphere flips the EPSG family.
        let south = LocalFrame::for_centroid(-33.9, 18.4);
        assert_eq!(south.epsg(), 32734);
    }

    #[test]
    fn test_round_trip_within_a_meter() {
        let frame = LocalFrame::for_centroid(54.4, 18.7);
        for &(lat, lon) in &[
            (54.52, 18.55),
            (54.35, 18.90),
            (54.0, 19.9),
            (55.1, 17.6),
        ] {
            let xy = frame.project(lat, lon);
            let (lat2, lon2) = frame.inverse(xy);
            let xy2 = frame.project(lat2, lon2);
            assert!(
                planar_distance(xy, xy2) < 1.0,
                "round trip error at ({lat}, {lon}) exceeds 1 m"
            );
        }
    }

    #[test]
    fn test_projection_scale_is_metric() {
        // One arc minute of latitude is one nautical mile, within TM
        // distortion at mid-latitudes.
        let frame = LocalFrame::for_centroid(54.4, 18.7);
        let a = frame.project(54.40, 18.70);
        let b = frame.project(54.40 + 1.0 / 60.0, 18.70);
        let d = planar_distance(a, b);
        assert!((d - 1852.0).abs() < 10.0, "arc minute projected to {d} m");
    }

    #[test]
    fn test_northing_increases_northward() {
        let frame = LocalFrame::for_centroid(54.4, 18.7);
        let south = frame.project(54.0, 18.7);
        let north = frame.project(55.0, 18.7);
        assert!(north.y > south.y);
    }
}
