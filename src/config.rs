use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::model::ControlPoint;

/// Concentric meshing zones around the route line: ring radii in meters
/// (near, mid, far) and the matching per-triangle area caps in m².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshZones {
    pub radii_m: [f64; 3],
    pub max_area_m2: [f64; 3],
}

impl MeshZones {
    pub fn new(radii_m: [f64; 3], max_area_m2: [f64; 3]) -> Result<Self, RouteError> {
        let zones = Self { radii_m, max_area_m2 };
        zones.validate()?;
        Ok(zones)
    }

    pub fn validate(&self) -> Result<(), RouteError> {
        let [r1, r2, r3] = self.radii_m;
        if !(r1 > 0.0 && r2 > r1 && r3 > r2) {
            return Err(RouteError::InvalidInput(
                "ring radii must be positive and strictly increasing (r1 < r2 < r3)".into(),
            ));
        }
        let [a1, a2, a3] = self.max_area_m2;
        if !(a1 > 0.0 && a2 >= a1 && a3 >= a2) {
            return Err(RouteError::InvalidInput(
                "area caps must be positive and non-decreasing (a1 <= a2 <= a3)".into(),
            ));
        }
        Ok(())
    }

    /// Area cap for a point at `distance_m` from the route line.
    pub fn cap_for_distance(&self, distance_m: f64) -> f64 {
        if distance_m <= self.radii_m[0] {
            self.max_area_m2[0]
        } else if distance_m <= self.radii_m[1] {
            self.max_area_m2[1]
        } else {
            self.max_area_m2[2]
        }
    }
}

impl Default for MeshZones {
    fn default() -> Self {
        Self {
            radii_m: [500.0, 1500.0, 3000.0],
            max_area_m2: [3_000.0, 15_000.0, 60_000.0],
        }
    }
}

/// Weather sampling layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherMeshConfig {
    /// Hard budget on the number of sampling points.
    pub max_points: usize,
    /// Along-route grid spacing for the mid/far zones, meters.
    pub grid_spacing_m: f64,
    /// Zone boundaries by distance to the route line, meters.
    pub near_zone_m: f64,
    pub mid_zone_m: f64,
    /// Minimum spacing between any two samples, meters.
    pub dedup_distance_m: f64,
    /// Vertices farther than this from every sample are non-navigable.
    pub max_mapping_distance_m: f64,
}

impl Default for WeatherMeshConfig {
    fn default() -> Self {
        Self {
            max_points: 50,
            grid_spacing_m: 5_000.0,
            near_zone_m: 500.0,
            mid_zone_m: 1_500.0,
            dedup_distance_m: 100.0,
            max_mapping_distance_m: 10_000.0,
        }
    }
}

impl WeatherMeshConfig {
    pub fn validate(&self) -> Result<(), RouteError> {
        if self.max_points == 0 {
            return Err(RouteError::InvalidInput(
                "weather point budget must be at least 1".into(),
            ));
        }
        if self.near_zone_m <= 0.0 || self.mid_zone_m <= self.near_zone_m {
            return Err(RouteError::InvalidInput(
                "weather zones must satisfy 0 < near < mid".into(),
            ));
        }
        Ok(())
    }
}

/// Knobs of the iterative time-aware ETA loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EtaConfig {
    pub max_iterations: usize,
    pub convergence_threshold_s: f64,
    /// Seed speed for the constant-speed ETA estimate, knots.
    pub initial_speed_kts: f64,
    /// ETAs round up to this interval for batching and cache keys.
    pub time_round_minutes: i64,
    /// Spatial cache grid in degrees (~1 km at 0.01).
    pub coord_grid_size_deg: f64,
    /// When true, vertices whose observation is a fallback default become
    /// non-navigable for the iteration.
    pub strict_weather: bool,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            convergence_threshold_s: 300.0,
            initial_speed_kts: 6.0,
            time_round_minutes: 15,
            coord_grid_size_deg: 0.01,
            strict_weather: false,
        }
    }
}

/// Optional departure-time sweep: evaluate the route at `num_samples`
/// evenly-spaced departures in `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepartureWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub num_samples: usize,
}

impl DepartureWindow {
    pub fn validate(&self) -> Result<(), RouteError> {
        if self.num_samples == 0 || self.num_samples > 10 {
            return Err(RouteError::InvalidInput(
                "departure window must sample between 1 and 10 times".into(),
            ));
        }
        if self.num_samples > 1 && self.end <= self.start {
            return Err(RouteError::InvalidInput(
                "departure window end must be after start".into(),
            ));
        }
        Ok(())
    }

    /// Departure instants to evaluate, earliest first.
    pub fn departure_times(&self) -> Vec<DateTime<Utc>> {
        if self.num_samples <= 1 {
            return vec![self.start];
        }
        let span = self.end - self.start;
        let step = span / (self.num_samples as i32 - 1);
        (0..self.num_samples)
            .map(|i| self.start + step * i as i32)
            .collect()
    }
}

/// A full routing request as it arrives from the outer surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub control_points: Vec<ControlPoint>,
    /// Corridor half-width around the route polyline, nautical miles.
    pub corridor_nm: f64,
    /// Standoff from the coast: added to the yacht draft for the shallow
    /// cutoff and used to erode the mid/far meshing zones, meters.
    pub shoreline_avoid_m: f64,
    #[serde(default)]
    pub zones: MeshZones,
    #[serde(default)]
    pub weather_mesh: WeatherMeshConfig,
    #[serde(default)]
    pub eta: EtaConfig,
    pub departure_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_window: Option<DepartureWindow>,
}

impl RouteRequest {
    pub fn validate(&self) -> Result<(), RouteError> {
        if self.control_points.len() < 2 {
            return Err(RouteError::InvalidInput(
                "provide at least start and finish control points".into(),
            ));
        }
        for (i, pair) in self.control_points.windows(2).enumerate() {
            if pair[0].lat == pair[1].lat && pair[0].lon == pair[1].lon {
                return Err(RouteError::InvalidInput(format!(
                    "control points {} and {} are coincident",
                    i,
                    i + 1
                )));
            }
        }
        for p in &self.control_points {
            if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon) {
                return Err(RouteError::InvalidInput(format!(
                    "control point ({}, {}) is outside WGS84 bounds",
                    p.lat, p.lon
                )));
            }
        }
        if self.corridor_nm <= 0.0 {
            return Err(RouteError::InvalidInput(
                "corridor width must be positive".into(),
            ));
        }
        if self.shoreline_avoid_m < 0.0 {
            return Err(RouteError::InvalidInput(
                "shoreline clearance cannot be negative".into(),
            ));
        }
        self.zones.validate()?;
        self.weather_mesh.validate()?;
        if let Some(window) = &self.departure_window {
            window.validate()?;
        }
        Ok(())
    }

    /// All departure instants to evaluate: the window when present, the
    /// single departure time otherwise.
    pub fn departures(&self) -> Vec<DateTime<Utc>> {
        match &self.departure_window {
            Some(w) => w.departure_times(),
            None => vec![self.departure_time],
        }
    }
}

/// Ceil a timestamp up to the next `interval_minutes` boundary. Shared by
/// the weather cache key and the batch grouping so they can never disagree.
pub fn ceil_to_interval(t: DateTime<Utc>, interval_minutes: i64) -> DateTime<Utc> {
    let interval_s = interval_minutes * 60;
    let secs = t.timestamp();
    let rem = secs.rem_euclid(interval_s);
    let rounded = if rem == 0 && t.timestamp_subsec_nanos() == 0 {
        secs
    } else {
        secs - rem + interval_s
    };
    DateTime::from_timestamp(rounded, 0).unwrap_or(t)
}

/// Hours spanned by a duration, as a float.
pub fn duration_hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}
