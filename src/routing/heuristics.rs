//! Edge-cost heuristics: the time to sail one mesh edge under
//! the weather at its endpoints, with maneuver, comfort and fatigue
//! penalties, plus the admissible remaining-time estimate for A*.

use std::collections::HashMap;

use geo::Coord;

use crate::geo::{bearing_deg, bearing_difference, planar_distance, signed_twa};
use crate::model::{SailingConditions, Yacht};
use crate::polar::boat_speed_ms;
use crate::units::{MIN_BOAT_SPEED_MS, knots_to_ms};
use crate::weather::WeatherObservation;

/// No useful progress is possible under sail this close to the wind.
pub const DEAD_ANGLE_DEG: f64 = 30.0;

const HEADING_CHANGE_PENALTY_S: f64 = 10.0;
const LONG_EDGE_M: f64 = 10_000.0;

/// Weather lookup for mesh vertices: vertex -> nearest sample -> observation.
pub struct VertexWeather<'a> {
    nearest_sample: &'a [Option<u32>],
    observations: &'a HashMap<u32, WeatherObservation>,
}

impl<'a> VertexWeather<'a> {
    pub fn new(
        nearest_sample: &'a [Option<u32>],
        observations: &'a HashMap<u32, WeatherObservation>,
    ) -> Self {
        Self { nearest_sample, observations }
    }

    pub fn conditions_at(&self, vertex: u32) -> SailingConditions {
        self.nearest_sample
            .get(vertex as usize)
            .copied()
            .flatten()
            .and_then(|idx| self.observations.get(&idx))
            .map(SailingConditions::from_observation)
            .unwrap_or_else(SailingConditions::fallback)
    }
}

pub struct SailingHeuristics<'a> {
    yacht: &'a Yacht,
    vertices: &'a [Coord<f64>],
    weather: VertexWeather<'a>,
    /// The safe fallback refuses edges touching these vertices.
    non_navigable: Option<&'a [bool]>,
}

impl<'a> SailingHeuristics<'a> {
    pub fn new(yacht: &'a Yacht, vertices: &'a [Coord<f64>], weather: VertexWeather<'a>) -> Self {
        Self { yacht, vertices, weather, non_navigable: None }
    }

    /// The safe variant additionally excludes all edges incident to a
    /// non-navigable vertex.
    pub fn with_exclusions(mut self, non_navigable: &'a [bool]) -> Self {
        self.non_navigable = Some(non_navigable);
        self
    }

    pub fn conditions_at(&self, vertex: u32) -> SailingConditions {
        self.weather.conditions_at(vertex)
    }

    pub fn position(&self, vertex: u32) -> Coord<f64> {
        self.vertices[vertex as usize]
    }

    /// Time in seconds to sail the edge `from -> to`, or infinity when it
    /// cannot be sailed. `previous_heading` is the bearing of the edge that
    /// led into `from` (absent on the first edge).
    pub fn edge_cost(&self, from: u32, to: u32, previous_heading: Option<f64>) -> f64 {
        if let Some(excluded) = self.non_navigable {
            if excluded[from as usize] || excluded[to as usize] {
                return f64::INFINITY;
            }
        }

        let from_pos = self.position(from);
        let to_pos = self.position(to);
        let from_cond = self.weather.conditions_at(from);
        let to_cond = self.weather.conditions_at(to);

        let bearing = bearing_deg(from_pos, to_pos);
        let distance = planar_distance(from_pos, to_pos);

        let from_twa = signed_twa(
            previous_heading.unwrap_or(bearing),
            from_cond.wind_direction_deg,
        );
        let to_twa = signed_twa(bearing, to_cond.wind_direction_deg);

        if to_twa.abs() < DEAD_ANGLE_DEG {
            return f64::INFINITY;
        }

        let avg_wind_ms =
            knots_to_ms((from_cond.wind_speed_kts + to_cond.wind_speed_kts) / 2.0);
        let avg_wave_height = (from_cond.wave_height_m + to_cond.wave_height_m) / 2.0;

        let mut speed = boat_speed_ms(self.yacht, avg_wind_ms, to_twa.abs());
        speed = apply_current(
            speed,
            bearing,
            to_cond.current_speed_ms(),
            to_cond.current_direction_deg,
        );
        let wave_penalty = self.wave_penalty(avg_wave_height, to_cond.wave_direction_deg, bearing);
        speed *= 1.0 - wave_penalty;
        speed = speed.max(MIN_BOAT_SPEED_MS);

        let mut time = distance / speed;

        if let Some(prev) = previous_heading {
            time += self.maneuver_penalty(prev, bearing, from_twa, to_twa);
        }

        time *= 1.0 + self.comfort_penalty(&to_cond);

        if distance > LONG_EDGE_M {
            time *= 1.0 + (distance - LONG_EDGE_M) / 50_000.0;
        }

        time
    }

    /// Admissible remaining-time estimate: straight distance over an
    /// optimistic speed. It ignores tacking, opposing current and waves, so
    /// it never overestimates.
    pub fn heuristic_cost(&self, vertex: u32, goal: Coord<f64>) -> f64 {
        let distance = planar_distance(self.position(vertex), goal);
        let conditions = self.weather.conditions_at(vertex);

        let mut optimistic = match self.yacht.max_speed_kts {
            Some(kts) => knots_to_ms(kts),
            None => self
                .yacht
                .polar_table
                .as_ref()
                .map(|t| knots_to_ms(t.max_speed_kts()))
                .filter(|&v| v > 0.0)
                .unwrap_or(5.0),
        };
        if conditions.wind_speed_kts < 5.0 {
            optimistic *= 0.5;
        } else if conditions.wind_speed_kts > 25.0 {
            optimistic *= 0.8;
        }

        distance / optimistic
    }

    /// Boat speed through water in knots for a traversal used in segment
    /// kinematics: the wind at the destination vertex, polar lookup.
    pub fn boat_speed_kts_at(&self, vertex: u32, twa_deg: f64) -> f64 {
        let conditions = self.weather.conditions_at(vertex);
        crate::units::ms_to_knots(boat_speed_ms(
            self.yacht,
            conditions.wind_speed_ms(),
            twa_deg.abs(),
        ))
    }

    fn wave_penalty(&self, wave_height_m: f64, wave_direction_deg: f64, heading_deg: f64) -> f64 {
        if wave_height_m < 0.5 {
            return 0.0;
        }
        let size_factor = 1.0 - (self.yacht.length_m / 50.0).min(0.5);
        let wave_angle = bearing_difference(heading_deg, wave_direction_deg);
        let angle_factor = if wave_angle < 30.0 {
            1.0
        } else if wave_angle < 60.0 {
            0.8
        } else if wave_angle < 120.0 {
            1.2
        } else if wave_angle < 150.0 {
            0.6
        } else {
            0.3
        };
        let height_factor = (wave_height_m / self.yacht.length_m * 3.0).min(1.0);
        (height_factor * angle_factor * size_factor * 0.4).min(0.5)
    }

    fn maneuver_penalty(
        &self,
        from_heading: f64,
        to_heading: f64,
        from_twa: f64,
        to_twa: f64,
    ) -> f64 {
        let heading_change = bearing_difference(from_heading, to_heading);
        let sign_change = from_twa * to_twa < 0.0;

        let mut penalty = 0.0;
        if sign_change && from_twa.abs() < 90.0 && to_twa.abs() < 90.0 {
            penalty = self.yacht.tack_penalty_s();
        } else if sign_change && from_twa.abs() > 120.0 && to_twa.abs() > 120.0 {
            penalty = self.yacht.jibe_penalty_s();
        }
        if heading_change > 60.0 {
            penalty += HEADING_CHANGE_PENALTY_S;
        }
        penalty
    }

    fn comfort_penalty(&self, conditions: &SailingConditions) -> f64 {
        let mut penalty: f64 = 0.0;

        let relative_wave = conditions.wave_height_m / self.yacht.length_m;
        if relative_wave > 0.1 {
            penalty += ((relative_wave - 0.1) * 2.0).min(0.3);
        }

        match self.yacht.max_wind_kts {
            Some(max_kts) => {
                if conditions.wind_speed_kts > max_kts {
                    penalty += 0.5;
                } else if conditions.wind_speed_kts > max_kts * 0.8 {
                    let over = (conditions.wind_speed_kts - max_kts * 0.8) / (max_kts * 0.2);
                    penalty += (over * 0.3).min(0.3);
                }
            }
            None => {
                if conditions.wind_speed_kts > 30.0 {
                    penalty += ((conditions.wind_speed_kts - 30.0) / 20.0).min(0.3);
                }
            }
        }

        if conditions.wind_speed_kts < 5.0 {
            let light = (5.0 - conditions.wind_speed_kts) / 5.0;
            let size_adjustment = (self.yacht.length_m / 30.0).min(1.5);
            penalty += (light * size_adjustment * 0.3).min(0.2);
        }

        if let Some(crew) = self.yacht.crew_size {
            let crew_factor = 1.0 / crew.max(1) as f64;
            penalty *= 1.0 + crew_factor * 0.2;
        }

        penalty.min(0.5)
    }
}

/// Speed over ground after adding the current vector to the boat vector
/// along the heading. Currents below 0.1 m/s are noise.
fn apply_current(
    boat_speed_ms: f64,
    heading_deg: f64,
    current_speed_ms: f64,
    current_direction_deg: f64,
) -> f64 {
    if current_speed_ms < 0.1 {
        return boat_speed_ms;
    }
    let heading = heading_deg.to_radians();
    let current = current_direction_deg.to_radians();
    let vx = boat_speed_ms * heading.sin() + current_speed_ms * current.sin();
    let vy = boat_speed_ms * heading.cos() + current_speed_ms * current.cos();
    (vx * vx + vy * vy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn flat_vertices() -> Vec<Coord<f64>> {
        vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.0, y: 1000.0 },    // due north of 0
            coord! { x: 1000.0, y: 0.0 },    // due east of 0
            coord! { x: 0.0, y: 20_000.0 },  // far north
        ]
    }

    fn observations(wind_from_deg: f64, wind_kts: f64) -> HashMap<u32, WeatherObservation> {
        let mut map = HashMap::new();
        map.insert(0, WeatherObservation::with_wind(wind_kts, wind_from_deg));
        map
    }

    #[test]
    fn test_dead_angle_edge_is_unsailable() {
        let yacht = Yacht::class40("t");
        let vertices = flat_vertices();
        let mapping = vec![Some(0); vertices.len()];
        let obs = observations(0.0, 12.0);
        let h = SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &obs));
        // Edge 0 -> 1 heads due north, straight into a north wind.
        assert!(h.edge_cost(0, 1, None).is_infinite());
        // Edge 0 -> 2 heads east, a beam reach: finite.
        assert!(h.edge_cost(0, 2, None).is_finite());
    }

    #[test]
    fn test_cost_scales_with_distance() {
        let yacht = Yacht::class40("t");
        let vertices = flat_vertices();
        let mapping = vec![Some(0); vertices.len()];
        let obs = observations(270.0, 12.0); // westerly, northbound edges are beam reaches
        let h = SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &obs));
        let short = h.edge_cost(0, 1, None);
        let long = h.edge_cost(0, 3, None);
        assert!(long > short * 10.0, "20x distance must cost much more");
    }

    #[test]
    fn test_tack_penalty_applies_on_sign_change() {
        let yacht = Yacht::class40("t");
        let vertices = vec![
            coord! { x: 0.0, y: 0.0 },
            // Close-hauled legs around a north wind: +45 then -45.
            coord! { x: 700.0, y: 700.0 },
            coord! { x: 0.0, y: 1400.0 },
        ];
        let mapping = vec![Some(0); vertices.len()];
        let obs = observations(0.0, 12.0);
        let h = SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &obs));

        let without_history = h.edge_cost(1, 2, None);
        // Arriving on bearing 45 and leaving on bearing 315 crosses the wind.
        let with_tack = h.edge_cost(1, 2, Some(45.0));
        assert!(
            with_tack >= without_history + yacht.tack_penalty_s(),
            "tack penalty missing: {with_tack} vs {without_history}"
        );
    }

    #[test]
    fn test_favourable_current_speeds_up() {
        let yacht = Yacht::class40("t");
        let vertices = flat_vertices();
        let mapping = vec![Some(0); vertices.len()];

        let mut with_current = observations(270.0, 12.0);
        if let Some(obs) = with_current.get_mut(&0) {
            obs.current_speed_kts = 2.0;
            obs.current_direction_deg = 0.0; // pushing north
        }
        let calm = observations(270.0, 12.0);

        let h_calm =
            SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &calm));
        let h_cur =
            SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &with_current));
        // Northbound edge with a northbound current is faster.
        assert!(h_cur.edge_cost(0, 1, None) < h_calm.edge_cost(0, 1, None));
    }

    #[test]
    fn test_waves_slow_the_boat() {
        let yacht = Yacht::class40("t");
        let vertices = flat_vertices();
        let mapping = vec![Some(0); vertices.len()];

        let calm = observations(270.0, 15.0);
        let mut rough = observations(270.0, 15.0);
        if let Some(obs) = rough.get_mut(&0) {
            obs.wave_height_m = 3.0;
            obs.wave_direction_deg = 0.0; // head seas on a northbound edge
        }

        let h_calm =
            SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &calm));
        let h_rough =
            SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &rough));
        assert!(h_rough.edge_cost(0, 1, None) > h_calm.edge_cost(0, 1, None));
    }

    #[test]
    fn test_safe_variant_blocks_excluded_vertices() {
        let yacht = Yacht::class40("t");
        let vertices = flat_vertices();
        let mapping = vec![Some(0); vertices.len()];
        let obs = observations(270.0, 12.0);
        let non_navigable = vec![false, true, false, false];
        let h = SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &obs))
            .with_exclusions(&non_navigable);
        assert!(h.edge_cost(0, 1, None).is_infinite());
        assert!(h.edge_cost(0, 2, None).is_finite());
    }

    #[test]
    fn test_heuristic_is_admissible_against_edge_cost() {
        let yacht = Yacht::class40("t");
        let vertices = flat_vertices();
        let mapping = vec![Some(0); vertices.len()];
        let obs = observations(270.0, 12.0);
        let h = SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &obs));
        let goal = vertices[1];
        // The optimistic estimate can never exceed the achievable cost.
        assert!(h.heuristic_cost(0, goal) <= h.edge_cost(0, 1, None));
    }

    #[test]
    fn test_unmapped_vertex_uses_fallback_conditions() {
        let yacht = Yacht::class40("t");
        let vertices = flat_vertices();
        let mapping: Vec<Option<u32>> = vec![None; vertices.len()];
        let obs = HashMap::new();
        let h = SailingHeuristics::new(&yacht, &vertices, VertexWeather::new(&mapping, &obs));
        let fallback = h.conditions_at(0);
        assert_eq!(fallback.wind_speed_kts, 10.0);
    }
}
