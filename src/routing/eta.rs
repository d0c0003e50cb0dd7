//! Iterative time-aware ETA refinement. Weather is fetched at
//! each sample point's expected arrival time, the route is re-planned under
//! that weather, and arrival times are recomputed from the actual segment
//! speeds until the largest ETA change drops under the threshold.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use geo::{Coord, LineString, MultiPolygon};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::EtaConfig;
use crate::error::RouteError;
use crate::geo::line::locate_along;
use crate::geo::{LocalFrame, bearing_deg, planar_distance, signed_twa};
use crate::geodata::detour::segment_in_water;
use crate::mesh::{Mesh, MeshGraph, VertexTree, nearest_vertex};
use crate::model::{EtaConfidence, Yacht};
use crate::routing::astar::find_route;
use crate::routing::heuristics::{SailingHeuristics, VertexWeather};
use crate::routing::segments::RawSegment;
use crate::sources::WeatherSource;
use crate::units::knots_to_ms;
use crate::weather::cache::SharedForecastCache;
use crate::weather::service::TimeAwareWeatherService;
use crate::weather::validate::validate_observation;
use crate::weather::{TimeAwareWeatherPoint, WeatherObservation};

/// Below this share of weather-covered vertices an iteration is unusable.
const MIN_NAVIGABLE_SHARE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationTrace {
    pub iteration: usize,
    pub max_eta_change_s: f64,
    pub weather_requests: usize,
    pub route_time_hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteProfile {
    pub departure_time: DateTime<Utc>,
    pub raw_segments: Vec<RawSegment>,
    pub total_distance_nm: f64,
    pub total_time_hours: f64,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub iterations: usize,
    pub converged: bool,
    pub max_eta_change_s: f64,
    pub weather_points: Vec<TimeAwareWeatherPoint>,
    /// Final iteration's observations, kept for persistence.
    pub observations: HashMap<u32, WeatherObservation>,
    pub trace: Vec<IterationTrace>,
}

/// Everything the loop needs about one meshed request.
pub struct RoutingContext<'a> {
    pub mesh: &'a Mesh,
    pub graph: &'a MeshGraph,
    pub vertex_tree: &'a VertexTree,
    pub frame: &'a LocalFrame,
    pub water: &'a MultiPolygon<f64>,
    pub route_xy: &'a LineString<f64>,
    /// Projected control points; legs run between consecutive pairs.
    pub control_xy: Vec<Coord<f64>>,
    pub layout: &'a crate::mesh::sampling::WeatherLayout,
    pub yacht: &'a Yacht,
    pub config: EtaConfig,
}

pub async fn compute_profile<S, C>(
    ctx: &RoutingContext<'_>,
    service: &TimeAwareWeatherService<S, C>,
    departure: DateTime<Utc>,
) -> Result<RouteProfile, RouteError>
where
    S: WeatherSource,
    C: SharedForecastCache,
{
    let now = Utc::now();
    let mut points = seed_points(ctx, departure);
    let mut profile = RouteProfile {
        departure_time: departure,
        raw_segments: Vec::new(),
        total_distance_nm: 0.0,
        total_time_hours: 0.0,
        estimated_arrival: None,
        iterations: 0,
        converged: false,
        max_eta_change_s: 0.0,
        weather_points: Vec::new(),
        observations: HashMap::new(),
        trace: Vec::new(),
    };

    let mut last_max_change = f64::INFINITY;
    for iteration in 0..ctx.config.max_iterations {
        profile.iterations = iteration + 1;

        let observations = match service.fetch_for_points(&points).await {
            Ok(observations) => observations,
            Err(e) if iteration == 0 => return Err(e),
            Err(e) => {
                warn!("weather batch failed on iteration {}: {e}; keeping last route", iteration + 1);
                break;
            }
        };

        let navigable = navigable_vertices(ctx, &observations);
        let navigable_count = navigable.iter().filter(|&&n| n).count();
        if (navigable_count as f64) < ctx.mesh.vertex_count() as f64 * MIN_NAVIGABLE_SHARE {
            if iteration == 0 {
                return Err(RouteError::WeatherFetchFailed(format!(
                    "only {navigable_count} of {} vertices have usable weather",
                    ctx.mesh.vertex_count()
                )));
            }
            warn!("too few navigable vertices on iteration {}, stopping", iteration + 1);
            break;
        }

        let path = route_legs(ctx, &observations, &navigable)?;
        let path = straighten_path(ctx, &observations, path);
        let segments = build_raw_segments(ctx, &observations, &path, departure);

        let max_change = update_etas(
            &mut points,
            &segments,
            iteration,
            last_max_change,
            departure,
            now,
        );

        profile.raw_segments = segments;
        profile.total_distance_nm = profile.raw_segments.iter().map(|s| s.distance_nm()).sum();
        profile.total_time_hours =
            profile.raw_segments.iter().map(|s| s.duration_s).sum::<f64>() / 3600.0;
        profile.estimated_arrival = profile.raw_segments.last().map(|s| s.end_time);
        profile.max_eta_change_s = max_change;
        profile.observations = observations;
        profile.trace.push(IterationTrace {
            iteration: iteration + 1,
            max_eta_change_s: max_change,
            weather_requests: points.len(),
            route_time_hours: profile.total_time_hours,
        });
        info!(
            "iteration {}: {:.2} h, {:.1} nm, max ETA change {:.0} s",
            iteration + 1,
            profile.total_time_hours,
            profile.total_distance_nm,
            max_change
        );

        if iteration >= 1 && max_change < ctx.config.convergence_threshold_s {
            profile.converged = true;
            break;
        }
        last_max_change = max_change;
    }

    profile.weather_points = points;
    Ok(profile)
}

/// Seed pass: project every sample onto the route, measure the
/// along-route arc length and seed the ETA with a constant-speed estimate.
fn seed_points(ctx: &RoutingContext<'_>, departure: DateTime<Utc>) -> Vec<TimeAwareWeatherPoint> {
    let mut speed_ms = knots_to_ms(ctx.config.initial_speed_kts);
    if speed_ms <= 0.1 {
        speed_ms = knots_to_ms(5.0);
    }
    ctx.layout
        .points
        .iter()
        .map(|sample| {
            let along = locate_along(ctx.route_xy, sample.position());
            let eta = departure + Duration::seconds((along / speed_ms) as i64);
            TimeAwareWeatherPoint {
                idx: sample.idx,
                x: sample.x,
                y: sample.y,
                lat: sample.lat,
                lon: sample.lon,
                eta,
                confidence: EtaConfidence::Estimated,
                distance_from_start_m: along,
            }
        })
        .collect()
}

/// A vertex is navigable when its nearest sample has a
/// valid observation (and, in strict mode, a non-default one).
fn navigable_vertices(
    ctx: &RoutingContext<'_>,
    observations: &HashMap<u32, WeatherObservation>,
) -> Vec<bool> {
    ctx.layout
        .nearest_sample
        .iter()
        .map(|mapped| match mapped {
            Some(idx) => observations.get(idx).is_some_and(|obs| {
                validate_observation(obs) && !(ctx.config.strict_weather && obs.is_default)
            }),
            None => false,
        })
        .collect()
}

/// A* per leg between control points, nominal first, safe fallback second.
fn route_legs(
    ctx: &RoutingContext<'_>,
    observations: &HashMap<u32, WeatherObservation>,
    navigable: &[bool],
) -> Result<Vec<u32>, RouteError> {
    let non_navigable: Vec<bool> = navigable.iter().map(|&n| !n).collect();
    let mut full_path: Vec<u32> = Vec::new();

    for (leg, pair) in ctx.control_xy.windows(2).enumerate() {
        let start = nearest_vertex(ctx.vertex_tree, pair[0])
            .ok_or(RouteError::NoRoute { leg_from: leg, leg_to: leg + 1 })?;
        let goal = nearest_vertex(ctx.vertex_tree, pair[1])
            .ok_or(RouteError::NoRoute { leg_from: leg, leg_to: leg + 1 })?;

        let nominal = SailingHeuristics::new(
            ctx.yacht,
            &ctx.mesh.vertices,
            VertexWeather::new(&ctx.layout.nearest_sample, observations),
        );
        let result = find_route(ctx.graph, &nominal, start, goal).or_else(|| {
            let safe = SailingHeuristics::new(
                ctx.yacht,
                &ctx.mesh.vertices,
                VertexWeather::new(&ctx.layout.nearest_sample, observations),
            )
            .with_exclusions(&non_navigable);
            find_route(ctx.graph, &safe, start, goal)
        });

        let Some(leg_result) = result else {
            return Err(RouteError::NoRoute { leg_from: leg, leg_to: leg + 1 });
        };

        if full_path.is_empty() {
            full_path.extend(leg_result.path);
        } else {
            let skip = usize::from(full_path.last() == leg_result.path.first());
            full_path.extend(leg_result.path.into_iter().skip(skip));
        }
    }
    Ok(full_path)
}

/// The mesh forces small detours around triangulation vertices even where
/// open water allows a straight board. Replace each run of edges by the
/// direct chord when the chord stays in water and does not cost more than
/// the run it replaces; the cost guard keeps dead-angle headings and real
/// obstacles out.
fn straighten_path(
    ctx: &RoutingContext<'_>,
    observations: &HashMap<u32, WeatherObservation>,
    path: Vec<u32>,
) -> Vec<u32> {
    if path.len() < 3 {
        return path;
    }
    let heuristics = SailingHeuristics::new(
        ctx.yacht,
        &ctx.mesh.vertices,
        VertexWeather::new(&ctx.layout.nearest_sample, observations),
    );

    // Prefix sums of the heading-free edge costs along the path.
    let mut prefix = Vec::with_capacity(path.len());
    prefix.push(0.0);
    for k in 0..path.len() - 1 {
        let cost = heuristics.edge_cost(path[k], path[k + 1], None);
        let cost = if cost.is_finite() { cost } else { 0.0 };
        prefix.push(prefix[k] + cost);
    }

    let mut out = vec![path[0]];
    let mut i = 0;
    while i + 1 < path.len() {
        let mut chosen = i + 1;
        for j in (i + 2..path.len()).rev() {
            let a = ctx.mesh.vertices[path[i] as usize];
            let b = ctx.mesh.vertices[path[j] as usize];
            if !segment_in_water(ctx.water, a, b) {
                continue;
            }
            let direct = heuristics.edge_cost(path[i], path[j], None);
            let via = prefix[j] - prefix[i];
            if direct.is_finite() && direct <= via * 1.001 {
                chosen = j;
                break;
            }
        }
        out.push(path[chosen]);
        i = chosen;
    }
    out
}

/// Walk the path from the departure time, deriving each
/// edge's duration from the cost model and stamping start/end times.
fn build_raw_segments(
    ctx: &RoutingContext<'_>,
    observations: &HashMap<u32, WeatherObservation>,
    path: &[u32],
    departure: DateTime<Utc>,
) -> Vec<RawSegment> {
    let heuristics = SailingHeuristics::new(
        ctx.yacht,
        &ctx.mesh.vertices,
        VertexWeather::new(&ctx.layout.nearest_sample, observations),
    );

    let mut segments = Vec::new();
    let mut current_time = departure;
    for i in 0..path.len().saturating_sub(1) {
        let (u, v) = (path[i], path[i + 1]);
        let previous_heading = (i > 0).then(|| {
            bearing_deg(
                ctx.mesh.vertices[path[i - 1] as usize],
                ctx.mesh.vertices[u as usize],
            )
        });
        let duration_s = heuristics.edge_cost(u, v, previous_heading);
        if !duration_s.is_finite() {
            warn!("skipping unsailable edge {u} -> {v} during segment build");
            continue;
        }

        let from = ctx.mesh.vertices[u as usize];
        let to = ctx.mesh.vertices[v as usize];
        let bearing = bearing_deg(from, to);
        let distance_m = planar_distance(from, to);
        let conditions = heuristics.conditions_at(v);
        let twa = signed_twa(bearing, conditions.wind_direction_deg);
        let boat_speed_kts = heuristics.boat_speed_kts_at(v, twa);
        let (from_lat, from_lon) = ctx.frame.inverse(from);
        let (to_lat, to_lon) = ctx.frame.inverse(to);

        let start_time = current_time;
        let end_time = start_time + Duration::milliseconds((duration_s * 1000.0) as i64);
        current_time = end_time;

        segments.push(RawSegment {
            from_x: from.x,
            from_y: from.y,
            to_x: to.x,
            to_y: to.y,
            from_lat,
            from_lon,
            to_lat,
            to_lon,
            distance_m,
            bearing_deg: bearing,
            duration_s,
            boat_speed_kts,
            wind_speed_kts: conditions.wind_speed_kts,
            wind_direction_deg: conditions.wind_direction_deg,
            twa_deg: twa,
            wave_height_m: conditions.wave_height_m,
            start_time,
            end_time,
        });
    }
    segments
}

/// Copy the timestamp of the nearest path position into
/// each sample's ETA. When the largest change grew compared to the previous
/// iteration, the new ETAs are blended halfway with the old ones to damp
/// tack-threshold oscillation.
fn update_etas(
    points: &mut [TimeAwareWeatherPoint],
    segments: &[RawSegment],
    iteration: usize,
    last_max_change: f64,
    departure: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    let mut position_times: Vec<(Coord<f64>, DateTime<Utc>)> =
        Vec::with_capacity(segments.len() + 1);
    position_times.push((
        Coord { x: segments[0].from_x, y: segments[0].from_y },
        segments[0].start_time,
    ));
    for s in segments {
        position_times.push((Coord { x: s.to_x, y: s.to_y }, s.end_time));
    }

    let mut proposals: Vec<DateTime<Utc>> = Vec::with_capacity(points.len());
    let mut raw_max_change: f64 = 0.0;
    for point in points.iter() {
        let target = Coord { x: point.x, y: point.y };
        let mut best = departure;
        let mut best_d = f64::INFINITY;
        for &(pos, time) in &position_times {
            let d = planar_distance(pos, target);
            if d < best_d {
                best_d = d;
                best = time;
            }
        }
        raw_max_change =
            raw_max_change.max((best - point.eta).num_seconds().unsigned_abs() as f64);
        proposals.push(best);
    }

    let damp = iteration > 1 && raw_max_change > last_max_change;
    if damp {
        warn!("ETA oscillation detected ({raw_max_change:.0} s > {last_max_change:.0} s), damping");
    }

    let mut applied_max: f64 = 0.0;
    for (point, proposal) in points.iter_mut().zip(proposals) {
        let target = if damp {
            point.eta + (proposal - point.eta) / 2
        } else {
            proposal
        };
        applied_max = applied_max.max((target - point.eta).num_seconds().unsigned_abs() as f64);
        point.update_eta(target, now);
    }
    applied_max
}

/// A degenerate profile for a start coincident with the goal: zero
/// segments, converged in one iteration.
pub fn zero_distance_profile(departure: DateTime<Utc>) -> RouteProfile {
    RouteProfile {
        departure_time: departure,
        raw_segments: Vec::new(),
        total_distance_nm: 0.0,
        total_time_hours: 0.0,
        estimated_arrival: Some(departure),
        iterations: 1,
        converged: true,
        max_eta_change_s: 0.0,
        weather_points: Vec::new(),
        observations: HashMap::new(),
        trace: Vec::new(),
    }
}

/// Average over-ground speed in knots implied by the profile.
pub fn average_speed_kts(profile: &RouteProfile) -> f64 {
    if profile.total_time_hours > 0.0 {
        profile.total_distance_nm / profile.total_time_hours
    } else {
        0.0
    }
}
