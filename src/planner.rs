//! Request orchestration: validate, build the navigable water, mesh it,
//! lay out weather samples, then run the time-aware ETA loop once per
//! departure variant and post-process segments and difficulty.

use chrono::{DateTime, Utc};
use geo::Coord;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::RouteRequest;
use crate::error::RouteError;
use crate::geo::line::polyline_length;
use crate::geodata::corridor::{frame_for_route, project_route};
use crate::geodata::water::build_water_area;
use crate::mesh::mesher::{MesherParams, triangulate_water};
use crate::mesh::sampling::{LayoutArtifact, select_weather_points};
use crate::mesh::MeshArtifact;
use crate::model::Yacht;
use crate::routing::difficulty::{DifficultyBreakdown, score_route};
use crate::routing::eta::{
    IterationTrace, RouteProfile, RoutingContext, average_speed_kts, compute_profile,
    zero_distance_profile,
};
use crate::routing::segments::{
    BEARING_TOLERANCE_DEG, MergedSegment, count_maneuvers, merge_segments,
};
use crate::sources::{BathymetrySource, ForecastStore, LandSource, RouteStore, WeatherSource};
use crate::weather::cache::{NoSharedCache, SharedForecastCache};
use crate::weather::service::{TimeAwareWeatherService, WeatherStats};
use crate::weather::{TimeAwareWeatherPoint, WeatherObservation};

/// Coincident-start-and-finish cutoff: a route shorter than this collapses
/// to the zero-segment profile.
const MIN_ROUTE_LENGTH_M: f64 = 1.0;

/// One evaluated departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteVariant {
    pub departure_time: DateTime<Utc>,
    /// Ordered (lat, lon) waypoints of the merged route.
    pub waypoints_wgs84: Vec<(f64, f64)>,
    pub segments: Vec<MergedSegment>,
    pub total_time_hours: f64,
    pub total_distance_nm: f64,
    pub average_speed_knots: f64,
    pub tacks_count: usize,
    pub jibes_count: usize,
    pub difficulty: DifficultyBreakdown,
    pub converged: bool,
    pub iterations: usize,
    pub max_eta_change_s: f64,
    pub trace: Vec<IterationTrace>,
    pub weather_points: Vec<TimeAwareWeatherPoint>,
    /// Final-iteration observations, kept in memory for persistence.
    #[serde(skip)]
    pub observations: HashMap<u32, WeatherObservation>,
}

/// The finished plan: all variants, the recommended one, the weather usage
/// counters, and the artifacts the external store persists with the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub variants: Vec<RouteVariant>,
    pub best_variant_index: usize,
    pub weather_stats: WeatherStats,
    pub mesh: MeshArtifact,
    pub layout: LayoutArtifact,
}

pub struct RoutePlanner<L, B, S, C = NoSharedCache> {
    land: L,
    bathymetry: B,
    weather: TimeAwareWeatherService<S, C>,
}

impl<L, B, S> RoutePlanner<L, B, S>
where
    L: LandSource,
    B: BathymetrySource,
    S: WeatherSource,
{
    pub fn new(land: L, bathymetry: B, weather: TimeAwareWeatherService<S>) -> Self {
        Self { land, bathymetry, weather }
    }
}

impl<L, B, S, C> RoutePlanner<L, B, S, C>
where
    L: LandSource,
    B: BathymetrySource,
    S: WeatherSource,
    C: SharedForecastCache,
{
    pub fn with_weather_service(
        land: L,
        bathymetry: B,
        weather: TimeAwareWeatherService<S, C>,
    ) -> Self {
        Self { land, bathymetry, weather }
    }

    pub fn weather_stats(&self) -> WeatherStats {
        self.weather.stats()
    }

    pub async fn plan(&self, request: &RouteRequest, yacht: &Yacht) -> Result<RoutePlan, RouteError> {
        request.validate()?;

        let frame = frame_for_route(&request.control_points);
        let route_xy = project_route(&frame, &request.control_points);

        if polyline_length(&route_xy) < MIN_ROUTE_LENGTH_M {
            info!("start and finish coincide, returning zero-segment plan");
            let variants: Vec<RouteVariant> = request
                .departures()
                .into_iter()
                .map(|departure| build_variant(zero_distance_profile(departure)))
                .collect();
            return Ok(RoutePlan {
                best_variant_index: 0,
                weather_stats: self.weather.stats(),
                mesh: crate::mesh::Mesh::default().to_artifact(frame.epsg()),
                layout: LayoutArtifact { points: Vec::new(), mapping: Default::default() },
                variants,
            });
        }

        let water = build_water_area(
            &self.land,
            &self.bathymetry,
            &frame,
            route_xy,
            request.corridor_nm,
            yacht,
            request.shoreline_avoid_m,
        )
        .await?;

        let mesher_params = MesherParams {
            coast_clear_m: request.shoreline_avoid_m,
            coast_simplify_m: request.shoreline_avoid_m / 2.0,
        };
        let mesh = triangulate_water(&water.polygon, &water.route_xy, &request.zones, &mesher_params)?;
        if mesh.is_empty() {
            return Err(RouteError::NoNavigableArea);
        }
        let graph = mesh.graph();
        let vertex_tree = mesh.vertex_tree();
        let layout = select_weather_points(
            &mesh,
            &water.route_xy,
            &water.polygon,
            &request.weather_mesh,
            &frame,
        )?;

        let control_xy: Vec<Coord<f64>> = request
            .control_points
            .iter()
            .map(|p| frame.project(p.lat, p.lon))
            .collect();

        let ctx = RoutingContext {
            mesh: &mesh,
            graph: &graph,
            vertex_tree: &vertex_tree,
            frame: &frame,
            water: &water.polygon,
            route_xy: &water.route_xy,
            control_xy,
            layout: &layout,
            yacht,
            config: request.eta,
        };

        let mut variants = Vec::new();
        for departure in request.departures() {
            let profile = compute_profile(&ctx, &self.weather, departure).await?;
            variants.push(build_variant(profile));
        }

        let best_variant_index = best_variant(&variants);
        info!(
            "planned {} variant(s), best index {best_variant_index}",
            variants.len()
        );
        Ok(RoutePlan {
            best_variant_index,
            weather_stats: self.weather.stats(),
            mesh: mesh.to_artifact(frame.epsg()),
            layout: layout.to_artifact(),
            variants,
        })
    }
}

fn build_variant(profile: RouteProfile) -> RouteVariant {
    let (tacks_count, jibes_count) = count_maneuvers(&profile.raw_segments);
    let segments = merge_segments(&profile.raw_segments, BEARING_TOLERANCE_DEG);

    let mut waypoints_wgs84 = Vec::with_capacity(segments.len() + 1);
    if let Some(first) = segments.first() {
        waypoints_wgs84.push((first.from_lat, first.from_lon));
    }
    for s in &segments {
        waypoints_wgs84.push((s.to_lat, s.to_lon));
    }

    let difficulty = score_route(
        &segments,
        tacks_count,
        jibes_count,
        profile.total_distance_nm,
        profile.total_time_hours,
        profile.departure_time,
    );

    RouteVariant {
        departure_time: profile.departure_time,
        waypoints_wgs84,
        total_time_hours: profile.total_time_hours,
        total_distance_nm: profile.total_distance_nm,
        average_speed_knots: average_speed_kts(&profile),
        tacks_count,
        jibes_count,
        difficulty,
        converged: profile.converged,
        iterations: profile.iterations,
        max_eta_change_s: profile.max_eta_change_s,
        trace: profile.trace,
        weather_points: profile.weather_points,
        observations: profile.observations,
        segments,
    }
}

/// Lowest difficulty wins; ties break on duration, then earlier departure.
fn best_variant(variants: &[RouteVariant]) -> usize {
    let mut best = 0;
    for (i, candidate) in variants.iter().enumerate().skip(1) {
        let current = &variants[best];
        let ordering = candidate
            .difficulty
            .total
            .total_cmp(&current.difficulty.total)
            .then(candidate.total_time_hours.total_cmp(&current.total_time_hours))
            .then(candidate.departure_time.cmp(&current.departure_time));
        if ordering.is_lt() {
            best = i;
        }
    }
    best
}

/// Commit a finished plan to the external stores: the plan with its mesh
/// and layout artifacts, and every actually-fetched observation.
pub async fn persist_plan<R, F>(
    plan: &RoutePlan,
    route_store: &R,
    forecast_store: &F,
) -> Result<(), RouteError>
where
    R: RouteStore,
    F: ForecastStore,
{
    route_store.save_plan(plan, &plan.mesh, &plan.layout).await?;
    for variant in &plan.variants {
        for point in &variant.weather_points {
            if let Some(observation) = variant.observations.get(&point.idx) {
                forecast_store
                    .save_forecast(point.idx, point.eta, observation)
                    .await?;
            }
        }
    }
    Ok(())
}
