use std::time::Instant;

use chrono::Utc;
use sail_router::config::{MeshZones, RouteRequest, WeatherMeshConfig};
use sail_router::model::ControlPoint;
use sail_router::planner::RoutePlanner;
use sail_router::sources::{OpenSea, UniformDepth, WeatherFn};
use sail_router::weather::WeatherObservation;
use sail_router::weather::service::{TimeAwareWeatherService, WeatherServiceConfig};
use sail_router::Yacht;

#[tokio::main]
async fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    println!("--- Sail Router CLI Debugger ---");

    // 1. Setup: a Gulf of Gdańsk leg under a steady 10 kt westerly.
    let request = RouteRequest {
        control_points: vec![
            ControlPoint::new(54.52, 18.55),
            ControlPoint::new(54.35, 18.90),
        ],
        corridor_nm: 3.0,
        shoreline_avoid_m: 0.0,
        zones: MeshZones {
            radii_m: [500.0, 1500.0, 3000.0],
            max_area_m2: [60_000.0, 240_000.0, 900_000.0],
        },
        weather_mesh: WeatherMeshConfig::default(),
        eta: Default::default(),
        departure_time: Utc::now(),
        departure_window: None,
    };
    let yacht = Yacht::class40("demo-class40");

    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(
            WeatherFn(|_lat, _lon, _t| WeatherObservation::with_wind(10.0, 270.0)),
            WeatherServiceConfig::default(),
        ),
    );

    // 2. Plan and report.
    let started = Instant::now();
    match planner.plan(&request, &yacht).await {
        Ok(plan) => {
            let elapsed = started.elapsed();
            let variant = &plan.variants[plan.best_variant_index];
            println!("Planned in {elapsed:?}");
            println!(
                "Route: {:.1} nm in {:.2} h ({:.1} kn average)",
                variant.total_distance_nm,
                variant.total_time_hours,
                variant.average_speed_knots
            );
            println!(
                "Segments: {} (tacks: {}, jibes: {}), difficulty {:.1} ({:?})",
                variant.segments.len(),
                variant.tacks_count,
                variant.jibes_count,
                variant.difficulty.total,
                variant.difficulty.level
            );
            println!(
                "Converged: {} after {} iteration(s), max ETA change {:.0} s",
                variant.converged, variant.iterations, variant.max_eta_change_s
            );
            for (i, segment) in variant.segments.iter().enumerate() {
                println!(
                    "  #{i}: {:.2} nm @ {:.0}°, {:.1} kn, TWA {:.0}°, {:?}",
                    segment.distance_nm,
                    segment.bearing_deg,
                    segment.boat_speed_kts,
                    segment.twa_deg,
                    segment.point_of_sail
                );
            }
            println!(
                "Weather: {} requests, {} cache hits, {} api calls",
                plan.weather_stats.total_requests,
                plan.weather_stats.cache_hits,
                plan.weather_stats.api_calls
            );
        }
        Err(e) => {
            eprintln!("Routing failed [{}]: {e}", e.kind());
            std::process::exit(1);
        }
    }
}
