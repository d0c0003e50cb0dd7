//! End-to-end planning scenarios on synthetic sources: a straight Gulf of
//! Gdańsk leg, an islet detour, an upwind start, a ramping-wind
//! convergence run and cache-reuse accounting.

use chrono::{DateTime, Duration, Utc};
use geo::{Contains, MultiPolygon, Point, polygon};

use sail_router::Yacht;
use sail_router::config::{DepartureWindow, MeshZones, RouteRequest, WeatherMeshConfig};
use sail_router::model::ControlPoint;
use sail_router::planner::RoutePlanner;
use sail_router::sources::{OpenSea, StaticLand, UniformDepth, WeatherFn, WeatherSource};
use sail_router::weather::WeatherObservation;
use sail_router::weather::service::{TimeAwareWeatherService, WeatherServiceConfig};

fn gulf_request(departure: DateTime<Utc>) -> RouteRequest {
    RouteRequest {
        control_points: vec![
            ControlPoint::new(54.52, 18.55),
            ControlPoint::new(54.35, 18.90),
        ],
        corridor_nm: 3.0,
        shoreline_avoid_m: 0.0,
        // Coarser than production so the scenario meshes stay small.
        zones: MeshZones {
            radii_m: [500.0, 1500.0, 3000.0],
            max_area_m2: [60_000.0, 240_000.0, 900_000.0],
        },
        weather_mesh: WeatherMeshConfig::default(),
        eta: Default::default(),
        departure_time: departure,
        departure_window: None,
    }
}

fn steady_westerly() -> impl WeatherSource {
    WeatherFn(|_lat, _lon, _t| WeatherObservation::with_wind(10.0, 270.0))
}

#[tokio::test]
async fn straight_gulf_leg_converges_quickly() {
    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(steady_westerly(), WeatherServiceConfig::default()),
    );
    let plan = planner
        .plan(&gulf_request(Utc::now()), &Yacht::class40("gulf"))
        .await
        .expect("plan");

    let variant = &plan.variants[plan.best_variant_index];
    assert!(variant.converged, "steady weather must converge");
    assert!(
        variant.iterations <= 2,
        "expected convergence within two iterations, took {}",
        variant.iterations
    );
    // Roughly 16 nm; a broad reach at 10 kt takes between two and
    // three-and-a-half hours.
    assert!(
        (2.0..=3.5).contains(&variant.total_time_hours),
        "total time {} h out of the expected band",
        variant.total_time_hours
    );
    assert!(variant.total_distance_nm > 14.0 && variant.total_distance_nm < 22.0);
    assert_eq!(variant.jibes_count, 0, "no jibe expected on a one-board reach");
    assert!(
        variant.segments.len() <= 4,
        "a straight reach should collapse to a handful of merged segments, got {}",
        variant.segments.len()
    );
}

#[tokio::test]
async fn islet_in_the_way_is_rounded() {
    let islet_wgs = polygon![
        (x: 18.70, y: 54.41),
        (x: 18.76, y: 54.41),
        (x: 18.76, y: 54.46),
        (x: 18.70, y: 54.46),
    ];
    let planner = RoutePlanner::new(
        StaticLand(MultiPolygon(vec![islet_wgs.clone()])),
        UniformDepth(30.0),
        TimeAwareWeatherService::new(steady_westerly(), WeatherServiceConfig::default()),
    );
    let plan = planner
        .plan(&gulf_request(Utc::now()), &Yacht::class40("islet"))
        .await
        .expect("plan");

    let variant = &plan.variants[plan.best_variant_index];
    assert!(!variant.segments.is_empty());
    // No waypoint may land on the islet.
    for &(lat, lon) in &variant.waypoints_wgs84 {
        assert!(
            !islet_wgs.contains(&Point::new(lon, lat)),
            "waypoint ({lat}, {lon}) sits on the islet"
        );
    }
    // The detour is longer than the unobstructed straight leg (~16 nm).
    assert!(variant.total_distance_nm > 16.0);
}

#[tokio::test]
async fn upwind_start_produces_a_tacking_zigzag() {
    let mut request = gulf_request(Utc::now());
    // Due north leg in a northerly: nothing sails straight there.
    request.control_points = vec![
        ControlPoint::new(54.40, 18.70),
        ControlPoint::new(54.44, 18.70),
    ];
    request.corridor_nm = 0.8;
    request.zones = MeshZones {
        radii_m: [300.0, 800.0, 1500.0],
        max_area_m2: [20_000.0, 60_000.0, 200_000.0],
    };
    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(
            WeatherFn(|_lat, _lon, _t| WeatherObservation::with_wind(12.0, 0.0)),
            WeatherServiceConfig::default(),
        ),
    );
    let plan = planner
        .plan(&request, &Yacht::class40("upwind"))
        .await
        .expect("plan");

    let variant = &plan.variants[plan.best_variant_index];
    assert!(
        variant.tacks_count >= 2,
        "an upwind leg in a narrow corridor needs repeated tacks, got {}",
        variant.tacks_count
    );
    // Straight-line distance is about 2.4 nm; beating adds at least 30%.
    assert!(
        variant.total_distance_nm >= 2.4 * 1.3,
        "zigzag distance {} nm is too close to the rhumb line",
        variant.total_distance_nm
    );
    // Every sailed segment stays outside the dead angle.
    for segment in &variant.segments {
        assert!(
            segment.twa_deg.abs() >= 25.0,
            "segment TWA {} inside the dead angle",
            segment.twa_deg
        );
    }
    // Boards alternate sides of the wind.
    let signs: Vec<bool> = variant.segments.iter().map(|s| s.twa_deg > 0.0).collect();
    assert!(
        signs.windows(2).any(|w| w[0] != w[1]),
        "expected alternating boards, got TWAs {:?}",
        variant.segments.iter().map(|s| s.twa_deg).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn ramping_wind_needs_extra_iterations_to_settle() {
    let departure = Utc::now();
    let mut request = gulf_request(departure);
    request.eta.max_iterations = 4;
    // Wind builds from 5 kt to 20 kt across the first four hours.
    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(
            WeatherFn(move |_lat, _lon, t: DateTime<Utc>| {
                let hours = (t - departure).num_seconds() as f64 / 3600.0;
                let kts = (5.0 + hours.clamp(0.0, 4.0) * 3.75).min(20.0);
                WeatherObservation::with_wind(kts, 270.0)
            }),
            WeatherServiceConfig::default(),
        ),
    );
    let plan = planner
        .plan(&request, &Yacht::class40("ramp"))
        .await
        .expect("plan");

    let variant = &plan.variants[plan.best_variant_index];
    assert!(variant.trace.len() >= 2, "a ramp cannot settle in one pass");
    let first = variant.trace.first().expect("trace");
    let last = variant.trace.last().expect("trace");
    // The seed-speed estimate is materially wrong in a building breeze.
    let relative_change =
        (first.route_time_hours - last.route_time_hours).abs() / last.route_time_hours;
    assert!(
        relative_change > 0.05,
        "route duration moved only {:.1}% across iterations",
        relative_change * 100.0
    );
    if variant.trace.len() >= 3 {
        assert!(
            last.max_eta_change_s <= variant.trace[1].max_eta_change_s,
            "ETA changes should shrink after the first correction"
        );
    }
}

#[tokio::test]
async fn identical_rerun_is_served_entirely_from_cache() {
    let departure = Utc::now();
    let mut request = gulf_request(departure);
    request.eta.max_iterations = 1;
    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(steady_westerly(), WeatherServiceConfig::default()),
    );
    let yacht = Yacht::class40("cache");

    planner.plan(&request, &yacht).await.expect("first plan");
    let after_first = planner.weather_stats();
    assert!(after_first.api_calls > 0);

    planner.plan(&request, &yacht).await.expect("second plan");
    let after_second = planner.weather_stats();
    assert_eq!(
        after_second.api_calls, after_first.api_calls,
        "identical re-run must be all cache hits"
    );
    assert!(after_second.cache_hits > after_first.cache_hits);
}

#[tokio::test]
async fn nearby_departure_reuses_most_of_the_cache() {
    let base = Utc::now();
    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(steady_westerly(), WeatherServiceConfig::default()),
    );
    let yacht = Yacht::class40("nearby");

    let mut first = gulf_request(base);
    first.eta.max_iterations = 1;
    planner.plan(&first, &yacht).await.expect("first plan");
    let after_first = planner.weather_stats();

    let mut second = gulf_request(base + Duration::minutes(10));
    second.eta.max_iterations = 1;
    planner.plan(&second, &yacht).await.expect("second plan");
    let after_second = planner.weather_stats();

    let first_calls = after_first.api_calls;
    let second_calls = after_second.api_calls - after_first.api_calls;
    assert!(
        second_calls < first_calls,
        "shifted departure made {second_calls} api calls, first made {first_calls}"
    );
}

#[tokio::test]
async fn weather_budget_and_mapping_cutoff_hold() {
    let mut request = gulf_request(Utc::now());
    request.weather_mesh.max_points = 20;
    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(steady_westerly(), WeatherServiceConfig::default()),
    );
    let plan = planner
        .plan(&request, &Yacht::class40("budget"))
        .await
        .expect("plan");

    assert!(plan.layout.points.len() <= 20);
    // Every mesh vertex that maps at all maps to an existing sample.
    let max_idx = plan.layout.points.len() as u32;
    for vertices in plan.layout.mapping.values() {
        assert!(!vertices.is_empty());
    }
    for idx in plan.layout.mapping.keys() {
        assert!(*idx < max_idx);
    }
}

#[tokio::test]
async fn departure_window_sweep_selects_a_best_variant() {
    let start = Utc::now();
    let mut request = gulf_request(start);
    request.departure_window = Some(DepartureWindow {
        start,
        end: start + Duration::hours(3),
        num_samples: 3,
    });
    // Wind dies after two hours: later departures are slower and harder.
    let planner = RoutePlanner::new(
        OpenSea,
        UniformDepth(30.0),
        TimeAwareWeatherService::new(
            WeatherFn(move |_lat, _lon, t: DateTime<Utc>| {
                let hours = (t - start).num_seconds() as f64 / 3600.0;
                let kts = if hours < 2.0 { 12.0 } else { 4.0 };
                WeatherObservation::with_wind(kts, 270.0)
            }),
            WeatherServiceConfig::default(),
        ),
    );
    let plan = planner
        .plan(&request, &Yacht::class40("window"))
        .await
        .expect("plan");

    assert_eq!(plan.variants.len(), 3);
    assert!(plan.best_variant_index < plan.variants.len());
    let best = &plan.variants[plan.best_variant_index];
    for v in &plan.variants {
        assert!(best.difficulty.total <= v.difficulty.total + 1e-9);
    }
}
