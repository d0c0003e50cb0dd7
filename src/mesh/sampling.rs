//! Weather sampling layout: a bounded set of representative
//! points arranged in concentric zones around the route, plus the mapping
//! from every mesh vertex to its nearest sample.

use std::collections::BTreeMap;

use geo::{Contains, Coord, LineString, MultiPolygon, Point};
use log::info;
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::config::WeatherMeshConfig;
use crate::error::RouteError;
use crate::geo::line::{distance_to_line, locate_along, offset_point, point_at, polyline_length};
use crate::geo::{LocalFrame, planar_distance};
use crate::mesh::{Mesh, nearest_vertex};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub idx: u32,
    pub x: f64,
    pub y: f64,
    pub lat: f64,
    pub lon: f64,
}

impl SamplePoint {
    pub fn position(&self) -> Coord<f64> {
        Coord { x: self.x, y: self.y }
    }
}

/// The selected sample set and the vertex-to-sample mapping. A vertex whose
/// nearest sample is farther than the configured cutoff is non-navigable
/// and maps to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherLayout {
    pub points: Vec<SamplePoint>,
    pub nearest_sample: Vec<Option<u32>>,
}

impl WeatherLayout {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Persisted form: the point list plus the inverse mapping
    /// (sample -> mesh vertices).
    pub fn to_artifact(&self) -> LayoutArtifact {
        let mut mapping: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (vertex, sample) in self.nearest_sample.iter().enumerate() {
            if let Some(idx) = sample {
                mapping.entry(*idx).or_default().push(vertex as u32);
            }
        }
        LayoutArtifact { points: self.points.clone(), mapping }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutArtifact {
    pub points: Vec<SamplePoint>,
    pub mapping: BTreeMap<u32, Vec<u32>>,
}

pub fn select_weather_points(
    mesh: &Mesh,
    route: &LineString<f64>,
    water: &MultiPolygon<f64>,
    config: &WeatherMeshConfig,
    frame: &LocalFrame,
) -> Result<WeatherLayout, RouteError> {
    config.validate()?;
    if mesh.is_empty() {
        return Err(RouteError::NoNavigableArea);
    }

    let budget = config.max_points;
    // 40/40/20 split across near/mid/far, near takes the remainder.
    let mid_budget = (budget * 2) / 5;
    let far_budget = budget / 5;
    let near_budget = budget - mid_budget - far_budget;

    let vertex_tree = mesh.vertex_tree();
    let mut candidates: Vec<Coord<f64>> = Vec::new();

    candidates.extend(near_zone_candidates(route, water, config, near_budget));
    candidates.extend(outer_zone_candidates(
        mesh,
        &vertex_tree,
        route,
        water,
        config,
        mid_budget,
        OuterZone::Mid,
    ));
    candidates.extend(outer_zone_candidates(
        mesh,
        &vertex_tree,
        route,
        water,
        config,
        far_budget,
        OuterZone::Far,
    ));

    let deduped = remove_close_duplicates(&candidates, config.dedup_distance_m);
    let points: Vec<SamplePoint> = deduped
        .into_iter()
        .take(config.max_points)
        .enumerate()
        .map(|(i, c)| {
            let (lat, lon) = frame.inverse(c);
            SamplePoint { idx: i as u32, x: c.x, y: c.y, lat, lon }
        })
        .collect();

    if points.is_empty() {
        return Err(RouteError::NoNavigableArea);
    }
    info!(
        "weather layout: {} samples (budget {}), {} mesh vertices",
        points.len(),
        config.max_points,
        mesh.vertex_count()
    );

    let nearest_sample = map_vertices_to_samples(mesh, &points, config.max_mapping_distance_m);
    Ok(WeatherLayout { points, nearest_sample })
}

/// Equispaced stations along the route with small lateral offsets
/// alternating left/right.
fn near_zone_candidates(
    route: &LineString<f64>,
    water: &MultiPolygon<f64>,
    config: &WeatherMeshConfig,
    count: usize,
) -> Vec<Coord<f64>> {
    if count == 0 {
        return Vec::new();
    }
    let total = polyline_length(route);
    let lateral = config.near_zone_m / 2.0;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let s = if count > 1 {
            total * i as f64 / (count - 1) as f64
        } else {
            total / 2.0
        };
        let side = if i % 2 == 0 { 1.0 } else { -1.0 };
        let offset = offset_point(route, s, side * lateral);
        if water.contains(&Point::from(offset)) {
            out.push(offset);
        } else {
            // Fall back onto the route itself, which is inside by contract.
            let on_route = point_at(route, s);
            if water.contains(&Point::from(on_route)) {
                out.push(on_route);
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OuterZone {
    Mid,
    Far,
}

/// Regular along-route grid emitting symmetric left/right samples, each
/// snapped to the nearest mesh vertex that still lies within the zone band.
fn outer_zone_candidates(
    mesh: &Mesh,
    vertex_tree: &crate::mesh::VertexTree,
    route: &LineString<f64>,
    water: &MultiPolygon<f64>,
    config: &WeatherMeshConfig,
    budget: usize,
    zone: OuterZone,
) -> Vec<Coord<f64>> {
    if budget == 0 {
        return Vec::new();
    }
    let total = polyline_length(route);
    let lateral = match zone {
        OuterZone::Mid => (config.near_zone_m + config.mid_zone_m) / 2.0,
        OuterZone::Far => config.mid_zone_m + config.grid_spacing_m / 2.0,
    };
    let in_band = |d: f64| match zone {
        OuterZone::Mid => d > config.near_zone_m && d <= config.mid_zone_m,
        OuterZone::Far => d > config.mid_zone_m,
    };

    let steps = ((total / config.grid_spacing_m).floor() as usize).max(1);
    let mut out = Vec::new();
    'grid: for i in 0..=steps {
        let s = (i as f64 * config.grid_spacing_m).min(total);
        for side in [1.0, -1.0] {
            if out.len() >= budget {
                break 'grid;
            }
            let grid_point = offset_point(route, s, side * lateral);
            let Some(vertex) = nearest_vertex(vertex_tree, grid_point) else {
                continue;
            };
            let snapped = mesh.vertices[vertex as usize];
            if !in_band(distance_to_line(route, snapped)) {
                continue;
            }
            if !water.contains(&Point::from(snapped)) {
                continue;
            }
            out.push(snapped);
        }
    }
    out
}

/// Keep-first dedup: any candidate closer than `min_distance_m` to an
/// already kept one is dropped.
fn remove_close_duplicates(candidates: &[Coord<f64>], min_distance_m: f64) -> Vec<Coord<f64>> {
    let mut kept: Vec<Coord<f64>> = Vec::with_capacity(candidates.len());
    for &c in candidates {
        if kept.iter().all(|&k| planar_distance(k, c) > min_distance_m) {
            kept.push(c);
        }
    }
    kept
}

fn map_vertices_to_samples(
    mesh: &Mesh,
    points: &[SamplePoint],
    max_distance_m: f64,
) -> Vec<Option<u32>> {
    let tree: RTree<GeomWithData<[f64; 2], u32>> = RTree::bulk_load(
        points
            .iter()
            .map(|p| GeomWithData::new([p.x, p.y], p.idx))
            .collect(),
    );
    mesh.vertices
        .par_iter()
        .map(|v| {
            tree.nearest_neighbor(&[v.x, v.y]).and_then(|nearest| {
                let sample = Coord { x: nearest.geom()[0], y: nearest.geom()[1] };
                if planar_distance(*v, sample) <= max_distance_m {
                    Some(nearest.data)
                } else {
                    None
                }
            })
        })
        .collect()
}
