//! Detour planning: when the user polyline pierces land or a
//! shoal, find a quick replacement polyline through the water with a coarse
//! mesh and Dijkstra. Fails softly per leg; a leg with no path keeps its
//! straight segment and the caller decides what that means.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use geo::{Area, Contains, Coord, LineString, MultiPolygon, Point, Simplify};
use log::{info, warn};

use crate::error::RouteError;
use crate::geo::planar_distance;
use crate::mesh::mesher::triangulate_uniform;
use crate::mesh::{Mesh, nearest_vertex};

const COARSE_AREA_M2: f64 = 5_000.0;
/// Cap on coarse-mesh size for very large water bodies.
const COARSE_TRIANGLE_BUDGET: f64 = 20_000.0;
const SIMPLIFY_TOLERANCE_M: f64 = 5.0;
const VIRTUAL_LINK_COUNT: usize = 20;

/// Replacement polyline through the water between consecutive waypoints.
/// Returns `Ok(None)` when no leg could be improved at all (no coarse mesh).
pub fn safe_polyline(
    water: &MultiPolygon<f64>,
    waypoints: &[Coord<f64>],
) -> Result<Option<LineString<f64>>, RouteError> {
    if waypoints.len() < 2 {
        return Ok(None);
    }

    let snapped: Vec<Coord<f64>> = waypoints
        .iter()
        .map(|&wp| snap_into_water(water, wp))
        .collect();

    let coarse_area = COARSE_AREA_M2.max(water.unsigned_area() / COARSE_TRIANGLE_BUDGET);
    let mesh = triangulate_uniform(water, coarse_area)?;
    if mesh.is_empty() {
        return Ok(None);
    }
    let graph = build_water_graph(&mesh);
    let tree = mesh.vertex_tree();

    let mut full_path: Vec<Coord<f64>> = Vec::new();
    for (leg, pair) in snapped.windows(2).enumerate() {
        let (start, end) = (pair[0], pair[1]);

        let start_links = virtual_links(&mesh, &tree, water, start);
        let end_links = virtual_links(&mesh, &tree, water, end);

        let leg_coords = match dijkstra(&mesh, &graph, &start_links, &end_links) {
            Some(indices) => {
                let mut coords = vec![start];
                coords.extend(indices.iter().map(|&i| mesh.vertices[i as usize]));
                coords.push(end);
                coords
            }
            None => {
                warn!("detour leg {leg} found no water path, keeping straight segment");
                vec![start, end]
            }
        };

        if full_path.is_empty() {
            full_path.extend(leg_coords);
        } else {
            full_path.extend(leg_coords.into_iter().skip(1));
        }
    }

    if full_path.len() < 2 {
        return Ok(None);
    }
    let line = LineString::from(full_path).simplify(&SIMPLIFY_TOLERANCE_M);
    info!("detour polyline with {} points", line.0.len());
    Ok(Some(line))
}

/// Nearest in-water position for a waypoint. Points already inside stay put;
/// outside points snap to the closest boundary vertex-dense location.
fn snap_into_water(water: &MultiPolygon<f64>, point: Coord<f64>) -> Coord<f64> {
    if water.contains(&Point::from(point)) {
        return point;
    }
    let mut best = point;
    let mut best_d = f64::INFINITY;
    for polygon in &water.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors().iter()) {
            for seg in ring.0.windows(2) {
                let candidate = nearest_on_segment(seg[0], seg[1], point);
                let d = planar_distance(candidate, point);
                if d < best_d {
                    best_d = d;
                    best = candidate;
                }
            }
        }
    }
    best
}

fn nearest_on_segment(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> Coord<f64> {
    let ab = Coord { x: b.x - a.x, y: b.y - a.y };
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 <= f64::EPSILON {
        return a;
    }
    let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len2).clamp(0.0, 1.0);
    Coord { x: a.x + t * ab.x, y: a.y + t * ab.y }
}

/// An edge is usable when sample points along it stay inside the water.
pub fn segment_in_water(water: &MultiPolygon<f64>, a: Coord<f64>, b: Coord<f64>) -> bool {
    let length = planar_distance(a, b);
    let samples = ((length / 25.0).ceil() as usize).clamp(2, 64);
    (0..=samples).all(|i| {
        let t = i as f64 / samples as f64;
        let p = Coord { x: a.x + t * (b.x - a.x), y: a.y + t * (b.y - a.y) };
        water.contains(&Point::from(p))
    })
}

/// Adjacency with euclidean weights. Every mesh edge is a side of an
/// in-water triangle, so it lies inside the water by construction; only
/// the virtual endpoint links need the sampled check.
fn build_water_graph(mesh: &Mesh) -> Vec<Vec<(u32, f64)>> {
    let mut adjacency: Vec<Vec<(u32, f64)>> = vec![Vec::new(); mesh.vertex_count()];
    for (u, v) in mesh.edges() {
        let w = planar_distance(mesh.vertices[u as usize], mesh.vertices[v as usize]);
        adjacency[u as usize].push((v, w));
        adjacency[v as usize].push((u, w));
    }
    adjacency
}

/// In-water links from a virtual endpoint to its k-nearest mesh vertices.
fn virtual_links(
    mesh: &Mesh,
    tree: &crate::mesh::VertexTree,
    water: &MultiPolygon<f64>,
    endpoint: Coord<f64>,
) -> Vec<(u32, f64)> {
    let mut links = Vec::new();
    // Take the nearest candidates in expanding order from the tree.
    for candidate in tree
        .nearest_neighbor_iter(&[endpoint.x, endpoint.y])
        .take(VIRTUAL_LINK_COUNT)
    {
        let idx = candidate.data;
        let vertex = mesh.vertices[idx as usize];
        if segment_in_water(water, endpoint, vertex) {
            links.push((idx, planar_distance(endpoint, vertex)));
        }
    }
    if links.is_empty() {
        // Last resort: connect to the single nearest vertex regardless.
        if let Some(idx) = nearest_vertex(tree, endpoint) {
            links.push((idx, planar_distance(endpoint, mesh.vertices[idx as usize])));
        }
    }
    links
}

/// Dijkstra from a virtual start (its links) to a virtual end (its links).
/// Returns the mesh-vertex index sequence, exclusive of the endpoints.
fn dijkstra(
    mesh: &Mesh,
    adjacency: &[Vec<(u32, f64)>],
    start_links: &[(u32, f64)],
    end_links: &[(u32, f64)],
) -> Option<Vec<u32>> {
    let n = mesh.vertex_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev = vec![u32::MAX; n];
    let mut heap: BinaryHeap<Reverse<(OrderedCost, u32)>> = BinaryHeap::new();

    for &(idx, w) in start_links {
        if w < dist[idx as usize] {
            dist[idx as usize] = w;
            heap.push(Reverse((OrderedCost(w), idx)));
        }
    }

    let mut end_cost: Vec<f64> = vec![f64::INFINITY; n];
    for &(idx, w) in end_links {
        end_cost[idx as usize] = w;
    }

    let mut best_exit: Option<(f64, u32)> = None;
    while let Some(Reverse((OrderedCost(d), u))) = heap.pop() {
        if d > dist[u as usize] {
            continue;
        }
        if end_cost[u as usize].is_finite() {
            let total = d + end_cost[u as usize];
            if best_exit.is_none_or(|(bd, _)| total < bd) {
                best_exit = Some((total, u));
            }
        }
        for &(v, w) in &adjacency[u as usize] {
            let nd = d + w;
            if nd < dist[v as usize] {
                dist[v as usize] = nd;
                prev[v as usize] = u;
                heap.push(Reverse((OrderedCost(nd), v)));
            }
        }
    }

    let (_, exit) = best_exit?;
    let mut path = vec![exit];
    let mut cursor = exit;
    while prev[cursor as usize] != u32::MAX {
        cursor = prev[cursor as usize];
        path.push(cursor);
    }
    path.reverse();
    Some(path)
}

/// Total-ordered f64 wrapper for the heap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedCost(f64);

impl Eq for OrderedCost {}

impl PartialOrd for OrderedCost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedCost {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{BooleanOps, coord, polygon};

    fn open_water() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: -3000.0),
            (x: 10_000.0, y: -3000.0),
            (x: 10_000.0, y: 3000.0),
            (x: 0.0, y: 3000.0),
        ]])
    }

    fn water_with_islet() -> MultiPolygon<f64> {
        let islet = MultiPolygon(vec![polygon![
            (x: 4000.0, y: -1200.0),
            (x: 6000.0, y: -1200.0),
            (x: 6000.0, y: 1200.0),
            (x: 4000.0, y: 1200.0),
        ]]);
        open_water().difference(&islet)
    }

    #[test]
    fn test_straight_water_keeps_roughly_straight_path() {
        let water = open_water();
        let line = safe_polyline(
            &water,
            &[coord! { x: 500.0, y: 0.0 }, coord! { x: 9500.0, y: 0.0 }],
        )
        .expect("detour")
        .expect("path exists");
        let length = crate::geo::line::polyline_length(&line);
        assert!(
            length < 9000.0 * 1.15,
            "open-water detour should stay near the straight distance, got {length}"
        );
    }

    #[test]
    fn test_detour_avoids_islet() {
        let water = water_with_islet();
        let line = safe_polyline(
            &water,
            &[coord! { x: 500.0, y: 0.0 }, coord! { x: 9500.0, y: 0.0 }],
        )
        .expect("detour")
        .expect("path exists");
        for pair in line.0.windows(2) {
            assert!(
                segment_in_water(&water, pair[0], pair[1]),
                "detour segment from {:?} to {:?} crosses the islet",
                pair[0],
                pair[1]
            );
        }
        // It must be longer than the (blocked) straight line.
        assert!(crate::geo::line::polyline_length(&line) > 9000.0);
    }

    #[test]
    fn test_waypoint_outside_water_is_snapped() {
        let water = open_water();
        let snapped = snap_into_water(&water, coord! { x: -500.0, y: 0.0 });
        assert!(water.contains(&Point::from(snapped)) || snapped.x.abs() < 1e-6);
        assert!(planar_distance(snapped, coord! { x: 0.0, y: 0.0 }) < 600.0);
    }

    #[test]
    fn test_empty_water_yields_none() {
        let empty = MultiPolygon::<f64>(vec![]);
        let result = safe_polyline(
            &empty,
            &[coord! { x: 0.0, y: 0.0 }, coord! { x: 100.0, y: 0.0 }],
        )
        .expect("no error on empty water");
        assert!(result.is_none());
    }
}
