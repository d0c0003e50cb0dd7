//! Time-optimal A* over the mesh graph. Uses the CSR adjacency,
//! pre-allocated score vectors and a binary heap keyed on f = g + h; ties
//! break on the vertex index so runs are deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use geo::Coord;

use crate::geo::bearing_deg;
use crate::mesh::MeshGraph;
use crate::routing::heuristics::SailingHeuristics;

#[derive(Debug, Clone, PartialEq)]
pub struct AstarResult {
    pub path: Vec<u32>,
    /// Cost to reach each vertex; infinity where never reached.
    pub g_score: Vec<f64>,
    /// g + h at the time of queueing; infinity where never queued.
    pub f_score: Vec<f64>,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenEntry {
    f: f64,
    vertex: u32,
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on f for a min-heap; equal f pops the smaller index.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn find_route(
    graph: &MeshGraph,
    heuristics: &SailingHeuristics<'_>,
    start: u32,
    goal: u32,
) -> Option<AstarResult> {
    let n = graph.vertex_count();
    if start as usize >= n || goal as usize >= n {
        return None;
    }
    if start == goal {
        return Some(AstarResult {
            path: vec![start],
            g_score: {
                let mut g = vec![f64::INFINITY; n];
                g[start as usize] = 0.0;
                g
            },
            f_score: vec![f64::INFINITY; n],
            total_cost: 0.0,
        });
    }

    let goal_pos: Coord<f64> = heuristics.position(goal);
    let mut g_score = vec![f64::INFINITY; n];
    let mut f_score = vec![f64::INFINITY; n];
    let mut came_from = vec![u32::MAX; n];
    let mut closed = vec![false; n];
    let mut open = BinaryHeap::new();

    g_score[start as usize] = 0.0;
    f_score[start as usize] = heuristics.heuristic_cost(start, goal_pos);
    open.push(OpenEntry { f: f_score[start as usize], vertex: start });

    while let Some(OpenEntry { vertex: current, .. }) = open.pop() {
        if current == goal {
            let path = reconstruct(&came_from, start, goal);
            let total_cost = g_score[goal as usize];
            return Some(AstarResult { path, g_score, f_score, total_cost });
        }
        if closed[current as usize] {
            continue;
        }
        closed[current as usize] = true;

        // Heading of the edge that brought us here, unknown at the start.
        let previous_heading = match came_from[current as usize] {
            u32::MAX => None,
            prev => Some(bearing_deg(
                heuristics.position(prev),
                heuristics.position(current),
            )),
        };

        for &neighbor in graph.neighbors(current) {
            if closed[neighbor as usize] {
                continue;
            }
            let edge_cost = heuristics.edge_cost(current, neighbor, previous_heading);
            if !edge_cost.is_finite() {
                continue;
            }
            let tentative = g_score[current as usize] + edge_cost;
            if tentative < g_score[neighbor as usize] {
                came_from[neighbor as usize] = current;
                g_score[neighbor as usize] = tentative;
                let f = tentative + heuristics.heuristic_cost(neighbor, goal_pos);
                f_score[neighbor as usize] = f;
                open.push(OpenEntry { f, vertex: neighbor });
            }
        }
    }

    None
}

fn reconstruct(came_from: &[u32], start: u32, goal: u32) -> Vec<u32> {
    let mut path = vec![goal];
    let mut cursor = goal;
    while cursor != start {
        cursor = came_from[cursor as usize];
        path.push(cursor);
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Yacht;
    use crate::routing::heuristics::VertexWeather;
    use crate::weather::WeatherObservation;
    use geo::coord;
    use std::collections::HashMap;

    /// A 5x3 strip of grid triangles, 1 km spacing, x eastward.
    fn strip_mesh() -> crate::mesh::Mesh {
        let cols = 5;
        let rows = 3;
        let mut vertices = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                vertices.push(coord! { x: c as f64 * 1000.0, y: r as f64 * 1000.0 - 1000.0 });
            }
        }
        let mut triangles = Vec::new();
        for r in 0..rows - 1 {
            for c in 0..cols - 1 {
                let i = (r * cols + c) as u32;
                triangles.push([i, i + 1, i + cols as u32 + 1]);
                triangles.push([i, i + cols as u32 + 1, i + cols as u32]);
            }
        }
        crate::mesh::Mesh { vertices, triangles }
    }

    fn uniform_obs(wind_from: f64, kts: f64, n: usize) -> (Vec<Option<u32>>, HashMap<u32, WeatherObservation>) {
        let mapping = vec![Some(0); n];
        let mut obs = HashMap::new();
        obs.insert(0, WeatherObservation::with_wind(kts, wind_from));
        (mapping, obs)
    }

    #[test]
    fn test_finds_a_path_on_a_beam_reach() {
        let mesh = strip_mesh();
        let graph = mesh.graph();
        let yacht = Yacht::class40("t");
        let (mapping, obs) = uniform_obs(0.0, 12.0, mesh.vertex_count());
        let h = SailingHeuristics::new(&yacht, &mesh.vertices, VertexWeather::new(&mapping, &obs));
        // West to east across the strip, north wind: beam reach all the way.
        let result = find_route(&graph, &h, 5, 9).expect("path must exist");
        assert_eq!(*result.path.first().unwrap(), 5);
        assert_eq!(*result.path.last().unwrap(), 9);
        assert!(result.total_cost.is_finite());
        // The direct row is optimal here.
        assert_eq!(result.path, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_start_equals_goal() {
        let mesh = strip_mesh();
        let graph = mesh.graph();
        let yacht = Yacht::class40("t");
        let (mapping, obs) = uniform_obs(0.0, 12.0, mesh.vertex_count());
        let h = SailingHeuristics::new(&yacht, &mesh.vertices, VertexWeather::new(&mapping, &obs));
        let result = find_route(&graph, &h, 3, 3).expect("trivial path");
        assert_eq!(result.path, vec![3]);
        assert_eq!(result.total_cost, 0.0);
    }

    #[test]
    fn test_upwind_goal_is_reached_by_zigzag() {
        // Wind from the east, goal due east: direct edges are in the dead
        // angle, so the router must zigzag through off-axis vertices.
        let mesh = strip_mesh();
        let graph = mesh.graph();
        let yacht = Yacht::class40("t");
        let (mapping, obs) = uniform_obs(90.0, 12.0, mesh.vertex_count());
        let h = SailingHeuristics::new(&yacht, &mesh.vertices, VertexWeather::new(&mapping, &obs));
        let result = find_route(&graph, &h, 5, 9).expect("zigzag path must exist");
        assert!(
            result.path != vec![5, 6, 7, 8, 9],
            "dead-angle edges must not be sailed straight"
        );
        // Path must leave the middle row at least once.
        assert!(result.path.iter().any(|&v| v < 5 || v > 9));
    }

    #[test]
    fn test_safe_variant_routes_around_exclusions() {
        let mesh = strip_mesh();
        let graph = mesh.graph();
        let yacht = Yacht::class40("t");
        let (mapping, obs) = uniform_obs(0.0, 12.0, mesh.vertex_count());
        let mut non_navigable = vec![false; mesh.vertex_count()];
        non_navigable[7] = true; // middle of the center row
        let h = SailingHeuristics::new(&yacht, &mesh.vertices, VertexWeather::new(&mapping, &obs))
            .with_exclusions(&non_navigable);
        let result = find_route(&graph, &h, 5, 9).expect("path around exclusion");
        assert!(!result.path.contains(&7));
    }

    #[test]
    fn test_no_route_when_goal_is_excluded() {
        let mesh = strip_mesh();
        let graph = mesh.graph();
        let yacht = Yacht::class40("t");
        let (mapping, obs) = uniform_obs(0.0, 12.0, mesh.vertex_count());
        let mut non_navigable = vec![false; mesh.vertex_count()];
        non_navigable[9] = true;
        let h = SailingHeuristics::new(&yacht, &mesh.vertices, VertexWeather::new(&mapping, &obs))
            .with_exclusions(&non_navigable);
        assert!(find_route(&graph, &h, 5, 9).is_none());
    }

    #[test]
    fn test_g_scores_monotone_along_path() {
        let mesh = strip_mesh();
        let graph = mesh.graph();
        let yacht = Yacht::class40("t");
        let (mapping, obs) = uniform_obs(0.0, 12.0, mesh.vertex_count());
        let h = SailingHeuristics::new(&yacht, &mesh.vertices, VertexWeather::new(&mapping, &obs));
        let result = find_route(&graph, &h, 5, 9).expect("path");
        for pair in result.path.windows(2) {
            assert!(
                result.g_score[pair[1] as usize] > result.g_score[pair[0] as usize],
                "g must strictly increase along the path"
            );
        }
    }
}
