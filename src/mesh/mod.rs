//! Triangular navigation mesh over the water polygon. The mesh induces an
//! undirected graph (triangle sides) stored in compact CSR form; a KD-tree
//! over vertices serves nearest-vertex snapping.

pub mod mesher;
pub mod sampling;

use std::collections::{BTreeSet, HashMap};

use geo::Coord;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

pub type VertexTree = RTree<GeomWithData<[f64; 2], u32>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Coord<f64>>,
    /// Counter-clockwise index triples into `vertices`.
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_area(&self, tri: [u32; 3]) -> f64 {
        let a = self.vertices[tri[0] as usize];
        let b = self.vertices[tri[1] as usize];
        let c = self.vertices[tri[2] as usize];
        0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))
    }

    /// Unique undirected edges, each as (min, max), in deterministic order.
    pub fn edges(&self) -> Vec<(u32, u32)> {
        let mut set = BTreeSet::new();
        for tri in &self.triangles {
            for (u, v) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                if u != v {
                    set.insert((u.min(v), u.max(v)));
                }
            }
        }
        set.into_iter().collect()
    }

    /// CSR adjacency over the triangle sides. Neighbor lists are sorted so
    /// traversal order is deterministic.
    pub fn graph(&self) -> MeshGraph {
        let n = self.vertices.len();
        let edges = self.edges();
        let mut degree = vec![0u32; n];
        for &(u, v) in &edges {
            degree[u as usize] += 1;
            degree[v as usize] += 1;
        }
        let mut offsets = vec![0u32; n + 1];
        for i in 0..n {
            offsets[i + 1] = offsets[i] + degree[i];
        }
        let mut neighbors = vec![0u32; offsets[n] as usize];
        let mut cursor = offsets[..n].to_vec();
        for &(u, v) in &edges {
            neighbors[cursor[u as usize] as usize] = v;
            cursor[u as usize] += 1;
            neighbors[cursor[v as usize] as usize] = u;
            cursor[v as usize] += 1;
        }
        // Edge list iteration already yields ascending targets per source,
        // but sort defensively per row so the invariant is local.
        for i in 0..n {
            let (lo, hi) = (offsets[i] as usize, offsets[i + 1] as usize);
            neighbors[lo..hi].sort_unstable();
        }
        MeshGraph { offsets, neighbors }
    }

    pub fn vertex_tree(&self) -> VertexTree {
        RTree::bulk_load(
            self.vertices
                .iter()
                .enumerate()
                .map(|(i, c)| GeomWithData::new([c.x, c.y], i as u32))
                .collect(),
        )
    }

    /// Concatenate part meshes, welding vertices that coincide to within a
    /// millimeter so zone boundaries stay connected.
    pub fn weld(parts: impl IntoIterator<Item = Mesh>) -> Mesh {
        let mut merged = Mesh::default();
        let mut index_of: HashMap<(i64, i64), u32> = HashMap::new();
        for part in parts {
            let mut remap = Vec::with_capacity(part.vertices.len());
            for v in &part.vertices {
                let key = ((v.x * 1000.0).round() as i64, (v.y * 1000.0).round() as i64);
                let idx = *index_of.entry(key).or_insert_with(|| {
                    merged.vertices.push(*v);
                    (merged.vertices.len() - 1) as u32
                });
                remap.push(idx);
            }
            for tri in &part.triangles {
                let mapped = [
                    remap[tri[0] as usize],
                    remap[tri[1] as usize],
                    remap[tri[2] as usize],
                ];
                if mapped[0] != mapped[1] && mapped[1] != mapped[2] && mapped[2] != mapped[0] {
                    merged.triangles.push(mapped);
                }
            }
        }
        merged
    }

    pub fn to_artifact(&self, crs_epsg: u32) -> MeshArtifact {
        MeshArtifact {
            nodes: self.vertices.iter().map(|c| [c.x, c.y]).collect(),
            triangles: self.triangles.to_vec(),
            crs_epsg,
        }
    }

    pub fn from_artifact(artifact: &MeshArtifact) -> Mesh {
        Mesh {
            vertices: artifact
                .nodes
                .iter()
                .map(|&[x, y]| Coord { x, y })
                .collect(),
            triangles: artifact.triangles.clone(),
        }
    }
}

/// Compact row-offset adjacency over the triangle sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshGraph {
    offsets: Vec<u32>,
    neighbors: Vec<u32>,
}

impl MeshGraph {
    pub fn vertex_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn neighbors(&self, vertex: u32) -> &[u32] {
        let lo = self.offsets[vertex as usize] as usize;
        let hi = self.offsets[vertex as usize + 1] as usize;
        &self.neighbors[lo..hi]
    }
}

/// Serialized mesh form persisted next to the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshArtifact {
    pub nodes: Vec<[f64; 2]>,
    pub triangles: Vec<[u32; 3]>,
    pub crs_epsg: u32,
}

/// Nearest mesh vertex to a planar point.
pub fn nearest_vertex(tree: &VertexTree, point: Coord<f64>) -> Option<u32> {
    tree.nearest_neighbor(&[point.x, point.y]).map(|g| g.data)
}
