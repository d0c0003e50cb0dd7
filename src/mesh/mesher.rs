//! Variable-density constrained-Delaunay meshing of the water polygon.
//! The water area is split into three concentric zones around
//! the route line; each zone is triangulated with its own area cap and the
//! parts are welded back together. Zone-boundary rings are densified before
//! the boolean split and constraint edges are kept unsplit during
//! refinement, so shared ring vertices coincide and weld into one connected
//! graph.

use std::collections::HashSet;

use geo::{Area, BooleanOps, Contains, Coord, Euclidean, LineString, MultiPolygon, Point, Polygon, Simplify};
use geo::line_measures::Densifiable;
use geo_offset::Offset;
use log::{debug, info};
use spade::{
    AngleLimit, ConstrainedDelaunayTriangulation, Point2, RefinementParameters, Triangulation,
};

use crate::config::MeshZones;
use crate::error::RouteError;
use crate::mesh::Mesh;

const EPS_AREA: f64 = 1e-6;
const MIN_ANGLE_DEG: f64 = 30.0;

/// Coastal treatment for the mid/far zones: erode the water copy away from
/// the shore and simplify its boundary. The near zone always meshes the raw
/// water so nothing around the route is clipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MesherParams {
    pub coast_clear_m: f64,
    pub coast_simplify_m: f64,
}

impl Default for MesherParams {
    fn default() -> Self {
        Self { coast_clear_m: 0.0, coast_simplify_m: 0.0 }
    }
}

/// Largest edge an equilateral triangle of the given area can have; used as
/// the densification step so boundary segments cannot exceed the zone's
/// implied edge bound.
fn max_edge_for_area(area_m2: f64) -> f64 {
    (4.0 * area_m2 / 3.0_f64.sqrt()).sqrt()
}

pub fn triangulate_water(
    water: &MultiPolygon<f64>,
    route: &LineString<f64>,
    zones: &MeshZones,
    params: &MesherParams,
) -> Result<Mesh, RouteError> {
    if water.unsigned_area() < EPS_AREA {
        return Ok(Mesh::default());
    }
    zones.validate()?;

    let [r1, r2, _] = zones.radii_m;
    let [a1, a2, a3] = zones.max_area_m2;

    let b1 = buffer_line(route, r1)?.densify(&Euclidean, 0.5 * max_edge_for_area(a1));
    let b2 = buffer_line(route, r2)?.densify(&Euclidean, 0.5 * max_edge_for_area(a2));

    let mut relaxed = water.clone();
    if params.coast_clear_m > 0.0 {
        let eroded = erode(&relaxed, params.coast_clear_m)?;
        if eroded.unsigned_area() >= EPS_AREA {
            relaxed = eroded;
        }
    }
    if params.coast_simplify_m > 0.0 {
        let simplified = relaxed.simplify(&params.coast_simplify_m);
        if simplified.unsigned_area() >= EPS_AREA {
            relaxed = simplified;
        }
    }

    let near = water.intersection(&b1);
    let mid = relaxed.intersection(&b2.difference(&b1));
    let far = relaxed.difference(&b2);

    let mut parts = Vec::new();
    for (region, cap) in [(near, a1), (mid, a2), (far, a3)] {
        if region.unsigned_area() < EPS_AREA {
            continue;
        }
        parts.push(triangulate_region(&region, cap)?);
    }

    let mut mesh = Mesh::weld(parts);
    drop_degenerate(&mut mesh);
    info!(
        "meshed water area: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangles.len()
    );
    Ok(mesh)
}

/// Uniform-density triangulation, used by the detour planner's coarse pass.
pub fn triangulate_uniform(
    water: &MultiPolygon<f64>,
    max_area_m2: f64,
) -> Result<Mesh, RouteError> {
    if water.unsigned_area() < EPS_AREA {
        return Ok(Mesh::default());
    }
    let mut mesh = triangulate_region(water, max_area_m2)?;
    drop_degenerate(&mut mesh);
    Ok(mesh)
}

fn buffer_line(line: &LineString<f64>, distance_m: f64) -> Result<MultiPolygon<f64>, RouteError> {
    line.offset_with_arc_segments(distance_m, 8)
        .map_err(|e| RouteError::MeshingFailed(format!("route buffer failed: {e:?}")))
}

fn erode(area: &MultiPolygon<f64>, distance_m: f64) -> Result<MultiPolygon<f64>, RouteError> {
    area.offset_with_arc_segments(-distance_m, 8)
        .map_err(|e| RouteError::MeshingFailed(format!("coastal erosion failed: {e:?}")))
}

fn triangulate_region(region: &MultiPolygon<f64>, max_area: f64) -> Result<Mesh, RouteError> {
    // Constraint edges are kept unsplit during refinement, so every ring
    // segment must already be shorter than the zone's edge bound or the
    // area cap is unsatisfiable along the boundary.
    let step = 0.5 * max_edge_for_area(max_area);
    let mut parts = Vec::new();
    for polygon in &region.0 {
        if polygon.unsigned_area() < EPS_AREA {
            continue;
        }
        parts.push(triangulate_polygon(&polygon.densify(&Euclidean, step), max_area)?);
    }
    Ok(Mesh::weld(parts))
}

fn triangulate_polygon(polygon: &Polygon<f64>, max_area: f64) -> Result<Mesh, RouteError> {
    let mut cdt = ConstrainedDelaunayTriangulation::<Point2<f64>>::new();

    insert_ring(&mut cdt, polygon.exterior())?;
    for interior in polygon.interiors() {
        insert_ring(&mut cdt, interior)?;
    }

    let refinement = RefinementParameters::<f64>::default()
        .exclude_outer_faces(true)
        .keep_constraint_edges()
        .with_angle_limit(AngleLimit::from_deg(MIN_ANGLE_DEG))
        .with_max_allowed_area(max_area);
    let outcome = cdt.refine(refinement);
    let excluded: HashSet<_> = outcome.excluded_faces.into_iter().collect();

    let mut vertices = vec![Coord { x: 0.0, y: 0.0 }; cdt.num_vertices()];
    for vertex in cdt.vertices() {
        let p = vertex.position();
        vertices[vertex.fix().index()] = Coord { x: p.x, y: p.y };
    }

    let mut triangles = Vec::new();
    for face in cdt.inner_faces() {
        if excluded.contains(&face.fix()) {
            continue;
        }
        let [va, vb, vc] = face.vertices();
        let tri = [
            va.fix().index() as u32,
            vb.fix().index() as u32,
            vc.fix().index() as u32,
        ];
        // Refinement's outer-face peeling handles the rings; the centroid
        // test catches anything left over inside holes.
        let centroid = Point::new(
            (vertices[tri[0] as usize].x + vertices[tri[1] as usize].x + vertices[tri[2] as usize].x) / 3.0,
            (vertices[tri[0] as usize].y + vertices[tri[1] as usize].y + vertices[tri[2] as usize].y) / 3.0,
        );
        if !polygon.contains(&centroid) {
            continue;
        }
        triangles.push(tri);
    }
    debug!(
        "triangulated polygon: {} vertices, {} faces kept (cap {max_area} m2)",
        vertices.len(),
        triangles.len()
    );

    Ok(Mesh { vertices, triangles })
}

fn insert_ring(
    cdt: &mut ConstrainedDelaunayTriangulation<Point2<f64>>,
    ring: &LineString<f64>,
) -> Result<(), RouteError> {
    let mut coords: Vec<Coord<f64>> = ring.0.clone();
    if coords.len() >= 2 && coords.first() == coords.last() {
        coords.pop();
    }
    coords.dedup();
    if coords.len() < 3 {
        return Ok(());
    }

    let mut handles = Vec::with_capacity(coords.len());
    for c in &coords {
        let handle = cdt
            .insert(Point2::new(c.x, c.y))
            .map_err(|e| RouteError::MeshingFailed(format!("vertex insertion failed: {e:?}")))?;
        handles.push(handle);
    }
    for i in 0..handles.len() {
        let a = handles[i];
        let b = handles[(i + 1) % handles.len()];
        if a != b {
            cdt.add_constraint(a, b);
        }
    }
    Ok(())
}

/// Drop triangles below the degeneracy threshold and fix orientation so
/// every kept triangle is counter-clockwise.
fn drop_degenerate(mesh: &mut Mesh) {
    let vertices = mesh.vertices.clone();
    mesh.triangles.retain_mut(|tri| {
        let a = vertices[tri[0] as usize];
        let b = vertices[tri[1] as usize];
        let c = vertices[tri[2] as usize];
        let doubled = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
        if doubled < 0.0 {
            tri.swap(1, 2);
        }
        doubled.abs() / 2.0 > EPS_AREA
    });
}
