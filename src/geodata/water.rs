//! Navigable-water construction: corridor minus land minus
//! shallows, with a detour re-plan when the user polyline pierces an
//! obstacle.

use geo::{Area, BooleanOps, Contains, LineString, MultiPolygon, unary_union};
use log::{info, warn};

use crate::error::RouteError;
use crate::geo::LocalFrame;
use crate::geodata::corridor::{build_corridor, corridor_bbox_wgs84};
use crate::geodata::detour::safe_polyline;
use crate::model::Yacht;
use crate::sources::{BathymetrySource, LandSource};

const BBOX_PAD_M: f64 = 5_000.0;
const BATHY_RES_DEG: f64 = 0.001;
const MIN_PART_AREA_M2: f64 = 1.0;
/// Fixed under-keel safety margin added on top of the requested clearance.
const KEEL_MARGIN_M: f64 = 0.5;

/// The navigable area and the (possibly re-planned) route polyline that
/// lies inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterArea {
    pub polygon: MultiPolygon<f64>,
    pub route_xy: LineString<f64>,
}

pub async fn build_water_area<L, B>(
    land_source: &L,
    bathymetry: &B,
    frame: &LocalFrame,
    route_xy: LineString<f64>,
    corridor_nm: f64,
    yacht: &Yacht,
    clearance_m: f64,
) -> Result<WaterArea, RouteError>
where
    L: LandSource,
    B: BathymetrySource,
{
    let depth_cutoff_m = yacht.draft_or_default_m() + clearance_m + KEEL_MARGIN_M;

    let water = subtract_obstacles(
        land_source,
        bathymetry,
        frame,
        &route_xy,
        corridor_nm,
        depth_cutoff_m,
    )
    .await?;

    if water.contains(&route_xy) {
        return Ok(WaterArea { polygon: water, route_xy });
    }

    info!("route polyline pierces an obstacle, planning detour");
    let detoured = safe_polyline(&water, &route_xy.0)?.ok_or(RouteError::NoNavigableArea)?;

    // Rebuild the corridor around the replacement polyline so the mesh
    // budget follows the sailed line.
    let water = subtract_obstacles(
        land_source,
        bathymetry,
        frame,
        &detoured,
        corridor_nm,
        depth_cutoff_m,
    )
    .await?;
    if !water.contains(&detoured) {
        warn!("detoured polyline still touches the water boundary");
    }
    Ok(WaterArea { polygon: water, route_xy: detoured })
}

async fn subtract_obstacles<L, B>(
    land_source: &L,
    bathymetry: &B,
    frame: &LocalFrame,
    route_xy: &LineString<f64>,
    corridor_nm: f64,
    depth_cutoff_m: f64,
) -> Result<MultiPolygon<f64>, RouteError>
where
    L: LandSource,
    B: BathymetrySource,
{
    let corridor = build_corridor(route_xy, corridor_nm)?;
    let bbox = corridor_bbox_wgs84(&corridor, frame, BBOX_PAD_M)?;

    let land_wgs = land_source.fetch_land(bbox).await?;
    let mut water = if land_wgs.0.is_empty() {
        corridor
    } else {
        let land_local = unary_union(&frame.project_multipolygon(&land_wgs).0);
        corridor.difference(&land_local)
    };

    let raster = bathymetry.fetch_raster(bbox, BATHY_RES_DEG).await?;
    if let Some(shallow) = raster.shallow_polygon(depth_cutoff_m, frame) {
        water = water.difference(&shallow);
    }

    let water = repair(water);
    if water.unsigned_area() < MIN_PART_AREA_M2 {
        return Err(RouteError::NoNavigableArea);
    }
    Ok(water)
}

/// Keep the dominant water body: slivers below the area floor are dropped
/// and, mirroring the upstream behavior, disconnected ponds lose to the
/// largest part. Interior holes are preserved.
fn repair(water: MultiPolygon<f64>) -> MultiPolygon<f64> {
    let mut parts: Vec<_> = water
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() >= MIN_PART_AREA_M2)
        .collect();
    if parts.len() > 1 {
        parts.sort_by(|a, b| b.unsigned_area().total_cmp(&a.unsigned_area()));
        parts.truncate(1);
    }
    MultiPolygon(parts)
}
