//! Depth raster handling: deriving the "too shallow to sail" polygon and a
//! local tile cache so repeated requests for the same coverage do not hit
//! the upstream service.

use std::fs;
use std::path::{Path, PathBuf};

use geo::{LineString, MultiPolygon, Polygon, unary_union};
use geo_offset::Offset;
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::geo::{BboxWgs84, LocalFrame};

/// Row-major grid of water depths in meters, positive downward (deeper).
/// Row 0 is the southernmost row; column 0 the westernmost column. Cells
/// with unknown depth hold NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthRaster {
    pub west: f64,
    pub south: f64,
    pub res_deg: f64,
    pub width: usize,
    pub height: usize,
    pub depths_m: Vec<f32>,
}

impl DepthRaster {
    /// Uniform-depth raster covering a bounding box, for tests and demos.
    pub fn uniform(bbox: BboxWgs84, res_deg: f64, depth_m: f32) -> Self {
        let width = (((bbox.east - bbox.west) / res_deg).ceil() as usize).max(1);
        let height = (((bbox.north - bbox.south) / res_deg).ceil() as usize).max(1);
        Self {
            west: bbox.west,
            south: bbox.south,
            res_deg,
            width,
            height,
            depths_m: vec![depth_m; width * height],
        }
    }

    pub fn cell(&self, col: usize, row: usize) -> f32 {
        self.depths_m[row * self.width + col]
    }

    pub fn cell_mut(&mut self, col: usize, row: usize) -> &mut f32 {
        &mut self.depths_m[row * self.width + col]
    }

    /// Depth at a WGS84 position, None outside the coverage or over an
    /// unknown cell.
    pub fn depth_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let col = ((lon - self.west) / self.res_deg).floor();
        let row = ((lat - self.south) / self.res_deg).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        let depth = self.cell(col, row);
        if depth.is_nan() { None } else { Some(depth as f64) }
    }

    /// Polygon (in the local frame) of all cells shallower than the
    /// threshold. Per-row shallow runs become quads, which are unioned and
    /// smoothed with a small morphological closing. Unknown cells do not
    /// count as shallow; navigability of unknowns is the validator's call.
    pub fn shallow_polygon(
        &self,
        threshold_m: f64,
        frame: &LocalFrame,
    ) -> Option<MultiPolygon<f64>> {
        let run_quads: Vec<Polygon<f64>> = (0..self.height)
            .into_par_iter()
            .flat_map_iter(|row| {
                let mut quads = Vec::new();
                let mut run_start: Option<usize> = None;
                for col in 0..=self.width {
                    let shallow = col < self.width && {
                        let d = self.cell(col, row);
                        !d.is_nan() && (d as f64) < threshold_m
                    };
                    match (shallow, run_start) {
                        (true, None) => run_start = Some(col),
                        (false, Some(start)) => {
                            quads.push(self.run_quad(start, col, row, frame));
                            run_start = None;
                        }
                        _ => {}
                    }
                }
                quads
            })
            .collect();

        if run_quads.is_empty() {
            return None;
        }
        debug!("shallow mask: {} run quads below {threshold_m} m", run_quads.len());

        let merged = unary_union(&run_quads);
        // Close hairline gaps between neighbouring runs.
        let closing = self.res_deg.to_radians() * 6_371_000.0 * 0.1;
        match merged.offset(closing).and_then(|g| g.offset(-closing)) {
            Ok(closed) => Some(closed),
            Err(e) => {
                warn!("shallow-mask closing failed ({e:?}), using raw union");
                Some(merged)
            }
        }
    }

    fn run_quad(&self, col_start: usize, col_end: usize, row: usize, frame: &LocalFrame)
        -> Polygon<f64>
    {
        let west = self.west + col_start as f64 * self.res_deg;
        let east = self.west + col_end as f64 * self.res_deg;
        let south = self.south + row as f64 * self.res_deg;
        let north = south + self.res_deg;
        let corners = [
            frame.project(south, west),
            frame.project(south, east),
            frame.project(north, east),
            frame.project(north, west),
        ];
        Polygon::new(
            LineString::from(vec![
                corners[0], corners[1], corners[2], corners[3], corners[0],
            ]),
            vec![],
        )
    }
}

/// Local filesystem cache for fetched rasters, keyed on (bbox, resolution).
/// Writes are atomic: serialize to a temp file, then rename into place.
#[derive(Debug, Clone)]
pub struct TileCache {
    dir: PathBuf,
}

impl TileCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn tile_path(&self, bbox: BboxWgs84, res_deg: f64) -> PathBuf {
        self.dir.join(format!(
            "bathy_{:.4}_{:.4}_{:.4}_{:.4}_{:.5}.json",
            bbox.west, bbox.south, bbox.east, bbox.north, res_deg
        ))
    }

    pub fn load(&self, bbox: BboxWgs84, res_deg: f64) -> Option<DepthRaster> {
        let path = self.tile_path(bbox, res_deg);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(raster) => Some(raster),
            Err(e) => {
                warn!("discarding unreadable bathymetry tile {path:?}: {e}");
                None
            }
        }
    }

    pub fn store(
        &self,
        bbox: BboxWgs84,
        res_deg: f64,
        raster: &DepthRaster,
    ) -> Result<(), RouteError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.tile_path(bbox, res_deg);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(raster)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Contains, Point};

    fn bbox() -> BboxWgs84 {
        BboxWgs84 { west: 18.5, south: 54.3, east: 19.0, north: 54.6 }
    }

    #[test]
    fn test_depth_lookup() {
        let raster = DepthRaster::uniform(bbox(), 0.01, 20.0);
        assert_eq!(raster.depth_at(54.4, 18.7), Some(20.0));
        assert_eq!(raster.depth_at(53.0, 18.7), None, "south of coverage");
        assert_eq!(raster.depth_at(54.4, 20.0), None, "east of coverage");
    }

    #[test]
    fn test_nan_cells_are_unknown() {
        let mut raster = DepthRaster::uniform(bbox(), 0.01, 20.0);
        *raster.cell_mut(0, 0) = f32::NAN;
        assert_eq!(raster.depth_at(54.3001, 18.5001), None);
    }

    #[test]
    fn test_deep_water_has_no_shallow_polygon() {
        let raster = DepthRaster::uniform(bbox(), 0.01, 30.0);
        let frame = LocalFrame::for_centroid(54.45, 18.75);
        assert!(raster.shallow_polygon(4.0, &frame).is_none());
    }

    #[test]
    fn test_shallow_patch_is_extracted() {
        let mut raster = DepthRaster::uniform(bbox(), 0.01, 30.0);
        // A 3x3 shoal around (54.45, 18.75).
        let col0 = ((18.75 - raster.west) / raster.res_deg) as usize;
        let row0 = ((54.45 - raster.south) / raster.res_deg) as usize;
        for row in row0..row0 + 3 {
            for col in col0..col0 + 3 {
                *raster.cell_mut(col, row) = 1.0;
            }
        }
        let frame = LocalFrame::for_centroid(54.45, 18.75);
        let shallow = raster
            .shallow_polygon(4.0, &frame)
            .expect("shoal must produce a polygon");
        let center = frame.project(54.455, 18.755);
        assert!(
            shallow.contains(&Point::from(center)),
            "shoal center must be inside the shallow polygon"
        );
        let far = frame.project(54.35, 18.55);
        assert!(!shallow.contains(&Point::from(far)));
    }

    #[test]
    fn test_tile_cache_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "sail-router-tiles-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let cache = TileCache::new(&dir);
        let raster = DepthRaster::uniform(bbox(), 0.01, 12.0);

        assert!(cache.load(bbox(), 0.01).is_none());
        cache.store(bbox(), 0.01, &raster).expect("store tile");
        let loaded = cache.load(bbox(), 0.01).expect("load tile");
        assert_eq!(loaded, raster);
        // No stray temp files remain after the rename.
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .expect("read cache dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }
}
