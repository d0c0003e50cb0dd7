//! Boundary traits for the external collaborators the core consumes (land
//! polygons, bathymetry rasters, weather batches) and the sinks it commits
//! to at the end of a request. HTTP, files and databases live behind these;
//! the in-memory implementations here serve tests, demos and composition.

use chrono::{DateTime, Utc};
use geo::MultiPolygon;

use crate::error::RouteError;
use crate::geo::BboxWgs84;
use crate::geodata::bathymetry::DepthRaster;
use crate::mesh::MeshArtifact;
use crate::mesh::sampling::LayoutArtifact;
use crate::planner::RoutePlan;
use crate::weather::WeatherObservation;

/// Land polygons intersecting a WGS84 bounding box (geo convention:
/// x = lon, y = lat).
pub trait LandSource: Sync {
    fn fetch_land(
        &self,
        bbox: BboxWgs84,
    ) -> impl Future<Output = Result<MultiPolygon<f64>, RouteError>> + Send;
}

/// Depth raster for a WGS84 bounding box at the requested resolution.
pub trait BathymetrySource: Sync {
    fn fetch_raster(
        &self,
        bbox: BboxWgs84,
        res_deg: f64,
    ) -> impl Future<Output = Result<DepthRaster, RouteError>> + Send;
}

/// Batched weather for a list of (lat, lon) positions at one future time.
/// The result is index-aligned with the input; a source that lost a single
/// point returns the default table with `is_default` set for it.
pub trait WeatherSource: Sync {
    fn fetch_batch_at_time(
        &self,
        points: &[(f64, f64)],
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<WeatherObservation>, RouteError>> + Send;
}

/// Persists the finished plan together with its mesh and sampling layout.
pub trait RouteStore: Sync {
    fn save_plan(
        &self,
        plan: &RoutePlan,
        mesh: &MeshArtifact,
        layout: &LayoutArtifact,
    ) -> impl Future<Output = Result<(), RouteError>> + Send;
}

/// Persists the observations that were actually fetched, defaults included.
pub trait ForecastStore: Sync {
    fn save_forecast(
        &self,
        sample_idx: u32,
        at: DateTime<Utc>,
        observation: &WeatherObservation,
    ) -> impl Future<Output = Result<(), RouteError>> + Send;
}

/// A sea with no land in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSea;

impl LandSource for OpenSea {
    async fn fetch_land(&self, _bbox: BboxWgs84) -> Result<MultiPolygon<f64>, RouteError> {
        Ok(MultiPolygon(vec![]))
    }
}

/// Fixed land polygons in WGS84, clipped only by the caller's use.
#[derive(Debug, Clone)]
pub struct StaticLand(pub MultiPolygon<f64>);

impl LandSource for StaticLand {
    async fn fetch_land(&self, _bbox: BboxWgs84) -> Result<MultiPolygon<f64>, RouteError> {
        Ok(self.0.clone())
    }
}

/// Constant depth everywhere in the requested coverage.
#[derive(Debug, Clone, Copy)]
pub struct UniformDepth(pub f32);

impl BathymetrySource for UniformDepth {
    async fn fetch_raster(
        &self,
        bbox: BboxWgs84,
        res_deg: f64,
    ) -> Result<DepthRaster, RouteError> {
        Ok(DepthRaster::uniform(bbox, res_deg, self.0))
    }
}

/// A pre-built raster, as a bathymetry source.
#[derive(Debug, Clone)]
pub struct StaticRaster(pub DepthRaster);

impl BathymetrySource for StaticRaster {
    async fn fetch_raster(
        &self,
        _bbox: BboxWgs84,
        _res_deg: f64,
    ) -> Result<DepthRaster, RouteError> {
        Ok(self.0.clone())
    }
}

/// Weather computed from a pure function of position and time. The workhorse
/// of the test suite: constant winds, ramps and fronts are all closures.
#[derive(Debug, Clone, Copy)]
pub struct WeatherFn<F>(pub F);

impl<F> WeatherSource for WeatherFn<F>
where
    F: Fn(f64, f64, DateTime<Utc>) -> WeatherObservation + Sync,
{
    async fn fetch_batch_at_time(
        &self,
        points: &[(f64, f64)],
        at: DateTime<Utc>,
    ) -> Result<Vec<WeatherObservation>, RouteError> {
        Ok(points.iter().map(|&(lat, lon)| (self.0)(lat, lon, at)).collect())
    }
}

/// Discards everything. Used when the caller does not persist.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl RouteStore for NullStore {
    async fn save_plan(
        &self,
        _plan: &RoutePlan,
        _mesh: &MeshArtifact,
        _layout: &LayoutArtifact,
    ) -> Result<(), RouteError> {
        Ok(())
    }
}

impl ForecastStore for NullStore {
    async fn save_forecast(
        &self,
        _sample_idx: u32,
        _at: DateTime<Utc>,
        _observation: &WeatherObservation,
    ) -> Result<(), RouteError> {
        Ok(())
    }
}
