//! Weather observations and the time-aware sampling points they attach to.
//! Speeds are knots at this boundary; ingestion converts once and the rest
//! of the crate trusts the unit.

pub mod cache;
pub mod rate_limit;
pub mod service;
pub mod validate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ceil_to_interval;
use crate::model::EtaConfidence;

/// One observation at a point and time. `is_default` marks values that came
/// from the fallback table after an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
    pub wind_gusts_kts: f64,
    pub wave_height_m: f64,
    pub wave_direction_deg: f64,
    pub wave_period_s: f64,
    pub current_speed_kts: f64,
    pub current_direction_deg: f64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    #[serde(default)]
    pub is_default: bool,
}

impl WeatherObservation {
    /// Fallback table used when a fetch fails for a point.
    pub fn default_observation() -> Self {
        Self {
            wind_speed_kts: 5.0,
            wind_direction_deg: 0.0,
            wind_gusts_kts: 7.0,
            wave_height_m: 0.5,
            wave_direction_deg: 0.0,
            wave_period_s: 4.0,
            current_speed_kts: 0.1,
            current_direction_deg: 0.0,
            temperature_c: 15.0,
            humidity_pct: 70.0,
            pressure_hpa: 1013.0,
            is_default: true,
        }
    }

    /// Calm conditions with the given wind, handy for tests and demos.
    pub fn with_wind(speed_kts: f64, direction_deg: f64) -> Self {
        Self {
            wind_speed_kts: speed_kts,
            wind_direction_deg: direction_deg,
            wind_gusts_kts: speed_kts * 1.3,
            wave_height_m: 0.0,
            wave_direction_deg: direction_deg,
            wave_period_s: 4.0,
            current_speed_kts: 0.0,
            current_direction_deg: 0.0,
            temperature_c: 15.0,
            humidity_pct: 70.0,
            pressure_hpa: 1013.0,
            is_default: false,
        }
    }
}

/// A weather sample point carrying the time the yacht is expected to reach
/// it. The cache key rounds the position to a spatial grid and the ETA up
/// to the next interval boundary, so nearby requests for the same quarter
/// hour coalesce.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeAwareWeatherPoint {
    pub idx: u32,
    pub x: f64,
    pub y: f64,
    pub lat: f64,
    pub lon: f64,
    pub eta: DateTime<Utc>,
    pub confidence: EtaConfidence,
    pub distance_from_start_m: f64,
}

impl TimeAwareWeatherPoint {
    pub fn cache_key(&self, grid_size_deg: f64, time_round_minutes: i64) -> String {
        let grid_lat = (self.lat / grid_size_deg).round() * grid_size_deg;
        let grid_lon = (self.lon / grid_size_deg).round() * grid_size_deg;
        let rounded = ceil_to_interval(self.eta, time_round_minutes);
        format!("taw:{grid_lat:.2}:{grid_lon:.2}:{}", rounded.timestamp())
    }

    /// Set a new ETA and derive the confidence band from how far out it is.
    pub fn update_eta(&mut self, eta: DateTime<Utc>, now: DateTime<Utc>) {
        self.eta = eta;
        let hours_ahead = (eta - now).num_seconds() as f64 / 3600.0;
        self.confidence = EtaConfidence::from_hours_ahead(hours_ahead.max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(lat: f64, lon: f64, eta: DateTime<Utc>) -> TimeAwareWeatherPoint {
        TimeAwareWeatherPoint {
            idx: 0,
            x: 0.0,
            y: 0.0,
            lat,
            lon,
            eta,
            confidence: EtaConfidence::Estimated,
            distance_from_start_m: 0.0,
        }
    }

    #[test]
    fn test_cache_key_coalesces_grid_and_quarter() {
        let eta_a = Utc.with_ymd_and_hms(2026, 8, 1, 10, 2, 0).unwrap();
        let eta_b = Utc.with_ymd_and_hms(2026, 8, 1, 10, 13, 0).unwrap();
        // Same grid cell, same quarter-hour ceiling.
        let a = point(54.521, 18.551, eta_a).cache_key(0.01, 15);
        let b = point(54.524, 18.548, eta_b).cache_key(0.01, 15);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_splits_across_quarter_boundary() {
        let eta_a = Utc.with_ymd_and_hms(2026, 8, 1, 10, 10, 0).unwrap();
        let eta_b = Utc.with_ymd_and_hms(2026, 8, 1, 10, 20, 0).unwrap();
        let a = point(54.52, 18.55, eta_a).cache_key(0.01, 15);
        let b = point(54.52, 18.55, eta_b).cache_key(0.01, 15);
        assert_ne!(a, b);
    }

    #[test]
    fn test_update_eta_sets_confidence() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        let mut p = point(54.5, 18.5, now);
        p.update_eta(now + chrono::Duration::minutes(30), now);
        assert_eq!(p.confidence, EtaConfidence::High);
        p.update_eta(now + chrono::Duration::hours(3), now);
        assert_eq!(p.confidence, EtaConfidence::Medium);
        p.update_eta(now + chrono::Duration::hours(12), now);
        assert_eq!(p.confidence, EtaConfidence::Low);
    }

    #[test]
    fn test_default_observation_is_flagged() {
        assert!(WeatherObservation::default_observation().is_default);
        assert!(!WeatherObservation::with_wind(10.0, 270.0).is_default);
    }
}
