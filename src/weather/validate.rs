//! Observation validation: a sample is usable only when every field the
//! router reads is present, finite and inside its physical range.

use crate::weather::WeatherObservation;

pub const MAX_WIND_SPEED_KTS: f64 = 100.0;
pub const MAX_WAVE_HEIGHT_M: f64 = 30.0;
pub const MAX_WAVE_PERIOD_S: f64 = 30.0;

pub fn validate_observation(obs: &WeatherObservation) -> bool {
    let speeds_ok = (0.0..=MAX_WIND_SPEED_KTS).contains(&obs.wind_speed_kts)
        && obs.current_speed_kts >= 0.0
        && obs.wind_gusts_kts >= 0.0;
    let waves_ok = (0.0..=MAX_WAVE_HEIGHT_M).contains(&obs.wave_height_m)
        && (0.0..=MAX_WAVE_PERIOD_S).contains(&obs.wave_period_s);
    let directions_ok = [
        obs.wind_direction_deg,
        obs.wave_direction_deg,
        obs.current_direction_deg,
    ]
    .iter()
    .all(|d| (0.0..360.0).contains(d));
    let finite = [
        obs.wind_speed_kts,
        obs.wind_direction_deg,
        obs.wind_gusts_kts,
        obs.wave_height_m,
        obs.wave_direction_deg,
        obs.wave_period_s,
        obs.current_speed_kts,
        obs.current_direction_deg,
    ]
    .iter()
    .all(|v| v.is_finite());

    finite && speeds_ok && waves_ok && directions_ok
}

/// Depth is navigable when known, finite and at least the required minimum.
pub fn validate_depth(depth_m: Option<f64>, min_depth_m: f64) -> bool {
    match depth_m {
        Some(d) => d.is_finite() && d >= min_depth_m,
        None => false,
    }
}
