use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::polar::PolarTable;
use crate::units::knots_to_ms;
use crate::weather::WeatherObservation;

/// Geographic control point supplied by the user. Route input is an ordered
/// sequence of at least two of these (start, ..., finish).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ControlPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, timestamp: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YachtType {
    Cruiser,
    Racer,
    RacerCruiser,
    Catamaran,
}

/// Yacht performance and handling parameters. Dimensions are meters, speeds
/// are knots, maneuver times are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Yacht {
    pub name: String,
    pub yacht_type: YachtType,
    pub length_m: f64,
    pub beam_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed_kts: Option<f64>,
    /// Maximum safe wind, knots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wind_kts: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crew_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tack_time_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jibe_time_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polar_table: Option<PolarTable>,
}

impl Yacht {
    pub const DEFAULT_TACK_TIME_S: f64 = 120.0;
    pub const DEFAULT_JIBE_TIME_S: f64 = 90.0;

    pub fn tack_penalty_s(&self) -> f64 {
        self.tack_time_s.unwrap_or(Self::DEFAULT_TACK_TIME_S)
    }

    pub fn jibe_penalty_s(&self) -> f64 {
        self.jibe_time_s.unwrap_or(Self::DEFAULT_JIBE_TIME_S)
    }

    pub fn draft_or_default_m(&self) -> f64 {
        self.draft_m.unwrap_or(2.0)
    }

    /// A Class-40-like test yacht, handy for examples and tests.
    pub fn class40(name: &str) -> Self {
        Self {
            name: name.to_string(),
            yacht_type: YachtType::Racer,
            length_m: 12.2,
            beam_m: 4.5,
            draft_m: Some(3.0),
            max_speed_kts: Some(14.0),
            max_wind_kts: Some(35.0),
            crew_size: Some(2),
            tack_time_s: Some(90.0),
            jibe_time_s: Some(60.0),
            polar_table: None,
        }
    }
}

/// Sailing conditions at a point, in marine units: speeds in knots,
/// directions in degrees ("from" convention, 0 = north, clockwise), wave
/// heights in meters. Conversion from raw observations happens exactly once,
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SailingConditions {
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
    pub wave_height_m: f64,
    pub wave_direction_deg: f64,
    pub wave_period_s: f64,
    pub current_speed_kts: f64,
    pub current_direction_deg: f64,
}

impl SailingConditions {
    pub fn from_observation(obs: &WeatherObservation) -> Self {
        Self {
            wind_speed_kts: obs.wind_speed_kts,
            wind_direction_deg: obs.wind_direction_deg.rem_euclid(360.0),
            wave_height_m: obs.wave_height_m,
            wave_direction_deg: obs.wave_direction_deg.rem_euclid(360.0),
            wave_period_s: obs.wave_period_s,
            current_speed_kts: obs.current_speed_kts,
            current_direction_deg: obs.current_direction_deg.rem_euclid(360.0),
        }
    }

    /// Fallback conditions used when a vertex has no mapped observation.
    pub fn fallback() -> Self {
        Self {
            wind_speed_kts: 10.0,
            wind_direction_deg: 0.0,
            wave_height_m: 1.0,
            wave_direction_deg: 0.0,
            wave_period_s: 5.0,
            current_speed_kts: 0.5,
            current_direction_deg: 0.0,
        }
    }

    pub fn wind_speed_ms(&self) -> f64 {
        knots_to_ms(self.wind_speed_kts)
    }

    pub fn current_speed_ms(&self) -> f64 {
        knots_to_ms(self.current_speed_kts)
    }
}

/// Maneuver classification at a segment boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maneuver {
    Tack,
    Jibe,
    None,
}

/// Named TWA band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOfSail {
    CloseHauled,
    CloseReach,
    BeamReach,
    BroadReach,
    Running,
}

impl PointOfSail {
    pub fn from_twa(twa_deg: f64) -> Self {
        match twa_deg.abs() {
            a if a < 50.0 => PointOfSail::CloseHauled,
            a if a < 80.0 => PointOfSail::CloseReach,
            a if a < 100.0 => PointOfSail::BeamReach,
            a if a < 150.0 => PointOfSail::BroadReach,
            _ => PointOfSail::Running,
        }
    }
}

/// How certain an arrival-time estimate is, relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaConfidence {
    /// Seeded from the constant-speed estimate, before the first pass.
    Estimated,
    /// More than 6 h out.
    Low,
    /// Between 1 h and 6 h out.
    Medium,
    /// Less than 1 h out.
    High,
}

impl EtaConfidence {
    pub fn from_hours_ahead(hours: f64) -> Self {
        if hours < 1.0 {
            EtaConfidence::High
        } else if hours < 6.0 {
            EtaConfidence::Medium
        } else {
            EtaConfidence::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    VeryEasy,
    Easy,
    Moderate,
    Difficult,
    VeryDifficult,
}

impl DifficultyLevel {
    pub fn from_score(score: f64) -> Self {
        if score <= 2.0 {
            DifficultyLevel::VeryEasy
        } else if score <= 4.0 {
            DifficultyLevel::Easy
        } else if score <= 6.0 {
            DifficultyLevel::Moderate
        } else if score <= 8.0 {
            DifficultyLevel::Difficult
        } else {
            DifficultyLevel::VeryDifficult
        }
    }
}
