//! Route difficulty scoring: a weighted 1-10 aggregate over
//! meteo (40%), geometry (45%) and navigation (15%) factors, banded into a
//! named level.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{bearing_difference, circular_concentration};
use crate::model::DifficultyLevel;
use crate::routing::segments::MergedSegment;

const WIND_OPTIMAL_MIN_KTS: f64 = 8.0;
const WIND_OPTIMAL_MAX_KTS: f64 = 18.0;
const WIND_DANGEROUS_KTS: f64 = 30.0;

const WAVE_COMFORTABLE_M: f64 = 0.5;
const WAVE_MODERATE_M: f64 = 1.5;
const WAVE_DIFFICULT_M: f64 = 2.5;
const WAVE_DANGEROUS_M: f64 = 4.0;

const DISTANCE_SHORT_NM: f64 = 10.0;
const DISTANCE_MEDIUM_NM: f64 = 30.0;
const DISTANCE_LONG_NM: f64 = 60.0;
const DISTANCE_VERY_LONG_NM: f64 = 100.0;

const TACKS_FEW: usize = 3;
const TACKS_MODERATE: usize = 8;
const TACKS_MANY: usize = 15;
const TACKS_EXTREME: usize = 25;

// Factor weights; meteo sums to 0.40, geometry to 0.45, navigation to 0.15.
const W_WIND_SPEED: f64 = 0.15;
const W_WIND_GUST: f64 = 0.08;
const W_WAVE_HEIGHT: f64 = 0.12;
const W_WIND_CONSISTENCY: f64 = 0.05;
const W_DISTANCE: f64 = 0.10;
const W_TACK_COUNT: f64 = 0.12;
const W_JIBE_COUNT: f64 = 0.08;
const W_MANEUVER_DENSITY: f64 = 0.10;
const W_UPWIND_RATIO: f64 = 0.05;
const W_NIGHT_SAILING: f64 = 0.08;
const W_COURSE_COMPLEXITY: f64 = 0.07;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyFactors {
    pub wind_speed: f64,
    pub wind_gust: f64,
    pub wave_height: f64,
    pub wind_consistency: f64,
    pub distance: f64,
    pub tack_count: f64,
    pub jibe_count: f64,
    pub maneuver_density: f64,
    pub upwind_ratio: f64,
    pub night_sailing: f64,
    pub course_complexity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBreakdown {
    pub total: f64,
    pub level: DifficultyLevel,
    /// Category subtotals rescaled onto 1-10.
    pub meteo: f64,
    pub geometry: f64,
    pub navigation: f64,
    pub factors: DifficultyFactors,
}

pub fn score_route(
    segments: &[MergedSegment],
    tacks_count: usize,
    jibes_count: usize,
    total_distance_nm: f64,
    total_time_hours: f64,
    departure_time: DateTime<Utc>,
) -> DifficultyBreakdown {
    let wind_speeds: Vec<f64> = segments.iter().map(|s| s.wind_speed_kts).collect();
    let wave_heights: Vec<f64> = segments.iter().map(|s| s.wave_height_m).collect();
    let wind_directions: Vec<f64> = segments.iter().map(|s| s.wind_direction_deg).collect();
    let twas: Vec<f64> = segments.iter().map(|s| s.twa_deg).collect();
    let bearings: Vec<f64> = segments.iter().map(|s| s.bearing_deg).collect();

    // Solar-local clock from the route's longitude; good enough for the
    // night-share factor without a timezone database.
    let utc_offset_hours = segments
        .first()
        .map(|s| (s.from_lon / 15.0).round())
        .unwrap_or(0.0);

    let factors = DifficultyFactors {
        wind_speed: wind_speed_score(&wind_speeds),
        wind_gust: wind_gust_score(&wind_speeds),
        wave_height: wave_score(&wave_heights),
        wind_consistency: wind_consistency_score(&wind_directions),
        distance: distance_score(total_distance_nm),
        tack_count: tack_score(tacks_count),
        jibe_count: jibe_score(jibes_count),
        maneuver_density: maneuver_density_score(tacks_count + jibes_count, total_distance_nm),
        upwind_ratio: upwind_ratio_score(&twas),
        night_sailing: night_score(departure_time, total_time_hours, utc_offset_hours),
        course_complexity: course_complexity_score(&bearings),
    };

    let meteo_weighted = factors.wind_speed * W_WIND_SPEED
        + factors.wind_gust * W_WIND_GUST
        + factors.wave_height * W_WAVE_HEIGHT
        + factors.wind_consistency * W_WIND_CONSISTENCY;
    let geometry_weighted = factors.distance * W_DISTANCE
        + factors.tack_count * W_TACK_COUNT
        + factors.jibe_count * W_JIBE_COUNT
        + factors.maneuver_density * W_MANEUVER_DENSITY
        + factors.upwind_ratio * W_UPWIND_RATIO;
    let navigation_weighted =
        factors.night_sailing * W_NIGHT_SAILING + factors.course_complexity * W_COURSE_COMPLEXITY;

    let total = (meteo_weighted + geometry_weighted + navigation_weighted).clamp(1.0, 10.0);

    DifficultyBreakdown {
        total,
        level: DifficultyLevel::from_score(total),
        meteo: (meteo_weighted / 0.40).clamp(1.0, 10.0),
        geometry: (geometry_weighted / 0.45).clamp(1.0, 10.0),
        navigation: (navigation_weighted / 0.15).clamp(1.0, 10.0),
        factors,
    }
}

fn wind_speed_score(wind_speeds: &[f64]) -> f64 {
    if wind_speeds.is_empty() {
        return 5.0;
    }
    let avg = wind_speeds.iter().sum::<f64>() / wind_speeds.len() as f64;
    let max = wind_speeds.iter().copied().fold(0.0, f64::max);

    let mut score = if avg < WIND_OPTIMAL_MIN_KTS {
        4.0 + (WIND_OPTIMAL_MIN_KTS - avg) * 0.5
    } else if avg <= WIND_OPTIMAL_MAX_KTS {
        2.0 + (avg - WIND_OPTIMAL_MIN_KTS) * 0.1
    } else if avg <= WIND_DANGEROUS_KTS {
        4.0 + (avg - WIND_OPTIMAL_MAX_KTS) * 0.4
    } else {
        9.0 + ((avg - WIND_DANGEROUS_KTS) * 0.1).min(1.0)
    };
    if max > WIND_DANGEROUS_KTS {
        score = (score + 1.5).min(10.0);
    }
    score.clamp(1.0, 10.0)
}

/// Peak-minus-mean as a gust proxy.
fn wind_gust_score(wind_speeds: &[f64]) -> f64 {
    if wind_speeds.len() < 2 {
        return 3.0;
    }
    let avg = wind_speeds.iter().sum::<f64>() / wind_speeds.len() as f64;
    let max = wind_speeds.iter().copied().fold(0.0, f64::max);
    match max - avg {
        g if g < 3.0 => 1.0,
        g if g < 6.0 => 3.0,
        g if g < 10.0 => 5.0,
        g if g < 15.0 => 7.0,
        _ => 9.0,
    }
}

fn wave_score(wave_heights: &[f64]) -> f64 {
    if wave_heights.is_empty() {
        return 3.0;
    }
    let avg = wave_heights.iter().sum::<f64>() / wave_heights.len() as f64;
    let max = wave_heights.iter().copied().fold(0.0, f64::max);

    let mut score = if avg < WAVE_COMFORTABLE_M {
        1.0
    } else if avg < WAVE_MODERATE_M {
        2.0 + (avg - WAVE_COMFORTABLE_M) * 2.0
    } else if avg < WAVE_DIFFICULT_M {
        4.0 + (avg - WAVE_MODERATE_M) * 2.0
    } else if avg < WAVE_DANGEROUS_M {
        6.0 + (avg - WAVE_DIFFICULT_M) * 2.0
    } else {
        9.0
    };
    if max > WAVE_DANGEROUS_M {
        score = (score + 1.0).min(10.0);
    }
    score.clamp(1.0, 10.0)
}

/// Scattered wind directions are harder than a steady breeze.
fn wind_consistency_score(wind_directions: &[f64]) -> f64 {
    if wind_directions.len() < 2 {
        return 2.0;
    }
    let consistency = circular_concentration(wind_directions);
    ((1.0 - consistency) * 10.0).clamp(1.0, 10.0)
}

fn distance_score(distance_nm: f64) -> f64 {
    if distance_nm < DISTANCE_SHORT_NM {
        1.0 + distance_nm / DISTANCE_SHORT_NM
    } else if distance_nm < DISTANCE_MEDIUM_NM {
        2.0 + (distance_nm - DISTANCE_SHORT_NM) / (DISTANCE_MEDIUM_NM - DISTANCE_SHORT_NM) * 2.0
    } else if distance_nm < DISTANCE_LONG_NM {
        4.0 + (distance_nm - DISTANCE_MEDIUM_NM) / (DISTANCE_LONG_NM - DISTANCE_MEDIUM_NM) * 2.0
    } else if distance_nm < DISTANCE_VERY_LONG_NM {
        6.0 + (distance_nm - DISTANCE_LONG_NM) / (DISTANCE_VERY_LONG_NM - DISTANCE_LONG_NM) * 2.0
    } else {
        (8.0 + (distance_nm - DISTANCE_VERY_LONG_NM) / 50.0).min(10.0)
    }
}

fn tack_score(tacks: usize) -> f64 {
    let t = tacks as f64;
    if tacks <= TACKS_FEW {
        1.0 + t * 0.5
    } else if tacks <= TACKS_MODERATE {
        3.0 + (t - TACKS_FEW as f64) * 0.4
    } else if tacks <= TACKS_MANY {
        5.0 + (t - TACKS_MODERATE as f64) * 0.3
    } else if tacks <= TACKS_EXTREME {
        7.0 + (t - TACKS_MANY as f64) * 0.2
    } else {
        (9.0 + (t - TACKS_EXTREME as f64) * 0.1).min(10.0)
    }
}

fn jibe_score(jibes: usize) -> f64 {
    let j = jibes as f64;
    if jibes <= 2 {
        1.0 + j * 0.75
    } else if jibes <= 5 {
        2.5 + (j - 2.0) * 0.7
    } else if jibes <= 10 {
        4.5 + (j - 5.0) * 0.5
    } else {
        (7.0 + (j - 10.0) * 0.3).min(10.0)
    }
}

fn maneuver_density_score(total_maneuvers: usize, distance_nm: f64) -> f64 {
    if distance_nm <= 0.0 {
        return 5.0;
    }
    let density = total_maneuvers as f64 / distance_nm;
    if density < 0.1 {
        1.0 + density * 20.0
    } else if density < 0.3 {
        3.0 + (density - 0.1) * 15.0
    } else if density < 0.5 {
        6.0 + (density - 0.3) * 10.0
    } else {
        (8.0 + (density - 0.5) * 4.0).min(10.0)
    }
}

fn upwind_ratio_score(twas: &[f64]) -> f64 {
    if twas.is_empty() {
        return 3.0;
    }
    let upwind = twas.iter().filter(|t| t.abs() < 60.0).count();
    1.0 + upwind as f64 / twas.len() as f64 * 9.0
}

/// Share of travel hours falling between 18:00 and 06:00 local.
fn night_score(departure: DateTime<Utc>, total_time_hours: f64, utc_offset_hours: f64) -> f64 {
    if total_time_hours <= 0.0 {
        return 2.0;
    }
    let mut night_hours = 0u32;
    let mut current = departure + chrono::Duration::seconds((utc_offset_hours * 3600.0) as i64);
    for _ in 0..=(total_time_hours as usize) {
        let hour = current.hour();
        if hour >= 18 || hour < 6 {
            night_hours += 1;
        }
        current += chrono::Duration::hours(1);
    }
    let ratio = night_hours as f64 / total_time_hours.max(1.0);
    (1.0 + ratio * 9.0).clamp(1.0, 10.0)
}

fn course_complexity_score(bearings: &[f64]) -> f64 {
    if bearings.len() < 2 {
        return 2.0;
    }
    let changes: Vec<f64> = bearings
        .windows(2)
        .map(|pair| bearing_difference(pair[0], pair[1]))
        .collect();
    let avg = changes.iter().sum::<f64>() / changes.len() as f64;
    let max = changes.iter().copied().fold(0.0, f64::max);

    let mut score = if avg < 10.0 {
        1.0 + avg * 0.1
    } else if avg < 30.0 {
        2.0 + (avg - 10.0) * 0.1
    } else if avg < 60.0 {
        4.0 + (avg - 30.0) * 0.1
    } else {
        7.0 + ((avg - 60.0) * 0.05).min(3.0)
    };
    if max > 90.0 {
        score = (score + 1.0).min(10.0);
    }
    score.clamp(1.0, 10.0)
}
