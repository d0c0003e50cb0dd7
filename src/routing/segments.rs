//! Segment merging and maneuver classification: consecutive
//! mesh edges with similar bearing fold into human-scale segments; a sign
//! change of TWA at a boundary is classified as tack or jibe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{bearing_difference, weighted_circular_mean};
use crate::model::{Maneuver, PointOfSail};
use crate::units::m_to_nm;

pub const BEARING_TOLERANCE_DEG: f64 = 5.0;
pub const MIN_SEGMENT_NM: f64 = 0.1;

/// One traversed mesh edge with its kinematics at cruise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
    pub distance_m: f64,
    pub bearing_deg: f64,
    pub duration_s: f64,
    pub boat_speed_kts: f64,
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
    /// Signed TWA in (-180, 180].
    pub twa_deg: f64,
    pub wave_height_m: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl RawSegment {
    pub fn distance_nm(&self) -> f64 {
        m_to_nm(self.distance_m)
    }
}

/// A merged run of colinear edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSegment {
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
    /// Length-weighted circular mean of the member bearings.
    pub bearing_deg: f64,
    pub boat_speed_kts: f64,
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
    pub twa_deg: f64,
    pub wave_height_m: f64,
    pub distance_nm: f64,
    pub duration_s: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub raw_count: usize,
    pub point_of_sail: PointOfSail,
    pub has_tack: bool,
    pub has_jibe: bool,
}

impl MergedSegment {
    pub fn duration_hours(&self) -> f64 {
        self.duration_s / 3600.0
    }
}

/// Maneuver between two consecutive TWAs: a sign change crossing the wind.
/// Tack when either side is upwind of 90, jibe when both are beyond 120,
/// otherwise unclassified.
pub fn classify_maneuver(prev_twa_deg: f64, next_twa_deg: f64) -> Maneuver {
    if prev_twa_deg * next_twa_deg >= 0.0 {
        return Maneuver::None;
    }
    if prev_twa_deg.abs() < 90.0 || next_twa_deg.abs() < 90.0 {
        Maneuver::Tack
    } else if prev_twa_deg.abs() > 120.0 && next_twa_deg.abs() > 120.0 {
        Maneuver::Jibe
    } else {
        Maneuver::None
    }
}

/// Tacks and jibes along the raw edge sequence.
pub fn count_maneuvers(raw: &[RawSegment]) -> (usize, usize) {
    let mut tacks = 0;
    let mut jibes = 0;
    for pair in raw.windows(2) {
        match classify_maneuver(pair[0].twa_deg, pair[1].twa_deg) {
            Maneuver::Tack => tacks += 1,
            Maneuver::Jibe => jibes += 1,
            Maneuver::None => {}
        }
    }
    (tacks, jibes)
}

pub fn merge_segments(raw: &[RawSegment], bearing_tolerance_deg: f64) -> Vec<MergedSegment> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut merged = Vec::new();
    let mut group: Vec<RawSegment> = vec![raw[0]];

    for &segment in &raw[1..] {
        let group_bearing = group_mean_bearing(&group);
        let bearing_diff = bearing_difference(group_bearing, segment.bearing_deg);
        let boundary_maneuver =
            classify_maneuver(group.last().map(|s| s.twa_deg).unwrap_or(0.0), segment.twa_deg);

        if bearing_diff <= bearing_tolerance_deg && boundary_maneuver == Maneuver::None {
            group.push(segment);
        } else {
            merged.push(emit_group(&group, boundary_maneuver));
            group = vec![segment];
        }
    }
    merged.push(emit_group(&group, Maneuver::None));

    fold_short_segments(merged, bearing_tolerance_deg)
}

fn group_mean_bearing(group: &[RawSegment]) -> f64 {
    let total: f64 = group.iter().map(|s| s.distance_m).sum();
    if total <= 0.0 {
        return group.first().map(|s| s.bearing_deg).unwrap_or(0.0);
    }
    weighted_circular_mean(group.iter().map(|s| (s.bearing_deg, s.distance_m / total)))
}

fn emit_group(group: &[RawSegment], boundary_maneuver: Maneuver) -> MergedSegment {
    let first = group[0];
    let last = group[group.len() - 1];
    let total_m: f64 = group.iter().map(|s| s.distance_m).sum();
    let duration_s: f64 = group.iter().map(|s| s.duration_s).sum();

    let weight = |s: &RawSegment| {
        if total_m > 0.0 {
            s.distance_m / total_m
        } else {
            1.0 / group.len() as f64
        }
    };

    let boat_speed_kts: f64 = group.iter().map(|s| s.boat_speed_kts * weight(s)).sum();
    let wind_speed_kts: f64 = group.iter().map(|s| s.wind_speed_kts * weight(s)).sum();
    let wave_height_m: f64 = group.iter().map(|s| s.wave_height_m * weight(s)).sum();
    let twa_deg: f64 = group.iter().map(|s| s.twa_deg * weight(s)).sum();
    let wind_direction_deg =
        weighted_circular_mean(group.iter().map(|s| (s.wind_direction_deg, weight(s))));
    let bearing_deg = group_mean_bearing(group);

    // Distance share decides the named point of sail.
    let mut by_band: Vec<(PointOfSail, f64)> = Vec::new();
    for s in group {
        let band = PointOfSail::from_twa(s.twa_deg);
        match by_band.iter_mut().find(|(b, _)| *b == band) {
            Some((_, d)) => *d += s.distance_m,
            None => by_band.push((band, s.distance_m)),
        }
    }
    let point_of_sail = by_band
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(b, _)| *b)
        .unwrap_or(PointOfSail::BeamReach);

    // Maneuvers inside the group (defensive; boundaries normally break
    // groups) plus the one detected at the outgoing boundary.
    let mut has_tack = boundary_maneuver == Maneuver::Tack;
    let mut has_jibe = boundary_maneuver == Maneuver::Jibe;
    for pair in group.windows(2) {
        match classify_maneuver(pair[0].twa_deg, pair[1].twa_deg) {
            Maneuver::Tack => has_tack = true,
            Maneuver::Jibe => has_jibe = true,
            Maneuver::None => {}
        }
    }

    MergedSegment {
        from_x: first.from_x,
        from_y: first.from_y,
        to_x: last.to_x,
        to_y: last.to_y,
        from_lat: first.from_lat,
        from_lon: first.from_lon,
        to_lat: last.to_lat,
        to_lon: last.to_lon,
        bearing_deg,
        boat_speed_kts,
        wind_speed_kts,
        wind_direction_deg,
        twa_deg,
        wave_height_m,
        distance_nm: m_to_nm(total_m),
        duration_s,
        start_time: first.start_time,
        end_time: last.end_time,
        raw_count: group.len(),
        point_of_sail,
        has_tack,
        has_jibe,
    }
}

/// Fold merged segments shorter than the minimum into a neighbour when the
/// bearing difference is within a relaxed tolerance and no maneuver sits
/// between them.
fn fold_short_segments(
    segments: Vec<MergedSegment>,
    bearing_tolerance_deg: f64,
) -> Vec<MergedSegment> {
    let relaxed = bearing_tolerance_deg * 2.0;
    let mut out: Vec<MergedSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        let foldable = segment.distance_nm < MIN_SEGMENT_NM
            && !segment.has_tack
            && !segment.has_jibe
            && out.last().is_some_and(|prev| {
                !prev.has_tack
                    && !prev.has_jibe
                    && bearing_difference(prev.bearing_deg, segment.bearing_deg) <= relaxed
            });
        if foldable {
            let prev = out.last_mut().expect("checked non-empty");
            absorb(prev, &segment);
        } else {
            out.push(segment);
        }
    }
    out
}

fn absorb(into: &mut MergedSegment, other: &MergedSegment) {
    let total = into.distance_nm + other.distance_nm;
    let (wa, wb) = if total > 0.0 {
        (into.distance_nm / total, other.distance_nm / total)
    } else {
        (0.5, 0.5)
    };
    into.bearing_deg = weighted_circular_mean([
        (into.bearing_deg, wa),
        (other.bearing_deg, wb),
    ]);
    into.wind_direction_deg = weighted_circular_mean([
        (into.wind_direction_deg, wa),
        (other.wind_direction_deg, wb),
    ]);
    into.boat_speed_kts = into.boat_speed_kts * wa + other.boat_speed_kts * wb;
    into.wind_speed_kts = into.wind_speed_kts * wa + other.wind_speed_kts * wb;
    into.wave_height_m = into.wave_height_m * wa + other.wave_height_m * wb;
    into.twa_deg = into.twa_deg * wa + other.twa_deg * wb;
    into.distance_nm = total;
    into.duration_s += other.duration_s;
    into.to_x = other.to_x;
    into.to_y = other.to_y;
    into.to_lat = other.to_lat;
    into.to_lon = other.to_lon;
    into.end_time = other.end_time;
    into.raw_count += other.raw_count;
    into.has_tack |= other.has_tack;
    into.has_jibe |= other.has_jibe;
}
