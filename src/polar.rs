//! Yacht polar performance evaluation: bilinear interpolation
//! in the polar table with a piecewise fraction-of-wind fallback when no
//! table is available.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::model::Yacht;
use crate::units::{MIN_BOAT_SPEED_MS, knots_to_ms, ms_to_knots};

/// Boat speeds in knots indexed by (true wind angle, true wind speed).
/// `boat_speeds[twa_idx][tws_idx]`, both axes ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarTable {
    #[serde(rename = "twa_angles")]
    pub twa_deg: Vec<f64>,
    #[serde(rename = "wind_speeds")]
    pub wind_speeds_kts: Vec<f64>,
    #[serde(rename = "boat_speeds")]
    pub boat_speeds_kts: Vec<Vec<f64>>,
}

impl PolarTable {
    pub fn is_empty(&self) -> bool {
        self.twa_deg.is_empty() || self.wind_speeds_kts.is_empty() || self.boat_speeds_kts.is_empty()
    }

    /// Loads the common polar CSV layout: header `twa/tws, 5, 10, ...`,
    /// then one row per TWA with boat speeds in knots.
    pub fn load_from_csv<P: AsRef<Path>>(path: P) -> Result<Self, RouteError> {
        info!("loading polar table from {:?}", path.as_ref());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RouteError> {
        let mut lines = BufReader::new(reader).lines();

        let header = lines
            .next()
            .ok_or_else(|| RouteError::InvalidInput("polar CSV is empty".into()))??;
        let mut wind_speeds_kts = Vec::new();
        for field in header.split(',').skip(1) {
            let tws: f64 = field.trim().parse().map_err(|_| {
                RouteError::InvalidInput(format!("bad wind speed in polar header: {field:?}"))
            })?;
            wind_speeds_kts.push(tws);
        }

        let mut twa_deg = Vec::new();
        let mut boat_speeds_kts = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split(',');
            let twa_field = fields.next().unwrap_or_default();
            let twa: f64 = twa_field.trim().parse().map_err(|_| {
                RouteError::InvalidInput(format!("bad TWA in polar row: {twa_field:?}"))
            })?;
            let mut row = Vec::with_capacity(wind_speeds_kts.len());
            for field in fields {
                let speed: f64 = field.trim().parse().map_err(|_| {
                    RouteError::InvalidInput(format!("bad boat speed in polar row: {field:?}"))
                })?;
                row.push(speed);
            }
            if row.len() != wind_speeds_kts.len() {
                return Err(RouteError::InvalidInput(format!(
                    "polar row for TWA {twa} has {} speeds, header has {}",
                    row.len(),
                    wind_speeds_kts.len()
                )));
            }
            twa_deg.push(twa);
            boat_speeds_kts.push(row);
        }

        Ok(Self { twa_deg, wind_speeds_kts, boat_speeds_kts })
    }

    /// Bilinear interpolation of boat speed (knots) for the given wind
    /// speed (knots) and absolute TWA (degrees). Values outside the table
    /// clamp to the edge.
    pub fn speed_kts(&self, tws_kts: f64, twa_deg: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let (t0, t1, tf) = interpolation_index(&self.twa_deg, twa_deg.abs());
        let (w0, w1, wf) = interpolation_index(&self.wind_speeds_kts, tws_kts);

        let s00 = self.boat_speeds_kts[t0][w0];
        let s01 = self.boat_speeds_kts[t0][w1];
        let s10 = self.boat_speeds_kts[t1][w0];
        let s11 = self.boat_speeds_kts[t1][w1];

        let low = s00 + (s01 - s00) * wf;
        let high = s10 + (s11 - s10) * wf;
        low + (high - low) * tf
    }

    /// Fastest speed anywhere in the table, knots.
    pub fn max_speed_kts(&self) -> f64 {
        self.boat_speeds_kts
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }
}

/// Bracketing indices and interpolation factor for `value` in an ascending
/// axis; clamps to the edges.
fn interpolation_index(axis: &[f64], value: f64) -> (usize, usize, f64) {
    if axis.is_empty() {
        return (0, 0, 0.0);
    }
    if value <= axis[0] {
        return (0, 0, 0.0);
    }
    if value >= axis[axis.len() - 1] {
        return (axis.len() - 1, axis.len() - 1, 0.0);
    }
    for i in 0..axis.len() - 1 {
        if axis[i] <= value && value <= axis[i + 1] {
            let span = axis[i + 1] - axis[i];
            let factor = if span > 0.0 { (value - axis[i]) / span } else { 0.0 };
            return (i, i + 1, factor);
        }
    }
    (axis.len() - 1, axis.len() - 1, 0.0)
}

/// Boat speed through water in m/s for the yacht under the given wind.
/// Uses the polar table when present, the analytic model otherwise; the
/// result is capped by the yacht's maximum speed and floored at the
/// numerical minimum.
pub fn boat_speed_ms(yacht: &Yacht, wind_speed_ms: f64, twa_deg: f64) -> f64 {
    let twa = twa_deg.abs();
    let speed_ms = match &yacht.polar_table {
        Some(table) if !table.is_empty() => {
            knots_to_ms(table.speed_kts(ms_to_knots(wind_speed_ms), twa))
        }
        _ => fraction_of_wind_model(wind_speed_ms, twa),
    };
    let capped = match yacht.max_speed_kts {
        Some(max_kts) => speed_ms.min(knots_to_ms(max_kts)),
        None => speed_ms,
    };
    capped.max(MIN_BOAT_SPEED_MS)
}

/// Piecewise fraction-of-wind model used when no polar table exists.
fn fraction_of_wind_model(wind_speed_ms: f64, twa_deg: f64) -> f64 {
    let twa = twa_deg.abs();
    let mut factor = if twa < 25.0 {
        0.0
    } else if twa < 45.0 {
        0.30
    } else if twa < 60.0 {
        0.50
    } else if twa < 90.0 {
        0.65
    } else if twa < 120.0 {
        0.70
    } else if twa < 150.0 {
        0.65
    } else if twa < 170.0 {
        0.55
    } else {
        0.50
    };

    let wind_kts = ms_to_knots(wind_speed_ms);
    if wind_kts < 5.0 {
        factor *= 0.3;
    } else if wind_kts > 25.0 {
        factor *= 0.8;
    }

    wind_speed_ms * factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn flat_table(speed: f64) -> PolarTable {
        PolarTable {
            twa_deg: vec![0.0, 90.0, 180.0],
            wind_speeds_kts: vec![0.0, 10.0, 20.0],
            boat_speeds_kts: vec![vec![speed; 3]; 3],
        }
    }

    #[test]
    fn test_csv_round_trip() {
        let csv = "twa/tws,6,10,14\n45,4.1,5.6,6.2\n90,5.0,6.8,7.5\n150,4.4,6.3,7.9\n";
        let table = PolarTable::from_reader(Cursor::new(csv)).expect("parse");
        assert_eq!(table.wind_speeds_kts, vec![6.0, 10.0, 14.0]);
        assert_eq!(table.twa_deg, vec![45.0, 90.0, 150.0]);
        assert_eq!(table.boat_speeds_kts[1][2], 7.5);
    }

    #[test]
    fn test_csv_rejects_ragged_rows() {
        let csv = "twa/tws,6,10\n45,4.1\n";
        assert!(matches!(
            PolarTable::from_reader(Cursor::new(csv)),
            Err(RouteError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bilinear_interpolation_midpoint() {
        let table = PolarTable {
            twa_deg: vec![0.0, 180.0],
            wind_speeds_kts: vec![0.0, 20.0],
            boat_speeds_kts: vec![vec![0.0, 10.0], vec![0.0, 10.0]],
        };
        // Halfway up the wind axis on a wind-linear table.
        let speed = table.speed_kts(10.0, 90.0);
        assert!((speed - 5.0).abs() < 1e-9, "expected 5.0 kts, got {speed}");
    }

    #[test]
    fn test_clamping_outside_the_table() {
        let table = flat_table(6.0);
        assert_eq!(table.speed_kts(100.0, 90.0), 6.0);
        assert_eq!(table.speed_kts(10.0, 500.0), 6.0);
    }

    #[test]
    fn test_boat_speed_uses_table_when_present() {
        let mut yacht = Yacht::class40("polar");
        yacht.polar_table = Some(flat_table(8.0));
        let speed = boat_speed_ms(&yacht, knots_to_ms(12.0), 90.0);
        assert!((speed - knots_to_ms(8.0)).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_model_bands() {
        let mut yacht = Yacht::class40("bare");
        yacht.polar_table = None;
        yacht.max_speed_kts = None;
        let wind = knots_to_ms(10.0);
        // Beam reach is the fastest band of the fallback model.
        let beam = boat_speed_ms(&yacht, wind, 100.0);
        let close = boat_speed_ms(&yacht, wind, 50.0);
        assert!(beam > close);
        assert!((beam - wind * 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_light_and_heavy_wind_scaling() {
        let mut yacht = Yacht::class40("bare");
        yacht.polar_table = None;
        yacht.max_speed_kts = None;
        let light = boat_speed_ms(&yacht, knots_to_ms(4.0), 100.0);
        assert!((light - knots_to_ms(4.0) * 0.70 * 0.3).abs() < 1e-9);
        let heavy = boat_speed_ms(&yacht, knots_to_ms(30.0), 100.0);
        assert!((heavy - knots_to_ms(30.0) * 0.70 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_floor_and_cap() {
        let mut yacht = Yacht::class40("capped");
        yacht.polar_table = None;
        // Dead upwind in the fallback model gives zero, floored to 0.5 m/s.
        assert_eq!(boat_speed_ms(&yacht, knots_to_ms(10.0), 10.0), 0.5);
        // A huge wind is capped by the yacht's max speed.
        yacht.max_speed_kts = Some(14.0);
        let speed = boat_speed_ms(&yacht, knots_to_ms(60.0), 100.0);
        assert!((speed - knots_to_ms(14.0)).abs() < 1e-9);
    }
}
