//! Route profile and elevation calculations.
//!
//! Maps accumulated steps to elevation gained along the summit route and
//! classifies elevation into named stations. Everything here is pure and
//! stateless; the station table is fixed at compile time.

use serde::Serialize;

/// Summit elevation in meters.
pub const GOAL_ELEVATION_M: f64 = 3776.0;

/// Elevation gained per step in meters.
pub const STEP_HEIGHT_M: f64 = 0.2;

/// Steps required to reach the summit.
pub const GOAL_STEPS: u64 = 18_880;

/// A named station along the route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Station {
    /// Display name
    pub name: &'static str,
    /// Elevation threshold in meters; the station is reached at or above this
    pub elevation_m: f64,
}

/// Stations in descending threshold order. The last entry has a zero
/// threshold so every elevation maps to some station.
pub const STATIONS: [Station; 5] = [
    Station {
        name: "Summit",
        elevation_m: 3776.0,
    },
    Station {
        name: "Eighth Station",
        elevation_m: 3100.0,
    },
    Station {
        name: "Fifth Station",
        elevation_m: 2300.0,
    },
    Station {
        name: "First Station",
        elevation_m: 400.0,
    },
    Station {
        name: "Trailhead",
        elevation_m: 0.0,
    },
];

/// Elevation gained for a step count, at one-decimal precision.
pub fn elevation_m(steps: u64) -> f64 {
    (steps as f64 * STEP_HEIGHT_M * 10.0).round() / 10.0
}

/// The station reached at a given elevation.
///
/// Scans highest threshold first; the zero-threshold Trailhead entry
/// guarantees a match.
pub fn station_at(elevation_m: f64) -> &'static Station {
    for station in &STATIONS {
        if elevation_m >= station.elevation_m {
            return station;
        }
    }
    &STATIONS[STATIONS.len() - 1]
}

/// Meters left to the summit, clamped at zero.
pub fn remaining_m(elevation_m: f64) -> f64 {
    (GOAL_ELEVATION_M - elevation_m).max(0.0)
}

/// Share of the route completed, clamped to 0..=1.
pub fn progress_fraction(elevation_m: f64) -> f64 {
    (elevation_m / GOAL_ELEVATION_M).clamp(0.0, 1.0)
}

/// Lateral drift of the route at a given progress fraction.
///
/// The trail meanders and narrows toward the peak; the drift amplitude
/// shrinks linearly with progress.
pub fn slope_offset(fraction: f64) -> f64 {
    (fraction * 15.0).sin() * 40.0 * (1.0 - fraction)
}
