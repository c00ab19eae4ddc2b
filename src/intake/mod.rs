//! Scan intake state machine.
//!
//! Decides accept/reject for incoming checkpoint scans. The gate itself is
//! stateless between calls; all durable state lives in the ledger. Checks
//! run in a fixed order and short-circuit on the first rejection; a
//! rejection never mutates the ledger.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{IntakeSettings, ReplayPolicy};
use crate::ledger::ClimbLedger;
use crate::route::{self, Station};

/// An incoming checkpoint scan, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Checkpoint identifier
    pub location_id: String,
    /// Steps gained, always positive
    pub steps: u64,
    /// When the scan occurred
    pub occurred_at: DateTime<Utc>,
}

impl ScanEvent {
    /// Build a scan event, rejecting malformed input before it can reach
    /// the gate.
    pub fn new(
        location_id: impl Into<String>,
        steps: u64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let location_id = location_id.into();

        if location_id.trim().is_empty() {
            return Err(ValidationError::EmptyLocation);
        }
        if steps == 0 {
            return Err(ValidationError::NonPositiveSteps);
        }

        Ok(Self {
            location_id,
            steps,
            occurred_at,
        })
    }
}

/// A station change produced by an accepted scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationTransition {
    /// Station the climber is at after the scan
    pub station: &'static Station,
    /// True exactly when a new station was reached by this scan
    pub is_new: bool,
}

/// Result of an accepted scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAccepted {
    /// Steps gained by this scan
    pub gained_steps: u64,
    /// New cumulative total
    pub total_steps: u64,
    /// New elevation at one-decimal precision
    pub elevation_m: f64,
    /// Station state after the scan
    pub transition: StationTransition,
}

/// Policy rejections, surfaced synchronously to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("Cooldown active, wait {remaining_secs}s")]
    Cooldown { remaining_secs: u64 },

    #[error("Scan suppressed by replay policy")]
    ReplaySuppressed,
}

/// Malformed input, rejected before any state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Checkpoint id must not be empty")]
    EmptyLocation,

    #[error("Steps must be positive")]
    NonPositiveSteps,

    #[error("Participant name must not be empty")]
    EmptyName,
}

/// Accept/reject gate for checkpoint scans.
pub struct IntakeGate {
    cooldown_ms: u64,
    policy: ReplayPolicy,
    day_offset: FixedOffset,
}

impl IntakeGate {
    /// Create a gate from intake settings.
    pub fn new(settings: &IntakeSettings) -> Self {
        let day_offset = FixedOffset::east_opt(settings.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));

        Self {
            cooldown_ms: settings.cooldown_ms,
            policy: settings.replay_policy,
            day_offset,
        }
    }

    /// The calendar day of a timestamp in the gate's configured offset.
    pub fn calendar_day(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.day_offset)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Evaluate a scan against the ledger.
    ///
    /// On acceptance the ledger is mutated atomically: total, last-accepted
    /// markers, and history all advance before this returns. Persistence
    /// and synchronization are the caller's responsibility and never undo
    /// an acceptance.
    pub fn evaluate(
        &self,
        ledger: &mut ClimbLedger,
        event: &ScanEvent,
    ) -> Result<ScanAccepted, RejectReason> {
        let now_ms = event.occurred_at.timestamp_millis();

        // 1. Cooldown. A clock that ran backwards yields a negative
        // elapsed time, which also lands inside the window.
        let elapsed_ms = now_ms - ledger.last_accepted_at_ms;
        if ledger.last_accepted_at_ms > 0 && elapsed_ms < self.cooldown_ms as i64 {
            let remaining_ms = (self.cooldown_ms as i64 - elapsed_ms) as u64;
            return Err(RejectReason::Cooldown {
                remaining_secs: (remaining_ms + 999) / 1000,
            });
        }

        // 2. Replay suppression
        let day = match self.policy {
            ReplayPolicy::PerDay => {
                let today = self.calendar_day(event.occurred_at);
                if ledger.last_accepted_day.as_deref() == Some(today.as_str()) {
                    return Err(RejectReason::ReplaySuppressed);
                }
                Some(today)
            }
            ReplayPolicy::DistinctLocation => {
                if ledger.last_accepted_location.as_deref() == Some(event.location_id.as_str()) {
                    return Err(RejectReason::ReplaySuppressed);
                }
                None
            }
        };

        // 3. Acceptance
        let old_elevation = route::elevation_m(ledger.total_steps);
        ledger.record_acceptance(&event.location_id, event.steps, event.occurred_at, day);
        let new_elevation = route::elevation_m(ledger.total_steps);

        // 4. Station transition. The strict elevation increase guards
        // against a false transition on zero-gain edge cases.
        let old_station = route::station_at(old_elevation);
        let new_station = route::station_at(new_elevation);
        let transition = StationTransition {
            station: new_station,
            is_new: new_station != old_station && new_elevation > old_elevation,
        };

        Ok(ScanAccepted {
            gained_steps: event.steps,
            total_steps: ledger.total_steps,
            elevation_m: new_elevation,
            transition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gate_with(policy: ReplayPolicy) -> IntakeGate {
        IntakeGate::new(&IntakeSettings {
            cooldown_ms: 3000,
            replay_policy: policy,
            utc_offset_minutes: 540,
        })
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    const T0: i64 = 1_754_500_000_000;

    fn scan(location: &str, steps: u64, at_ms: i64) -> ScanEvent {
        ScanEvent::new(location, steps, at(at_ms)).unwrap()
    }

    #[test]
    fn test_validation_rejects_malformed_input() {
        assert_eq!(
            ScanEvent::new("", 100, at(T0)).unwrap_err(),
            ValidationError::EmptyLocation
        );
        assert_eq!(
            ScanEvent::new("   ", 100, at(T0)).unwrap_err(),
            ValidationError::EmptyLocation
        );
        assert_eq!(
            ScanEvent::new("gate-a", 0, at(T0)).unwrap_err(),
            ValidationError::NonPositiveSteps
        );
    }

    #[test]
    fn test_cooldown_boundary() {
        let gate = gate_with(ReplayPolicy::DistinctLocation);
        let mut ledger = ClimbLedger::default();

        gate.evaluate(&mut ledger, &scan("a", 100, T0)).unwrap();

        // One millisecond short of the window: rejected with the wait
        // rounded up to whole seconds.
        let err = gate
            .evaluate(&mut ledger, &scan("b", 100, T0 + 2999))
            .unwrap_err();
        assert_eq!(err, RejectReason::Cooldown { remaining_secs: 1 });

        // Exactly at the window: accepted.
        gate.evaluate(&mut ledger, &scan("b", 100, T0 + 3000))
            .unwrap();
        assert_eq!(ledger.total_steps, 200);
    }

    #[test]
    fn test_cooldown_rejection_does_not_mutate() {
        let gate = gate_with(ReplayPolicy::DistinctLocation);
        let mut ledger = ClimbLedger::default();

        gate.evaluate(&mut ledger, &scan("a", 100, T0)).unwrap();
        let snapshot = ledger.clone();

        let _ = gate
            .evaluate(&mut ledger, &scan("b", 500, T0 + 1000))
            .unwrap_err();
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn test_distinct_location_immediate_repeat() {
        let gate = gate_with(ReplayPolicy::DistinctLocation);
        let mut ledger = ClimbLedger::default();

        // [A, A] rejects the second.
        gate.evaluate(&mut ledger, &scan("a", 100, T0)).unwrap();
        let err = gate
            .evaluate(&mut ledger, &scan("a", 100, T0 + 5000))
            .unwrap_err();
        assert_eq!(err, RejectReason::ReplaySuppressed);

        // [A, B, A] accepts all three.
        gate.evaluate(&mut ledger, &scan("b", 100, T0 + 10_000))
            .unwrap();
        gate.evaluate(&mut ledger, &scan("a", 100, T0 + 15_000))
            .unwrap();
        assert_eq!(ledger.total_steps, 300);
    }

    #[test]
    fn test_per_day_caps_one_scan_globally() {
        let gate = gate_with(ReplayPolicy::PerDay);
        let mut ledger = ClimbLedger::default();

        gate.evaluate(&mut ledger, &scan("a", 100, T0)).unwrap();

        // Different checkpoint, hours later, same calendar day: rejected.
        let err = gate
            .evaluate(&mut ledger, &scan("b", 100, T0 + 3_600_000))
            .unwrap_err();
        assert_eq!(err, RejectReason::ReplaySuppressed);

        // Next day: accepted, even at the same checkpoint.
        gate.evaluate(&mut ledger, &scan("a", 100, T0 + 86_400_000))
            .unwrap();
        assert_eq!(ledger.total_steps, 200);
    }

    #[test]
    fn test_per_day_uses_configured_offset() {
        let gate = gate_with(ReplayPolicy::PerDay);
        // 2026-08-06T23:30:00+09:00
        let before_midnight = Utc.with_ymd_and_hms(2026, 8, 6, 14, 30, 0).unwrap();
        // 2026-08-07T00:30:00+09:00
        let after_midnight = Utc.with_ymd_and_hms(2026, 8, 6, 15, 30, 0).unwrap();

        assert_eq!(gate.calendar_day(before_midnight), "2026-08-06");
        assert_eq!(gate.calendar_day(after_midnight), "2026-08-07");

        let mut ledger = ClimbLedger::default();
        gate.evaluate(
            &mut ledger,
            &ScanEvent::new("a", 100, before_midnight).unwrap(),
        )
        .unwrap();
        // The JST day rolled over between the two scans.
        gate.evaluate(
            &mut ledger,
            &ScanEvent::new("b", 100, after_midnight).unwrap(),
        )
        .unwrap();
        assert_eq!(ledger.total_steps, 200);
    }

    #[test]
    fn test_station_transition_fires_once_per_crossing() {
        let gate = gate_with(ReplayPolicy::DistinctLocation);
        let mut ledger = ClimbLedger::default();

        // 400 steps -> 80.0 m, still Trailhead.
        let first = gate.evaluate(&mut ledger, &scan("a", 400, T0)).unwrap();
        assert_eq!(first.total_steps, 400);
        assert_eq!(first.elevation_m, 80.0);
        assert_eq!(first.transition.station.name, "Trailhead");
        assert!(!first.transition.is_new);

        // +3600 steps -> 4000 total, 800.0 m, crossed First Station (400 m).
        let second = gate
            .evaluate(&mut ledger, &scan("b", 3600, T0 + 10_000))
            .unwrap();
        assert_eq!(second.total_steps, 4000);
        assert_eq!(second.elevation_m, 800.0);
        assert_eq!(second.transition.station.name, "First Station");
        assert!(second.transition.is_new);

        // Another scan within the same band does not re-fire.
        let third = gate
            .evaluate(&mut ledger, &scan("c", 100, T0 + 20_000))
            .unwrap();
        assert_eq!(third.transition.station.name, "First Station");
        assert!(!third.transition.is_new);
    }
}
