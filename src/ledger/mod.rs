//! Local authoritative progress record.
//!
//! One ledger per installation. Only scan acceptance mutates it; an
//! explicit reset restores the empty default and forgets the participant
//! name along with everything else.

pub mod store;

pub use store::{LedgerStore, LedgerStoreError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum history entries retained, oldest evicted first.
pub const MAX_HISTORY: usize = 50;

/// One accepted scan, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the scan occurred (unix millis)
    pub occurred_at_ms: i64,
    /// Checkpoint that produced the scan
    pub location_id: String,
    /// Steps gained by the scan
    pub gained_steps: u64,
}

/// Local progress ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimbLedger {
    /// Sum of all accepted step gains
    pub total_steps: u64,
    /// Checkpoint of the most recent accepted scan
    pub last_accepted_location: Option<String>,
    /// Unix millis of the most recent accepted scan, 0 when never
    pub last_accepted_at_ms: i64,
    /// Calendar day of the most recent accepted scan (per-day policy only)
    pub last_accepted_day: Option<String>,
    /// Accepted scans, most recent first, capped at [`MAX_HISTORY`]
    pub history: Vec<HistoryEntry>,
    /// Registered participant name; `None` until the user registers
    pub participant_name: Option<String>,
}

impl Default for ClimbLedger {
    fn default() -> Self {
        Self {
            total_steps: 0,
            last_accepted_location: None,
            last_accepted_at_ms: 0,
            last_accepted_day: None,
            history: Vec::new(),
            participant_name: None,
        }
    }
}

impl ClimbLedger {
    /// Record an accepted scan.
    ///
    /// Adds the gain, advances the last-accepted markers, and prepends a
    /// history entry, evicting past the cap. `day` is recorded only under
    /// the per-day policy.
    pub fn record_acceptance(
        &mut self,
        location_id: &str,
        steps: u64,
        occurred_at: DateTime<Utc>,
        day: Option<String>,
    ) {
        let occurred_at_ms = occurred_at.timestamp_millis();

        self.total_steps += steps;
        self.last_accepted_location = Some(location_id.to_string());
        self.last_accepted_at_ms = occurred_at_ms;
        if day.is_some() {
            self.last_accepted_day = day;
        }

        self.history.insert(
            0,
            HistoryEntry {
                occurred_at_ms,
                location_id: location_id.to_string(),
                gained_steps: steps,
            },
        );
        self.history.truncate(MAX_HISTORY);
    }
}
