//! Ranked views over the shared progress table.
//!
//! The roster is read-only and server-derived: ranking queries go straight
//! to the store, while the visualizer renders from a cached set that the
//! sync coordinator replaces wholesale on each change notification.

use std::sync::{Arc, RwLock};

use crate::remote::{ClimberRecord, RemoteError, RemoteStore};

/// A ranked roster entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedClimber {
    /// 1-based rank; equal step totals rank in store order, which is
    /// non-deterministic
    pub rank: u32,
    /// The underlying record
    pub record: ClimberRecord,
    /// Whether this entry belongs to the local participant
    pub is_self: bool,
}

/// Deterministic avatar color derived from a participant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvatarColor {
    /// Hue in degrees, 0..360
    pub hue: u16,
    /// Saturation percent
    pub saturation: u8,
    /// Lightness percent
    pub lightness: u8,
}

impl std::fmt::Display for AvatarColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hsl({}, {}%, {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

/// Color for a participant's avatar, stable across sessions and devices.
pub fn avatar_color(name: &str) -> AvatarColor {
    let mut hash: i32 = 0;
    for unit in name.encode_utf16() {
        hash = (unit as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }

    AvatarColor {
        hue: (hash % 360).unsigned_abs() as u16,
        saturation: 65,
        lightness: 55,
    }
}

#[derive(Debug, Default)]
struct RosterState {
    records: Vec<ClimberRecord>,
    online: usize,
}

/// Read-only roster over a remote store.
#[derive(Clone)]
pub struct Roster<S> {
    store: S,
    self_name: Arc<RwLock<Option<String>>>,
    state: Arc<RwLock<RosterState>>,
}

impl<S: RemoteStore> Roster<S> {
    /// Create a roster over the given store.
    pub fn new(store: S, self_name: Option<String>) -> Self {
        Self {
            store,
            self_name: Arc::new(RwLock::new(self_name)),
            state: Arc::new(RwLock::new(RosterState::default())),
        }
    }

    /// The local participant's registered name, if any.
    pub fn self_name(&self) -> Option<String> {
        self.self_name.read().unwrap().clone()
    }

    /// Update the local participant's name.
    pub fn set_self_name(&self, name: Option<String>) {
        *self.self_name.write().unwrap() = name;
    }

    /// Replace the cached set from the store.
    ///
    /// Safe to invoke concurrently: each completion swaps the whole set in
    /// one assignment, so the last reload to finish wins and readers never
    /// observe a partial set.
    pub async fn reload(&self) -> Result<(), RemoteError> {
        let records = self.store.fetch_climbers(None).await?;
        self.state.write().unwrap().records = records;
        Ok(())
    }

    /// Snapshot of the cached set, ordered by step total descending.
    pub fn cached(&self) -> Vec<ClimberRecord> {
        self.state.read().unwrap().records.clone()
    }

    /// Live session count from the latest presence snapshot.
    pub fn online_count(&self) -> usize {
        self.state.read().unwrap().online
    }

    /// Record a presence membership change.
    pub fn set_online_count(&self, online: usize) {
        self.state.write().unwrap().online = online;
    }

    /// Top climbers by step total, freshly queried.
    pub async fn top_ranked(&self, limit: usize) -> Result<Vec<RankedClimber>, RemoteError> {
        let records = self.store.fetch_climbers(Some(limit)).await?;
        let self_name = self.self_name();

        Ok(records
            .into_iter()
            .enumerate()
            .map(|(i, record)| RankedClimber {
                rank: i as u32 + 1,
                is_self: self_name.as_deref() == Some(record.name.as_str()),
                record,
            })
            .collect())
    }

    /// The set shown on the route visualizer: the cached top
    /// `max_display`, with the local participant's record appended when it
    /// fell outside that slice. Self is always visible regardless of rank.
    pub fn visualizer_set(&self, max_display: usize) -> Vec<ClimberRecord> {
        let state = self.state.read().unwrap();
        let mut display: Vec<ClimberRecord> =
            state.records.iter().take(max_display).cloned().collect();

        if let Some(name) = self.self_name() {
            let self_shown = display.iter().any(|r| r.name == name);
            if !self_shown {
                if let Some(own) = state.records.iter().find(|r| r.name == name) {
                    display.push(own.clone());
                }
            }
        }

        display
    }

    /// Every record, unranked, freshly queried. Administrative listing.
    pub async fn full_listing(&self) -> Result<Vec<ClimberRecord>, RemoteError> {
        self.store.fetch_climbers(None).await
    }
}
