//! Remote store interface.
//!
//! The shared progress table and presence channel are specified here only
//! by interface; [`rest`] talks to a hosted deployment and [`memory`]
//! provides the same semantics in-process for tests and offline runs.
//!
//! Payloads crossing the store boundary are validated tagged types. A
//! malformed payload is rejected (logged and dropped), never trusted.

pub mod memory;
pub mod rest;

pub use memory::MemoryRemoteStore;
pub use rest::RestRemoteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;

/// One participant's shared progress row, keyed uniquely by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimberRecord {
    /// Participant name, the row key
    #[serde(rename = "username")]
    pub name: String,
    /// Cumulative accepted steps
    pub total_steps: u64,
    /// Station derived from the step total
    pub station: String,
    /// Last writer's timestamp
    #[serde(rename = "last_updated")]
    pub updated_at: DateTime<Utc>,
}

impl ClimberRecord {
    /// Check boundary invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.name.trim().is_empty() {
            return Err(RemoteError::InvalidPayload(
                "climber record with empty name".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ephemeral per-session liveness entry; exists only while the session's
/// channel is open, never durably stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Participant name
    #[serde(rename = "user")]
    pub name: String,
    /// Elevation at announce time
    #[serde(rename = "elevation")]
    pub elevation_m: f64,
    /// When the entry was last refreshed
    #[serde(rename = "last_updated")]
    pub updated_at: DateTime<Utc>,
}

/// Notification from the remote store.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// A new record appeared in the progress table
    RecordInserted(ClimberRecord),
    /// An existing record changed
    RecordUpdated(ClimberRecord),
    /// Presence membership changed; carries the live session count
    PresenceSync { online: usize },
}

/// Wire frame on the notification/presence channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ChannelFrame {
    /// Client subscribes to a table's change feed
    Subscribe { table: String },
    /// Keepalive in both directions
    Heartbeat,
    /// Row inserted
    Insert(ClimberRecord),
    /// Row updated
    Update(ClimberRecord),
    /// Presence membership snapshot changed
    PresenceSync { online: usize },
    /// Client announces or refreshes its presence entry
    Track(PresenceEntry),
    /// Client withdraws its presence entry
    Untrack { name: String },
}

/// Remote store errors; confined to the sync boundary, never fatal.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Notification channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Malformed remote payload: {0}")]
    InvalidPayload(String),
}

/// A uniquely-keyed progress table plus an ephemeral presence channel.
///
/// Upserts are last-writer-wins on the name key. `fetch_climbers` orders by
/// step total descending; the relative order of equal totals is whatever
/// the store returns and must be treated as non-deterministic.
pub trait RemoteStore: Send + Sync {
    /// Open the notification/presence channel.
    fn connect(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Close the channel, dropping this session's presence entry.
    fn disconnect(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Insert or replace the record keyed by its name.
    fn upsert_climber(
        &self,
        record: ClimberRecord,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// All records ordered by step total descending, optionally truncated.
    fn fetch_climbers(
        &self,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<ClimberRecord>, RemoteError>> + Send;

    /// The record for one participant, if present.
    fn fetch_climber(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ClimberRecord>, RemoteError>> + Send;

    /// Remove one record; absence is not an error.
    fn delete_climber(&self, name: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Remove every record. Irreversible.
    fn delete_all_climbers(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Announce or refresh this session's presence entry.
    fn track_presence(
        &self,
        entry: PresenceEntry,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Withdraw this session's presence entry.
    fn untrack_presence(&self, name: &str)
        -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent>;
}
