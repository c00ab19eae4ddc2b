//! In-process remote store.
//!
//! Same contract as the hosted store, backed by shared maps and a local
//! broadcast channel. Used by the test suite and by offline runs where no
//! remote endpoint is configured.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use super::{ClimberRecord, PresenceEntry, RemoteError, RemoteEvent, RemoteStore};

/// In-memory remote store.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    records: Arc<RwLock<HashMap<String, ClimberRecord>>>,
    presence: Arc<RwLock<HashMap<String, PresenceEntry>>>,
    event_tx: broadcast::Sender<RemoteEvent>,
}

impl MemoryRemoteStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            presence: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Number of live presence entries.
    pub fn online_count(&self) -> usize {
        self.presence.read().unwrap().len()
    }

    fn broadcast_presence(&self) {
        let online = self.online_count();
        let _ = self.event_tx.send(RemoteEvent::PresenceSync { online });
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn connect(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn upsert_climber(&self, record: ClimberRecord) -> Result<(), RemoteError> {
        record.validate()?;

        let previous = self
            .records
            .write()
            .unwrap()
            .insert(record.name.clone(), record.clone());

        let event = match previous {
            None => RemoteEvent::RecordInserted(record),
            Some(_) => RemoteEvent::RecordUpdated(record),
        };
        let _ = self.event_tx.send(event);

        Ok(())
    }

    async fn fetch_climbers(&self, limit: Option<usize>) -> Result<Vec<ClimberRecord>, RemoteError> {
        let mut records: Vec<ClimberRecord> =
            self.records.read().unwrap().values().cloned().collect();

        // Descending by total; equal totals keep map order, which is
        // deliberately unspecified.
        records.sort_by(|a, b| b.total_steps.cmp(&a.total_steps));

        if let Some(limit) = limit {
            records.truncate(limit);
        }

        Ok(records)
    }

    async fn fetch_climber(&self, name: &str) -> Result<Option<ClimberRecord>, RemoteError> {
        Ok(self.records.read().unwrap().get(name).cloned())
    }

    async fn delete_climber(&self, name: &str) -> Result<(), RemoteError> {
        self.records.write().unwrap().remove(name);
        Ok(())
    }

    async fn delete_all_climbers(&self) -> Result<(), RemoteError> {
        self.records.write().unwrap().clear();
        Ok(())
    }

    async fn track_presence(&self, entry: PresenceEntry) -> Result<(), RemoteError> {
        self.presence
            .write()
            .unwrap()
            .insert(entry.name.clone(), entry);
        self.broadcast_presence();
        Ok(())
    }

    async fn untrack_presence(&self, name: &str) -> Result<(), RemoteError> {
        self.presence.write().unwrap().remove(name);
        self.broadcast_presence();
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(name: &str, steps: u64) -> ClimberRecord {
        ClimberRecord {
            name: name.to_string(),
            total_steps: steps,
            station: "Trailhead".to_string(),
            updated_at: Utc.timestamp_millis_opt(1_754_500_000_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_emits_insert_then_update() {
        let store = MemoryRemoteStore::new();
        let mut rx = store.subscribe();

        store.upsert_climber(record("aiko", 100)).await.unwrap();
        store.upsert_climber(record("aiko", 200)).await.unwrap();

        match rx.recv().await.unwrap() {
            RemoteEvent::RecordInserted(r) => assert_eq!(r.total_steps, 100),
            other => panic!("Expected insert, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            RemoteEvent::RecordUpdated(r) => assert_eq!(r.total_steps, 200),
            other => panic!("Expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_last_writer_wins() {
        let store = MemoryRemoteStore::new();

        store.upsert_climber(record("aiko", 100)).await.unwrap();
        store.upsert_climber(record("aiko", 50)).await.unwrap();

        let fetched = store.fetch_climber("aiko").await.unwrap().unwrap();
        assert_eq!(fetched.total_steps, 50);
    }

    #[tokio::test]
    async fn test_fetch_orders_descending_with_limit() {
        let store = MemoryRemoteStore::new();
        store.upsert_climber(record("a", 300)).await.unwrap();
        store.upsert_climber(record("b", 900)).await.unwrap();
        store.upsert_climber(record("c", 600)).await.unwrap();

        let all = store.fetch_climbers(None).await.unwrap();
        let totals: Vec<u64> = all.iter().map(|r| r.total_steps).collect();
        assert_eq!(totals, vec![900, 600, 300]);

        let top2 = store.fetch_climbers(Some(2)).await.unwrap();
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].name, "b");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryRemoteStore::new();
        store.upsert_climber(record("aiko", 100)).await.unwrap();

        store.delete_climber("aiko").await.unwrap();
        store.delete_climber("aiko").await.unwrap();
        store.delete_climber("never-existed").await.unwrap();

        assert!(store.fetch_climber("aiko").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_presence_tracks_distinct_sessions() {
        let store = MemoryRemoteStore::new();
        let mut rx = store.subscribe();

        let entry = |name: &str| PresenceEntry {
            name: name.to_string(),
            elevation_m: 0.0,
            updated_at: Utc.timestamp_millis_opt(1_754_500_000_000).unwrap(),
        };

        store.track_presence(entry("aiko")).await.unwrap();
        store.track_presence(entry("kenji")).await.unwrap();
        // Refreshing an existing entry does not grow the count.
        store.track_presence(entry("aiko")).await.unwrap();
        assert_eq!(store.online_count(), 2);

        store.untrack_presence("aiko").await.unwrap();
        assert_eq!(store.online_count(), 1);

        let mut last_online = None;
        while let Ok(event) = rx.try_recv() {
            if let RemoteEvent::PresenceSync { online } = event {
                last_online = Some(online);
            }
        }
        assert_eq!(last_online, Some(1));
    }

    #[tokio::test]
    async fn test_rejects_invalid_record() {
        let store = MemoryRemoteStore::new();
        let result = store.upsert_climber(record("", 10)).await;
        assert!(matches!(result, Err(RemoteError::InvalidPayload(_))));
        assert!(store.fetch_climbers(None).await.unwrap().is_empty());
    }
}
