//! Privileged administrative operations.
//!
//! These mutate the remote store directly, bypassing the intake gate
//! entirely. The surface is only constructed when the invocation context
//! carries the admin flag; without it nothing here is reachable.

use chrono::Utc;
use thiserror::Error;

use crate::remote::{ClimberRecord, RemoteError, RemoteStore};
use crate::route;

/// First of two confirmations required before a full reset.
///
/// [`AdminOps::reset_all`] only accepts a [`ResetConfirmation`], and the
/// only way to produce one is `ResetRequest::new().confirm()` — two
/// deliberate steps. A single confirmation cannot type-check into the
/// call.
#[derive(Debug)]
pub struct ResetRequest {
    _private: (),
}

/// Proof that the reset was confirmed twice.
#[derive(Debug)]
pub struct ResetConfirmation {
    _private: (),
}

impl ResetRequest {
    /// Record the first confirmation.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Record the second, independent confirmation.
    pub fn confirm(self) -> ResetConfirmation {
        ResetConfirmation { _private: () }
    }
}

impl Default for ResetRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Administrative operation errors.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Participant not found: {0}")]
    NotFound(String),

    #[error("Grant must be a positive step count")]
    InvalidGrant,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Privileged mutation surface over the remote store.
pub struct AdminOps<S> {
    store: S,
}

impl<S: RemoteStore> AdminOps<S> {
    /// Create the admin surface. Callers gate construction on the admin
    /// flag of the invocation context.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Add steps to a participant's remote record.
    ///
    /// Read-then-write with no isolation: a participant syncing their own
    /// progress between the read and the write takes the row with them
    /// (last writer wins) and the grant is lost. Accepted risk.
    pub async fn grant_steps(&self, name: &str, steps: u64) -> Result<ClimberRecord, AdminError> {
        if steps == 0 {
            return Err(AdminError::InvalidGrant);
        }

        let current = self
            .store
            .fetch_climber(name)
            .await?
            .ok_or_else(|| AdminError::NotFound(name.to_string()))?;

        let total_steps = current.total_steps + steps;
        let elevation = route::elevation_m(total_steps);

        let updated = ClimberRecord {
            name: current.name,
            total_steps,
            station: route::station_at(elevation).name.to_string(),
            updated_at: Utc::now(),
        };

        self.store.upsert_climber(updated.clone()).await?;
        tracing::info!("Granted {} steps to {} (total {})", steps, name, total_steps);

        Ok(updated)
    }

    /// Remove a participant's record. Absence is not an error.
    pub async fn delete_participant(&self, name: &str) -> Result<(), AdminError> {
        self.store.delete_climber(name).await?;
        tracing::info!("Deleted participant {}", name);
        Ok(())
    }

    /// Delete every record. Irreversible; requires the doubly-confirmed
    /// token.
    pub async fn reset_all(&self, _confirmed: ResetConfirmation) -> Result<(), AdminError> {
        self.store.delete_all_climbers().await?;
        tracing::warn!("All participant records deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use chrono::TimeZone;

    fn record(name: &str, steps: u64) -> ClimberRecord {
        ClimberRecord {
            name: name.to_string(),
            total_steps: steps,
            station: route::station_at(route::elevation_m(steps)).name.to_string(),
            updated_at: chrono::Utc.timestamp_millis_opt(1_754_500_000_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_grant_adds_and_recomputes_station() {
        let store = MemoryRemoteStore::new();
        store.upsert_climber(record("aiko", 1000)).await.unwrap();

        let admin = AdminOps::new(store.clone());
        let updated = admin.grant_steps("aiko", 3000).await.unwrap();

        assert_eq!(updated.total_steps, 4000);
        // 4000 steps is 800.0 m, past the First Station threshold.
        assert_eq!(updated.station, "First Station");

        let stored = store.fetch_climber("aiko").await.unwrap().unwrap();
        assert_eq!(stored.total_steps, 4000);
    }

    #[tokio::test]
    async fn test_grant_absent_participant_is_not_found() {
        let store = MemoryRemoteStore::new();
        let admin = AdminOps::new(store.clone());

        let result = admin.grant_steps("nobody", 100).await;
        assert!(matches!(result, Err(AdminError::NotFound(_))));
        assert!(store.fetch_climbers(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_zero_steps_rejected() {
        let store = MemoryRemoteStore::new();
        store.upsert_climber(record("aiko", 1000)).await.unwrap();

        let admin = AdminOps::new(store.clone());
        let result = admin.grant_steps("aiko", 0).await;
        assert!(matches!(result, Err(AdminError::InvalidGrant)));

        let stored = store.fetch_climber("aiko").await.unwrap().unwrap();
        assert_eq!(stored.total_steps, 1000);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryRemoteStore::new();
        store.upsert_climber(record("aiko", 1000)).await.unwrap();

        let admin = AdminOps::new(store.clone());
        admin.delete_participant("aiko").await.unwrap();
        admin.delete_participant("aiko").await.unwrap();

        assert!(store.fetch_climber("aiko").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_all_requires_double_confirmation() {
        let store = MemoryRemoteStore::new();
        store.upsert_climber(record("aiko", 1000)).await.unwrap();
        store.upsert_climber(record("kenji", 2000)).await.unwrap();

        let admin = AdminOps::new(store.clone());
        let confirmed = ResetRequest::new().confirm();
        admin.reset_all(confirmed).await.unwrap();

        assert!(store.fetch_climbers(None).await.unwrap().is_empty());
    }
}
