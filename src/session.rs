//! Owned application context for one participant session.
//!
//! Everything the session touches — config, ledger, durable slot, gate,
//! coordinator, roster — is owned here with explicit construction and
//! teardown. There are no module-level singletons.

use thiserror::Error;
use uuid::Uuid;

use crate::admin::AdminOps;
use crate::config::AppConfig;
use crate::intake::{IntakeGate, RejectReason, ScanAccepted, ScanEvent, ValidationError};
use crate::ledger::{ClimbLedger, LedgerStore, LedgerStoreError};
use crate::remote::{RemoteError, RemoteStore};
use crate::roster::Roster;
use crate::route;
use crate::sync::SyncCoordinator;

/// Why a scan did not produce progress. Both cases are expected and
/// surfaced synchronously; neither mutates any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Rejected(#[from] RejectReason),
}

/// Snapshot of local progress for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub total_steps: u64,
    pub elevation_m: f64,
    pub remaining_m: f64,
    pub station_name: &'static str,
}

/// One participant's session.
pub struct ClimbSession<S> {
    id: Uuid,
    config: AppConfig,
    ledger: ClimbLedger,
    ledger_store: LedgerStore,
    gate: IntakeGate,
    store: S,
    coordinator: SyncCoordinator<S>,
    roster: Roster<S>,
    admin: Option<AdminOps<S>>,
}

impl<S> ClimbSession<S>
where
    S: RemoteStore + Clone + Send + Sync + 'static,
{
    /// Create a session with the ledger slot in the configured data
    /// directory.
    pub fn new(config: AppConfig, store: S) -> Result<Self, LedgerStoreError> {
        let ledger_store = LedgerStore::open(&config.data_dir.join("ledger.db"))?;
        Ok(Self::with_ledger_store(config, store, ledger_store))
    }

    /// Create a session with an in-memory ledger slot (for testing).
    pub fn in_memory(config: AppConfig, store: S) -> Result<Self, LedgerStoreError> {
        let ledger_store = LedgerStore::open_in_memory()?;
        Ok(Self::with_ledger_store(config, store, ledger_store))
    }

    fn with_ledger_store(config: AppConfig, store: S, ledger_store: LedgerStore) -> Self {
        let ledger = ledger_store.load();
        let gate = IntakeGate::new(&config.intake);
        let roster = Roster::new(store.clone(), ledger.participant_name.clone());
        let coordinator = SyncCoordinator::new(store.clone(), roster.clone());

        let id = Uuid::new_v4();
        tracing::debug!("Session {} started with {} steps", id, ledger.total_steps);

        Self {
            id,
            config,
            ledger,
            ledger_store,
            gate,
            store,
            coordinator,
            roster,
            admin: None,
        }
    }

    /// Unlock the administrative surface. Only the invocation boundary
    /// that saw the admin flag calls this; otherwise [`Self::admin`]
    /// stays `None` and no admin operation exists in the session.
    pub fn with_admin_access(mut self) -> Self {
        self.admin = Some(AdminOps::new(self.store.clone()));
        self
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The active configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The local ledger.
    pub fn ledger(&self) -> &ClimbLedger {
        &self.ledger
    }

    /// The roster view.
    pub fn roster(&self) -> &Roster<S> {
        &self.roster
    }

    /// The admin surface, present only when unlocked.
    pub fn admin(&self) -> Option<&AdminOps<S>> {
        self.admin.as_ref()
    }

    /// Current local progress.
    pub fn progress(&self) -> ProgressSummary {
        let elevation_m = route::elevation_m(self.ledger.total_steps);
        ProgressSummary {
            total_steps: self.ledger.total_steps,
            elevation_m,
            remaining_m: route::remaining_m(elevation_m),
            station_name: route::station_at(elevation_m).name,
        }
    }

    /// Open the notification channel, announce presence, and load the
    /// roster.
    pub async fn connect(&mut self) -> Result<(), RemoteError> {
        self.coordinator.start(&self.ledger).await
    }

    /// Register the participant name and push the first sync.
    pub async fn register(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        self.ledger.participant_name = Some(name.to_string());
        self.persist();
        self.roster.set_self_name(Some(name.to_string()));
        self.coordinator.sync_self(&self.ledger).await;

        tracing::info!("Registered as {}", name);
        Ok(())
    }

    /// Run one scan through the gate.
    ///
    /// Acceptance persists locally before synchronization starts; a slow
    /// or failed sync never affects the returned result.
    pub async fn process_scan(
        &mut self,
        location_id: &str,
        steps: u64,
    ) -> Result<ScanAccepted, ScanError> {
        let event = ScanEvent::new(location_id, steps, chrono::Utc::now())?;
        let accepted = self.gate.evaluate(&mut self.ledger, &event)?;

        self.persist();
        self.coordinator.sync_self(&self.ledger).await;

        Ok(accepted)
    }

    /// Restore the empty default ledger, forgetting the participant name.
    pub fn reset_local(&mut self) -> Result<(), LedgerStoreError> {
        self.ledger_store.reset()?;
        self.ledger = ClimbLedger::default();
        self.roster.set_self_name(None);
        tracing::info!("Local ledger reset");
        Ok(())
    }

    /// Withdraw presence and close the channel.
    pub async fn shutdown(&mut self) {
        self.coordinator.shutdown(&self.ledger).await;
    }

    fn persist(&self) {
        // Best-effort durability: a failed save costs at most the progress
        // since the last successful one.
        if let Err(e) = self.ledger_store.save(&self.ledger) {
            tracing::error!("Failed to persist ledger: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    fn session() -> ClimbSession<MemoryRemoteStore> {
        ClimbSession::in_memory(AppConfig::default(), MemoryRemoteStore::new())
            .expect("Failed to create session")
    }

    #[tokio::test]
    async fn test_scan_accumulates_progress() {
        let mut session = session();

        let first = session.process_scan("gate-a", 400).await.unwrap();
        assert_eq!(first.total_steps, 400);
        assert_eq!(first.elevation_m, 80.0);
        assert!(!first.transition.is_new);

        let progress = session.progress();
        assert_eq!(progress.station_name, "Trailhead");
        assert_eq!(progress.remaining_m, 3696.0);
    }

    #[tokio::test]
    async fn test_scan_validation_precedes_gate() {
        let mut session = session();

        let result = session.process_scan("gate-a", 0).await;
        assert!(matches!(
            result,
            Err(ScanError::Invalid(ValidationError::NonPositiveSteps))
        ));
        assert_eq!(session.ledger().total_steps, 0);
    }

    #[tokio::test]
    async fn test_accepted_scan_syncs_after_registration() {
        let store = MemoryRemoteStore::new();
        let mut session =
            ClimbSession::in_memory(AppConfig::default(), store.clone()).unwrap();

        session.register("aiko").await.unwrap();
        session.process_scan("gate-a", 2000).await.unwrap();

        let record = store.fetch_climber("aiko").await.unwrap().unwrap();
        assert_eq!(record.total_steps, 2000);
        assert_eq!(record.station, "First Station");
    }

    #[tokio::test]
    async fn test_unregistered_scan_stays_local() {
        let store = MemoryRemoteStore::new();
        let mut session =
            ClimbSession::in_memory(AppConfig::default(), store.clone()).unwrap();

        session.process_scan("gate-a", 2000).await.unwrap();

        assert!(store.fetch_climbers(None).await.unwrap().is_empty());
        assert_eq!(session.ledger().total_steps, 2000);
    }

    #[tokio::test]
    async fn test_register_rejects_blank_name() {
        let mut session = session();
        assert_eq!(
            session.register("   ").await.unwrap_err(),
            ValidationError::EmptyName
        );
        assert!(session.ledger().participant_name.is_none());
    }

    #[tokio::test]
    async fn test_reset_forgets_everything() {
        let mut session = session();
        session.register("aiko").await.unwrap();
        session.process_scan("gate-a", 500).await.unwrap();

        session.reset_local().unwrap();

        assert_eq!(session.ledger().total_steps, 0);
        assert!(session.ledger().participant_name.is_none());
        assert!(session.roster().self_name().is_none());
    }

    #[tokio::test]
    async fn test_admin_surface_locked_by_default() {
        let session = session();
        assert!(session.admin().is_none());

        let unlocked = session.with_admin_access();
        assert!(unlocked.admin().is_some());
    }
}
