//! Synchronization between the local ledger and the remote store.
//!
//! All remote writes here are fire-and-forget: at most one attempt per
//! call, failures logged and swallowed. Local acceptance has already been
//! persisted by the time any of this runs, so nothing here can roll it
//! back or block it.

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::ledger::ClimbLedger;
use crate::remote::{ClimberRecord, PresenceEntry, RemoteError, RemoteEvent, RemoteStore};
use crate::roster::Roster;
use crate::route;

/// Coordinates upsert-on-accept, presence, and notification handling.
pub struct SyncCoordinator<S> {
    store: S,
    roster: Roster<S>,
    listener: Option<JoinHandle<()>>,
}

impl<S> SyncCoordinator<S>
where
    S: RemoteStore + Clone + Send + Sync + 'static,
{
    /// Create a coordinator over the store and the roster it refreshes.
    pub fn new(store: S, roster: Roster<S>) -> Self {
        Self {
            store,
            roster,
            listener: None,
        }
    }

    /// Open the notification channel and begin reacting to it.
    ///
    /// On the first successful subscription this announces presence once
    /// and performs one full roster load; afterwards the roster stays
    /// current through change notifications alone.
    pub async fn start(&mut self, ledger: &ClimbLedger) -> Result<(), RemoteError> {
        self.store.connect().await?;

        let rx = self.store.subscribe();
        self.listener = Some(self.spawn_listener(rx));

        self.announce_presence(ledger).await;

        if let Err(e) = self.roster.reload().await {
            tracing::warn!("Initial roster load failed: {}", e);
        }

        Ok(())
    }

    fn spawn_listener(&self, mut rx: tokio::sync::broadcast::Receiver<RemoteEvent>) -> JoinHandle<()> {
        let roster = self.roster.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(RemoteEvent::RecordInserted(record)) => {
                        tracing::debug!("New climber record: {}", record.name);
                        if let Err(e) = roster.reload().await {
                            tracing::warn!("Roster reload failed: {}", e);
                        }
                    }
                    Ok(RemoteEvent::RecordUpdated(record)) => {
                        tracing::debug!("Climber record updated: {}", record.name);
                        if let Err(e) = roster.reload().await {
                            tracing::warn!("Roster reload failed: {}", e);
                        }
                    }
                    Ok(RemoteEvent::PresenceSync { online }) => {
                        roster.set_online_count(online);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Missed {} notifications, reloading roster", skipped);
                        if let Err(e) = roster.reload().await {
                            tracing::warn!("Roster reload failed: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Push the local participant's current progress to the remote store
    /// and refresh the presence entry.
    ///
    /// No-op without a registered name. Both writes are independent and
    /// at-most-once; neither failure is surfaced to the caller.
    pub async fn sync_self(&self, ledger: &ClimbLedger) {
        let Some(name) = ledger.participant_name.clone() else {
            return;
        };

        let elevation = route::elevation_m(ledger.total_steps);
        let record = ClimberRecord {
            name: name.clone(),
            total_steps: ledger.total_steps,
            station: route::station_at(elevation).name.to_string(),
            updated_at: Utc::now(),
        };

        if let Err(e) = self.store.upsert_climber(record).await {
            tracing::warn!("Progress sync failed: {}", e);
        }

        if let Err(e) = self
            .store
            .track_presence(PresenceEntry {
                name,
                elevation_m: elevation,
                updated_at: Utc::now(),
            })
            .await
        {
            tracing::warn!("Presence refresh failed: {}", e);
        }
    }

    async fn announce_presence(&self, ledger: &ClimbLedger) {
        let Some(name) = ledger.participant_name.clone() else {
            return;
        };

        let elevation = route::elevation_m(ledger.total_steps);
        if let Err(e) = self
            .store
            .track_presence(PresenceEntry {
                name,
                elevation_m: elevation,
                updated_at: Utc::now(),
            })
            .await
        {
            tracing::warn!("Presence announce failed: {}", e);
        }
    }

    /// Withdraw presence and close the channel.
    pub async fn shutdown(&mut self, ledger: &ClimbLedger) {
        if let Some(name) = &ledger.participant_name {
            if let Err(e) = self.store.untrack_presence(name).await {
                tracing::debug!("Presence untrack failed: {}", e);
            }
        }

        if let Err(e) = self.store.disconnect().await {
            tracing::debug!("Channel disconnect failed: {}", e);
        }

        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
