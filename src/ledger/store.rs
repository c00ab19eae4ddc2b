//! Durable single-slot persistence for the ledger.
//!
//! The ledger lives in one row of a SQLite table as a JSON blob. Loading
//! never fails the caller: a missing row or unparseable blob falls back to
//! the empty default ledger.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use thiserror::Error;

use super::ClimbLedger;

const SLOT_TABLE: &str = "CREATE TABLE IF NOT EXISTS ledger_slot (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    ledger_json TEXT NOT NULL,
    saved_at TEXT NOT NULL
)";

/// Single-slot ledger store.
pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    /// Open or create the store at the given path.
    pub fn open(path: &PathBuf) -> Result<Self, LedgerStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerStoreError::IoError(e.to_string()))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| LedgerStoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { conn };
        store.initialize()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, LedgerStoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LedgerStoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { conn };
        store.initialize()?;

        Ok(store)
    }

    fn initialize(&self) -> Result<(), LedgerStoreError> {
        self.conn
            .execute_batch(SLOT_TABLE)
            .map_err(|e| LedgerStoreError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Load the ledger from the slot.
    ///
    /// Falls back to [`ClimbLedger::default`] when the slot is empty or the
    /// stored blob does not parse; corruption is logged, never raised.
    pub fn load(&self) -> ClimbLedger {
        let result: Result<String, _> = self.conn.query_row(
            "SELECT ledger_json FROM ledger_slot WHERE id = 1",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(ledger) => ledger,
                Err(e) => {
                    tracing::warn!("Stored ledger is corrupt, starting fresh: {}", e);
                    ClimbLedger::default()
                }
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => ClimbLedger::default(),
            Err(e) => {
                tracing::warn!("Failed to read ledger slot, starting fresh: {}", e);
                ClimbLedger::default()
            }
        }
    }

    /// Serialize and write the ledger into the slot.
    pub fn save(&self, ledger: &ClimbLedger) -> Result<(), LedgerStoreError> {
        let json = serde_json::to_string(ledger)
            .map_err(|e| LedgerStoreError::SerializationError(e.to_string()))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO ledger_slot (id, ledger_json, saved_at)
                 VALUES (1, ?1, ?2)",
                params![json, Utc::now().to_rfc3339()],
            )
            .map_err(|e| LedgerStoreError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Clear the slot.
    pub fn reset(&self) -> Result<(), LedgerStoreError> {
        self.conn
            .execute("DELETE FROM ledger_slot", [])
            .map_err(|e| LedgerStoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }
}

/// Ledger store errors.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
