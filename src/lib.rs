//! StepSummit - Stair-Climbing Summit Challenge Engine
//!
//! Converts checkpoint scans into elevation gained along a virtual summit
//! route, guards the intake against replays and rapid-fire scanning, and
//! keeps a shared multi-participant view synchronized through an
//! eventually-consistent remote store with change notification and
//! ephemeral presence.

pub mod admin;
pub mod config;
pub mod intake;
pub mod ledger;
pub mod remote;
pub mod roster;
pub mod route;
pub mod session;
pub mod sync;

// Re-export commonly used types
pub use admin::AdminOps;
pub use config::AppConfig;
pub use intake::{IntakeGate, ScanEvent};
pub use ledger::ClimbLedger;
pub use remote::{MemoryRemoteStore, RemoteStore, RestRemoteStore};
pub use roster::Roster;
pub use session::ClimbSession;
pub use sync::SyncCoordinator;
