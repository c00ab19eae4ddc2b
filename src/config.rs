//! Application configuration loading from TOML.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Replay-suppression policy for scan intake.
///
/// The two policies are mutually exclusive; exactly one is active per
/// installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplayPolicy {
    /// Reject an immediate repeat of the last accepted checkpoint; a
    /// different checkpoint in between re-enables it.
    #[default]
    DistinctLocation,
    /// Accept at most one scan per calendar day, regardless of checkpoint.
    PerDay,
}

impl std::fmt::Display for ReplayPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayPolicy::DistinctLocation => write!(f, "distinct-location"),
            ReplayPolicy::PerDay => write!(f, "per-day"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Scan intake settings
    pub intake: IntakeSettings,
    /// Remote store settings
    pub remote: RemoteSettings,
    /// Roster view settings
    pub roster: RosterSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            intake: IntakeSettings::default(),
            remote: RemoteSettings::default(),
            roster: RosterSettings::default(),
        }
    }
}

/// Scan intake settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeSettings {
    /// Minimum interval between accepted scans in milliseconds
    pub cooldown_ms: u64,
    /// Active replay-suppression policy
    pub replay_policy: ReplayPolicy,
    /// Fixed UTC offset in minutes for calendar-day boundaries (JST by
    /// default, where the route lives)
    pub utc_offset_minutes: i32,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: 3000,
            replay_policy: ReplayPolicy::default(),
            utc_offset_minutes: 9 * 60,
        }
    }
}

/// Remote store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the REST endpoint
    pub base_url: String,
    /// WebSocket URL of the change-notification channel
    pub channel_url: String,
    /// API key sent with every request
    pub api_key: String,
    /// Table holding per-participant records
    pub table: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            channel_url: String::new(),
            api_key: String::new(),
            table: "climbers".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Roster view settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSettings {
    /// Ranking query size
    pub ranking_limit: usize,
    /// Maximum climbers shown on the route visualizer (self excluded)
    pub max_display: usize,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            ranking_limit: 100,
            max_display: 50,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "stepsummit", "StepSummit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = get_config_path();

    if !path.exists() {
        let config = AppConfig {
            data_dir: get_data_dir(),
            ..Default::default()
        };
        return Ok(config);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = get_data_dir();

    Ok(config)
}

/// Save application configuration to file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = get_config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
