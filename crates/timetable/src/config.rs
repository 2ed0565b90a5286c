/// Configuration file for the timetable service
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::auth::Role;
use crate::parser::SheetLayout;

/// Default page listing the published timetable files.
const DEFAULT_LISTING_URL: &str = "https://www.example.edu.pl/studenci/plany-zajec";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Path of the SQLite database file
    pub database_path: String,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub layout: SheetLayout,
    /// Bearer tokens accepted by the API and the role each one grants
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

/// Where and how the spreadsheet is downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub listing_url: String,
    /// Substring used to choose among several published files (e.g. study mode)
    pub filter: Option<String>,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound for one fetch-parse-save run
    pub timeout_secs: u64,
    /// Whether a notification is created when a new snapshot has changes
    pub notify_on_change: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: i64,
    pub name: String,
    pub role: Role,
    /// Student group, only meaningful for a starosta
    #[serde(default)]
    pub group: Option<String>,
}

impl AppConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// # Arguments
    /// * `path` - Path to the JSON configuration file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` - Parsed configuration, with defaults for missing keys
    /// * `Err` - If the file can't be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_path: "timetable.db".to_string(),
            source: SourceConfig::default(),
            sync: SyncConfig::default(),
            layout: SheetLayout::default(),
            tokens: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            filter: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            notify_on_change: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config file {path}: {message}")]
    Invalid { path: String, message: String },
}
