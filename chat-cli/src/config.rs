//! Configuration for parlor.
//!
//! Settings come from a TOML file (default: `parlor.toml` in the data
//! directory). Every field has a default, so an empty or missing file is a
//! valid configuration. The signed-in identity is kept separately in
//! `identity.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chat_client::{SessionConfig, DEFAULT_FEED_URL, DEFAULT_HISTORY_URL};
use chat_types::{Identity, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "parlor.toml";

const IDENTITY_FILE: &str = "identity.json";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server endpoints.
    #[serde(default)]
    pub server: ServerConfig,
    /// Live feed behaviour.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Local storage.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// History endpoint (default: http://localhost:8080/api/messages/history).
    #[serde(default = "default_history_url")]
    pub history_url: String,
    /// Live feed endpoint (default: ws://localhost:8080/ws-chat).
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    /// Login endpoint, used when signing in with an email address.
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

/// Live feed behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Wait between reconnect attempts in milliseconds (default: 5000).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long one-shot commands wait for history and the feed (default: 10).
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
}

/// Local storage.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Read cursor file, relative to the data directory unless absolute.
    #[serde(default = "default_cursor_file")]
    pub cursor_file: PathBuf,
}

fn default_history_url() -> String {
    DEFAULT_HISTORY_URL.to_string()
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_login_url() -> String {
    "http://localhost:8080/api/users/login".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_wait_secs() -> u64 {
    10
}

fn default_cursor_file() -> PathBuf {
    PathBuf::from("read_cursors.json")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            history_url: default_history_url(),
            feed_url: default_feed_url(),
            login_url: default_login_url(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            wait_secs: default_wait_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cursor_file: default_cursor_file(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `explicit` if given, otherwise `parlor.toml` in `data_dir` if it
    /// exists, otherwise the defaults.
    pub fn load(data_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = data_dir.join(CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_feed_url(&self.server.feed_url)
            .with_history_url(&self.server.history_url)
            .with_reconnect_delay(Duration::from_millis(self.feed.reconnect_delay_ms))
    }

    /// How long one-shot commands wait.
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.feed.wait_secs)
    }

    /// Absolute location of the read cursor file.
    pub fn cursor_path(&self, data_dir: &Path) -> PathBuf {
        if self.storage.cursor_file.is_absolute() {
            self.storage.cursor_file.clone()
        } else {
            data_dir.join(&self.storage.cursor_file)
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// The remembered sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredIdentity {
    /// Signed-in user name.
    pub username: String,
    /// Email given at sign-in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// When the sign-in happened.
    pub signed_in_at: Timestamp,
}

impl StoredIdentity {
    /// Remember `identity`.
    pub fn new(identity: &Identity, email: Option<String>) -> Self {
        Self {
            username: identity.as_str().to_string(),
            email,
            signed_in_at: Utc::now(),
        }
    }

    /// The remembered identity, validated.
    pub fn identity(&self) -> Result<Identity> {
        Identity::parse(&self.username).context("Stored identity is invalid. Run 'parlor login' again.")
    }

    /// Load the remembered sign-in from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Not signed in. Run 'parlor login <name>' first.")?;
        serde_json::from_str(&contents).context("Invalid identity file")
    }

    /// Save the sign-in to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save identity")?;
        Ok(())
    }

    /// Forget the sign-in. Returns false if nobody was signed in.
    pub async fn remove(data_dir: &Path) -> Result<bool> {
        match tokio::fs::remove_file(data_dir.join(IDENTITY_FILE)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to remove identity"),
        }
    }

    /// Check if someone is signed in.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(IDENTITY_FILE).exists()
    }
}
