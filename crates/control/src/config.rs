//! Client configuration.
//!
//! Stored as JSON at `~/.config/cloudctl/config.json` (`%APPDATA%` on
//! Windows). Every field has a default, so a partial or missing file is
//! fine; an unparsable file is logged and ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cloudctl_transfer::{Concurrency, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::poller::{DEFAULT_POLL_INTERVAL, PollPolicy};

/// Long-running operation polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    /// Give up after this many status calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Give up after this many seconds of polling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_attempts: None,
            timeout_secs: None,
        }
    }
}

impl PollSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Object transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub chunk_size: u64,
    /// Worker bound: a positive number or `"unbounded"`.
    pub concurrency: Concurrency,
    pub progress_interval_ms: u64,
    pub verify_checksum: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: Concurrency::default(),
            progress_interval_ms: 1000,
            verify_checksum: false,
        }
    }
}

impl TransferSettings {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Persisted client defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub poll: PollSettings,
    pub transfer: TransferSettings,
}

impl ClientConfig {
    /// Loads the configuration from the default location.
    pub fn load() -> Result<Self, ControlError> {
        Self::load_from(&config_path())
    }

    /// Loads the configuration from `path`.
    ///
    /// A missing file yields the defaults. So does a file that fails to
    /// parse, after logging a warning.
    pub fn load_from(path: &Path) -> Result<Self, ControlError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Saves the configuration to the default location.
    pub fn save(&self) -> Result<(), ControlError> {
        self.save_to(&config_path())
    }

    /// Writes the configuration to `path` as pretty JSON, owner-only.
    pub fn save_to(&self, path: &Path) -> Result<(), ControlError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        set_permissions_0600(path);

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn validate(&self) -> Result<(), ControlError> {
        if self.transfer.chunk_size == 0 {
            return Err(ControlError::Validation(
                "transfer.chunk_size must be greater than zero".into(),
            ));
        }
        if self.transfer.progress_interval_ms == 0 {
            return Err(ControlError::Validation(
                "transfer.progress_interval_ms must be greater than zero".into(),
            ));
        }
        if self.poll.interval_ms == 0 {
            return Err(ControlError::Validation(
                "poll.interval_ms must be greater than zero".into(),
            ));
        }
        self.poll.policy().validate()
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Default configuration file path.
pub fn config_path() -> PathBuf {
    config_base_dir().join("cloudctl").join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
