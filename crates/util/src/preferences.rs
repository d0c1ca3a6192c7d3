//! User preference persistence for the Quarry CLI.
//!
//! The store is a small JSON document written to the standard configuration
//! directory (`~/.config/quarry/preferences.json` on most platforms). Its main
//! purpose is the Graph API key override: a key saved here takes precedence
//! over the `QUARRY_GRAPH_API_KEY` environment default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use dirs_next::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable allowing callers to override the preferences file path.
pub const PREFERENCES_PATH_ENV: &str = "QUARRY_PREFERENCES_PATH";

/// Default filename for the JSON payload.
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Error surfaced when reading or writing preferences fails.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("preferences I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("preferences serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted preference values.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PreferencesPayload {
    /// User-supplied Graph API key overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_api_key: Option<String>,
}

/// Thread-safe preferences store backed by a JSON file.
#[derive(Debug, Default)]
pub struct UserPreferences {
    path: PathBuf,
    payload: Mutex<PreferencesPayload>,
    persist_to_disk: bool,
}

impl UserPreferences {
    /// Open the store at the default location, honoring [`PREFERENCES_PATH_ENV`].
    pub fn new() -> Result<Self, PreferencesError> {
        Self::open(default_preferences_path())
    }

    /// Open the store at an explicit path. A missing file yields empty preferences.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferencesError> {
        let path = path.into();
        let payload = load_payload(&path)?;
        Ok(Self {
            path,
            payload: Mutex::new(payload),
            persist_to_disk: true,
        })
    }

    /// Build an in-memory store used when the config directory cannot be accessed.
    pub fn ephemeral() -> Self {
        Self {
            path: PathBuf::new(),
            payload: Mutex::new(PreferencesPayload::default()),
            persist_to_disk: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved Graph API key override, if any. Blank values count as unset.
    pub fn graph_api_key(&self) -> Option<String> {
        self.lock()
            .graph_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Persist a Graph API key override; `None` clears it.
    pub fn set_graph_api_key(&self, api_key: Option<String>) -> Result<(), PreferencesError> {
        let mut payload = self.lock();
        payload.graph_api_key = api_key.map(|key| key.trim().to_string()).filter(|key| !key.is_empty());
        if self.persist_to_disk {
            self.save_locked(&payload)?;
        }
        debug!(path = %self.path.display(), has_key = payload.graph_api_key.is_some(), "graph api key preference updated");
        Ok(())
    }

    pub fn clear_graph_api_key(&self) -> Result<(), PreferencesError> {
        self.set_graph_api_key(None)
    }

    fn lock(&self) -> MutexGuard<'_, PreferencesPayload> {
        self.payload.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save_locked(&self, payload: &PreferencesPayload) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(payload)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

/// Resolve the preferences path from the environment or the config directory.
pub fn default_preferences_path() -> PathBuf {
    if let Ok(path) = env::var(PREFERENCES_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quarry")
        .join(PREFERENCES_FILE_NAME)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

fn load_payload(path: &Path) -> Result<PreferencesPayload, PreferencesError> {
    match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(payload) => Ok(payload),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to parse preferences file; using defaults"
                );
                Ok(PreferencesPayload::default())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(PreferencesPayload::default()),
        Err(error) => Err(PreferencesError::Io(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn graph_api_key_round_trips_through_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(PREFERENCES_FILE_NAME);

        let preferences = UserPreferences::open(&path).expect("open");
        assert_eq!(preferences.graph_api_key(), None);
        preferences.set_graph_api_key(Some("  key-123 ".into())).expect("save");

        let reopened = UserPreferences::open(&path).expect("reopen");
        assert_eq!(reopened.graph_api_key().as_deref(), Some("key-123"));

        reopened.clear_graph_api_key().expect("clear");
        let cleared = UserPreferences::open(&path).expect("reopen after clear");
        assert_eq!(cleared.graph_api_key(), None);
    }

    #[test]
    fn blank_key_is_treated_as_unset() {
        let preferences = UserPreferences::ephemeral();
        preferences.set_graph_api_key(Some("   ".into())).expect("ephemeral save");
        assert_eq!(preferences.graph_api_key(), None);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(PREFERENCES_FILE_NAME);
        fs::write(&path, "{not json").expect("write");

        let preferences = UserPreferences::open(&path).expect("open");
        assert_eq!(preferences.graph_api_key(), None);
    }

    #[test]
    fn path_env_override_is_respected() {
        let dir = tempdir().expect("tempdir");
        let custom = dir.path().join("custom.json");
        let custom_str = custom.to_string_lossy().to_string();

        temp_env::with_var(PREFERENCES_PATH_ENV, Some(custom_str.as_str()), || {
            assert_eq!(default_preferences_path(), custom);
        });
    }
}
