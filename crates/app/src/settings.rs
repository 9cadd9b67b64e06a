//! Persisted user settings.
//!
//! The [`SettingsStore`] trait is the only persistence seam the client
//! needs: server URLs, the ComfyUI location, the signed-in user and their
//! auth token.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// User-editable settings. Unset fields fall back to [`crate::AppConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comfyui_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comfyui_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Settings {
    pub fn is_signed_in(&self) -> bool {
        self.auth_token.is_some()
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored settings, or the defaults when nothing was saved yet.
    async fn load(&self) -> Result<Settings, SettingsError>;

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError>;

    /// Forget everything stored.
    async fn clear(&self) -> Result<(), SettingsError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps settings for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Option<Settings>>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.settings.lock().clone().unwrap_or_default())
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SettingsError> {
        self.settings.lock().take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// Stores settings as pretty-printed JSON.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous settings intact.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(settings)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), SettingsError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn signed_in() -> Settings {
        Settings {
            user_id: Some("user-7".into()),
            auth_token: Some("jwt-abc".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettingsStore::new(dir.path().join("nested").join("settings.json"));

        assert_eq!(store.load().await.unwrap(), Settings::default());

        store.save(&signed_in()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), signed_in());
        assert!(!store.temp_path().exists());

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), Settings::default());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn unset_fields_are_omitted_and_unknown_keys_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = JsonFileSettingsStore::new(&path);

        store.save(&signed_in()).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"user_id": "user-7", "auth_token": "jwt-abc"}));

        std::fs::write(&path, r#"{"comfyui_url": "http://gpu-box:8188", "theme": "dark"}"#).unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.comfyui_url.as_deref(), Some("http://gpu-box:8188"));
        assert!(!loaded.is_signed_in());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileSettingsStore::new(&path).load().await.unwrap_err();
        assert_matches!(err, SettingsError::Parse(_));
    }

    #[tokio::test]
    async fn memory_store_clear_restores_defaults() {
        let store = MemorySettingsStore::new(signed_in());
        assert!(store.load().await.unwrap().is_signed_in());
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), Settings::default());
    }
}
