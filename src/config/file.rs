//! JSON settings file loading.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use super::ConfigResult;
use super::settings::Settings;

const APPLICATION: &str = "llm-estimate";
const SETTINGS_FILE: &str = "settings.json";

/// Settings file on disk.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/llm-estimate/settings.json` for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> ConfigResult<Settings> {
        let content = std::fs::read_to_string(&self.path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        tracing::debug!(path = %self.path.display(), models = settings.models.len(), "loaded settings file");
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
