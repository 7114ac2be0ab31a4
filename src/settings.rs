//! Persisted user settings (master volume and mute flag).
//!
//! The engine never owns durable storage. It reads and writes string values
//! through an injected [`SettingsStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{EngineError, Result};

pub const VOLUME_KEY: &str = "audio.masterVolume";
pub const MUTED_KEY: &str = "audio.muted";

pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-process store, used by offline engines and tests.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: HashMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Flat JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileSettings {
    /// Open (or lazily create) the settings file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(JsonFileSettings {
            path,
            values: Mutex::new(values),
        })
    }

    /// `settings.json` in the platform config directory.
    pub fn default_location() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "nebula_audio")
            .ok_or_else(|| EngineError::Settings("no home directory for settings".into()))?;
        Self::open(dirs.config_dir().join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let mut store = MemorySettings::new();
        assert_eq!(store.get(VOLUME_KEY), None);
        store.set(VOLUME_KEY, "0.25").unwrap();
        assert_eq!(store.get(VOLUME_KEY).as_deref(), Some("0.25"));
    }

    #[test]
    fn json_file_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("nebula_audio_settings_{}", std::process::id()));
        let path = dir.join("settings.json");
        let _ = std::fs::remove_file(&path);

        let mut store = JsonFileSettings::open(&path).unwrap();
        store.set(MUTED_KEY, "true").unwrap();
        store.set(VOLUME_KEY, "0.4").unwrap();

        let reopened = JsonFileSettings::open(&path).unwrap();
        assert_eq!(reopened.get(MUTED_KEY).as_deref(), Some("true"));
        assert_eq!(reopened.get(VOLUME_KEY).as_deref(), Some("0.4"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
