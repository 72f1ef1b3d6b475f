use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::snapshot::SettingsSnapshot;

/// Errors from the persistent settings store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("settings store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored settings could not be parsed
    #[error("failed to parse stored settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// The snapshot could not be serialized
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// The external persistent settings store.
///
/// The settings surface is one of possibly several writers; other writers
/// announce their changes through an out-of-band notification carrying a
/// full [`SettingsSnapshot`]. Mocked in tests via `mockall`.
#[cfg_attr(test, mockall::automock)]
pub trait SettingsStore: Send + Sync {
    /// Read the current snapshot
    ///
    /// # Errors
    /// Returns [`StoreError`] when the store cannot be read or parsed.
    fn get_settings(&self) -> Result<SettingsSnapshot, StoreError>;

    /// Replace the stored snapshot
    ///
    /// # Errors
    /// Returns [`StoreError`] when the write fails.
    fn update_settings(&self, snapshot: &SettingsSnapshot) -> Result<(), StoreError>;
}

/// File-backed store writing the snapshot as TOML.
///
/// A missing file yields the default snapshot (and is created on the first
/// write), so a fresh install starts with usable settings.
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    /// Create a store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for TomlSettingsStore {
    fn get_settings(&self) -> Result<SettingsSnapshot, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(SettingsSnapshot::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn update_settings(&self, snapshot: &SettingsSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = toml::to_string_pretty(snapshot)?;

        // Write-then-rename so a crash mid-write never corrupts the store
        let temp_path = self.path.with_extension("toml.tmp");
        fs::write(&temp_path, serialized)?;
        fs::rename(&temp_path, &self.path)?;

        info!(
            path = %self.path.display(),
            revision = snapshot.revision,
            "settings persisted"
        );
        Ok(())
    }
}
