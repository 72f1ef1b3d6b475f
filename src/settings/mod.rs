/// The persisted preferences aggregate
pub mod snapshot;
/// Settings store trait and the TOML file-backed implementation
pub mod store;
/// Optimistic persistence and external-change reconciliation
pub mod sync;

pub use snapshot::{CleanupSettings, SettingsSnapshot, TranscriptionMode};
pub use store::{SettingsStore, StoreError, TomlSettingsStore};
pub use sync::SettingsSyncEngine;
