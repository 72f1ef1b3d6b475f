//! Dictation Settings - shortcut capture and settings reconciliation engine
//!
//! The stateful core of a desktop dictation app's settings surface:
//! live shortcut capture, the three trigger bindings, per-model download
//! tracking, and synchronization with the external settings store.

/// Engine configuration file
pub mod config;
/// Model download tracking and backends
pub mod download;
/// The settings-surface facade and its event loop
pub mod engine;
/// Persisted settings, store access, and synchronization
pub mod settings;
/// Shortcut capture and the trigger bindings
pub mod shortcut;
/// Telemetry and logging setup
pub mod telemetry;

pub use engine::{run_event_loop, SettingsEngine};
