use serde::{Deserialize, Serialize};

use crate::shortcut::{BindingName, ShortcutBinding, ShortcutBindingSet};

/// Where transcription runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionMode {
    /// On-device model
    Local,
    /// Hosted API
    Cloud,
}

/// LLM post-processing ("cleanup") configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Whether transcripts are passed through an LLM for cleanup
    pub enabled: bool,
    /// Provider identifier (preset catalog is out of scope here)
    pub provider: String,
    /// Model identifier at the provider
    pub model: String,
    /// System prompt applied to the transcript
    pub prompt: String,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            prompt: "Fix punctuation and capitalization. Do not rephrase.".to_owned(),
        }
    }
}

/// The full set of persisted preferences at a point in time.
///
/// This is the unit of persistence: every local mutation writes the whole
/// snapshot, and external change notifications carry a whole snapshot back.
/// `revision` is bumped on every local mutation so an externally received
/// copy of our own write is recognizable as an echo.
// Scalar fields precede the table-valued ones so the snapshot serializes
// cleanly as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Monotonic local mutation counter
    pub revision: u64,
    /// Local vs cloud transcription
    pub mode: TranscriptionMode,
    /// Selected transcription model key
    pub selected_model: String,
    /// Input device name (None = system default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// Spoken language code, `auto` for detection
    pub language: String,
    /// Whether dictated text is inserted in edit mode
    pub edit_mode: bool,
    /// Smart trigger binding
    pub smart: ShortcutBinding,
    /// Hold (push-to-talk) trigger binding
    pub hold: ShortcutBinding,
    /// Toggle trigger binding
    pub toggle: ShortcutBinding,
    /// LLM cleanup configuration
    pub cleanup: CleanupSettings,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        let bindings = ShortcutBindingSet::default();
        Self {
            revision: 0,
            smart: bindings.get(BindingName::Smart).clone(),
            hold: bindings.get(BindingName::Hold).clone(),
            toggle: bindings.get(BindingName::Toggle).clone(),
            mode: TranscriptionMode::Local,
            selected_model: "whisper-small".to_owned(),
            input_device: None,
            language: "auto".to_owned(),
            cleanup: CleanupSettings::default(),
            edit_mode: false,
        }
    }
}

impl SettingsSnapshot {
    /// Rebuild the binding set from the persisted bindings.
    ///
    /// Goes through [`ShortcutBindingSet::from_bindings`], which repairs an
    /// all-disabled payload.
    #[must_use]
    pub fn binding_set(&self) -> ShortcutBindingSet {
        ShortcutBindingSet::from_bindings(
            self.smart.clone(),
            self.hold.clone(),
            self.toggle.clone(),
        )
    }

    /// Write the binding set back into the snapshot fields
    pub fn set_bindings(&mut self, bindings: &ShortcutBindingSet) {
        self.smart = bindings.get(BindingName::Smart).clone();
        self.hold = bindings.get(BindingName::Hold).clone();
        self.toggle = bindings.get(BindingName::Toggle).clone();
    }
}
