use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

use super::bindings::BindingName;
use super::keymap::{display_name, format_combination, Modifier};

/// Errors that can end a capture session without producing a combination
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Key-up arrived before any non-modifier key was pressed
    #[error("incomplete combination: press a non-modifier key")]
    IncompleteCombination,
}

/// A raw keyboard event as delivered by the capture hook.
///
/// `code` is the physical key code (`ControlLeft`, `KeyA`, `Space`);
/// `key` is the logical key name (`Control`, `a`, ` `).
#[derive(Debug, Clone)]
pub struct KeyEvent {
    /// Physical key code
    pub code: String,
    /// Logical key name
    pub key: String,
}

impl KeyEvent {
    /// Convenience constructor for call sites and tests
    #[must_use]
    pub fn new(code: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            key: key.into(),
        }
    }
}

/// Outcome of feeding a key-down event to an armed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDownOutcome {
    /// The preview changed; keep the session armed
    Updated,
    /// Escape was pressed; the caller must tear the session down
    Cancelled,
}

/// A live shortcut-capture session for a single binding.
///
/// Created when the user arms capture for one binding and destroyed on
/// key-up resolution, Escape, or teardown of the settings surface. While a
/// session exists the caller holds the process-wide keyboard hook; dropping
/// the session is what releases it, so teardown is deterministic by
/// ownership.
#[derive(Debug)]
pub struct KeyCaptureSession {
    armed_for: BindingName,
    modifiers: BTreeSet<Modifier>,
    primary: Option<String>,
}

impl KeyCaptureSession {
    /// Arm a fresh session for `binding` with no accumulated state
    #[must_use]
    pub fn new(binding: BindingName) -> Self {
        debug!(binding = %binding, "capture session armed");
        Self {
            armed_for: binding,
            modifiers: BTreeSet::new(),
            primary: None,
        }
    }

    /// The binding this session was armed for
    #[must_use]
    pub const fn armed_for(&self) -> BindingName {
        self.armed_for
    }

    /// Classify a key-down event and fold it into the session.
    ///
    /// Modifiers accumulate into the (canonically ordered) modifier set; any
    /// other key becomes the primary key, overwriting a previous one. Escape
    /// cancels the session outright.
    pub fn key_down(&mut self, event: &KeyEvent) -> KeyDownOutcome {
        if event.code == "Escape" || event.key == "Escape" {
            debug!(binding = %self.armed_for, "capture cancelled via Escape");
            return KeyDownOutcome::Cancelled;
        }

        if let Some(modifier) = Modifier::from_key(&event.code, &event.key) {
            self.modifiers.insert(modifier);
        } else {
            // Latest physical key-down wins
            self.primary = Some(display_name(&event.code));
        }

        debug!(
            binding = %self.armed_for,
            preview = %self.preview(),
            "capture updated"
        );
        KeyDownOutcome::Updated
    }

    /// The live preview string for the accumulated state
    #[must_use]
    pub fn preview(&self) -> String {
        format_combination(&self.modifiers, self.primary.as_deref())
    }

    /// Resolve the session on key-up, consuming it.
    ///
    /// # Errors
    /// Returns [`CaptureError::IncompleteCombination`] when no primary key
    /// was recorded; the caller must not mutate any binding in that case.
    pub fn resolve(self) -> Result<String, CaptureError> {
        match self.primary {
            Some(ref primary) => {
                let combo = format_combination(&self.modifiers, Some(primary));
                debug!(binding = %self.armed_for, combo = %combo, "capture resolved");
                Ok(combo)
            }
            None => {
                debug!(binding = %self.armed_for, "capture resolved without primary key");
                Err(CaptureError::IncompleteCombination)
            }
        }
    }
}
