use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// The three configurable voice-capture triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingName {
    /// Press-or-hold hybrid trigger
    Smart,
    /// Push-to-talk: record while held
    Hold,
    /// Press once to start, again to stop
    Toggle,
}

impl BindingName {
    /// All bindings, in display order
    pub const ALL: [Self; 3] = [Self::Smart, Self::Hold, Self::Toggle];

    /// Lowercase name used in persisted settings and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::Hold => "hold",
            Self::Toggle => "toggle",
        }
    }
}

impl fmt::Display for BindingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named shortcut configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutBinding {
    /// Which trigger this binding controls
    pub name: BindingName,
    /// Canonical combination string, e.g. `Control+Space`
    pub combo: String,
    /// Whether this trigger is active
    pub enabled: bool,
}

/// Why a capture could not be armed for a binding
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    /// The binding is disabled; enable it before recording a shortcut
    #[error("binding '{0}' is disabled")]
    Disabled(BindingName),
    /// Another binding already holds the capture hook
    #[error("a capture session is already active for '{0}'")]
    CaptureInProgress(BindingName),
}

/// The set of all three bindings with the mutual-exclusion invariant:
/// at least one binding is enabled at all times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutBindingSet {
    smart: ShortcutBinding,
    hold: ShortcutBinding,
    toggle: ShortcutBinding,
}

impl Default for ShortcutBindingSet {
    fn default() -> Self {
        Self {
            smart: ShortcutBinding {
                name: BindingName::Smart,
                combo: "Control+Space".to_owned(),
                enabled: true,
            },
            hold: ShortcutBinding {
                name: BindingName::Hold,
                combo: "Control+Shift+Space".to_owned(),
                enabled: true,
            },
            toggle: ShortcutBinding {
                name: BindingName::Toggle,
                combo: "Alt+Space".to_owned(),
                enabled: false,
            },
        }
    }
}

impl ShortcutBindingSet {
    /// Build a set from three persisted bindings.
    ///
    /// A payload with every binding disabled cannot be represented; `smart`
    /// is re-enabled so the invariant holds for deserialized state too.
    #[must_use]
    pub fn from_bindings(
        smart: ShortcutBinding,
        hold: ShortcutBinding,
        toggle: ShortcutBinding,
    ) -> Self {
        let mut set = Self { smart, hold, toggle };
        if set.enabled_count() == 0 {
            warn!("all bindings disabled in persisted settings, re-enabling 'smart'");
            set.smart.enabled = true;
        }
        set
    }

    /// Read one binding
    #[must_use]
    pub const fn get(&self, name: BindingName) -> &ShortcutBinding {
        match name {
            BindingName::Smart => &self.smart,
            BindingName::Hold => &self.hold,
            BindingName::Toggle => &self.toggle,
        }
    }

    fn get_mut(&mut self, name: BindingName) -> &mut ShortcutBinding {
        match name {
            BindingName::Smart => &mut self.smart,
            BindingName::Hold => &mut self.hold,
            BindingName::Toggle => &mut self.toggle,
        }
    }

    /// How many bindings are currently enabled
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        [&self.smart, &self.hold, &self.toggle]
            .iter()
            .filter(|b| b.enabled)
            .count()
    }

    /// Replace a binding's combination string. The enabled flag is untouched.
    pub fn set_combination(&mut self, name: BindingName, combo: impl Into<String>) {
        let combo = combo.into();
        debug!(binding = %name, combo = %combo, "combination updated");
        self.get_mut(name).combo = combo;
    }

    /// Enable or disable a binding.
    ///
    /// Disabling the last enabled binding is rejected as a silent no-op;
    /// the return value reports whether the change was applied.
    pub fn set_enabled(&mut self, name: BindingName, enabled: bool) -> bool {
        if !enabled && self.get(name).enabled && self.enabled_count() == 1 {
            debug!(binding = %name, "refusing to disable the last enabled binding");
            return false;
        }
        self.get_mut(name).enabled = enabled;
        debug!(binding = %name, enabled = enabled, "enabled flag updated");
        true
    }

    /// Check that `name` may start a capture session.
    ///
    /// # Errors
    /// Returns [`BindingError::Disabled`] when the binding is disabled.
    pub fn check_armable(&self, name: BindingName) -> Result<(), BindingError> {
        if self.get(name).enabled {
            Ok(())
        } else {
            Err(BindingError::Disabled(name))
        }
    }
}
