/// The three named trigger bindings and their mutual-exclusion invariant
pub mod bindings;
/// Live shortcut-capture sessions
pub mod capture;
/// Modifier classification and key display names
pub mod keymap;

pub use bindings::{BindingError, BindingName, ShortcutBinding, ShortcutBindingSet};
pub use capture::{CaptureError, KeyCaptureSession, KeyDownOutcome, KeyEvent};
pub use keymap::Modifier;
