use std::collections::BTreeSet;
use std::fmt;

/// Modifier keys recognized during capture.
///
/// The derive order is the canonical order: a `BTreeSet<Modifier>` iterates
/// Control, Shift, Alt, Command, which is exactly the order modifiers appear
/// in a combination string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    /// Control / Ctrl
    Control,
    /// Shift
    Shift,
    /// Alt / Option
    Alt,
    /// Command / Meta / Super / Windows key
    Command,
}

impl Modifier {
    /// Classify a key event as a modifier, matching the physical key code
    /// first and the logical key name second.
    ///
    /// Returns `None` for non-modifier keys.
    #[must_use]
    pub fn from_key(code: &str, key: &str) -> Option<Self> {
        match code {
            "ControlLeft" | "ControlRight" => return Some(Self::Control),
            "ShiftLeft" | "ShiftRight" => return Some(Self::Shift),
            "AltLeft" | "AltRight" => return Some(Self::Alt),
            "MetaLeft" | "MetaRight" | "OSLeft" | "OSRight" => return Some(Self::Command),
            _ => {}
        }
        match key {
            "Control" | "Ctrl" => Some(Self::Control),
            "Shift" => Some(Self::Shift),
            "Alt" | "Option" => Some(Self::Alt),
            "Meta" | "Command" | "Super" => Some(Self::Command),
            _ => None,
        }
    }

    /// Name used in combination strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "Control",
            Self::Shift => "Shift",
            Self::Alt => "Alt",
            Self::Command => "Command",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a physical key code to its display name.
///
/// Letters and digits are stripped of their positional prefix (`KeyA` → `A`,
/// `Digit5` → `5`), named keys pass through verbatim, punctuation maps to its
/// printed character, and numpad keys get a `Num` prefix. Unknown codes pass
/// through unchanged so a new key is still representable, just unpolished.
#[must_use]
pub fn display_name(code: &str) -> String {
    if let Some(letter) = code.strip_prefix("Key") {
        if letter.len() == 1 && letter.chars().all(|c| c.is_ascii_uppercase()) {
            return letter.to_owned();
        }
    }
    if let Some(digit) = code.strip_prefix("Digit") {
        if digit.len() == 1 && digit.chars().all(|c| c.is_ascii_digit()) {
            return digit.to_owned();
        }
    }
    if let Some(digit) = code.strip_prefix("Numpad") {
        if digit.len() == 1 && digit.chars().all(|c| c.is_ascii_digit()) {
            return format!("Num{digit}");
        }
    }

    match code {
        "Comma" => ",".to_owned(),
        "Period" => ".".to_owned(),
        "Slash" => "/".to_owned(),
        "Backslash" => "\\".to_owned(),
        "Backquote" => "`".to_owned(),
        "Minus" => "-".to_owned(),
        "Equal" => "=".to_owned(),
        "BracketLeft" => "[".to_owned(),
        "BracketRight" => "]".to_owned(),
        "Semicolon" => ";".to_owned(),
        "Quote" => "'".to_owned(),
        "NumpadAdd" => "Num+".to_owned(),
        "NumpadSubtract" => "Num-".to_owned(),
        "NumpadMultiply" => "Num*".to_owned(),
        "NumpadDivide" => "Num/".to_owned(),
        "NumpadDecimal" => "Num.".to_owned(),
        "NumpadEnter" => "NumEnter".to_owned(),
        other => other.to_owned(),
    }
}

/// Format a combination string: modifiers in canonical order, primary key
/// last, joined with `+`.
///
/// Without a primary key this yields a partial string (or an empty one) that
/// is only suitable as a live preview; modifiers alone never form a valid
/// final combination, which [`resolve`](crate::shortcut::KeyCaptureSession::resolve)
/// enforces.
#[must_use]
pub fn format_combination(modifiers: &BTreeSet<Modifier>, primary: Option<&str>) -> String {
    let mut parts: Vec<&str> = modifiers.iter().map(|m| m.as_str()).collect();
    match primary {
        Some(key) => parts.push(key),
        None if parts.is_empty() => return String::new(),
        None => {}
    }
    parts.join("+")
}
