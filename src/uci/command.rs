//! The UCI command model.
//!
//! A [`UciCommand`] is a single mutation against the on-device configuration
//! database: `set`, `add_list`, `del_list`, or `delete`. Commands are the
//! common currency of the whole pipeline - trees emit them, parsers produce
//! them, the diff engine classifies them, and the reconciler replays them
//! over a transport.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;

/// Option names whose values must never be shown in clear text.
///
/// Matched case-insensitively against the last path segment.
static SENSITIVE_OPTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "key",
        "password",
        "wpakey",
        "sae_password",
        "psk",
        "secret",
        "auth_secret",
        "priv_passwd",
        "auth_passwd",
    ]
    .into_iter()
    .collect()
});

/// The mutation kind carried by a [`UciCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UciAction {
    /// Assign a scalar value (or define a section when the path has two segments).
    Set,
    /// Append one element to a list option.
    AddList,
    /// Remove one exact element from a list option.
    DelList,
    /// Delete a section or option entirely.
    Delete,
}

impl fmt::Display for UciAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UciAction::Set => "set",
            UciAction::AddList => "add_list",
            UciAction::DelList => "del_list",
            UciAction::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A single UCI mutation.
///
/// The path is a dotted sequence of segments: two segments address a section
/// definition (`package.section`), three segments address an option
/// (`package.section.option`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UciCommand {
    /// The mutation kind.
    pub action: UciAction,
    /// Dotted path (`package.section` or `package.section.option`).
    pub path: String,
    /// Scalar payload. `delete` carries none; `del_list` carries the exact
    /// element to remove.
    pub value: Option<String>,
}

impl UciCommand {
    /// Creates a `set` command.
    pub fn set(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            action: UciAction::Set,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    /// Creates an `add_list` command.
    pub fn add_list(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            action: UciAction::AddList,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a `del_list` command.
    pub fn del_list(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            action: UciAction::DelList,
            path: path.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a `delete` command.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            action: UciAction::Delete,
            path: path.into(),
            value: None,
        }
    }

    /// The first path segment (UCI package).
    pub fn package(&self) -> &str {
        self.path.split('.').next().unwrap_or("")
    }

    /// The second path segment (section name), if present.
    pub fn section(&self) -> Option<&str> {
        self.path.split('.').nth(1)
    }

    /// The third path segment (option name), if present.
    pub fn option(&self) -> Option<&str> {
        self.path.split('.').nth(2)
    }

    /// Number of dotted path segments.
    pub fn depth(&self) -> usize {
        self.path.split('.').count()
    }

    /// True for two-segment paths that define a section.
    pub fn is_section_definition(&self) -> bool {
        self.action == UciAction::Set && self.depth() == 2
    }

    /// True if the last path segment names a secret-bearing option.
    pub fn is_sensitive(&self) -> bool {
        match self.option() {
            Some(option) => SENSITIVE_OPTIONS.contains(option.to_ascii_lowercase().as_str()),
            None => false,
        }
    }

    /// Canonical on-device string form, fed verbatim to the remote shell.
    ///
    /// Values are single-quoted; the on-device shell handles embedded
    /// characters through the quoting, no escaping is applied here.
    pub fn to_uci_string(&self) -> String {
        match self.action {
            UciAction::Set => format!("uci set {}='{}'", self.path, self.value_or_empty()),
            UciAction::AddList => {
                format!("uci add_list {}='{}'", self.path, self.value_or_empty())
            }
            UciAction::DelList => {
                format!("uci del_list {}='{}'", self.path, self.value_or_empty())
            }
            UciAction::Delete => format!("uci delete {}", self.path),
        }
    }

    /// String form for display, with sensitive values masked.
    ///
    /// The stored value is never mutated; masking is purely a rendering
    /// concern.
    pub fn to_display_string(&self) -> String {
        match self.action {
            UciAction::Delete => self.to_uci_string(),
            _ => {
                let shown = self.display_value();
                match self.action {
                    UciAction::Set => format!("uci set {}='{}'", self.path, shown),
                    UciAction::AddList => format!("uci add_list {}='{}'", self.path, shown),
                    UciAction::DelList => format!("uci del_list {}='{}'", self.path, shown),
                    UciAction::Delete => unreachable!(),
                }
            }
        }
    }

    /// The value as it should appear in output: verbatim for ordinary
    /// options, masked for sensitive ones.
    pub fn display_value(&self) -> String {
        let value = self.value_or_empty();
        if self.is_sensitive() {
            mask_value(value)
        } else {
            value.to_string()
        }
    }

    fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci_string())
    }
}

/// Masks a secret value for display.
///
/// Values longer than three characters keep their first three characters and
/// are padded with `*` to the original length; shorter values are fully
/// starred.
pub fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 3 {
        let visible: String = chars[..3].iter().collect();
        format!("{}{}", visible, "*".repeat(chars.len() - 3))
    } else {
        "*".repeat(chars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_strings() {
        assert_eq!(
            UciCommand::set("network.lan.proto", "static").to_uci_string(),
            "uci set network.lan.proto='static'"
        );
        assert_eq!(
            UciCommand::add_list("network.br_lan.ports", "lan1").to_uci_string(),
            "uci add_list network.br_lan.ports='lan1'"
        );
        assert_eq!(
            UciCommand::del_list("network.br_lan.ports", "lan2").to_uci_string(),
            "uci del_list network.br_lan.ports='lan2'"
        );
        assert_eq!(
            UciCommand::delete("wireless.old_wifi").to_uci_string(),
            "uci delete wireless.old_wifi"
        );
    }

    #[test]
    fn test_path_accessors() {
        let cmd = UciCommand::set("network.lan.proto", "static");
        assert_eq!(cmd.package(), "network");
        assert_eq!(cmd.section(), Some("lan"));
        assert_eq!(cmd.option(), Some("proto"));
        assert!(!cmd.is_section_definition());

        let section = UciCommand::set("network.lan", "interface");
        assert!(section.is_section_definition());
        assert_eq!(section.option(), None);
    }

    #[test]
    fn test_sensitive_masking() {
        let cmd = UciCommand::set("wireless.w0.key", "MySecret123");
        assert!(cmd.is_sensitive());
        assert_eq!(
            cmd.to_display_string(),
            "uci set wireless.w0.key='MyS********'"
        );
        // Stored value unchanged
        assert_eq!(cmd.value.as_deref(), Some("MySecret123"));
    }

    #[test]
    fn test_sensitive_case_insensitive() {
        assert!(UciCommand::set("wireless.w0.SAE_Password", "x").is_sensitive());
        assert!(!UciCommand::set("network.lan.proto", "static").is_sensitive());
        // Section definitions never mask
        assert!(!UciCommand::set("wireless.key", "zone").is_sensitive());
    }

    #[test]
    fn test_mask_short_values() {
        assert_eq!(mask_value("ab"), "**");
        assert_eq!(mask_value("abc"), "***");
        assert_eq!(mask_value("abcd"), "abc*");
        assert_eq!(mask_value(""), "");
    }
}
