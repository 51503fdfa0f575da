//! Remote-preservation policy.
//!
//! A [`RemotePolicy`] decides which remote-only paths survive a sync instead
//! of being scheduled for deletion. The primary mechanism is a whitelist of
//! dotted path-glob patterns rooted at the package level; the pattern space
//! uses the logical-group names of desired-state documents (`interfaces`,
//! `devices`, `radios`, ...), not raw UCI section types.
//!
//! Pattern semantics:
//!
//! - a literal segment matches one equal path segment;
//! - `*` as a full segment matches exactly one arbitrary segment;
//! - `**` matches zero or more consecutive segments and may appear anywhere;
//! - glob characters inside a segment (`?`, `[..]`, partial `*`) match with
//!   filename-glob semantics against that single segment;
//! - a pattern ending in `.*` additionally matches its own prefix, so
//!   `interfaces.guest.*` whitelists the `interfaces.guest` section
//!   definition as well as every option under it.

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// Policy for handling remote-only sections and values.
///
/// The legacy `allowed_sections` / `allowed_values` fields are accepted for
/// backward compatibility and consulted only when `whitelist` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePolicy {
    /// Path glob patterns to preserve on the remote.
    pub whitelist: Vec<String>,

    /// Deprecated: section-name patterns (filename-glob against the section
    /// name). Superseded by `whitelist`.
    pub allowed_sections: Vec<String>,

    /// Deprecated: value patterns (filename-glob against scalar or list
    /// element values). Superseded by `whitelist`.
    pub allowed_values: Vec<String>,
}

impl RemotePolicy {
    /// Creates a policy from whitelist patterns.
    pub fn with_whitelist<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            whitelist: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Checks a relative path against every whitelist pattern.
    pub fn is_path_whitelisted(&self, path: &str) -> bool {
        if self.whitelist.is_empty() {
            return false;
        }

        let path_parts: Vec<&str> = path.split('.').collect();
        for pattern in &self.whitelist {
            let pattern_parts: Vec<&str> = pattern.split('.').collect();
            if match_parts(&path_parts, &pattern_parts) {
                return true;
            }
            // A pattern ending in .* also whitelists the bare prefix, so the
            // section definition itself is preserved along with its options.
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if path == prefix {
                    return true;
                }
            }
        }
        false
    }

    /// Decides whether a remote-only path (with optional value, for list
    /// elements and scalars) should be kept.
    ///
    /// Uses the whitelist when configured, otherwise falls back to the
    /// legacy section/value patterns.
    pub fn should_keep_remote_path(&self, path: &str, value: Option<&str>) -> bool {
        if !self.whitelist.is_empty() {
            return self.is_path_whitelisted(path);
        }

        // Legacy behaviour: the section name is the second dotted segment.
        let parts: Vec<&str> = path.split('.').collect();
        let section_name = if parts.len() >= 2 { parts[1] } else { parts[0] };
        if !self.is_section_allowed(section_name) {
            return false;
        }
        match value {
            Some(v) => self.is_value_allowed(v),
            None => true,
        }
    }

    /// Legacy: checks a section name against `allowed_sections`.
    ///
    /// An empty list allows nothing.
    pub fn is_section_allowed(&self, section_name: &str) -> bool {
        self.allowed_sections
            .iter()
            .any(|pattern| pattern == "*" || segment_matches(pattern, section_name))
    }

    /// Legacy: checks a value against `allowed_values`.
    ///
    /// An empty list allows every value.
    pub fn is_value_allowed(&self, value: &str) -> bool {
        if self.allowed_values.is_empty() {
            return true;
        }
        self.allowed_values
            .iter()
            .any(|pattern| pattern == "*" || segment_matches(pattern, value))
    }
}

/// Position-by-position walk of path segments against pattern segments,
/// recursing at `**` to try every suffix split.
fn match_parts(path: &[&str], pattern: &[&str]) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return path.is_empty();
    };

    match *head {
        "**" => {
            if rest.is_empty() {
                return true;
            }
            (0..=path.len()).any(|i| match_parts(&path[i..], rest))
        }
        "*" => match path.split_first() {
            Some((_, path_rest)) => match_parts(path_rest, rest),
            None => false,
        },
        literal => match path.split_first() {
            Some((segment, path_rest)) => {
                segment_matches(literal, segment) && match_parts(path_rest, rest)
            }
            None => false,
        },
    }
}

/// Filename-glob match of one segment, falling back to literal comparison
/// when the pattern is not valid glob syntax.
fn segment_matches(pattern: &str, segment: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(segment),
        Err(_) => pattern == segment,
    }
}
