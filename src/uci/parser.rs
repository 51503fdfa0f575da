//! Parsers for on-device configuration text.
//!
//! Devices report their state in one of two text forms. The *export form*
//! is one dotted assignment per line:
//!
//! ```text
//! network.lan=interface
//! network.lan.proto='static'
//! ```
//!
//! The *show form* is block structured:
//!
//! ```text
//! config interface 'lan'
//!     option proto 'static'
//!     list ipaddr '127.0.0.1/8'
//! ```
//!
//! Both parsers produce a flat [`UciCommand`] sequence that, replayed on an
//! empty tree, reproduces the observed state. Which form a device speaks is
//! detected heuristically per package.

use std::collections::HashMap;

use tracing::trace;

use super::command::UciCommand;
use crate::error::{Error, Result};

/// The two on-device text formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFormat {
    /// Dotted `package.section.option='value'` lines.
    Export,
    /// `config` / `option` / `list` blocks.
    Show,
}

/// Detects which format a configuration dump is in.
///
/// The presence of a `config ` block header or a tab-indented `option `
/// line selects the show form; anything else is treated as export form.
pub fn detect_format(text: &str) -> RemoteFormat {
    if text.contains("config ") || text.contains("\toption ") {
        RemoteFormat::Show
    } else {
        RemoteFormat::Export
    }
}

/// Parses a configuration dump in whichever format it is in.
///
/// Empty or whitespace-only input yields an empty command sequence.
pub fn parse_remote_config(package: &str, text: &str) -> Result<Vec<UciCommand>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match detect_format(text) {
        RemoteFormat::Show => parse_show_form(package, text),
        RemoteFormat::Export => parse_export_form(package, text),
    }
}

/// Parses the export form: one `path=value` assignment per line.
///
/// Quotes around values may be single, double, or absent. Comment lines
/// (`#`) and blank lines are ignored. Each assignment emits one `set`.
pub fn parse_export_form(package: &str, text: &str) -> Result<Vec<UciCommand>> {
    let mut commands = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("package ") {
            continue;
        }

        let (path, raw_value) = line.split_once('=').ok_or_else(|| {
            Error::remote_parse(package, format!("expected 'path=value', got '{}'", line))
        })?;
        let path = path.trim();
        let value = strip_quotes(raw_value.trim());

        match path.split('.').count() {
            2 | 3 => commands.push(UciCommand::set(path, value)),
            depth => {
                return Err(Error::remote_parse(
                    package,
                    format!("path '{}' has {} segments, expected 2 or 3", path, depth),
                ));
            }
        }
    }

    trace!(package = %package, commands = commands.len(), "Parsed export form");
    Ok(commands)
}

/// Parses the show form: `config` section headers with indented `option`
/// and `list` lines.
///
/// Anonymous section headers (`config <type>` with no name) are assigned
/// generated names `@<type>[<index>]`, indexed in appearance order within
/// their type.
pub fn parse_show_form(package: &str, text: &str) -> Result<Vec<UciCommand>> {
    let mut commands = Vec::new();
    let mut current_section: Option<String> = None;
    let mut anon_counters: HashMap<String, usize> = HashMap::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("package ") {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("config ") {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let section_type = strip_quotes(parts.next().unwrap_or("")).to_string();
            if section_type.is_empty() {
                return Err(Error::remote_parse(package, "config header without a type"));
            }
            let name = match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
                Some(quoted) => strip_quotes(quoted).to_string(),
                None => {
                    let counter = anon_counters.entry(section_type.clone()).or_insert(0);
                    let name = format!("@{}[{}]", section_type, counter);
                    *counter += 1;
                    name
                }
            };
            commands.push(UciCommand::set(
                format!("{}.{}", package, name),
                section_type,
            ));
            current_section = Some(name);
        } else if let Some(rest) = trimmed.strip_prefix("option ") {
            let section = current_section.as_deref().ok_or_else(|| {
                Error::remote_parse(package, "option line outside of a config block")
            })?;
            let (name, value) = split_name_value(rest);
            commands.push(UciCommand::set(
                format!("{}.{}.{}", package, section, name),
                value,
            ));
        } else if let Some(rest) = trimmed.strip_prefix("list ") {
            let section = current_section.as_deref().ok_or_else(|| {
                Error::remote_parse(package, "list line outside of a config block")
            })?;
            let (name, value) = split_name_value(rest);
            commands.push(UciCommand::add_list(
                format!("{}.{}.{}", package, section, name),
                value,
            ));
        } else {
            return Err(Error::remote_parse(
                package,
                format!("unrecognised line '{}'", trimmed),
            ));
        }
    }

    trace!(package = %package, commands = commands.len(), "Parsed show form");
    Ok(commands)
}

/// Splits an `option`/`list` payload into name and (unquoted) value.
fn split_name_value(rest: &str) -> (String, String) {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = strip_quotes(parts.next().unwrap_or("")).to_string();
    let value = strip_quotes(parts.next().unwrap_or("").trim()).to_string();
    (name, value)
}

/// Removes one layer of matching surrounding quotes.
fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return &s[1..s.len() - 1];
        }
    }
    s
}
