//! Layered document loading.
//!
//! Desired state is written as YAML or JSON documents and composed in
//! layers: later documents override earlier ones with a deep-merge rule
//! (mappings merge recursively, scalars overwrite, sequences overwrite
//! entirely - an explicitly empty list clears a list). After the merge,
//! variable references are expanded:
//!
//! - `${oc.env:NAME}` / `${oc.env:NAME,default}` - environment lookup;
//! - `${dotted.path}` - reference into the merged document itself.
//!
//! The resolved mapping is then lowered into a [`ConfigTree`] using the
//! known-package table: top-level keys are packages, second-level keys are
//! logical groups (or `remote_policy`), third-level keys are sections.

use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::mapping::Entry;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::policy::RemotePolicy;
use crate::uci::packages::{
    group_for_section_type, group_is_anonymous, group_is_sequence, groups_for, is_known_package,
    section_type_for_group, KNOWN_PACKAGES,
};
use crate::uci::tree::{ConfigTree, OptionValue, SectionConfig};

/// Reserved top-level keys of fleet inventory documents. Their presence in
/// a device-config document is a structural mix-up worth a hard error.
const FLEET_KEYS: &[&str] = &["defaults", "config_layers", "devices"];

/// Maximum reference-resolution depth before a cycle is assumed.
const MAX_RESOLVE_DEPTH: usize = 16;

/// Reads one document file (YAML or JSON; YAML is a superset, so one
/// parser covers both).
pub fn read_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| Error::DocumentNotFound(path.to_path_buf()))?;
    serde_yaml::from_str(&text)
        .map_err(|e| Error::document_parse(path, e.to_string(), Some(Box::new(e))))
}

/// Deep-merges `overlay` into `base`.
///
/// Mapping keys combine recursively; every other value kind, including
/// sequences, overwrites the previous value wholesale.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.entry(key) {
                    Entry::Occupied(mut existing) => merge_values(existing.get_mut(), value),
                    Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Loads an ordered list of documents, merges them, and expands variable
/// references in the merged result.
pub fn load_documents<P: AsRef<Path>>(paths: &[P]) -> Result<Value> {
    let mut merged = Value::Mapping(Mapping::new());
    for path in paths {
        let document = read_document(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Merging document layer");
        merge_values(&mut merged, document);
    }
    interpolate(&merged)
}

/// Expands every variable reference in a value tree.
///
/// References are resolved against the tree as merged, once, after the full
/// merge is assembled.
pub fn interpolate(root: &Value) -> Result<Value> {
    resolve_value(root, root, 0)
}

fn resolve_value(value: &Value, root: &Value, depth: usize) -> Result<Value> {
    if depth > MAX_RESOLVE_DEPTH {
        return Err(Error::Document(
            "reference cycle detected during interpolation".to_string(),
        ));
    }
    match value {
        Value::String(s) => resolve_string(s, root, depth),
        Value::Mapping(map) => {
            let mut out = Mapping::new();
            for (key, val) in map {
                out.insert(key.clone(), resolve_value(val, root, depth)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for val in seq {
                out.push(resolve_value(val, root, depth)?);
            }
            Ok(Value::Sequence(out))
        }
        other => Ok(other.clone()),
    }
}

/// Expands `${...}` references in one string.
///
/// A string that is exactly one reference resolves to the referenced value
/// with its type intact; references embedded in longer strings are
/// stringified in place.
fn resolve_string(s: &str, root: &Value, depth: usize) -> Result<Value> {
    if !s.contains("${") {
        return Ok(Value::String(s.to_string()));
    }

    // Whole-string reference keeps the referenced type.
    if s.starts_with("${") && s.ends_with('}') && !s[2..s.len() - 1].contains("${") {
        let inner = &s[2..s.len() - 1];
        let resolved = resolve_reference(inner, root)?;
        return resolve_value(&resolved, root, depth + 1);
    }

    let mut out = String::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            Error::Document(format!("unterminated reference in '{}'", s))
        })?;
        let inner = &after[..end];
        let resolved = resolve_reference(inner, root)?;
        let resolved = resolve_value(&resolved, root, depth + 1)?;
        out.push_str(&stringify_scalar(&resolved, inner)?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

/// Resolves one reference body: either an environment lookup or a dotted
/// path into the merged document.
fn resolve_reference(inner: &str, root: &Value) -> Result<Value> {
    if let Some(lookup) = inner.strip_prefix("oc.env:") {
        let (name, default) = match lookup.split_once(',') {
            Some((name, default)) => (name.trim(), Some(default.trim())),
            None => (lookup.trim(), None),
        };
        return match std::env::var(name) {
            Ok(value) => Ok(Value::String(value)),
            Err(_) => match default {
                Some(default) => Ok(Value::String(default.to_string())),
                None => Err(Error::unresolved(
                    inner,
                    format!("environment variable '{}' is not set", name),
                )),
            },
        };
    }

    let mut current = root;
    for segment in inner.split('.') {
        current = match current {
            Value::Mapping(map) => map
                .get(&Value::String(segment.to_string()))
                .ok_or_else(|| Error::unresolved(inner, format!("no key '{}'", segment)))?,
            Value::Sequence(seq) => {
                let index: usize = segment.parse().map_err(|_| {
                    Error::unresolved(inner, format!("'{}' is not a sequence index", segment))
                })?;
                seq.get(index).ok_or_else(|| {
                    Error::unresolved(inner, format!("index {} out of bounds", index))
                })?
            }
            _ => {
                return Err(Error::unresolved(
                    inner,
                    format!("cannot descend into scalar at '{}'", segment),
                ))
            }
        };
    }
    Ok(current.clone())
}

fn stringify_scalar(value: &Value, reference: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::unresolved(
            reference,
            "reference inside a string must resolve to a scalar".to_string(),
        )),
    }
}

// ============================================================================
// Document -> ConfigTree
// ============================================================================

/// Loads an ordered list of documents into a [`ConfigTree`].
pub fn load_config_tree<P: AsRef<Path>>(paths: &[P]) -> Result<ConfigTree> {
    let merged = load_documents(paths)?;
    tree_from_document(&merged)
}

/// Lowers a resolved document mapping into a [`ConfigTree`].
pub fn tree_from_document(document: &Value) -> Result<ConfigTree> {
    let Value::Mapping(map) = document else {
        return Err(Error::Document(
            "document root must be a mapping of packages".to_string(),
        ));
    };

    let mut tree = ConfigTree::new();

    for (key, value) in map {
        let package = key
            .as_str()
            .ok_or_else(|| Error::Document("package keys must be strings".to_string()))?;

        if FLEET_KEYS.contains(&package) {
            return Err(Error::Document(format!(
                "'{}' is a fleet inventory key; this file is not a device configuration",
                package
            )));
        }
        if !is_known_package(package) {
            return Err(Error::Document(format!(
                "unknown package '{}' (known: {})",
                package,
                KNOWN_PACKAGES.join(", ")
            )));
        }

        let Value::Mapping(groups) = value else {
            return Err(Error::Document(format!(
                "package '{}' must be a mapping of logical groups",
                package
            )));
        };

        load_package(&mut tree, package, groups)?;
    }

    Ok(tree)
}

fn load_package(tree: &mut ConfigTree, package: &str, groups: &Mapping) -> Result<()> {
    // Independent counters per anonymous section type.
    let mut anon_index: IndexMap<&str, usize> = IndexMap::new();

    for (group_key, group_value) in groups {
        let group = group_key
            .as_str()
            .ok_or_else(|| Error::Document(format!("group keys in '{}' must be strings", package)))?;

        if group == "remote_policy" {
            let policy: RemotePolicy = serde_yaml::from_value(group_value.clone())
                .map_err(|e| Error::Document(format!("invalid remote_policy: {}", e)))?;
            tree.package_mut(package).remote_policy = Some(policy);
            continue;
        }

        let Some(section_type) = section_type_for_group(package, group) else {
            let known: Vec<&str> = groups_for(package).iter().map(|(g, _)| *g).collect();
            return Err(Error::Document(format!(
                "unknown group '{}' in package '{}' (known: {})",
                group,
                package,
                known.join(", ")
            )));
        };

        if group_is_sequence(package, group) {
            let Value::Sequence(entries) = group_value else {
                return Err(Error::Document(format!(
                    "'{}.{}' must be an ordered sequence",
                    package, group
                )));
            };
            for entry in entries {
                let index = anon_index.entry(section_type).or_insert(0);
                let name = format!("@{}[{}]", section_type, index);
                *index += 1;
                let section = section_from_value(package, group, &name, entry, None)?;
                insert_section(tree, package, name, section);
            }
        } else {
            let Value::Mapping(sections) = group_value else {
                return Err(Error::Document(format!(
                    "'{}.{}' must be a mapping of sections",
                    package, group
                )));
            };
            for (section_key, section_value) in sections {
                let doc_name = section_key.as_str().ok_or_else(|| {
                    Error::Document(format!(
                        "section names in '{}.{}' must be strings",
                        package, group
                    ))
                })?;

                // Anonymous groups (firewall zones) key sections by a
                // document name that becomes the 'name' option; the UCI
                // section itself is indexed.
                let (name, default_name) = if group_is_anonymous(package, group) {
                    let index = anon_index.entry(section_type).or_insert(0);
                    let name = format!("@{}[{}]", section_type, index);
                    *index += 1;
                    (name, Some(doc_name))
                } else {
                    (doc_name.to_string(), None)
                };

                let section =
                    section_from_value(package, group, &name, section_value, default_name)?;
                insert_section(tree, package, name, section);
            }
        }
    }
    Ok(())
}

fn insert_section(tree: &mut ConfigTree, package: &str, name: String, section: SectionConfig) {
    let pkg = tree.package_mut(package);
    let slot = pkg.add_section(name, section.section_type());
    *slot = section;
}

/// Builds one section from its document mapping.
fn section_from_value(
    package: &str,
    group: &str,
    name: &str,
    value: &Value,
    default_name: Option<&str>,
) -> Result<SectionConfig> {
    let Value::Mapping(options) = value else {
        return Err(Error::Document(format!(
            "section '{}' in '{}.{}' must be a mapping of options",
            name, package, group
        )));
    };

    let section_type = section_type_for_group(package, group).unwrap_or(group);
    let mut section = SectionConfig::new(section_type);

    // Zone names default to their document key.
    if let Some(default) = default_name {
        if !options.contains_key(&Value::String("name".to_string())) {
            section.set("name", default);
        }
    }

    for (option_key, option_value) in options {
        let option = option_key.as_str().ok_or_else(|| {
            Error::Document(format!("option names in section '{}' must be strings", name))
        })?;

        match option_value {
            Value::Null => {}
            Value::Sequence(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    list.push(scalar_from_value(item, name, option)?);
                }
                section.set(option, OptionValue::List(list));
            }
            other => {
                let scalar = scalar_from_value(other, name, option)?;
                section.set(option, OptionValue::Scalar(scalar));
            }
        }
    }
    Ok(section)
}

/// Converts one document scalar to its UCI string form.
///
/// Booleans become `"1"`/`"0"`, numbers their decimal form. Values with an
/// embedded single quote are rejected: command strings are single-quoted
/// verbatim on the device shell.
fn scalar_from_value(value: &Value, section: &str, option: &str) -> Result<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(Error::Document(format!(
                "option '{}.{}' must be a scalar or a list of scalars",
                section, option
            )))
        }
    };
    if text.contains('\'') {
        return Err(Error::Document(format!(
            "option '{}.{}' contains a single quote, which cannot be sent safely",
            section, option
        )));
    }
    Ok(text)
}

// ============================================================================
// ConfigTree -> Document (import)
// ============================================================================

/// Renders a tree back into document form, the inverse of
/// [`tree_from_document`].
///
/// Used by the import flow to save a device's live configuration as a
/// reusable desired-state document. Digit-only scalars are written as
/// integers.
pub fn document_from_tree(tree: &ConfigTree) -> Value {
    let mut root = Mapping::new();

    for package in tree.packages() {
        if package.is_empty() {
            continue;
        }
        let mut groups = Mapping::new();
        let mut zone_counter = 0usize;

        for (section_name, section) in package.sections() {
            let group = group_for_section_type(package.name(), section.section_type());

            if group_is_sequence(package.name(), group) {
                let entry = options_to_value(section);
                if let Value::Sequence(seq) = groups
                    .entry(Value::String(group.to_string()))
                    .or_insert_with(|| Value::Sequence(Vec::new()))
                {
                    seq.push(entry);
                }
            } else if group_is_anonymous(package.name(), group) {
                let key = match section.get("name") {
                    Some(OptionValue::Scalar(name)) => name.clone(),
                    _ => {
                        let key = format!("zone_{}", zone_counter);
                        zone_counter += 1;
                        key
                    }
                };
                insert_grouped(&mut groups, group, key, options_to_value(section));
            } else {
                insert_grouped(
                    &mut groups,
                    group,
                    section_name.to_string(),
                    options_to_value(section),
                );
            }
        }

        if let Some(policy) = &package.remote_policy {
            if let Ok(value) = serde_yaml::to_value(policy) {
                groups.insert(Value::String("remote_policy".to_string()), value);
            }
        }

        if !groups.is_empty() {
            root.insert(Value::String(package.name().to_string()), Value::Mapping(groups));
        }
    }

    Value::Mapping(root)
}

fn insert_grouped(groups: &mut Mapping, group: &str, key: String, value: Value) {
    if let Value::Mapping(map) = groups
        .entry(Value::String(group.to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()))
    {
        map.insert(Value::String(key), value);
    }
}

fn options_to_value(section: &SectionConfig) -> Value {
    let mut map = Mapping::new();
    for (option, value) in section.options() {
        let entry = match value {
            OptionValue::Scalar(s) => scalar_to_document_value(s),
            OptionValue::List(items) => {
                Value::Sequence(items.iter().map(|s| scalar_to_document_value(s)).collect())
            }
        };
        map.insert(Value::String(option.to_string()), entry);
    }
    Value::Mapping(map)
}

fn scalar_to_document_value(s: &str) -> Value {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = s.parse::<u64>() {
            return Value::Number(n.into());
        }
    }
    Value::String(s.to_string())
}
