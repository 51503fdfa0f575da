//! In-memory desired state.
//!
//! A [`ConfigTree`] holds packages, each package an ordered set of sections,
//! each section an ordered set of scalar or list options. The tree is built
//! either programmatically or by the layered document loader, and its only
//! job afterwards is to emit a deterministic [`UciCommand`] sequence for
//! diffing and apply.

use indexmap::IndexMap;

use super::command::{UciAction, UciCommand};
use crate::policy::RemotePolicy;

/// An option value: a single scalar or an ordered list of scalars.
///
/// Booleans render as `"1"`/`"0"`, integers as decimal strings; the on-device
/// database only knows strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// A single scalar value.
    Scalar(String),
    /// An ordered list of scalar values.
    List(Vec<String>),
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Scalar(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Scalar(v)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Scalar(if v { "1" } else { "0" }.to_string())
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Scalar(v.to_string())
    }
}

impl From<u64> for OptionValue {
    fn from(v: u64) -> Self {
        OptionValue::Scalar(v.to_string())
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Scalar(v.to_string())
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(v: Vec<String>) -> Self {
        OptionValue::List(v)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(v: Vec<&str>) -> Self {
        OptionValue::List(v.into_iter().map(String::from).collect())
    }
}

/// A configuration section: a typed block of options.
///
/// Section names are either plain identifiers or the anonymous form
/// `@<type>[<index>]` used by packages like firewall where ordering within
/// a type is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionConfig {
    section_type: String,
    options: IndexMap<String, OptionValue>,
}

impl SectionConfig {
    /// Creates an empty section of the given type.
    pub fn new(section_type: impl Into<String>) -> Self {
        Self {
            section_type: section_type.into(),
            options: IndexMap::new(),
        }
    }

    /// The UCI section type (`interface`, `wifi-device`, `zone`, ...).
    pub fn section_type(&self) -> &str {
        &self.section_type
    }

    /// Sets an option, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> &mut Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Appends one element to a list option, creating the list if needed.
    pub fn push_list(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let entry = self
            .options
            .entry(name.into())
            .or_insert_with(|| OptionValue::List(Vec::new()));
        match entry {
            OptionValue::List(items) => items.push(value.into()),
            // A scalar under the same name is ill-formed; the last writer wins.
            other => *other = OptionValue::List(vec![value.into()]),
        }
        self
    }

    /// Looks up an option by name.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    /// Iterates options in insertion order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of options in this section.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// True if the section carries no options.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// One UCI package within a [`ConfigTree`].
#[derive(Debug, Clone, Default)]
pub struct PackageConfig {
    name: String,
    sections: IndexMap<String, SectionConfig>,
    /// Policy deciding which remote-only paths are preserved.
    pub remote_policy: Option<RemotePolicy>,
}

impl PackageConfig {
    /// Creates an empty package.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: IndexMap::new(),
            remote_policy: None,
        }
    }

    /// The package name (`network`, `wireless`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a section and returns a handle for populating it. Re-adding an
    /// existing name replaces the section.
    pub fn add_section(
        &mut self,
        name: impl Into<String>,
        section_type: impl Into<String>,
    ) -> &mut SectionConfig {
        let name = name.into();
        self.sections
            .insert(name.clone(), SectionConfig::new(section_type));
        self.sections.get_mut(&name).unwrap()
    }

    /// Looks up a section by name.
    pub fn section(&self, name: &str) -> Option<&SectionConfig> {
        self.sections.get(name)
    }

    /// Mutable section lookup.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut SectionConfig> {
        self.sections.get_mut(name)
    }

    /// Iterates sections in insertion order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &SectionConfig)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of sections in this package.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// True if the package carries no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Number of sections of a given type.
    pub fn count_of_type(&self, section_type: &str) -> usize {
        self.sections
            .values()
            .filter(|s| s.section_type() == section_type)
            .count()
    }

    fn emit_into(&self, out: &mut Vec<UciCommand>) {
        for (section_name, section) in &self.sections {
            let base = format!("{}.{}", self.name, section_name);
            out.push(UciCommand::set(&base, section.section_type()));
            for (option, value) in section.options() {
                let path = format!("{}.{}", base, option);
                match value {
                    OptionValue::Scalar(v) => out.push(UciCommand::set(&path, v.as_str())),
                    OptionValue::List(items) => {
                        for item in items {
                            out.push(UciCommand::add_list(&path, item.as_str()));
                        }
                    }
                }
            }
        }
    }
}

/// The complete desired state for one device.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    packages: IndexMap<String, PackageConfig>,
}

impl ConfigTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the package, creating it empty if absent.
    pub fn package_mut(&mut self, name: &str) -> &mut PackageConfig {
        self.packages
            .entry(name.to_string())
            .or_insert_with(|| PackageConfig::new(name))
    }

    /// Looks up a package by name.
    pub fn package(&self, name: &str) -> Option<&PackageConfig> {
        self.packages.get(name)
    }

    /// Iterates packages in insertion order.
    pub fn packages(&self) -> impl Iterator<Item = &PackageConfig> {
        self.packages.values()
    }

    /// True if no package carries any section.
    pub fn is_empty(&self) -> bool {
        self.packages.values().all(|p| p.is_empty())
    }

    /// Emits the full ordered command sequence for this tree.
    ///
    /// For each section, the section-definition `set` precedes every option
    /// command; scalar options emit in insertion order and list options emit
    /// one `add_list` per element in element order. The output is stable
    /// across runs for identical input.
    pub fn emit_commands(&self) -> Vec<UciCommand> {
        let mut out = Vec::new();
        for package in self.packages.values() {
            package.emit_into(&mut out);
        }
        out
    }

    /// Remote-preservation policies per package, for the diff engine.
    pub fn policies(&self) -> IndexMap<String, RemotePolicy> {
        self.packages
            .iter()
            .filter_map(|(name, pkg)| {
                pkg.remote_policy
                    .as_ref()
                    .map(|policy| (name.clone(), policy.clone()))
            })
            .collect()
    }

    /// Rebuilds a tree from a flat command sequence.
    ///
    /// The sequence must be in emission order (section definitions before
    /// their options), which both on-device parsers guarantee. Option
    /// commands for unknown sections are dropped.
    pub fn from_commands(commands: &[UciCommand]) -> Self {
        let mut tree = Self::new();
        for cmd in commands {
            match (cmd.action, cmd.depth()) {
                (UciAction::Set, 2) => {
                    let package = cmd.package().to_string();
                    let section = cmd.section().unwrap_or_default().to_string();
                    tree.package_mut(&package)
                        .add_section(section, cmd.value.as_deref().unwrap_or(""));
                }
                (UciAction::Set, 3) => {
                    let package = cmd.package().to_string();
                    let section = cmd.section().unwrap_or_default().to_string();
                    let option = cmd.option().unwrap_or_default().to_string();
                    if let Some(sec) = tree.package_mut(&package).section_mut(&section) {
                        sec.set(option, cmd.value.clone().unwrap_or_default());
                    }
                }
                (UciAction::AddList, 3) => {
                    let package = cmd.package().to_string();
                    let section = cmd.section().unwrap_or_default().to_string();
                    let option = cmd.option().unwrap_or_default().to_string();
                    if let Some(sec) = tree.package_mut(&package).section_mut(&section) {
                        sec.push_list(option, cmd.value.clone().unwrap_or_default());
                    }
                }
                _ => {}
            }
        }
        tree
    }
}
