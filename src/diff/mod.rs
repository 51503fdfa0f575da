//! The configuration diff engine.
//!
//! Given the desired command sequence (from a [`ConfigTree`]) and the
//! observed command sequence (parsed off the device), the diff engine
//! classifies every `(path, value)` pair into one of six buckets:
//!
//! - `to_add` - present locally, absent remotely;
//! - `to_modify` - scalar path present on both sides with different values;
//! - `to_remove` - remote-only and scheduled for deletion;
//! - `remote_only` - remote-only, kept because no removal was requested;
//! - `whitelisted` - remote-only, preserved by the package policy;
//! - `common` - identical on both sides.
//!
//! Scalar paths are compared by value; list options are compared element by
//! element, so one list path can contribute to several buckets at once.

pub mod render;

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::policy::RemotePolicy;
use crate::uci::command::{UciAction, UciCommand};
use crate::uci::packages::group_for_section_type;
use crate::uci::tree::ConfigTree;

/// What to do with remote-only state that no whitelist preserves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemovalDirective {
    /// Keep everything; remote-only paths are only reported.
    #[default]
    KeepAll,
    /// Schedule every unmanaged remote path for deletion.
    RemoveAll,
    /// Schedule deletions only within the named packages.
    Packages(Vec<String>),
}

impl RemovalDirective {
    /// True when remote-only paths in `package` should be deleted.
    pub fn should_remove(&self, package: &str) -> bool {
        match self {
            RemovalDirective::KeepAll => false,
            RemovalDirective::RemoveAll => true,
            RemovalDirective::Packages(packages) => packages.iter().any(|p| p == package),
        }
    }
}

/// The result of diffing desired state against observed state.
///
/// Treated as immutable once returned; the section-presence sets are kept
/// for the renderer's section tags and for the deletion optimiser.
#[derive(Debug, Clone, Default)]
pub struct ConfigDiff {
    /// Commands present locally but not on the device.
    pub to_add: Vec<UciCommand>,
    /// Pairs of (observed, desired) commands for scalar paths whose values differ.
    pub to_modify: Vec<(UciCommand, UciCommand)>,
    /// Remote-only commands scheduled for deletion.
    pub to_remove: Vec<UciCommand>,
    /// Remote-only commands kept because removal was not requested.
    pub remote_only: Vec<UciCommand>,
    /// Remote-only commands preserved by a whitelist.
    pub whitelisted: Vec<UciCommand>,
    /// Commands identical on both sides.
    pub common: Vec<UciCommand>,

    local_sections: IndexSet<(String, String)>,
    remote_sections: IndexSet<(String, String)>,
}

impl ConfigDiff {
    /// True when the device already matches the desired state (whitelisted
    /// and common entries do not count as differences).
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty()
            && self.to_remove.is_empty()
            && self.to_modify.is_empty()
            && self.remote_only.is_empty()
    }

    /// Number of mutations this diff implies.
    pub fn change_count(&self) -> usize {
        self.to_add.len() + self.to_modify.len() + self.to_remove.len()
    }

    /// Sections present in the desired state.
    pub fn local_sections(&self) -> &IndexSet<(String, String)> {
        &self.local_sections
    }

    /// Sections observed on the device.
    pub fn remote_sections(&self) -> &IndexSet<(String, String)> {
        &self.remote_sections
    }

    /// Translates `to_remove` into executable deletion commands, collapsing
    /// whole-section removals.
    ///
    /// A section that exists only on the remote is deleted with a single
    /// `uci delete package.section` instead of one delete per option. The
    /// collapse is skipped when any path under the section was whitelisted:
    /// deleting the section would take the preserved options with it.
    pub fn removal_commands(&self) -> Vec<UciCommand> {
        let mut by_section: IndexMap<(String, String), Vec<&UciCommand>> = IndexMap::new();
        for cmd in &self.to_remove {
            let Some(section) = cmd.section() else { continue };
            by_section
                .entry((cmd.package().to_string(), section.to_string()))
                .or_default()
                .push(cmd);
        }

        let preserved_sections: HashSet<(String, String)> = self
            .whitelisted
            .iter()
            .filter_map(|cmd| {
                cmd.section()
                    .map(|s| (cmd.package().to_string(), s.to_string()))
            })
            .collect();

        let mut out = Vec::new();
        for ((package, section), commands) in &by_section {
            let key = (package.clone(), section.clone());
            let fully_remote =
                self.remote_sections.contains(&key) && !self.local_sections.contains(&key);

            if fully_remote && !preserved_sections.contains(&key) {
                out.push(UciCommand::delete(format!("{}.{}", package, section)));
                continue;
            }

            for cmd in commands {
                match cmd.action {
                    // The bare section delete is suppressed here: options
                    // under it were whitelisted, so the section must stay.
                    UciAction::Set if cmd.depth() == 2 => {}
                    UciAction::AddList => out.push(UciCommand::del_list(
                        cmd.path.clone(),
                        cmd.value.clone().unwrap_or_default(),
                    )),
                    _ => out.push(UciCommand::delete(cmd.path.clone())),
                }
            }
        }
        out
    }
}

/// Diffs a desired-state tree against observed remote commands.
pub fn diff_tree(
    tree: &ConfigTree,
    remote: &[UciCommand],
    removal: &RemovalDirective,
) -> ConfigDiff {
    let local = tree.emit_commands();
    diff_commands(&local, remote, removal, &tree.policies())
}

/// Diffs two flat command sequences.
///
/// `policies` maps package names to their remote-preservation policies;
/// packages without an entry preserve nothing through whitelisting.
pub fn diff_commands(
    local: &[UciCommand],
    remote: &[UciCommand],
    removal: &RemovalDirective,
    policies: &IndexMap<String, RemotePolicy>,
) -> ConfigDiff {
    let mut diff = ConfigDiff::default();

    // Index both sides. Scalars map path -> command, lists map
    // path -> ordered elements, sections record presence and type.
    let local_scalars: HashMap<&str, &UciCommand> = local
        .iter()
        .filter(|c| c.action == UciAction::Set)
        .map(|c| (c.path.as_str(), c))
        .collect();
    let remote_scalars: HashMap<&str, &UciCommand> = remote
        .iter()
        .filter(|c| c.action == UciAction::Set)
        .map(|c| (c.path.as_str(), c))
        .collect();

    let mut local_lists: HashMap<&str, Vec<&str>> = HashMap::new();
    for cmd in local.iter().filter(|c| c.action == UciAction::AddList) {
        local_lists
            .entry(cmd.path.as_str())
            .or_default()
            .push(cmd.value.as_deref().unwrap_or(""));
    }
    let mut remote_lists: HashMap<&str, Vec<&str>> = HashMap::new();
    for cmd in remote.iter().filter(|c| c.action == UciAction::AddList) {
        remote_lists
            .entry(cmd.path.as_str())
            .or_default()
            .push(cmd.value.as_deref().unwrap_or(""));
    }

    let mut remote_types: HashMap<(String, String), String> = HashMap::new();
    for cmd in local {
        if cmd.is_section_definition() {
            diff.local_sections.insert((
                cmd.package().to_string(),
                cmd.section().unwrap_or_default().to_string(),
            ));
        }
    }
    for cmd in remote {
        if cmd.is_section_definition() {
            let key = (
                cmd.package().to_string(),
                cmd.section().unwrap_or_default().to_string(),
            );
            remote_types.insert(key.clone(), cmd.value.clone().unwrap_or_default());
            diff.remote_sections.insert(key);
        }
    }

    // Pass 1: desired state, in emission order.
    for cmd in local {
        match cmd.action {
            UciAction::Set => match remote_scalars.get(cmd.path.as_str()) {
                Some(remote_cmd) if remote_cmd.value == cmd.value => {
                    diff.common.push(cmd.clone());
                }
                Some(remote_cmd) => {
                    diff.to_modify.push(((*remote_cmd).clone(), cmd.clone()));
                }
                None => diff.to_add.push(cmd.clone()),
            },
            UciAction::AddList => {
                let element = cmd.value.as_deref().unwrap_or("");
                let on_remote = remote_lists
                    .get(cmd.path.as_str())
                    .is_some_and(|items| items.contains(&element));
                if on_remote {
                    diff.common.push(cmd.clone());
                } else {
                    diff.to_add.push(cmd.clone());
                }
            }
            _ => {}
        }
    }

    // Pass 2: observed state. Anything without a local counterpart is
    // remote-only and routed through whitelist, then removal intent.
    for cmd in remote {
        let remote_only = match cmd.action {
            UciAction::Set => !local_scalars.contains_key(cmd.path.as_str()),
            UciAction::AddList => {
                let element = cmd.value.as_deref().unwrap_or("");
                !local_lists
                    .get(cmd.path.as_str())
                    .is_some_and(|items| items.contains(&element))
            }
            _ => false,
        };
        if !remote_only {
            continue;
        }

        let package = cmd.package();
        // Section definitions carry the section type as their payload, which
        // is not a value in the legacy allowed_values sense.
        let value = if cmd.depth() == 2 {
            None
        } else {
            cmd.value.as_deref()
        };
        let kept = policies.get(package).is_some_and(|policy| {
            policy.should_keep_remote_path(&pattern_path(cmd, &remote_types), value)
        });

        if kept {
            diff.whitelisted.push(cmd.clone());
        } else if removal.should_remove(package) {
            diff.to_remove.push(cmd.clone());
        } else {
            diff.remote_only.push(cmd.clone());
        }
    }

    debug!(
        to_add = diff.to_add.len(),
        to_modify = diff.to_modify.len(),
        to_remove = diff.to_remove.len(),
        remote_only = diff.remote_only.len(),
        whitelisted = diff.whitelisted.len(),
        common = diff.common.len(),
        "Computed configuration diff"
    );
    diff
}

/// Translates a device path into the whitelist pattern space.
///
/// The package segment is dropped and the section is prefixed with its
/// logical-group name, resolved from the remote section type:
/// `network.lan.gateway` becomes `interfaces.lan.gateway`. Sections whose
/// type was never reported keep just `section[.option]`.
fn pattern_path(cmd: &UciCommand, remote_types: &HashMap<(String, String), String>) -> String {
    let package = cmd.package();
    let section = cmd.section().unwrap_or_default();
    let mut rel = match remote_types.get(&(package.to_string(), section.to_string())) {
        Some(section_type) => format!(
            "{}.{}",
            group_for_section_type(package, section_type),
            section
        ),
        None => section.to_string(),
    };
    if let Some(option) = cmd.option() {
        rel.push('.');
        rel.push_str(option);
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_policies() -> IndexMap<String, RemotePolicy> {
        IndexMap::new()
    }

    #[test]
    fn test_identical_configs_are_common() {
        let commands = vec![
            UciCommand::set("network.lan", "interface"),
            UciCommand::set("network.lan.proto", "static"),
        ];
        let diff = diff_commands(&commands, &commands, &RemovalDirective::KeepAll, &no_policies());
        assert!(diff.is_empty());
        assert_eq!(diff.common.len(), 2);
    }

    #[test]
    fn test_scalar_modify_appears_once() {
        let local = vec![UciCommand::set("network.lan.ipaddr", "192.168.1.1")];
        let remote = vec![UciCommand::set("network.lan.ipaddr", "192.168.2.1")];
        let diff = diff_commands(&local, &remote, &RemovalDirective::KeepAll, &no_policies());
        assert_eq!(diff.to_modify.len(), 1);
        assert!(diff.to_add.is_empty());
        assert!(diff.to_remove.is_empty());
        assert!(diff.remote_only.is_empty());
        assert!(diff.common.is_empty());
        let (old, new) = &diff.to_modify[0];
        assert_eq!(old.value.as_deref(), Some("192.168.2.1"));
        assert_eq!(new.value.as_deref(), Some("192.168.1.1"));
    }

    #[test]
    fn test_removal_directive_scoping() {
        let directive = RemovalDirective::Packages(vec!["wireless".into()]);
        assert!(directive.should_remove("wireless"));
        assert!(!directive.should_remove("network"));
        assert!(RemovalDirective::RemoveAll.should_remove("network"));
        assert!(!RemovalDirective::KeepAll.should_remove("network"));
    }

    #[test]
    fn test_whole_section_removal_collapses() {
        let remote = vec![
            UciCommand::set("wireless.old_wifi", "wifi-iface"),
            UciCommand::set("wireless.old_wifi.device", "radio0"),
            UciCommand::set("wireless.old_wifi.ssid", "Old"),
            UciCommand::set("wireless.old_wifi.encryption", "psk2"),
        ];
        let diff = diff_commands(&[], &remote, &RemovalDirective::RemoveAll, &no_policies());
        assert_eq!(diff.to_remove.len(), 4);

        let removals = diff.removal_commands();
        assert_eq!(removals, vec![UciCommand::delete("wireless.old_wifi")]);
    }

    #[test]
    fn test_partial_section_removal_stays_granular() {
        let local = vec![
            UciCommand::set("network.lan", "interface"),
            UciCommand::set("network.lan.proto", "static"),
        ];
        let remote = vec![
            UciCommand::set("network.lan", "interface"),
            UciCommand::set("network.lan.proto", "static"),
            UciCommand::set("network.lan.gateway", "192.168.1.254"),
        ];
        let diff = diff_commands(&local, &remote, &RemovalDirective::RemoveAll, &no_policies());
        assert_eq!(
            diff.removal_commands(),
            vec![UciCommand::delete("network.lan.gateway")]
        );
    }

    #[test]
    fn test_collapse_guarded_by_whitelisted_options() {
        let mut policies = IndexMap::new();
        policies.insert(
            "network".to_string(),
            RemotePolicy::with_whitelist(["interfaces.guest.proto"]),
        );
        let remote = vec![
            UciCommand::set("network.guest", "interface"),
            UciCommand::set("network.guest.proto", "static"),
            UciCommand::set("network.guest.gateway", "192.168.100.254"),
        ];
        let diff = diff_commands(&[], &remote, &RemovalDirective::RemoveAll, &policies);

        let whitelisted: Vec<&str> = diff.whitelisted.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(whitelisted, vec!["network.guest.proto"]);

        // No whole-section delete: the preserved option must survive.
        let removals = diff.removal_commands();
        assert_eq!(
            removals,
            vec![UciCommand::delete("network.guest.gateway")]
        );
    }
}
