//! The known UCI package table.
//!
//! Desired-state documents group sections under *logical group* keys
//! (`interfaces`, `devices`, `radios`, ...) rather than raw UCI section
//! types. This module owns the mapping in both directions: document group
//! to section type when building a tree, and section type back to group
//! when translating a device path into the whitelist pattern space.

/// UCI packages Ucible manages.
///
/// Remote packages outside this list are tolerated (skipped with a warning)
/// when observed on a device.
pub const KNOWN_PACKAGES: &[&str] = &["network", "wireless", "dhcp", "firewall", "sqm"];

/// Per-package table of `(logical_group, section_type)` pairs.
///
/// The logical group is the key used in desired-state documents and as the
/// first segment of whitelist patterns.
const GROUP_TABLE: &[(&str, &[(&str, &str)])] = &[
    ("network", &[("devices", "device"), ("interfaces", "interface")]),
    ("wireless", &[("radios", "wifi-device"), ("interfaces", "wifi-iface")]),
    ("dhcp", &[("sections", "dhcp"), ("hosts", "host")]),
    ("firewall", &[("zones", "zone"), ("forwardings", "forwarding")]),
    ("sqm", &[("queues", "queue")]),
];

/// Returns true if `package` is one of the managed packages.
pub fn is_known_package(package: &str) -> bool {
    KNOWN_PACKAGES.contains(&package)
}

/// Logical groups defined for a package, in document order.
pub fn groups_for(package: &str) -> &'static [(&'static str, &'static str)] {
    GROUP_TABLE
        .iter()
        .find(|(pkg, _)| *pkg == package)
        .map(|(_, groups)| *groups)
        .unwrap_or(&[])
}

/// Maps a document logical-group key to its UCI section type.
pub fn section_type_for_group(package: &str, group: &str) -> Option<&'static str> {
    groups_for(package)
        .iter()
        .find(|(g, _)| *g == group)
        .map(|(_, ty)| *ty)
}

/// Maps a UCI section type back to its document logical-group key.
///
/// Unmapped types fall back to the raw type string so that whitelist
/// patterns stay expressible for section types outside the table.
pub fn group_for_section_type<'a>(package: &str, section_type: &'a str) -> &'a str {
    groups_for(package)
        .iter()
        .find(|(_, ty)| *ty == section_type)
        .map(|(g, _)| *g)
        .unwrap_or(section_type)
}

/// True when the group is stored as an ordered sequence of anonymous
/// sections in documents (firewall `forwardings`).
pub fn group_is_sequence(package: &str, group: &str) -> bool {
    package == "firewall" && group == "forwardings"
}

/// True when sections under this group are emitted anonymously
/// (`@type[index]`) rather than under their document key.
pub fn group_is_anonymous(package: &str, group: &str) -> bool {
    package == "firewall" && (group == "zones" || group == "forwardings")
}
