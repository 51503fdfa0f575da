//! Textual diff views.
//!
//! Two presentations of a [`ConfigDiff`]: a flat list of command blocks and
//! a tree grouped by package and section. Both mask sensitive values and
//! close with a summary footer. Whitelisted entries are never rendered,
//! they only contribute to the summary count - the output stays focused on
//! what will actually change.

use std::collections::BTreeMap;

use colored::Colorize;

use super::ConfigDiff;
use crate::uci::command::UciCommand;

/// Diff glyphs, coloured or plain depending on the `color` flag.
struct Glyphs {
    color: bool,
}

impl Glyphs {
    fn new(color: bool) -> Self {
        Self { color }
    }

    fn add(&self) -> String {
        self.paint_green("+")
    }

    fn remove(&self) -> String {
        self.paint_red("-")
    }

    fn modify(&self) -> String {
        if self.color {
            "~".yellow().to_string()
        } else {
            "~".to_string()
        }
    }

    fn remote(&self) -> String {
        if self.color {
            "*".cyan().to_string()
        } else {
            "*".to_string()
        }
    }

    fn bold(&self, s: &str) -> String {
        if self.color {
            s.bold().to_string()
        } else {
            s.to_string()
        }
    }

    fn dim(&self, s: &str) -> String {
        if self.color {
            s.dimmed().to_string()
        } else {
            s.to_string()
        }
    }

    fn paint_green(&self, s: &str) -> String {
        if self.color {
            s.green().to_string()
        } else {
            s.to_string()
        }
    }

    fn paint_red(&self, s: &str) -> String {
        if self.color {
            s.red().to_string()
        } else {
            s.to_string()
        }
    }
}

/// Renders the flat view: sequential command blocks plus a summary footer.
pub fn render_flat(diff: &ConfigDiff, color: bool) -> String {
    if diff.is_empty() {
        return "No differences found.".to_string();
    }

    let glyphs = Glyphs::new(color);
    let mut lines: Vec<String> = Vec::new();

    if !diff.to_add.is_empty() {
        lines.push("Commands to add:".to_string());
        for cmd in &diff.to_add {
            lines.push(format!("  {} {}", glyphs.add(), cmd.to_display_string()));
        }
    }

    if !diff.to_modify.is_empty() {
        lines.push("\nCommands to modify:".to_string());
        for (old, new) in &diff.to_modify {
            lines.push(format!("  {} {}", glyphs.remove(), old.to_display_string()));
            lines.push(format!("  {} {}", glyphs.add(), new.to_display_string()));
        }
    }

    if !diff.to_remove.is_empty() {
        lines.push("\nCommands to remove:".to_string());
        for cmd in &diff.to_remove {
            lines.push(format!("  {} {}", glyphs.remove(), cmd.to_display_string()));
        }
    }

    if !diff.remote_only.is_empty() {
        lines.push("\nRemote-only settings (not managed by config):".to_string());
        for cmd in &diff.remote_only {
            lines.push(format!("  {} {}", glyphs.remote(), cmd.to_display_string()));
        }
    }

    lines.push(String::new());
    lines.push(summary_line(diff, &glyphs));
    lines.join("\n")
}

/// One diff entry attached to a section node in the tree view.
enum TreeEntry<'a> {
    Add(&'a UciCommand),
    Remove(&'a UciCommand),
    Modify(&'a UciCommand, &'a UciCommand),
    RemoteOnly(&'a UciCommand),
}

/// Renders the tree view: packages, then sections with presence tags, then
/// per-entry glyph lines.
pub fn render_tree(diff: &ConfigDiff, color: bool) -> String {
    if diff.is_empty() {
        return "No differences found.".to_string();
    }

    let glyphs = Glyphs::new(color);

    // package -> section -> entries, sorted for stable output.
    let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<TreeEntry>>> = BTreeMap::new();

    fn attach<'a>(
        grouped: &mut BTreeMap<&'a str, BTreeMap<&'a str, Vec<TreeEntry<'a>>>>,
        cmd: &'a UciCommand,
        entry: TreeEntry<'a>,
    ) {
        if let Some(section) = cmd.section() {
            grouped
                .entry(cmd.package())
                .or_default()
                .entry(section)
                .or_default()
                .push(entry);
        }
    }

    for cmd in &diff.to_add {
        attach(&mut grouped, cmd, TreeEntry::Add(cmd));
    }
    for cmd in &diff.to_remove {
        attach(&mut grouped, cmd, TreeEntry::Remove(cmd));
    }
    for (old, new) in &diff.to_modify {
        attach(&mut grouped, new, TreeEntry::Modify(old, new));
    }
    for cmd in &diff.remote_only {
        attach(&mut grouped, cmd, TreeEntry::RemoteOnly(cmd));
    }

    let mut lines: Vec<String> = Vec::new();
    for (package, sections) in &grouped {
        lines.push(format!("\n{}", glyphs.bold(&format!("{}/", package))));

        let count = sections.len();
        for (i, (section, entries)) in sections.iter().enumerate() {
            let last = i == count - 1;
            let branch = if last { "└── " } else { "├── " };
            let indent = if last { "    " } else { "│   " };

            let key = (package.to_string(), section.to_string());
            let tag = match (
                diff.local_sections().contains(&key),
                diff.remote_sections().contains(&key),
            ) {
                (true, false) => format!(" {}", glyphs.dim("(config-only)")),
                (false, true) => format!(" {}", glyphs.dim("(remote-only)")),
                _ => String::new(),
            };
            lines.push(format!("{}{}{}", branch, section, tag));

            for entry in entries {
                match entry {
                    TreeEntry::Add(cmd) => lines.push(format!(
                        "{}  {} {} = {}",
                        indent,
                        glyphs.add(),
                        entry_label(cmd),
                        cmd.display_value()
                    )),
                    TreeEntry::Remove(cmd) => lines.push(format!(
                        "{}  {} {} = {}",
                        indent,
                        glyphs.remove(),
                        entry_label(cmd),
                        cmd.display_value()
                    )),
                    TreeEntry::Modify(old, new) => {
                        lines.push(format!(
                            "{}  {} {}",
                            indent,
                            glyphs.modify(),
                            entry_label(new)
                        ));
                        lines.push(format!(
                            "{}    {} {}",
                            indent,
                            glyphs.remove(),
                            old.display_value()
                        ));
                        lines.push(format!(
                            "{}    {} {}",
                            indent,
                            glyphs.add(),
                            new.display_value()
                        ));
                    }
                    TreeEntry::RemoteOnly(cmd) => lines.push(format!(
                        "{}  {} {} = {} {}",
                        indent,
                        glyphs.remote(),
                        entry_label(cmd),
                        cmd.display_value(),
                        glyphs.dim("(remote-only)")
                    )),
                }
            }
        }
    }

    lines.push(String::new());
    lines.push(summary_line(diff, &glyphs));
    lines.join("\n")
}

/// Option name for a three-segment path, full path for section definitions.
fn entry_label(cmd: &UciCommand) -> String {
    match cmd.option() {
        Some(option) => option.to_string(),
        None => cmd.path.clone(),
    }
}

fn summary_line(diff: &ConfigDiff, glyphs: &Glyphs) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !diff.to_add.is_empty() {
        parts.push(format!("{}{} to add", glyphs.add(), diff.to_add.len()));
    }
    if !diff.to_modify.is_empty() {
        parts.push(format!("{}{} to modify", glyphs.modify(), diff.to_modify.len()));
    }
    if !diff.to_remove.is_empty() {
        parts.push(format!("{}{} to remove", glyphs.remove(), diff.to_remove.len()));
    }
    if !diff.remote_only.is_empty() {
        parts.push(format!("{}{} remote-only", glyphs.remote(), diff.remote_only.len()));
    }
    if !diff.whitelisted.is_empty() {
        parts.push(format!("{} whitelisted", diff.whitelisted.len()));
    }
    if !diff.common.is_empty() {
        parts.push(format!("{} in common", diff.common.len()));
    }
    format!("{} {}", glyphs.bold("Summary:"), parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{diff_commands, RemovalDirective};
    use indexmap::IndexMap;

    fn sample_diff() -> ConfigDiff {
        let local = vec![
            UciCommand::set("network.lan", "interface"),
            UciCommand::set("network.lan.proto", "static"),
            UciCommand::set("network.lan.ipaddr", "192.168.1.1"),
        ];
        let remote = vec![
            UciCommand::set("network.lan", "interface"),
            UciCommand::set("network.lan.proto", "static"),
            UciCommand::set("network.lan.ipaddr", "192.168.2.1"),
            UciCommand::set("network.guest", "interface"),
            UciCommand::set("network.guest.proto", "dhcp"),
        ];
        diff_commands(&local, &remote, &RemovalDirective::KeepAll, &IndexMap::new())
    }

    #[test]
    fn test_flat_view_structure() {
        let text = render_flat(&sample_diff(), false);
        assert!(text.contains("Commands to modify:"));
        assert!(text.contains("- uci set network.lan.ipaddr='192.168.2.1'"));
        assert!(text.contains("+ uci set network.lan.ipaddr='192.168.1.1'"));
        assert!(text.contains("Remote-only settings (not managed by config):"));
        assert!(text.contains("Summary:"));
        assert!(text.contains("2 in common"));
    }

    #[test]
    fn test_tree_view_tags_remote_only_sections() {
        let text = render_tree(&sample_diff(), false);
        assert!(text.contains("network/"));
        assert!(text.contains("guest (remote-only)"));
        assert!(text.contains("~ ipaddr"));
    }

    #[test]
    fn test_empty_diff_renders_placeholder() {
        let diff = ConfigDiff::default();
        assert_eq!(render_flat(&diff, false), "No differences found.");
        assert_eq!(render_tree(&diff, true), "No differences found.");
    }

    #[test]
    fn test_whitelisted_not_rendered_but_counted() {
        let mut diff = sample_diff();
        diff.whitelisted
            .push(UciCommand::set("network.guest.gateway", "192.168.100.254"));
        let text = render_flat(&diff, false);
        assert!(!text.contains("gateway"));
        assert!(text.contains("1 whitelisted"));
    }

    #[test]
    fn test_masked_values_in_output() {
        let mut diff = ConfigDiff::default();
        diff.to_add
            .push(UciCommand::set("wireless.w0.key", "MySecret123"));
        let text = render_flat(&diff, false);
        assert!(text.contains("MyS********"));
        assert!(!text.contains("MySecret123"));
    }
}
