//! Single-device subcommand implementations.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;
use is_terminal::IsTerminal;

use super::ConnectArgs;
use crate::connection::{SshTransportFactory, TransportFactory};
use crate::diff::render::{render_flat, render_tree};
use crate::diff::{ConfigDiff, RemovalDirective};
use crate::error::Result;
use crate::loader::{document_from_tree, load_config_tree};
use crate::reconcile::{mutated_packages, service_reloads, ApplyOptions, Reconciler};
use crate::uci::packages::{groups_for, KNOWN_PACKAGES};
use crate::uci::parser::parse_remote_config;
use crate::uci::tree::ConfigTree;

/// Arguments for the preview command.
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Path to a YAML or JSON configuration file
    pub config_file: PathBuf,

    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Additional configuration layers merged over the base file, in order
    #[arg(long = "overlay", value_name = "FILE")]
    pub overlays: Vec<PathBuf>,

    /// Show UCI commands that would be executed
    #[arg(long)]
    pub show_commands: bool,

    /// Show the diff as a linear list instead of a tree
    #[arg(long)]
    pub linear: bool,
}

/// Arguments for the apply command.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to a YAML or JSON configuration file
    pub config_file: PathBuf,

    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Additional configuration layers merged over the base file, in order
    #[arg(long = "overlay", value_name = "FILE")]
    pub overlays: Vec<PathBuf>,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Show UCI commands that would be executed
    #[arg(long)]
    pub show_commands: bool,

    /// Don't commit changes after applying
    #[arg(long)]
    pub no_commit: bool,

    /// Don't reload services after applying
    #[arg(long)]
    pub no_reload: bool,

    /// Remove settings on the device that are not in the config (dangerous!)
    #[arg(long)]
    pub remove_unmanaged: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to a YAML or JSON configuration file
    pub config_file: PathBuf,

    /// Additional configuration layers merged over the base file, in order
    #[arg(long = "overlay", value_name = "FILE")]
    pub overlays: Vec<PathBuf>,
}

/// Arguments for the commands command.
#[derive(Args, Debug)]
pub struct CommandsArgs {
    /// Path to a YAML or JSON configuration file
    pub config_file: PathBuf,

    /// Additional configuration layers merged over the base file, in order
    #[arg(long = "overlay", value_name = "FILE")]
    pub overlays: Vec<PathBuf>,

    /// Leave out the trailing `uci commit`
    #[arg(long)]
    pub no_commit: bool,

    /// Leave out the trailing service reloads
    #[arg(long)]
    pub no_reload: bool,
}

/// Arguments for the import command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Where to save the configuration (.yaml or .json)
    pub output_file: PathBuf,

    /// Output format (auto-detected from the file extension by default)
    #[arg(long, value_parser = ["yaml", "json"])]
    pub format: Option<String>,

    /// Comma-separated list of UCI packages to import
    #[arg(long, default_value = "network,wireless,dhcp,firewall,sqm")]
    pub packages: String,
}

/// Whether output should be colored, combining the flag with tty detection.
pub fn use_color(no_color: bool) -> bool {
    !no_color && std::io::stdout().is_terminal()
}

/// Collects the base config plus overlays into one ordered layer list.
fn layer_list(config_file: &PathBuf, overlays: &[PathBuf]) -> Vec<PathBuf> {
    let mut layers = vec![config_file.clone()];
    layers.extend(overlays.iter().cloned());
    layers
}

/// Formats the executable command plan of a diff, masked for display.
pub fn format_commands(diff: &ConfigDiff, show_remote_only: bool) -> String {
    let mut lines: Vec<String> = Vec::new();

    if !diff.to_add.is_empty() {
        lines.push("# Commands to add:".to_string());
        for cmd in &diff.to_add {
            lines.push(cmd.to_display_string());
        }
    }

    if !diff.to_modify.is_empty() {
        lines.push("\n# Commands to modify (new values):".to_string());
        for (old, new) in &diff.to_modify {
            lines.push(format!("# was: {}", old.to_display_string()));
            lines.push(new.to_display_string());
        }
    }

    let removals = diff.removal_commands();
    if !removals.is_empty() {
        lines.push("\n# Commands to remove:".to_string());
        for cmd in &removals {
            lines.push(cmd.to_display_string());
        }
    }

    if show_remote_only && !diff.remote_only.is_empty() {
        lines.push("\n# Remote-only settings (not in config):".to_string());
        for cmd in &diff.remote_only {
            lines.push(format!("# {}", cmd.to_display_string()));
        }
    }

    lines.join("\n")
}

impl PreviewArgs {
    /// Executes `preview`.
    pub async fn execute(&self, no_color: bool) -> Result<i32> {
        let tree = load_config_tree(&layer_list(&self.config_file, &self.overlays))?;

        println!("Connecting to {}...", self.connect.target);
        let factory = SshTransportFactory;
        let transport = factory
            .open(&self.connect.target, &self.connect.connect_options())
            .await?;

        let mut reconciler = Reconciler::new(transport.as_ref());
        let diff = reconciler.diff(&tree, &RemovalDirective::KeepAll).await;
        let _ = transport.disconnect().await;
        let diff = diff?;

        if diff.is_empty() {
            println!("\nConfiguration is in sync - no differences found.");
            return Ok(0);
        }

        let color = use_color(no_color);
        println!();
        if self.linear {
            println!("{}", render_flat(&diff, color));
        } else {
            println!("{}", render_tree(&diff, color));
        }

        if self.show_commands {
            println!("\n{}", "=".repeat(60));
            println!("UCI Commands:");
            println!("{}", "=".repeat(60));
            println!("{}", format_commands(&diff, true));
        }

        Ok(0)
    }
}

impl ApplyArgs {
    /// Executes `apply`.
    pub async fn execute(&self, no_color: bool) -> Result<i32> {
        let tree = load_config_tree(&layer_list(&self.config_file, &self.overlays))?;
        let removal = if self.remove_unmanaged {
            RemovalDirective::RemoveAll
        } else {
            RemovalDirective::KeepAll
        };

        println!("Connecting to {}...", self.connect.target);
        let factory = SshTransportFactory;
        let transport = factory
            .open(&self.connect.target, &self.connect.connect_options())
            .await?;

        let result = self
            .run_on(transport.as_ref(), &tree, removal, no_color)
            .await;
        let _ = transport.disconnect().await;
        result
    }

    async fn run_on(
        &self,
        transport: &dyn crate::connection::Transport,
        tree: &ConfigTree,
        removal: RemovalDirective,
        no_color: bool,
    ) -> Result<i32> {
        let mut reconciler = Reconciler::new(transport);
        let diff = reconciler.diff(tree, &removal).await?;

        if diff.is_empty() {
            println!("\nConfiguration is already in sync - nothing to apply.");
            return Ok(0);
        }

        let color = use_color(no_color);
        println!();
        println!("{}", render_tree(&diff, color));

        if self.show_commands {
            println!("\n{}", "=".repeat(60));
            println!("UCI Commands to execute:");
            println!("{}", "=".repeat(60));
            println!("{}", format_commands(&diff, false));
        }

        if self.dry_run {
            println!("\n[Dry run mode - no changes made]");
            if !self.no_commit {
                println!("Would run: uci commit");
            }
            if !self.no_reload {
                let plan = crate::reconcile::plan_commands(&diff);
                for reload in service_reloads(&mutated_packages(&plan)) {
                    println!("Would run: {}", reload);
                }
            }
            return Ok(0);
        }

        if !self.yes {
            println!();
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Apply {} changes to {}?",
                    diff.change_count(),
                    self.connect.target
                ))
                .default(false)
                .interact()
                .unwrap_or(false);
            if !confirmed {
                println!("Aborted.");
                return Ok(1);
            }
        }

        let options = ApplyOptions {
            dry_run: false,
            auto_commit: !self.no_commit,
            auto_reload: !self.no_reload,
            removal,
        };

        println!();
        reconciler.apply(tree, &options, None).await?;
        println!("\n{}", "Configuration applied successfully!".green());
        Ok(0)
    }
}

impl ValidateArgs {
    /// Executes `validate`.
    pub fn execute(&self) -> Result<i32> {
        let tree = load_config_tree(&layer_list(&self.config_file, &self.overlays))?;
        let commands = tree.emit_commands();

        println!("Configuration is valid!");
        for package_name in KNOWN_PACKAGES {
            let Some(package) = tree.package(package_name) else {
                continue;
            };
            if package.is_empty() {
                continue;
            }
            for (group, section_type) in groups_for(package_name) {
                let count = package.count_of_type(section_type);
                if count > 0 {
                    println!("  - {} {}: {}", package_name, group, count);
                }
            }
        }
        println!("  - Total UCI commands: {}", commands.len());
        Ok(0)
    }
}

impl CommandsArgs {
    /// Executes `commands`: the full sequence as a shell script.
    pub fn execute(&self) -> Result<i32> {
        let tree = load_config_tree(&layer_list(&self.config_file, &self.overlays))?;
        let commands = tree.emit_commands();

        println!("#!/bin/sh");
        println!();
        for cmd in &commands {
            println!("{}", cmd.to_uci_string());
        }
        if !self.no_commit {
            println!();
            println!("uci commit");
        }
        if !self.no_reload {
            for reload in service_reloads(&mutated_packages(&commands)) {
                println!("{}", reload);
            }
        }
        Ok(0)
    }
}

impl ImportArgs {
    /// Executes `import`: read the device's live configuration and save it
    /// as a desired-state document.
    pub async fn execute(&self) -> Result<i32> {
        let format = match &self.format {
            Some(format) => format.clone(),
            None => {
                if self.output_file.extension().is_some_and(|e| e == "json") {
                    "json".to_string()
                } else {
                    "yaml".to_string()
                }
            }
        };

        println!("Connecting to {}...", self.connect.target);
        let factory = SshTransportFactory;
        let transport = factory
            .open(&self.connect.target, &self.connect.connect_options())
            .await?;

        let mut commands = Vec::new();
        for package in self.packages.split(',').map(str::trim) {
            match transport.get_uci_config(package).await {
                Ok(text) => match parse_remote_config(package, &text) {
                    Ok(parsed) => {
                        println!("  imported {}", package);
                        commands.extend(parsed);
                    }
                    Err(e) => eprintln!("Warning: could not parse {}: {}", package, e),
                },
                Err(e) => eprintln!("Warning: could not import {}: {}", package, e),
            }
        }
        let _ = transport.disconnect().await;

        let tree = ConfigTree::from_commands(&commands);
        let document = document_from_tree(&tree);

        let text = if format == "json" {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_yaml::to_string(&document)?
        };
        std::fs::write(&self.output_file, text)?;

        println!("\nConfiguration saved to {}", self.output_file.display());
        for package in tree.packages() {
            if !package.is_empty() {
                println!("  - {}: {} sections", package.name(), package.len());
            }
        }
        println!(
            "\nYou can now use this file with 'ucible apply {} <target>'",
            self.output_file.display()
        );
        Ok(0)
    }
}
