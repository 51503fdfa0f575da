//! Fleet subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;

use super::commands::use_color;
use crate::diff::render::render_tree;
use crate::diff::RemovalDirective;
use crate::error::Result;
use crate::fleet::executor::DEFAULT_WORKERS;
use crate::fleet::{
    filter_devices, layer_paths, load_fleet, FleetCallbacks, FleetExecutor, FleetResult,
};
use crate::connection::SshTransportFactory;
use crate::loader::load_config_tree;

/// Fleet subcommands.
#[derive(Subcommand, Debug)]
pub enum FleetCommands {
    /// Two-phase apply across the fleet (stage, then coordinated commit)
    Apply(FleetApplyArgs),

    /// Per-device diffs without applying
    Preview(FleetPreviewArgs),

    /// Validate the inventory and every referenced configuration layer
    Validate(FleetFileArgs),

    /// Show the device table
    Show(FleetFileArgs),
}

/// Filters shared by fleet commands.
#[derive(Args, Debug, Clone)]
pub struct FleetFilterArgs {
    /// Device name or glob pattern (e.g. "ap-*")
    #[arg(long)]
    pub target: Option<String>,

    /// Tags the device must carry (repeatable; AND logic)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Maximum parallel connections
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

/// Arguments for fleet apply.
#[derive(Args, Debug)]
pub struct FleetApplyArgs {
    /// Path to the fleet inventory file
    pub fleet_file: PathBuf,

    #[command(flatten)]
    pub filter: FleetFilterArgs,

    /// Remove settings on devices that are not in their configs (dangerous!)
    #[arg(long)]
    pub remove_unmanaged: bool,

    /// Override the coordinated commit delay in seconds
    #[arg(long)]
    pub commit_delay: Option<u64>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for fleet preview.
#[derive(Args, Debug)]
pub struct FleetPreviewArgs {
    /// Path to the fleet inventory file
    pub fleet_file: PathBuf,

    #[command(flatten)]
    pub filter: FleetFilterArgs,

    /// Classify unmanaged settings as removals in the preview
    #[arg(long)]
    pub remove_unmanaged: bool,
}

/// Arguments for fleet validate / fleet show.
#[derive(Args, Debug)]
pub struct FleetFileArgs {
    /// Path to the fleet inventory file
    pub fleet_file: PathBuf,
}

/// Progress callbacks that narrate the run on the terminal.
fn progress_callbacks(color: bool) -> FleetCallbacks {
    FleetCallbacks::new()
        .on_phase_start(move |phase| {
            println!("\n== Phase: {} ==", phase);
        })
        .on_device_start(|name, target| {
            println!("  -> {} ({})", name, target);
        })
        .on_device_complete(move |name, result| {
            if result.success {
                let status = if color {
                    "ok".green().to_string()
                } else {
                    "ok".to_string()
                };
                println!("  {} {} ({} changes)", status, name, result.changes);
            } else {
                let status = if color {
                    "failed".red().bold().to_string()
                } else {
                    "failed".to_string()
                };
                println!(
                    "  {} {}: {}",
                    status,
                    name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        })
}

fn print_phase_summary(result: &FleetResult) {
    println!(
        "\n{}: {} succeeded, {} failed of {}",
        result.phase,
        result.success_count(),
        result.failure_count(),
        result.total_count()
    );
    if let Some(reason) = &result.abort_reason {
        println!("Aborted: {}", reason);
    }
}

impl FleetCommands {
    /// Dispatches the fleet subcommand.
    pub async fn execute(&self, no_color: bool) -> Result<i32> {
        match self {
            FleetCommands::Apply(args) => args.execute(no_color).await,
            FleetCommands::Preview(args) => args.execute(no_color).await,
            FleetCommands::Validate(args) => args.validate(),
            FleetCommands::Show(args) => args.show(),
        }
    }
}

impl FleetApplyArgs {
    async fn execute(&self, no_color: bool) -> Result<i32> {
        let fleet = load_fleet(&self.fleet_file)?;
        let selected = filter_devices(&fleet, self.filter.target.as_deref(), &self.filter.tags);
        if selected.is_empty() {
            println!("No devices matched the filters.");
            return Ok(0);
        }

        if !self.yes {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Apply configuration to {} device(s)?",
                    selected.len()
                ))
                .default(false)
                .interact()
                .unwrap_or(false);
            if !confirmed {
                println!("Aborted.");
                return Ok(1);
            }
        }

        let removal = if self.remove_unmanaged {
            RemovalDirective::RemoveAll
        } else {
            RemovalDirective::KeepAll
        };

        let color = use_color(no_color);
        let mut executor =
            FleetExecutor::new(fleet, &self.fleet_file, Arc::new(SshTransportFactory))
                .with_callbacks(progress_callbacks(color));

        let (stage_result, commit_result) = executor
            .apply(
                self.filter.target.as_deref(),
                &self.filter.tags,
                self.filter.workers,
                removal,
                self.commit_delay,
            )
            .await;

        print_phase_summary(&stage_result);
        if !commit_result.aborted {
            print_phase_summary(&commit_result);
        }

        let ok = !stage_result.aborted
            && stage_result.all_successful()
            && !commit_result.aborted
            && commit_result.all_successful();
        if ok {
            println!("\n{}", "Fleet apply complete.".green());
            Ok(0)
        } else {
            Ok(1)
        }
    }
}

impl FleetPreviewArgs {
    async fn execute(&self, no_color: bool) -> Result<i32> {
        let fleet = load_fleet(&self.fleet_file)?;
        let removal = if self.remove_unmanaged {
            RemovalDirective::RemoveAll
        } else {
            RemovalDirective::KeepAll
        };

        let color = use_color(no_color);
        let executor = FleetExecutor::new(fleet, &self.fleet_file, Arc::new(SshTransportFactory))
            .with_callbacks(progress_callbacks(color));

        let result = executor
            .preview(
                self.filter.target.as_deref(),
                &self.filter.tags,
                self.filter.workers,
                removal,
            )
            .await;

        for (name, device_result) in &result.devices {
            println!("\n{}", format!("### {} ###", name).bold());
            match &device_result.diff {
                Some(diff) if diff.is_empty() => println!("In sync."),
                Some(diff) => println!("{}", render_tree(diff, color)),
                None => println!(
                    "Error: {}",
                    device_result.error.as_deref().unwrap_or("unknown")
                ),
            }
        }

        print_phase_summary(&result);
        Ok(if result.all_successful() { 0 } else { 1 })
    }
}

impl FleetFileArgs {
    fn validate(&self) -> Result<i32> {
        let fleet = load_fleet(&self.fleet_file)?;
        let fleet_dir = self
            .fleet_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."));

        let mut errors = 0;
        for (name, device) in &fleet.devices {
            let layers = layer_paths(device, fleet_dir);
            match load_config_tree(&layers) {
                Ok(tree) => {
                    let sections: usize = tree.packages().map(|p| p.len()).sum();
                    println!("  ok {} ({} sections from {} layers)", name, sections, layers.len());
                }
                Err(e) => {
                    println!("  {} {}: {}", "error".red(), name, e);
                    errors += 1;
                }
            }
        }

        if errors == 0 {
            println!("\nFleet inventory is valid: {} device(s).", fleet.devices.len());
            Ok(0)
        } else {
            println!("\n{} device(s) with invalid configuration.", errors);
            Ok(1)
        }
    }

    fn show(&self) -> Result<i32> {
        let fleet = load_fleet(&self.fleet_file)?;

        println!(
            "Defaults: timeout={}s username={} commit_delay={}s",
            fleet.defaults.timeout, fleet.defaults.username, fleet.defaults.commit_delay
        );
        if !fleet.config_layers.is_empty() {
            println!("Config layers:");
            for (name, path) in &fleet.config_layers {
                println!("  {} -> {}", name, path);
            }
        }
        println!("Devices:");
        for (name, device) in &fleet.devices {
            let tags = if device.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", device.tags.join(", "))
            };
            println!("  {:<20} {}{}", name, device.target, tags);
            for config in &device.configs {
                println!("  {:<20}   layer: {}", "", config);
            }
        }
        Ok(0)
    }
}
