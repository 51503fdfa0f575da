//! The reconciliation pipeline.
//!
//! A [`Reconciler`] drives one device from observed state to desired state:
//! fetch the remote configuration, diff it against the tree, replay the
//! ordered mutation plan over the transport, then commit and reload the
//! affected services. The command stream is ordered so intermediate
//! on-device state stays valid: deletions first (stale list elements must go
//! before new ones arrive), then additions, then modifications, then commit
//! and reloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionError, Transport};
use crate::diff::{diff_tree, ConfigDiff, RemovalDirective};
use crate::error::{Error, Result};
use crate::uci::command::UciCommand;
use crate::uci::packages::KNOWN_PACKAGES;
use crate::uci::parser::parse_remote_config;
use crate::uci::tree::ConfigTree;

/// Delay between consecutive service reload commands, giving each service
/// time to settle before the next one restarts.
const RELOAD_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Options controlling one reconciliation run.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Plan only; never touch the transport with mutations.
    pub dry_run: bool,
    /// Issue `uci commit` after the mutation stream.
    pub auto_commit: bool,
    /// Restart/reload the services whose packages changed.
    pub auto_reload: bool,
    /// What to do with unmanaged remote state.
    pub removal: RemovalDirective,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            auto_commit: true,
            auto_reload: true,
            removal: RemovalDirective::KeepAll,
        }
    }
}

/// Phases of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    /// Not started.
    Idle,
    /// Reading remote package dumps.
    Fetching,
    /// Computing the diff.
    Diffing,
    /// Replaying the mutation plan.
    Applying,
    /// Issuing `uci commit`.
    Committing,
    /// Restarting affected services.
    Reloading,
    /// Finished successfully.
    Done,
    /// Failed in `Applying`, `Committing`, or `Reloading`.
    Failed,
}

/// Cooperative cancellation flag shared across fleet workers.
///
/// Checked before every transport exec; once triggered, workers stop
/// issuing commands and unwind.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the abort.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the abort has been triggered.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The outcome of one reconciliation run.
#[derive(Debug)]
pub struct ReconcileReport {
    /// The computed diff.
    pub diff: ConfigDiff,
    /// The ordered mutation plan (deletions, additions, modifications).
    pub commands: Vec<UciCommand>,
    /// Service reload commands selected from the mutated packages. Always
    /// populated, even when reloading was not requested for this run.
    pub reloads: Vec<&'static str>,
    /// False when the run stopped after planning (dry-run).
    pub applied: bool,
}

/// Builds the ordered command plan from a diff.
///
/// Deletions come first (with whole-section removals collapsed), then
/// additions, then the new value of each modification. Old values are never
/// sent; `set` on an existing scalar path overwrites.
pub fn plan_commands(diff: &ConfigDiff) -> Vec<UciCommand> {
    let mut commands = diff.removal_commands();
    commands.extend(diff.to_add.iter().cloned());
    commands.extend(diff.to_modify.iter().map(|(_, new)| new.clone()));
    commands
}

/// The set of packages a command plan touches.
pub fn mutated_packages(commands: &[UciCommand]) -> IndexSet<String> {
    commands.iter().map(|c| c.package().to_string()).collect()
}

/// Chooses the service reload commands for a set of mutated packages.
///
/// Traffic shaping (`sqm`) hooks into the network service, so both map to a
/// network restart.
pub fn service_reloads(packages: &IndexSet<String>) -> Vec<&'static str> {
    let mut reloads = Vec::new();
    if packages.contains("network") || packages.contains("sqm") {
        reloads.push("/etc/init.d/network restart");
    }
    if packages.contains("wireless") {
        reloads.push("wifi reload");
    }
    if packages.contains("dhcp") {
        reloads.push("/etc/init.d/dnsmasq restart");
    }
    if packages.contains("firewall") {
        reloads.push("/etc/init.d/firewall reload");
    }
    reloads
}

/// Drives one device through fetch, diff, apply, commit, and reload.
pub struct Reconciler<'a> {
    transport: &'a dyn Transport,
    phase: ApplyPhase,
}

impl<'a> Reconciler<'a> {
    /// Creates an idle reconciler over an open transport.
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            transport,
            phase: ApplyPhase::Idle,
        }
    }

    /// The current phase.
    pub fn phase(&self) -> ApplyPhase {
        self.phase
    }

    /// Reads and parses every known package from the device.
    ///
    /// A package whose dump cannot be read or parsed is skipped with a
    /// warning; the diff proceeds with the remaining packages. Connection
    /// level failures abort the run.
    pub async fn fetch_remote(&mut self) -> Result<Vec<UciCommand>> {
        self.phase = ApplyPhase::Fetching;
        let mut commands = Vec::new();

        for package in KNOWN_PACKAGES {
            let text = match self.transport.get_uci_config(package).await {
                Ok(text) => text,
                Err(ConnectionError::ExecutionFailed(message)) => {
                    warn!(package = %package, error = %message, "Could not retrieve package, skipping");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            match parse_remote_config(package, &text) {
                Ok(parsed) => commands.extend(parsed),
                Err(err) if err.is_skippable_parse() => {
                    warn!(package = %package, error = %err, "Could not parse package, skipping");
                }
                Err(err) => return Err(err),
            }
        }

        debug!(commands = commands.len(), "Fetched remote configuration");
        Ok(commands)
    }

    /// Fetches the remote state and diffs it against the tree.
    pub async fn diff(
        &mut self,
        tree: &ConfigTree,
        removal: &RemovalDirective,
    ) -> Result<ConfigDiff> {
        let remote = self.fetch_remote().await?;
        self.phase = ApplyPhase::Diffing;
        Ok(diff_tree(tree, &remote, removal))
    }

    /// Runs the full pipeline.
    ///
    /// With `dry_run` the plan is computed but nothing is sent to the
    /// device. `abort` is consulted before every transport exec.
    pub async fn apply(
        &mut self,
        tree: &ConfigTree,
        options: &ApplyOptions,
        abort: Option<&AbortSignal>,
    ) -> Result<ReconcileReport> {
        let diff = self.diff(tree, &options.removal).await?;
        let commands = plan_commands(&diff);
        // Always selected so callers staging without reload (fleet phase 1)
        // still know what the commit phase must restart.
        let reloads = service_reloads(&mutated_packages(&commands));

        if options.dry_run {
            self.phase = ApplyPhase::Done;
            return Ok(ReconcileReport {
                diff,
                commands,
                reloads,
                applied: false,
            });
        }

        self.phase = ApplyPhase::Applying;
        for cmd in &commands {
            self.checked_execute(&cmd.to_uci_string(), abort).await?;
        }
        info!(commands = commands.len(), "Applied mutation plan");

        if options.auto_commit {
            self.phase = ApplyPhase::Committing;
            self.checked_execute("uci commit", abort).await?;
            debug!("Committed changes");
        }

        if options.auto_reload && !reloads.is_empty() {
            self.phase = ApplyPhase::Reloading;
            for (i, reload) in reloads.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(RELOAD_SETTLE_DELAY).await;
                }
                self.checked_execute(reload, abort).await?;
            }
            info!(reloads = reloads.len(), "Reloaded services");
        }

        self.phase = ApplyPhase::Done;
        Ok(ReconcileReport {
            diff,
            commands,
            reloads,
            applied: true,
        })
    }

    /// Executes one command, honouring the abort signal and treating any
    /// non-zero exit as fatal. The offending command and the device's
    /// stderr are surfaced verbatim.
    async fn checked_execute(&mut self, command: &str, abort: Option<&AbortSignal>) -> Result<()> {
        if abort.is_some_and(AbortSignal::is_aborted) {
            self.phase = ApplyPhase::Failed;
            return Err(Error::StageAborted(format!(
                "aborted before '{}' on {}",
                command,
                self.transport.identifier()
            )));
        }

        let result = self.transport.execute(command).await.map_err(|e| {
            self.phase = ApplyPhase::Failed;
            e
        })?;

        if !result.success {
            self.phase = ApplyPhase::Failed;
            return Err(Error::remote_command(
                self.transport.identifier(),
                command,
                result.exit_code,
                result.stderr,
            ));
        }
        Ok(())
    }
}
