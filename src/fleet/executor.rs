//! Two-phase fleet execution.
//!
//! Applying a configuration change to a mesh of devices one at a time would
//! partition the network halfway through. The executor therefore splits the
//! work:
//!
//! 1. **Stage**: push every mutation to every device in parallel, without
//!    committing. Any failure aborts the phase, reverts all staged devices,
//!    and nothing takes effect.
//! 2. **Commit**: dispatch a detached, delayed `uci commit` plus service
//!    reloads to every staged device. The delay gives each device time to
//!    receive its instruction before any of them restarts networking, so
//!    the cutover lands nearly simultaneously across the fleet.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{
    connect_options, filter_devices, layer_paths, FleetConfig, FleetDefaults, FleetDevice,
};
use crate::connection::{Transport, TransportFactory};
use crate::diff::{ConfigDiff, RemovalDirective};
use crate::loader::load_config_tree;
use crate::reconcile::{AbortSignal, ApplyOptions, Reconciler};

/// Result of operations on a single device.
#[derive(Debug)]
pub struct DeviceResult {
    /// Device name from the inventory.
    pub name: String,
    /// Connection target.
    pub target: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Failure message, when unsuccessful.
    pub error: Option<String>,
    /// The computed diff, when one was produced.
    pub diff: Option<ConfigDiff>,
    /// Number of mutations implied by the diff.
    pub changes: usize,
}

impl DeviceResult {
    fn ok(name: &str, target: &str, diff: Option<ConfigDiff>) -> Self {
        let changes = diff.as_ref().map_or(0, ConfigDiff::change_count);
        Self {
            name: name.to_string(),
            target: target.to_string(),
            success: true,
            error: None,
            diff,
            changes,
        }
    }

    fn failed(name: &str, target: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            success: false,
            error: Some(error.into()),
            diff: None,
            changes: 0,
        }
    }
}

/// Result of a fleet-wide phase.
#[derive(Debug, Default)]
pub struct FleetResult {
    /// Per-device results keyed by device name.
    pub devices: IndexMap<String, DeviceResult>,
    /// Phase name: `preview`, `stage`, or `commit`.
    pub phase: String,
    /// Whether the phase was aborted.
    pub aborted: bool,
    /// Why the phase was aborted.
    pub abort_reason: Option<String>,
}

impl FleetResult {
    fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            ..Self::default()
        }
    }

    /// Number of devices that succeeded.
    pub fn success_count(&self) -> usize {
        self.devices.values().filter(|d| d.success).count()
    }

    /// Number of devices that failed.
    pub fn failure_count(&self) -> usize {
        self.devices.values().filter(|d| !d.success).count()
    }

    /// Total number of devices in this phase.
    pub fn total_count(&self) -> usize {
        self.devices.len()
    }

    /// True when every device succeeded.
    pub fn all_successful(&self) -> bool {
        self.devices.values().all(|d| d.success)
    }
}

type StartHook = Arc<dyn Fn(&str, &str) + Send + Sync>;
type CompleteHook = Arc<dyn Fn(&str, &DeviceResult) + Send + Sync>;
type PhaseHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Progress hooks, invoked from arbitrary workers.
///
/// Implementations must tolerate concurrent invocation.
#[derive(Clone, Default)]
pub struct FleetCallbacks {
    on_device_start: Option<StartHook>,
    on_device_complete: Option<CompleteHook>,
    on_phase_start: Option<PhaseHook>,
}

impl FleetCallbacks {
    /// Creates empty callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the device-start hook `(name, target)`.
    pub fn on_device_start(mut self, hook: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_device_start = Some(Arc::new(hook));
        self
    }

    /// Sets the device-complete hook `(name, result)`.
    pub fn on_device_complete(
        mut self,
        hook: impl Fn(&str, &DeviceResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_device_complete = Some(Arc::new(hook));
        self
    }

    /// Sets the phase-start hook.
    pub fn on_phase_start(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_phase_start = Some(Arc::new(hook));
        self
    }

    fn device_start(&self, name: &str, target: &str) {
        if let Some(hook) = &self.on_device_start {
            hook(name, target);
        }
    }

    fn device_complete(&self, name: &str, result: &DeviceResult) {
        if let Some(hook) = &self.on_device_complete {
            hook(name, result);
        }
    }

    fn phase_start(&self, phase: &str) {
        if let Some(hook) = &self.on_phase_start {
            hook(phase);
        }
    }
}

/// A device that passed the stage phase: its transport stays open and its
/// reload selection is remembered for the commit instruction.
struct StagedSession {
    transport: Box<dyn Transport>,
    reloads: Vec<&'static str>,
}

/// Default stage-phase parallelism.
pub const DEFAULT_WORKERS: usize = 5;

/// Executes fleet operations with two-phase coordinated updates.
pub struct FleetExecutor {
    fleet: FleetConfig,
    fleet_dir: PathBuf,
    factory: Arc<dyn TransportFactory>,
    callbacks: FleetCallbacks,
    staged: IndexMap<String, StagedSession>,
}

impl FleetExecutor {
    /// Creates an executor over a fleet inventory.
    ///
    /// `fleet_path` is the inventory file location, used to resolve the
    /// relative paths of configuration layers.
    pub fn new(fleet: FleetConfig, fleet_path: &Path, factory: Arc<dyn TransportFactory>) -> Self {
        let fleet_dir = fleet_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            fleet,
            fleet_dir,
            factory,
            callbacks: FleetCallbacks::default(),
            staged: IndexMap::new(),
        }
    }

    /// Installs progress callbacks.
    pub fn with_callbacks(mut self, callbacks: FleetCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// The fleet this executor operates on.
    pub fn fleet(&self) -> &FleetConfig {
        &self.fleet
    }

    /// Computes per-device diffs without mutating anything.
    pub async fn preview(
        &self,
        target: Option<&str>,
        tags: &[String],
        workers: usize,
        removal: RemovalDirective,
    ) -> FleetResult {
        let devices = filter_devices(&self.fleet, target, tags);
        let mut result = FleetResult::new("preview");
        if devices.is_empty() {
            return result;
        }
        self.callbacks.phase_start("preview");

        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut join_set: JoinSet<(String, DeviceResult)> = JoinSet::new();

        for (name, device) in devices {
            let semaphore = Arc::clone(&semaphore);
            let factory = Arc::clone(&self.factory);
            let callbacks = self.callbacks.clone();
            let fleet_dir = self.fleet_dir.clone();
            let defaults = self.fleet.defaults.clone();
            let removal = removal.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let device_result = preview_device(
                    &name, &device, &fleet_dir, &defaults, factory, &callbacks, removal,
                )
                .await;
                (name, device_result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Ok((name, device_result)) = joined {
                self.callbacks.device_complete(&name, &device_result);
                result.devices.insert(name, device_result);
            }
        }
        result
    }

    /// Phase 1: push mutations to all selected devices without committing.
    ///
    /// Fails fast: the first device failure triggers a fleet-wide abort,
    /// remaining workers stop before their next transport exec, and every
    /// staged device is reverted. Successful sessions stay open for the
    /// commit phase.
    pub async fn stage(
        &mut self,
        target: Option<&str>,
        tags: &[String],
        workers: usize,
        removal: RemovalDirective,
    ) -> FleetResult {
        let devices = filter_devices(&self.fleet, target, tags);
        let mut result = FleetResult::new("stage");
        self.staged.clear();
        if devices.is_empty() {
            return result;
        }
        self.callbacks.phase_start("stage");

        let abort = AbortSignal::new();
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut join_set: JoinSet<(String, DeviceResult, Option<StagedSession>)> = JoinSet::new();

        for (name, device) in devices {
            let semaphore = Arc::clone(&semaphore);
            let factory = Arc::clone(&self.factory);
            let callbacks = self.callbacks.clone();
            let fleet_dir = self.fleet_dir.clone();
            let defaults = self.fleet.defaults.clone();
            let removal = removal.clone();
            let abort = abort.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let (device_result, session) = stage_device(
                    &name, &device, &fleet_dir, &defaults, factory, &callbacks, removal, &abort,
                )
                .await;
                (name, device_result, session)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let Ok((name, device_result, session)) = joined else {
                continue;
            };
            if let Some(session) = session {
                self.staged.insert(name.clone(), session);
            }
            self.callbacks.device_complete(&name, &device_result);

            if !device_result.success && !result.aborted {
                result.aborted = true;
                result.abort_reason = Some(format!(
                    "Device '{}' failed: {}",
                    name,
                    device_result.error.as_deref().unwrap_or("unknown error")
                ));
                abort.trigger();
            }
            result.devices.insert(name, device_result);
        }

        if result.aborted {
            warn!(
                reason = %result.abort_reason.as_deref().unwrap_or(""),
                "Stage phase aborted, rolling back"
            );
            self.rollback_all().await;
        }
        result
    }

    /// Phase 2: dispatch the coordinated delayed commit to every staged
    /// device.
    ///
    /// Each device receives one detached background command that sleeps for
    /// the commit delay, commits, and reloads its affected services. The
    /// network restart may drop the control connection, so the instruction
    /// is fire-and-forget and the session is closed right after dispatch.
    pub async fn commit(&mut self, delay: Option<u64>) -> FleetResult {
        let mut result = FleetResult::new("commit");
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return result;
        }

        let delay = delay.unwrap_or(self.fleet.defaults.commit_delay);
        self.callbacks.phase_start("commit");

        let mut join_set: JoinSet<(String, DeviceResult)> = JoinSet::new();
        for (name, session) in staged {
            let callbacks = self.callbacks.clone();
            join_set.spawn(async move {
                let device_result = commit_device(&name, session, delay, &callbacks).await;
                (name, device_result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Ok((name, device_result)) = joined {
                self.callbacks.device_complete(&name, &device_result);
                result.devices.insert(name, device_result);
            }
        }

        info!(
            devices = result.total_count(),
            failures = result.failure_count(),
            delay_secs = delay,
            "Commit instructions dispatched"
        );
        result
    }

    /// Full two-phase apply: stage, then commit if staging was clean.
    pub async fn apply(
        &mut self,
        target: Option<&str>,
        tags: &[String],
        workers: usize,
        removal: RemovalDirective,
        commit_delay: Option<u64>,
    ) -> (FleetResult, FleetResult) {
        let stage_result = self.stage(target, tags, workers, removal).await;

        if stage_result.aborted || !stage_result.all_successful() {
            let mut commit_result = FleetResult::new("commit");
            commit_result.aborted = true;
            return (stage_result, commit_result);
        }

        let commit_result = self.commit(commit_delay).await;
        (stage_result, commit_result)
    }

    /// Reverts and closes every staged session.
    async fn rollback_all(&mut self) {
        for (name, session) in std::mem::take(&mut self.staged) {
            debug!(device = %name, "Reverting staged changes");
            if let Err(e) = session.transport.execute("uci revert").await {
                warn!(device = %name, error = %e, "Best-effort revert failed");
            }
            let _ = session.transport.disconnect().await;
        }
    }

    /// Closes any connections still open (failure paths, drop-before-commit).
    pub async fn cleanup(&mut self) {
        for (_, session) in std::mem::take(&mut self.staged) {
            let _ = session.transport.disconnect().await;
        }
    }
}

async fn preview_device(
    name: &str,
    device: &FleetDevice,
    fleet_dir: &Path,
    defaults: &FleetDefaults,
    factory: Arc<dyn TransportFactory>,
    callbacks: &FleetCallbacks,
    removal: RemovalDirective,
) -> DeviceResult {
    callbacks.device_start(name, &device.target);

    let tree = match load_config_tree(&layer_paths(device, fleet_dir)) {
        Ok(tree) => tree,
        Err(e) => return DeviceResult::failed(name, &device.target, e.to_string()),
    };

    let options = connect_options(device, defaults);
    let transport = match factory.open(&device.target, &options).await {
        Ok(transport) => transport,
        Err(e) => return DeviceResult::failed(name, &device.target, e.to_string()),
    };

    let mut reconciler = Reconciler::new(transport.as_ref());
    let outcome = reconciler.diff(&tree, &removal).await;
    let _ = transport.disconnect().await;

    match outcome {
        Ok(diff) => DeviceResult::ok(name, &device.target, Some(diff)),
        Err(e) => DeviceResult::failed(name, &device.target, e.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn stage_device(
    name: &str,
    device: &FleetDevice,
    fleet_dir: &Path,
    defaults: &FleetDefaults,
    factory: Arc<dyn TransportFactory>,
    callbacks: &FleetCallbacks,
    removal: RemovalDirective,
    abort: &AbortSignal,
) -> (DeviceResult, Option<StagedSession>) {
    callbacks.device_start(name, &device.target);

    if abort.is_aborted() {
        return (
            DeviceResult::failed(name, &device.target, "aborted before start"),
            None,
        );
    }

    let tree = match load_config_tree(&layer_paths(device, fleet_dir)) {
        Ok(tree) => tree,
        Err(e) => return (DeviceResult::failed(name, &device.target, e.to_string()), None),
    };

    let options = connect_options(device, defaults);
    let transport = match factory.open(&device.target, &options).await {
        Ok(transport) => transport,
        Err(e) => return (DeviceResult::failed(name, &device.target, e.to_string()), None),
    };

    let apply_options = ApplyOptions {
        dry_run: false,
        auto_commit: false,
        auto_reload: false,
        removal,
    };

    let mut reconciler = Reconciler::new(transport.as_ref());
    match reconciler.apply(&tree, &apply_options, Some(abort)).await {
        Ok(report) => {
            debug!(device = %name, changes = report.commands.len(), "Staged device");
            let result = DeviceResult::ok(name, &device.target, Some(report.diff));
            let session = StagedSession {
                transport,
                reloads: report.reloads,
            };
            (result, Some(session))
        }
        Err(e) => {
            // Leave nothing pending on the device we were mutating.
            let _ = transport.execute("uci revert").await;
            let _ = transport.disconnect().await;
            (DeviceResult::failed(name, &device.target, e.to_string()), None)
        }
    }
}

async fn commit_device(
    name: &str,
    session: StagedSession,
    delay: u64,
    callbacks: &FleetCallbacks,
) -> DeviceResult {
    let target = session.transport.identifier().to_string();
    callbacks.device_start(name, &target);

    let mut steps = vec![format!("sleep {}", delay), "uci commit".to_string()];
    steps.extend(session.reloads.iter().map(|s| s.to_string()));
    let command = format!("nohup sh -c '{}' > /dev/null 2>&1 &", steps.join(" && "));

    let outcome = session.transport.execute(&command).await;
    let _ = session.transport.disconnect().await;

    match outcome {
        Ok(result) if result.success => DeviceResult::ok(name, &target, None),
        Ok(result) => DeviceResult::failed(
            name,
            &target,
            format!("commit dispatch exited {}: {}", result.exit_code, result.stderr),
        ),
        Err(e) => DeviceResult::failed(name, &target, e.to_string()),
    }
}
