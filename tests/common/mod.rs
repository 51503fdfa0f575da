//! Shared test fixtures: a scripted in-memory transport.
//!
//! The scripted transport plays back canned `uci export` dumps and records
//! every executed command, so the reconciliation and fleet pipelines can be
//! exercised end to end without a network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ucible::connection::{
    CommandResult, ConnectOptions, ConnectionError, ConnectionResult, Transport, TransportFactory,
};

/// Scripted device state, shared between the factory and the test body.
#[derive(Clone, Default)]
pub struct DeviceScript {
    /// Canned `uci export` output per package.
    pub packages: HashMap<String, String>,
    /// Every command executed on the device, in order.
    pub log: Arc<Mutex<Vec<String>>>,
    /// When set, the (n+1)-th executed command fails with exit code 1.
    /// Later commands succeed again, so rollback can be observed.
    pub fail_at: Option<usize>,
    /// When set, opening a transport to this device fails outright.
    pub refuse_connect: bool,
}

impl DeviceScript {
    /// Creates a script with canned package dumps.
    pub fn with_packages(packages: &[(&str, &str)]) -> Self {
        Self {
            packages: packages
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// The executed command log.
    pub fn executed(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

/// A connected scripted session.
pub struct ScriptedTransport {
    identifier: String,
    script: DeviceScript,
    executed: AtomicUsize,
    open: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(identifier: &str, script: DeviceScript) -> Self {
        Self {
            identifier: identifier.to_string(),
            script,
            executed: AtomicUsize::new(0),
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn execute(&self, command: &str) -> ConnectionResult<CommandResult> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionClosed);
        }
        let index = self.executed.fetch_add(1, Ordering::SeqCst);
        self.script.log.lock().push(command.to_string());

        if self.script.fail_at == Some(index) {
            return Ok(CommandResult::failure(
                1,
                String::new(),
                "simulated device failure".to_string(),
            ));
        }
        Ok(CommandResult::success(String::new(), String::new()))
    }

    async fn get_uci_config(&self, package: &str) -> ConnectionResult<String> {
        // Reads bypass the command log so tests only see mutations.
        match self.script.packages.get(package) {
            Some(text) => Ok(text.clone()),
            None => Err(ConnectionError::ExecutionFailed(format!(
                "uci export {} exited 1: Entry not found",
                package
            ))),
        }
    }

    async fn disconnect(&self) -> ConnectionResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out scripted sessions keyed by target string.
#[derive(Default)]
pub struct ScriptedFactory {
    pub devices: HashMap<String, DeviceScript>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device script under a target address.
    pub fn device(mut self, target: &str, script: DeviceScript) -> Self {
        self.devices.insert(target.to_string(), script);
        self
    }
}

#[async_trait]
impl TransportFactory for ScriptedFactory {
    async fn open(
        &self,
        target: &str,
        _options: &ConnectOptions,
    ) -> ConnectionResult<Box<dyn Transport>> {
        let script = self
            .devices
            .get(target)
            .cloned()
            .ok_or_else(|| ConnectionError::ConnectionFailed(format!("no route to {}", target)))?;
        if script.refuse_connect {
            return Err(ConnectionError::ConnectionFailed(format!(
                "connection refused: {}",
                target
            )));
        }
        Ok(Box::new(ScriptedTransport::new(target, script)))
    }
}
