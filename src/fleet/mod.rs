//! Fleet inventory.
//!
//! A fleet is a table of devices sharing defaults and a set of named
//! configuration layers. The inventory document (`fleet.yaml`) is loaded
//! through the same interpolation machinery as device configs, so entries
//! like `${oc.env:ROUTER_PASSWORD}` and `${config_layers.base}` resolve
//! before deserialization.

pub mod executor;

use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::ConnectOptions;
use crate::error::{Error, Result};
use crate::loader::{interpolate, read_document};

pub use executor::{DeviceResult, FleetCallbacks, FleetExecutor, FleetResult};

/// Default settings applied to all devices in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FleetDefaults {
    /// Connection timeout in seconds.
    pub timeout: u64,
    /// Default login username.
    pub username: String,
    /// Seconds to wait before the coordinated commit fires.
    pub commit_delay: u64,
}

impl Default for FleetDefaults {
    fn default() -> Self {
        Self {
            timeout: 30,
            username: "root".to_string(),
            commit_delay: 10,
        }
    }
}

/// Definition of a single device in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetDevice {
    /// Device address: IP, hostname, `user@host[:port]`, or serial port.
    pub target: String,
    /// Login username override.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password, usually an `${oc.env:...}` reference.
    #[serde(default)]
    pub password: Option<String>,
    /// SSH private key file.
    #[serde(default)]
    pub key_file: Option<String>,
    /// Connection timeout override in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Ordered configuration layers for this device.
    #[serde(default)]
    pub configs: Vec<String>,
    /// Tags for filtering.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The fleet inventory: defaults, named layers, and the device table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Defaults applied to every device.
    pub defaults: FleetDefaults,
    /// Named configuration layer paths, referenced as
    /// `${config_layers.<name>}` from device entries.
    pub config_layers: IndexMap<String, String>,
    /// Devices keyed by name.
    pub devices: IndexMap<String, FleetDevice>,
}

/// Loads and resolves a fleet inventory file.
pub fn load_fleet(path: &Path) -> Result<FleetConfig> {
    let raw = read_document(path)?;
    let resolved = interpolate(&raw)?;
    let fleet: FleetConfig = serde_yaml::from_value(resolved)
        .map_err(|e| Error::fleet_load(path, e.to_string()))?;
    debug!(path = %path.display(), devices = fleet.devices.len(), "Loaded fleet inventory");
    Ok(fleet)
}

/// Filters the device table by an optional name glob and a required tag set.
///
/// Tag filtering uses AND logic: a device must carry every requested tag.
pub fn filter_devices(
    fleet: &FleetConfig,
    target: Option<&str>,
    tags: &[String],
) -> IndexMap<String, FleetDevice> {
    let pattern = target.and_then(|t| Pattern::new(t).ok());

    fleet
        .devices
        .iter()
        .filter(|(name, device)| {
            if let Some(target) = target {
                let matched = match &pattern {
                    Some(p) => p.matches(name),
                    None => target == *name,
                };
                if !matched {
                    return false;
                }
            }
            tags.iter().all(|tag| device.tags.contains(tag))
        })
        .map(|(name, device)| (name.clone(), device.clone()))
        .collect()
}

/// Builds connect options for one device, applying fleet defaults.
pub fn connect_options(device: &FleetDevice, defaults: &FleetDefaults) -> ConnectOptions {
    ConnectOptions {
        username: device
            .username
            .clone()
            .unwrap_or_else(|| defaults.username.clone()),
        password: device.password.clone(),
        key_file: device.key_file.as_ref().map(PathBuf::from),
        timeout: Duration::from_secs(device.timeout.unwrap_or(defaults.timeout)),
    }
}

/// Resolves a device's configuration layer paths relative to the fleet file.
pub fn layer_paths(device: &FleetDevice, fleet_dir: &Path) -> Vec<PathBuf> {
    device
        .configs
        .iter()
        .map(|config| {
            let path = Path::new(config);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                fleet_dir.join(path)
            }
        })
        .collect()
}
