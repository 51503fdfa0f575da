//! # Ucible - Declarative UCI Configuration Management
//!
//! Ucible manages fleets of network devices that expose a hierarchical
//! key-value configuration database (UCI: packages, sections, options).
//! Desired state is written as layered YAML/JSON documents, diffed against
//! each device's live configuration over a transport, and reconciled with a
//! minimal mutation sequence. Multi-device fleets are updated in two
//! coordinated phases so network-affecting changes cut over nearly
//! simultaneously.
//!
//! ## Core Concepts
//!
//! - **Commands**: a single UCI mutation (`set`, `add_list`, `del_list`,
//!   `delete`) - the common currency of the whole pipeline
//! - **Config tree**: in-memory desired state, emitting a deterministic
//!   command sequence
//! - **Diff**: the classification of every path into add / modify / remove /
//!   remote-only / whitelisted / common
//! - **Policy**: path-glob whitelists deciding which remote-only state is
//!   preserved
//! - **Reconciler**: replays the ordered plan over a transport, then commits
//!   and reloads affected services
//! - **Fleet executor**: bounded-parallel two-phase apply with fail-fast
//!   rollback and a delayed coordinated commit
//!
//! ## Data Flow
//!
//! ```text
//! documents ──> ConfigTree ──┐
//!                            ├──> ConfigDiff ──> Reconciler ──> device
//! device ──> parser ─────────┘                      │
//!                                                   └──> commit + reloads
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use ucible::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let tree = load_config_tree(&["configs/base.yaml", "configs/ap.yaml"])?;
//!
//!     let factory = SshTransportFactory;
//!     let transport = factory
//!         .open("192.168.1.1", &ConnectOptions::default())
//!         .await?;
//!
//!     let mut reconciler = Reconciler::new(transport.as_ref());
//!     let report = reconciler
//!         .apply(&tree, &ApplyOptions::default(), None)
//!         .await?;
//!
//!     println!("applied {} commands", report.commands.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Error handling
    pub use crate::error::{Error, Result};

    // Command model and tree
    pub use crate::uci::sections::{
        DhcpHost, DhcpPool, FirewallForwarding, FirewallZone, NetworkDevice, NetworkInterface,
        SqmQueue, WirelessInterface, WirelessRadio,
    };
    pub use crate::uci::{ConfigTree, OptionValue, UciAction, UciCommand};

    // Parsing
    pub use crate::uci::{detect_format, parse_remote_config, RemoteFormat};

    // Policy
    pub use crate::policy::RemotePolicy;

    // Diff engine and rendering
    pub use crate::diff::render::{render_flat, render_tree};
    pub use crate::diff::{diff_commands, diff_tree, ConfigDiff, RemovalDirective};

    // Reconciliation
    pub use crate::reconcile::{
        plan_commands, service_reloads, AbortSignal, ApplyOptions, ApplyPhase, Reconciler,
    };

    // Document loading
    pub use crate::loader::{load_config_tree, load_documents, tree_from_document};

    // Transport layer
    pub use crate::connection::{
        CommandResult, ConnectOptions, ConnectionError, SshTransportFactory, TargetSpec,
        Transport, TransportFactory,
    };

    // Fleet
    pub use crate::fleet::{
        filter_devices, load_fleet, DeviceResult, FleetCallbacks, FleetConfig, FleetDefaults,
        FleetDevice, FleetExecutor, FleetResult,
    };
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases for Ucible operations.
pub mod error;

/// The UCI configuration model: commands, trees, parsers, and the known
/// package table.
pub mod uci;

/// Remote-preservation policy: dotted path-glob whitelists.
pub mod policy;

/// The diff engine and its textual renderers.
pub mod diff;

/// The reconciliation pipeline: plan ordering, apply, commit, reloads.
pub mod reconcile;

/// Layered document loading with variable interpolation.
pub mod loader;

// ============================================================================
// Infrastructure
// ============================================================================

/// Transport layer for device communication (SSH shell sessions).
pub mod connection;

/// Fleet inventory and the two-phase fleet executor.
pub mod fleet;

/// Command-line interface.
pub mod cli;

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of Ucible.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
