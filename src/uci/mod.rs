//! The UCI configuration model.
//!
//! This module holds the pieces that understand the on-device configuration
//! database itself: the command model, the in-memory desired-state tree, the
//! parsers for the two on-device text formats, and the known-package table.

pub mod command;
pub mod packages;
pub mod parser;
pub mod sections;
pub mod tree;

pub use command::{mask_value, UciAction, UciCommand};
pub use parser::{detect_format, parse_remote_config, RemoteFormat};
pub use tree::{ConfigTree, OptionValue, PackageConfig, SectionConfig};
