//! Error types for Ucible.
//!
//! This module defines the error types used throughout Ucible, providing
//! rich error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Ucible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Ucible.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Document Errors
    // ========================================================================
    /// Error parsing a desired-state document.
    #[error("Failed to parse document '{path}': {message}")]
    DocumentParse {
        /// Path to the document
        path: PathBuf,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A desired-state document is structurally invalid.
    #[error("Invalid document: {0}")]
    Document(String),

    /// Referenced document file does not exist.
    #[error("Document file not found: {0}")]
    DocumentNotFound(PathBuf),

    /// A variable reference could not be resolved.
    #[error("Unresolved reference '${{{reference}}}': {message}")]
    UnresolvedReference {
        /// The reference as written in the document
        reference: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // On-device Text Errors
    // ========================================================================
    /// Malformed on-device configuration text.
    #[error("Failed to parse '{package}' configuration: {message}")]
    RemoteParse {
        /// UCI package being parsed
        package: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection-level failure (connect, auth, session drop).
    #[error(transparent)]
    Connection(#[from] crate::connection::ConnectionError),

    /// A remote command exited non-zero during apply.
    #[error("Remote command failed on '{host}' (exit {exit_code}): {command}: {stderr}")]
    RemoteCommand {
        /// Target host or device name
        host: String,
        /// The command that failed
        command: String,
        /// Exit code reported by the remote shell
        exit_code: i32,
        /// Stderr captured from the remote shell, verbatim
        stderr: String,
    },

    // ========================================================================
    // Fleet Errors
    // ========================================================================
    /// Error loading the fleet inventory.
    #[error("Failed to load fleet inventory from '{path}': {message}")]
    FleetLoad {
        /// Path to the inventory file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The stage phase was aborted because a device failed or the
    /// fleet-wide abort fired.
    #[error("Fleet stage aborted: {0}")]
    StageAborted(String),

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new document parse error.
    pub fn document_parse(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DocumentParse {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates a new remote parse error.
    pub fn remote_parse(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteParse {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Creates a new remote command error.
    pub fn remote_command(
        host: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::RemoteCommand {
            host: host.into(),
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Creates a new fleet load error.
    pub fn fleet_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FleetLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new unresolved reference error.
    pub fn unresolved(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error is a per-package parse problem that the
    /// diff pipeline recovers from by skipping the package.
    pub fn is_skippable_parse(&self) -> bool {
        matches!(self, Error::RemoteParse { .. })
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}
