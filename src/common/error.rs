//! Error types for the UDP harness
//!
//! Harness faults (config I/O, launching or killing the SUT, socket setup) are
//! kept apart from verification failures so a report can tell "the SUT sent
//! the wrong thing" from "the environment is broken".

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === SUT Config File Errors ===
    #[error("Failed to write SUT config '{path}': {source}")]
    ConfigWrite {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove SUT config '{path}': {source}")]
    ConfigRemove {
        path: String,
        #[source]
        source: io::Error,
    },

    // === Process Errors ===
    #[error("SUT executable '{0}' not found. Pass --sut or set sut_path in the settings file")]
    SutNotFound(String),

    #[error("Failed to launch SUT '{path}': {source}")]
    SutLaunch {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("SUT (pid {pid}) did not exit within {timeout_ms} ms after being killed")]
    SutTerminationTimeout { pid: u32, timeout_ms: u64 },

    // === Capture Errors ===
    #[error("Failed to open capture socket on {addr}: {source}")]
    CaptureBind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Capture socket is closed")]
    CaptureClosed,

    #[error("No datagram received within {0} ms")]
    NoPacket(u64),

    // === Verification Errors ===
    #[error("{0}")]
    Assertion(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid settings file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario: {0}")]
    Scenario(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a config write error for a path
    pub fn config_write(path: &Path, source: io::Error) -> Self {
        Self::ConfigWrite {
            path: path.display().to_string(),
            source,
        }
    }

    /// Create a config remove error for a path
    pub fn config_remove(path: &Path, source: io::Error) -> Self {
        Self::ConfigRemove {
            path: path.display().to_string(),
            source,
        }
    }

    /// Create a launch error for an executable
    pub fn sut_launch(path: &Path, source: io::Error) -> Self {
        Self::SutLaunch {
            path: path.display().to_string(),
            source,
        }
    }

    /// True for outcomes that mean the SUT misbehaved rather than the harness
    ///
    /// These are turned into failed reports instead of aborting the run.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Error::Assertion(_) | Error::NoPacket(_))
    }
}
