//! Error types and handling
//!
//! This module provides domain-specific error types for the harness. The
//! taxonomy is structured with specific error enums for each failure domain
//! (device availability, target setup, build content, configuration) that are
//! then wrapped in the main TetherError enum for unified error handling.
//!
//! The split matters operationally: device-availability errors are always
//! propagated to the caller so device-level recovery can run, setup errors
//! mark the invocation failed without condemning the build, and build-content
//! errors condemn the build itself.

use std::time::Duration;
use thiserror::Error;

/// Device communication and availability errors
///
/// Raised when the device under test stops responding or is lost. These are
/// never absorbed by the invocation pipeline: they mark the invocation failed
/// and are re-raised to the caller after cleanup.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Device stopped responding or was disconnected
    #[error("device {serial} is not available: {message}")]
    NotAvailable { serial: String, message: String },

    /// A device operation exceeded its timeout
    #[error("device {serial} operation timed out after {timeout:?}")]
    Timeout { serial: String, timeout: Duration },

    /// Transport-level failure while talking to the device
    #[error("device transport error: {message}")]
    Transport { message: String },
}

impl DeviceError {
    /// Shorthand for a [`DeviceError::NotAvailable`] with owned strings.
    pub fn not_available(serial: impl Into<String>, message: impl Into<String>) -> Self {
        DeviceError::NotAvailable {
            serial: serial.into(),
            message: message.into(),
        }
    }
}

/// Target-preparation errors
///
/// The environment was unable to run the build as given: board mismatch,
/// flashing failure, missing flashing resource. These map to invocation
/// status FAILED.
#[derive(Error, Debug)]
pub enum SetupError {
    /// Firmware metadata could not be parsed
    #[error("failed to parse firmware metadata: {message}")]
    Metadata { message: String },

    /// The build's metadata declares no acceptable boards
    #[error("build metadata does not declare any acceptable boards")]
    NoBoardsDeclared,

    /// The device's board is not among the build's acceptable boards
    #[error("device board '{device_board}' is not among the build's acceptable boards [{acceptable}]")]
    BoardMismatch {
        device_board: String,
        acceptable: String,
    },

    /// The device did not report a board identifier
    #[error("device {serial} did not report a board identifier")]
    UnknownBoard { serial: String },

    /// A firmware image required for flashing could not be obtained
    #[error("missing flashing resource {name} version {version}: {message}")]
    MissingResource {
        name: String,
        version: String,
        message: String,
    },

    /// A flash command reported non-success
    #[error("flashing partition '{partition}' failed: {message}")]
    FlashFailed { partition: String, message: String },

    /// A firmware component still reports the wrong version after flashing
    #[error("{component} version is '{actual}' after flashing, expected '{expected}'")]
    VersionMismatch {
        component: String,
        expected: String,
        actual: String,
    },

    /// Wiping the user-data partition failed
    #[error("failed to wipe user data: {message}")]
    WipeFailed { message: String },

    /// A flash-mode command reported non-success
    #[error("flash-mode command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Generic target-preparation failure
    #[error("target preparation failed: {message}")]
    Preparation { message: String },
}

/// Build-content errors
///
/// The build artifact itself is unusable for testing, as opposed to the
/// environment being unable to run it. These map to invocation status
/// BUILD_ERROR and trigger `build_not_tested` on the provider.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A named artifact is corrupt or otherwise unusable
    #[error("build artifact '{name}' is unusable: {message}")]
    UnusableArtifact { name: String, message: String },

    /// The build cannot be tested at all
    #[error("build is not testable: {message}")]
    Untestable { message: String },
}

/// Configuration errors
///
/// Invalid option values or missing collaborators detected while wiring an
/// invocation. These map to invocation status FAILED.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An option carries a value that makes no sense for this invocation
    #[error("invalid value for {option}: {message}")]
    InvalidOption { option: String, message: String },

    /// A collaborator required by the configured options was not supplied
    #[error("required collaborator missing: {name}")]
    MissingCollaborator { name: String },
}

/// Internal/generic fallback errors
#[derive(Error, Debug)]
pub enum InternalError {
    /// Generic internal error
    #[error("internal error: {message}")]
    Generic { message: String },

    /// Unexpected error condition
    #[error("unexpected error: {message}")]
    Unexpected { message: String },

    /// Host-side I/O failure
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum TetherError {
    /// Device communication and availability errors
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Target-preparation errors
    #[error("setup error: {0}")]
    Setup(#[from] SetupError),

    /// Build-content errors
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal/generic errors
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl TetherError {
    /// Returns the underlying [`DeviceError`] if this error is a
    /// device-availability failure.
    pub fn as_device_error(&self) -> Option<&DeviceError> {
        match self {
            TetherError::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TetherError {
    fn from(e: std::io::Error) -> Self {
        TetherError::Internal(InternalError::Io(e))
    }
}

/// Convenience type alias for Results with TetherError
pub type Result<T> = std::result::Result<T, TetherError>;
