//! Device handle abstraction
//!
//! The harness never talks to hardware directly; it drives a [`TestDevice`]
//! trait object supplied by the caller. Implementations wrap a concrete
//! transport (USB, TCP, an emulator control socket). Every operation that
//! touches the device is async and must be bounded: implementations surface
//! an exceeded timeout as [`DeviceError::Timeout`], not as a generic failure,
//! so callers can apply device-level recovery.

use crate::errors::DeviceError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Outcome classification of one device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Command ran and exited successfully
    Success,
    /// Command ran and reported failure
    Failed,
    /// Command could not be run at all
    Exception,
    /// Command exceeded its timeout
    TimedOut,
}

/// Captured output of one device command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(status: CommandStatus) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// A handle to one device under test.
///
/// A handle is exclusively owned by one invocation for its duration; no two
/// invocations may operate the same handle concurrently. Methods take `&self`
/// so the handle can be shared down the call tree within that invocation;
/// implementations use interior mutability for connection state.
#[async_trait]
pub trait TestDevice: Send + Sync {
    /// The device's serial number.
    fn serial_number(&self) -> &str;

    /// Install a recovery strategy; subsequent operations may invoke it to
    /// self-heal on transient unresponsiveness. The harness installs the
    /// configured strategy at the start of each invocation but never decides
    /// recovery policy itself.
    fn set_recovery(&self, recovery: Arc<dyn DeviceRecovery>);

    /// Run a shell command on the booted device.
    async fn execute_shell_command(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, DeviceError>;

    /// Run a command against the device's flashing interface
    /// (bootloader-equivalent mode), e.g. `getvar`, `flash`, `erase`.
    async fn execute_flash_command(
        &self,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandResult, DeviceError>;

    /// Reboot the device into its flashing interface.
    async fn reboot_into_flash_mode(&self) -> Result<(), DeviceError>;

    /// Reboot the device into its normal runtime mode.
    async fn reboot(&self) -> Result<(), DeviceError>;

    /// Block until the device is responsive in its runtime mode. Callers
    /// bound this with a timeout; see [`crate::prepare::wait_for_device`].
    async fn wait_for_available(&self) -> Result<(), DeviceError>;

    /// The device's board/product identifier, if it reports one.
    async fn product_type(&self) -> Result<Option<String>, DeviceError>;

    /// Snapshot of the device's on-device log.
    async fn logcat(&self) -> Result<Vec<u8>, DeviceError>;

    /// Push a local file onto the device's filesystem.
    async fn push_file(&self, local: &Path, remote: &str) -> Result<(), DeviceError>;
}

/// Policy for restoring an unresponsive device to a usable state.
///
/// Implemented outside the core; the invocation pipeline only installs the
/// configured strategy on the device handle.
#[async_trait]
pub trait DeviceRecovery: Send + Sync {
    async fn recover(&self, device: &dyn TestDevice) -> Result<(), DeviceError>;
}

/// Recovery strategy that never recovers: the unavailability is reported
/// straight back. Useful for callers that want failures surfaced immediately.
#[derive(Debug, Default)]
pub struct NoRecovery;

#[async_trait]
impl DeviceRecovery for NoRecovery {
    async fn recover(&self, device: &dyn TestDevice) -> Result<(), DeviceError> {
        Err(DeviceError::not_available(
            device.serial_number(),
            "recovery disabled",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_success() {
        assert!(CommandResult::new(CommandStatus::Success).success());
        assert!(!CommandResult::new(CommandStatus::Failed).success());
        assert!(!CommandResult::new(CommandStatus::TimedOut).success());
        assert!(!CommandResult::new(CommandStatus::Exception).success());
    }
}
