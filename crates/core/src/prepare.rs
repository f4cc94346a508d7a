//! Target preparation
//!
//! A target preparer makes a device ready to run a given build. The flashing
//! preparer hands the device to the [`DeviceFlasher`] and then waits,
//! bounded, for it to come back online; the stub preparer does nothing and
//! exists for payloads that run against whatever is already on the device.

use crate::build::Build;
use crate::device::TestDevice;
use crate::errors::{DeviceError, Result, SetupError};
use crate::flash::DeviceFlasher;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Default bound on waiting for a freshly flashed device to boot.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(300);

/// Makes a device ready to run a build.
#[async_trait]
pub trait TargetPreparer: Send {
    async fn set_up(&mut self, device: &dyn TestDevice, build: &Build) -> Result<()>;
}

/// Preparer that flashes the build onto the device.
pub struct FlashPreparer {
    flasher: DeviceFlasher,
    boot_timeout: Duration,
}

impl FlashPreparer {
    pub fn new(flasher: DeviceFlasher) -> Self {
        Self {
            flasher,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
        }
    }

    pub fn with_boot_timeout(mut self, boot_timeout: Duration) -> Self {
        self.boot_timeout = boot_timeout;
        self
    }
}

#[async_trait]
impl TargetPreparer for FlashPreparer {
    async fn set_up(&mut self, device: &dyn TestDevice, build: &Build) -> Result<()> {
        let device_build = match build {
            Build::Device(device_build) => device_build,
            Build::Generic(_) => {
                return Err(SetupError::Preparation {
                    message: "flashing requires a build with device images".to_string(),
                }
                .into());
            }
        };
        self.flasher.flash(device, device_build).await?;
        info!("waiting up to {:?} for device to boot", self.boot_timeout);
        wait_for_device(device, self.boot_timeout).await?;
        Ok(())
    }
}

/// Preparer that leaves the device as-is.
#[derive(Debug, Default)]
pub struct StubPreparer;

#[async_trait]
impl TargetPreparer for StubPreparer {
    async fn set_up(&mut self, _device: &dyn TestDevice, build: &Build) -> Result<()> {
        debug!(
            "stub preparer: leaving device untouched for build {}",
            build.info().build_id()
        );
        Ok(())
    }
}

/// Bound a device-availability wait with `timeout`. Exceeding the bound
/// surfaces as [`DeviceError::Timeout`] so the caller can apply device-level
/// recovery rather than treating it as a generic failure.
pub async fn wait_for_device(
    device: &dyn TestDevice,
    timeout: Duration,
) -> std::result::Result<(), DeviceError> {
    match tokio::time::timeout(timeout, device.wait_for_available()).await {
        Ok(result) => result,
        Err(_) => Err(DeviceError::Timeout {
            serial: device.serial_number().to_string(),
            timeout,
        }),
    }
}
