//! Conditional device flashing
//!
//! [`DeviceFlasher`] puts a device onto a build's firmware: it reboots the
//! device into its flashing interface, checks board compatibility, brings
//! the bootloader and baseband up to the build's required versions (flashing
//! only when stale), writes the system image unconditionally, and handles
//! the user-data partition according to the configured
//! [`UserDataFlashOption`]. The device is left booted into its normal
//! runtime mode.
//!
//! Versioned components follow one compare-skip-or-flash-and-verify routine:
//! query the current version, skip if it already matches, otherwise flash
//! and re-query. An empty or unparseable version response counts as
//! "unknown" and always triggers a flash; ambiguity must never leave stale
//! firmware on the device.

use crate::build::DeviceBuildInfo;
use crate::device::TestDevice;
use crate::errors::{ConfigError, Result, SetupError};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::requirements::FirmwareRequirements;

/// Timeout for short flash-mode commands (`getvar`, `erase`).
const FLASH_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
/// Timeout for commands that transfer a full image to the device.
const IMAGE_TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

const BOOTLOADER_PARTITION: &str = "bootloader";
const BASEBAND_PARTITION: &str = "radio";
const SYSTEM_PARTITION: &str = "system";
const USERDATA_PARTITION: &str = "userdata";

const BOOTLOADER_VERSION_VAR: &str = "version-bootloader";
const BASEBAND_VERSION_VAR: &str = "version-baseband";

/// How the user-data partition is handled during flashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDataFlashOption {
    /// Erase user data before continuing.
    Wipe,
    /// Push a tests archive onto the data partition via the configured
    /// [`TestsZipInstaller`].
    TestsZip,
    /// Leave existing user data untouched.
    Retain,
    /// Erase user data even where a plain wipe would be skipped.
    ForceWipe,
}

impl UserDataFlashOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserDataFlashOption::Wipe => "wipe",
            UserDataFlashOption::TestsZip => "tests_zip",
            UserDataFlashOption::Retain => "retain",
            UserDataFlashOption::ForceWipe => "force_wipe",
        }
    }
}

/// Obtains firmware images that do not travel inside the build.
///
/// The bootloader image (and a baseband image the build does not carry) is
/// looked up by component name and required version. Implementations fetch
/// from a build archive or a local cache; a failed lookup is reported by the
/// flasher as a missing-resource setup error.
#[async_trait]
pub trait ImageRetriever: Send + Sync {
    async fn retrieve_image(&self, name: &str, version: &str) -> Result<PathBuf>;
}

/// Pushes a tests archive onto the device's data partition.
///
/// Used by [`UserDataFlashOption::TestsZip`]; runs with the device booted
/// into whatever mode the implementation needs, and the flasher restores the
/// flashing interface afterwards.
#[async_trait]
pub trait TestsZipInstaller: Send + Sync {
    async fn push_tests_zip(
        &self,
        device: &dyn TestDevice,
        build: &DeviceBuildInfo,
    ) -> Result<()>;
}

/// One versioned firmware component, fed to the shared
/// compare-skip-or-flash-and-verify routine.
struct FirmwareComponent<'a> {
    /// Human-readable component name for logs and errors.
    label: &'a str,
    /// Flash-mode variable that reports the installed version.
    version_var: &'a str,
    /// Partition the image is written to.
    partition: &'a str,
    /// Version the build requires.
    required_version: &'a str,
    /// Image carried by the build, if any; otherwise the retriever is asked.
    image: Option<&'a Path>,
    /// Whether the device must be rebooted back into its flashing interface
    /// after writing this component (the bootloader replaces the very
    /// interface being talked to).
    reboot_after_flash: bool,
}

/// Flashes device builds onto compatible devices.
pub struct DeviceFlasher {
    retriever: Box<dyn ImageRetriever>,
    user_data_option: UserDataFlashOption,
    tests_zip_installer: Option<Box<dyn TestsZipInstaller>>,
}

impl DeviceFlasher {
    pub fn new(retriever: Box<dyn ImageRetriever>) -> Self {
        Self {
            retriever,
            user_data_option: UserDataFlashOption::Wipe,
            tests_zip_installer: None,
        }
    }

    pub fn set_user_data_flash_option(&mut self, option: UserDataFlashOption) {
        self.user_data_option = option;
    }

    pub fn user_data_flash_option(&self) -> UserDataFlashOption {
        self.user_data_option
    }

    pub fn set_tests_zip_installer(&mut self, installer: Box<dyn TestsZipInstaller>) {
        self.tests_zip_installer = Some(installer);
    }

    /// Flash `build` onto `device`.
    ///
    /// Fails with a setup error when the device's board is incompatible, the
    /// metadata is unparseable, a required version cannot be reached, or any
    /// flash command reports non-success. A device-unavailable failure in
    /// any sub-step aborts the whole flash immediately and propagates.
    #[instrument(skip(self, device, build), fields(serial = device.serial_number(), build_id = build.info().build_id()))]
    pub async fn flash(&self, device: &dyn TestDevice, build: &DeviceBuildInfo) -> Result<()> {
        info!(
            "flashing build {} onto {}",
            build.info().build_id(),
            device.serial_number()
        );
        device.reboot_into_flash_mode().await?;
        let requirements = self.parse_requirements(build)?;
        self.verify_board(device, &requirements).await?;
        self.check_and_flash_bootloader(device, build, &requirements)
            .await?;
        self.check_and_flash_baseband(device, build, &requirements)
            .await?;
        self.flash_system_image(device, build).await?;
        self.flash_user_data(device, build).await?;
        device.reboot().await?;
        Ok(())
    }

    /// Read and parse the build's firmware metadata artifact.
    fn parse_requirements(&self, build: &DeviceBuildInfo) -> Result<FirmwareRequirements> {
        let path = build
            .info()
            .artifact(crate::build::FIRMWARE_METADATA_ARTIFACT)
            .ok_or_else(|| SetupError::Metadata {
                message: "build carries no firmware metadata artifact".to_string(),
            })?;
        let text = std::fs::read_to_string(path).map_err(|e| SetupError::Metadata {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        FirmwareRequirements::parse(&text)
    }

    /// Refuse to flash a device whose board is not among the build's
    /// acceptable boards. Runs before any flash-mode command is issued.
    async fn verify_board(
        &self,
        device: &dyn TestDevice,
        requirements: &FirmwareRequirements,
    ) -> Result<()> {
        if requirements.boards.is_empty() {
            return Err(SetupError::NoBoardsDeclared.into());
        }
        let board = device.product_type().await?.ok_or_else(|| {
            SetupError::UnknownBoard {
                serial: device.serial_number().to_string(),
            }
        })?;
        if !requirements.boards.contains(&board) {
            return Err(SetupError::BoardMismatch {
                device_board: board,
                acceptable: requirements.boards_for_display(),
            }
            .into());
        }
        debug!("board '{}' accepted", board);
        Ok(())
    }

    /// Bring the bootloader up to the build's required version, if it
    /// declares one. Returns whether an image was written.
    pub async fn check_and_flash_bootloader(
        &self,
        device: &dyn TestDevice,
        build: &DeviceBuildInfo,
        requirements: &FirmwareRequirements,
    ) -> Result<bool> {
        let required = requirements
            .bootloader_version
            .as_deref()
            .or(build.bootloader_version());
        let Some(required) = required else {
            debug!("build declares no bootloader version, skipping bootloader");
            return Ok(false);
        };
        self.check_and_flash_component(
            device,
            FirmwareComponent {
                label: "bootloader",
                version_var: BOOTLOADER_VERSION_VAR,
                partition: BOOTLOADER_PARTITION,
                required_version: required,
                image: None,
                reboot_after_flash: true,
            },
        )
        .await
    }

    /// Bring the baseband/radio up to the build's required version, if it
    /// declares one. Returns whether an image was written.
    pub async fn check_and_flash_baseband(
        &self,
        device: &dyn TestDevice,
        build: &DeviceBuildInfo,
        requirements: &FirmwareRequirements,
    ) -> Result<bool> {
        let required = requirements
            .baseband_version
            .as_deref()
            .or(build.baseband_version());
        let Some(required) = required else {
            debug!("build declares no baseband version, skipping baseband");
            return Ok(false);
        };
        self.check_and_flash_component(
            device,
            FirmwareComponent {
                label: "baseband",
                version_var: BASEBAND_VERSION_VAR,
                partition: BASEBAND_PARTITION,
                required_version: required,
                image: build.baseband_image(),
                reboot_after_flash: false,
            },
        )
        .await
    }

    /// The shared compare-skip-or-flash-and-verify sequence. The bootloader,
    /// the baseband, and any future versioned component run through this one
    /// routine so the unknown-version tie-break cannot drift between them.
    async fn check_and_flash_component(
        &self,
        device: &dyn TestDevice,
        component: FirmwareComponent<'_>,
    ) -> Result<bool> {
        let current = self.image_version(device, component.version_var).await?;
        if current.as_deref() == Some(component.required_version) {
            info!(
                "{} already at version {}, skipping",
                component.label, component.required_version
            );
            return Ok(false);
        }
        info!(
            "flashing {} (installed: {}, required: {})",
            component.label,
            current.as_deref().unwrap_or("unknown"),
            component.required_version
        );
        let image = match component.image {
            Some(path) => path.to_path_buf(),
            None => self
                .retriever
                .retrieve_image(component.label, component.required_version)
                .await
                .map_err(|e| SetupError::MissingResource {
                    name: component.label.to_string(),
                    version: component.required_version.to_string(),
                    message: e.to_string(),
                })?,
        };
        self.flash_partition(device, component.partition, &image)
            .await?;
        if component.reboot_after_flash {
            device.reboot_into_flash_mode().await?;
        }
        let flashed = self.image_version(device, component.version_var).await?;
        if flashed.as_deref() != Some(component.required_version) {
            return Err(SetupError::VersionMismatch {
                component: component.label.to_string(),
                expected: component.required_version.to_string(),
                actual: flashed.unwrap_or_else(|| "unknown".to_string()),
            }
            .into());
        }
        Ok(true)
    }

    /// Query the installed version of a firmware component.
    ///
    /// Returns `None` when the device reports no usable value; callers treat
    /// that as "unknown" and flash.
    pub async fn image_version(
        &self,
        device: &dyn TestDevice,
        version_var: &str,
    ) -> Result<Option<String>> {
        let result = device
            .execute_flash_command(&["getvar", version_var], FLASH_COMMAND_TIMEOUT)
            .await?;
        if !result.success() {
            return Err(SetupError::CommandFailed {
                command: format!("getvar {}", version_var),
                message: first_line(&result.stderr).to_string(),
            }
            .into());
        }
        // the flashing interface reports getvar output on stderr
        Ok(extract_variable(version_var, &result.stderr)
            .or_else(|| extract_variable(version_var, &result.stdout)))
    }

    /// Write the main device image. Not versioned like the firmware
    /// components; always flashed.
    async fn flash_system_image(
        &self,
        device: &dyn TestDevice,
        build: &DeviceBuildInfo,
    ) -> Result<()> {
        info!("flashing device image {}", build.device_image().display());
        self.flash_partition(device, SYSTEM_PARTITION, build.device_image())
            .await
    }

    /// Handle the user-data partition according to the configured option.
    pub async fn flash_user_data(
        &self,
        device: &dyn TestDevice,
        build: &DeviceBuildInfo,
    ) -> Result<()> {
        match self.user_data_option {
            UserDataFlashOption::Retain => {
                debug!("retaining existing user data");
                Ok(())
            }
            UserDataFlashOption::Wipe | UserDataFlashOption::ForceWipe => {
                info!("wiping user data");
                let result = device
                    .execute_flash_command(
                        &["erase", USERDATA_PARTITION],
                        FLASH_COMMAND_TIMEOUT,
                    )
                    .await?;
                if !result.success() {
                    return Err(SetupError::WipeFailed {
                        message: first_line(&result.stderr).to_string(),
                    }
                    .into());
                }
                Ok(())
            }
            UserDataFlashOption::TestsZip => {
                let installer =
                    self.tests_zip_installer
                        .as_ref()
                        .ok_or(ConfigError::MissingCollaborator {
                            name: "tests-zip installer".to_string(),
                        })?;
                info!("pushing tests archive onto data partition");
                installer.push_tests_zip(device, build).await?;
                // the installer leaves the device in runtime mode; later
                // steps expect the flashing interface back
                device.reboot_into_flash_mode().await?;
                Ok(())
            }
        }
    }

    async fn flash_partition(
        &self,
        device: &dyn TestDevice,
        partition: &str,
        image: &Path,
    ) -> Result<()> {
        let image_arg = image.display().to_string();
        let result = device
            .execute_flash_command(
                &["flash", partition, image_arg.as_str()],
                IMAGE_TRANSFER_TIMEOUT,
            )
            .await?;
        if !result.success() {
            return Err(SetupError::FlashFailed {
                partition: partition.to_string(),
                message: first_line(&result.stderr).to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Extract a `<name>: <value>` line from flash-mode command output. Returns
/// `None` for a missing line or an empty value.
fn extract_variable(name: &str, output: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"(?m)^{}:\s*(\S.*?)\s*$", regex::escape(name)))
        .expect("variable pattern is valid");
    pattern
        .captures(output)
        .map(|captures| captures[1].to_string())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
