//! Conditional device flashing: requirements parsing and the flasher itself.

pub mod flasher;
pub mod requirements;

pub use flasher::{DeviceFlasher, ImageRetriever, TestsZipInstaller, UserDataFlashOption};
pub use requirements::FirmwareRequirements;
