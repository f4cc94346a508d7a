//! Build descriptors
//!
//! A [`BuildInfo`] identifies one unit of software under test: a build id, a
//! logical test tag, a build target name, an open attribute map, and a set of
//! named artifact files. A [`DeviceBuildInfo`] extends it with the device
//! image files needed for flashing.
//!
//! Artifact files may live inside scratch directories owned by the build.
//! Ownership is explicit: the invocation that received a build must call
//! [`Build::release`] exactly once when it is done, which deletes the owned
//! scratch directories. Artifact paths are only valid until release.

use crate::errors::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the artifact carrying the build's firmware metadata
/// (`require <key>=<value>` declarations consumed by the flasher).
pub const FIRMWARE_METADATA_ARTIFACT: &str = "firmware-metadata";

/// Identifies a unit of software under test.
#[derive(Debug, Default)]
pub struct BuildInfo {
    build_id: String,
    test_tag: String,
    build_target: String,
    attributes: HashMap<String, String>,
    artifacts: HashMap<String, PathBuf>,
    scratch_dirs: Vec<PathBuf>,
    released: bool,
}

impl BuildInfo {
    /// Create a new build descriptor.
    pub fn new(
        build_id: impl Into<String>,
        test_tag: impl Into<String>,
        build_target: impl Into<String>,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            test_tag: test_tag.into(),
            build_target: build_target.into(),
            ..Default::default()
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn test_tag(&self) -> &str {
        &self.test_tag
    }

    pub fn build_target(&self) -> &str {
        &self.build_target
    }

    /// Record an ancillary fact about this build (e.g. the serial of the
    /// device it ran on). Keys are unique; setting an existing key replaces
    /// its value.
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Associate a named artifact file with this build.
    pub fn add_artifact(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.artifacts.insert(name.into(), path.into());
    }

    pub fn artifact(&self, name: &str) -> Option<&Path> {
        self.artifacts.get(name).map(PathBuf::as_path)
    }

    /// Allocate a scratch directory owned by this build. The directory is
    /// deleted when the build is released.
    pub fn allocate_scratch_dir(&mut self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("tether-build-")
            .tempdir()?
            .into_path();
        self.scratch_dirs.push(dir.clone());
        Ok(dir)
    }

    /// Take ownership of an existing directory; it is deleted on release.
    pub fn own_scratch_dir(&mut self, dir: impl Into<PathBuf>) {
        self.scratch_dirs.push(dir.into());
    }

    /// Deep-copy this build. Owned scratch directories are copied into fresh
    /// temp directories (never aliased), and artifact paths that pointed into
    /// an owned directory are remapped into its copy.
    pub fn try_clone(&self) -> Result<BuildInfo> {
        let mut clone = BuildInfo {
            build_id: self.build_id.clone(),
            test_tag: self.test_tag.clone(),
            build_target: self.build_target.clone(),
            attributes: self.attributes.clone(),
            artifacts: self.artifacts.clone(),
            scratch_dirs: Vec::with_capacity(self.scratch_dirs.len()),
            released: false,
        };
        for original in &self.scratch_dirs {
            let copy = tempfile::Builder::new()
                .prefix("tether-build-")
                .tempdir()?
                .into_path();
            copy_dir_recursive(original, &copy)?;
            for path in clone.artifacts.values_mut() {
                if let Ok(rest) = path.strip_prefix(original) {
                    *path = copy.join(rest);
                }
            }
            clone.scratch_dirs.push(copy);
        }
        Ok(clone)
    }

    /// Delete the scratch directories owned by this build. Idempotent: the
    /// second and later calls are no-ops. Artifact paths are invalid after
    /// the first call.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for dir in self.scratch_dirs.drain(..) {
            debug!("removing build scratch dir {}", dir.display());
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(
                    "failed to remove build scratch dir {}: {}",
                    dir.display(),
                    e
                );
            }
        }
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// A build descriptor carrying device images for flashing.
#[derive(Debug)]
pub struct DeviceBuildInfo {
    info: BuildInfo,
    device_image: PathBuf,
    userdata_image: PathBuf,
    baseband_image: Option<PathBuf>,
    baseband_version: Option<String>,
    bootloader_version: Option<String>,
}

impl DeviceBuildInfo {
    /// Create a device build around a base descriptor and its two mandatory
    /// images.
    pub fn new(
        info: BuildInfo,
        device_image: impl Into<PathBuf>,
        userdata_image: impl Into<PathBuf>,
    ) -> Self {
        Self {
            info,
            device_image: device_image.into(),
            userdata_image: userdata_image.into(),
            baseband_image: None,
            baseband_version: None,
            bootloader_version: None,
        }
    }

    pub fn info(&self) -> &BuildInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut BuildInfo {
        &mut self.info
    }

    pub fn device_image(&self) -> &Path {
        &self.device_image
    }

    pub fn userdata_image(&self) -> &Path {
        &self.userdata_image
    }

    /// Attach a baseband/radio image and its declared version.
    pub fn set_baseband_image(&mut self, image: impl Into<PathBuf>, version: impl Into<String>) {
        self.baseband_image = Some(image.into());
        self.baseband_version = Some(version.into());
    }

    pub fn baseband_image(&self) -> Option<&Path> {
        self.baseband_image.as_deref()
    }

    pub fn baseband_version(&self) -> Option<&str> {
        self.baseband_version.as_deref()
    }

    pub fn set_bootloader_version(&mut self, version: impl Into<String>) {
        self.bootloader_version = Some(version.into());
    }

    pub fn bootloader_version(&self) -> Option<&str> {
        self.bootloader_version.as_deref()
    }

    /// Deep-copy, see [`BuildInfo::try_clone`].
    pub fn try_clone(&self) -> Result<DeviceBuildInfo> {
        Ok(DeviceBuildInfo {
            info: self.info.try_clone()?,
            device_image: self.device_image.clone(),
            userdata_image: self.userdata_image.clone(),
            baseband_image: self.baseband_image.clone(),
            baseband_version: self.baseband_version.clone(),
            bootloader_version: self.bootloader_version.clone(),
        })
    }
}

/// A build as yielded by a provider: either a plain build or one carrying
/// device images. Components that need the device shape (the flasher, the
/// flash preparer) match on the variant instead of downcasting.
#[derive(Debug)]
pub enum Build {
    Generic(BuildInfo),
    Device(DeviceBuildInfo),
}

impl Build {
    pub fn info(&self) -> &BuildInfo {
        match self {
            Build::Generic(info) => info,
            Build::Device(build) => build.info(),
        }
    }

    pub fn info_mut(&mut self) -> &mut BuildInfo {
        match self {
            Build::Generic(info) => info,
            Build::Device(build) => build.info_mut(),
        }
    }

    /// Release owned artifacts, see [`BuildInfo::release`].
    pub fn release(&mut self) {
        self.info_mut().release();
    }

    pub fn try_clone(&self) -> Result<Build> {
        Ok(match self {
            Build::Generic(info) => Build::Generic(info.try_clone()?),
            Build::Device(build) => Build::Device(build.try_clone()?),
        })
    }
}
