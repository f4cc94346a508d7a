//! Invocation orchestration
//!
//! [`Invocation::invoke`] sequences one end-to-end run against one device:
//! acquire a build, prepare the target (which may flash), execute the test
//! payload, report results. The phases run in fixed order; a phase failure
//! short-circuits the remaining phases but never the cleanup.
//!
//! `invoke` fails only by propagating a device-unavailability condition.
//! Every other failure is absorbed into the reporting protocol: the listener
//! receives log artifacts and exactly one terminal callback matching the
//! computed status. Separating BUILD_ERROR from FAILED lets downstream
//! systems distinguish "stop testing this build" from "this run or
//! environment is broken, retrying is reasonable"; the coordinator itself
//! never retries.

use crate::build::Build;
use crate::device::{DeviceRecovery, TestDevice};
use crate::errors::{DeviceError, Result, TetherError};
use crate::listener::{InvocationListener, ListenerFanout, LogKind};
use crate::logging::HarnessLog;
use crate::payload::TestPayload;
use crate::prepare::TargetPreparer;
use crate::provider::BuildProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Attribute key under which the device serial is recorded on the build.
pub const DEVICE_SERIAL_ATTRIBUTE: &str = "device_serial";
/// Name of the attached on-device log artifact.
pub const DEVICE_LOG_NAME: &str = "device_logcat";
/// Name of the attached harness log artifact.
pub const HARNESS_LOG_NAME: &str = "tether_log";

/// Terminal classification of one invocation. Selects which terminal
/// listener callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    BuildError,
    Failed,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Success => "success",
            InvocationStatus::BuildError => "build_error",
            InvocationStatus::Failed => "failed",
        }
    }

    /// Map a phase failure to the terminal status. Build-content failures
    /// select the build-error callback; everything else, including
    /// device-unavailability, marks the invocation failed.
    fn for_error(error: &TetherError) -> Self {
        match error {
            TetherError::Build(_) => InvocationStatus::BuildError,
            _ => InvocationStatus::Failed,
        }
    }
}

/// Collaborators and sinks wired into one invocation.
pub struct InvocationConfig {
    /// Upstream source of builds to test.
    pub build_provider: Box<dyn BuildProvider>,
    /// Makes the device ready to run the build; may flash.
    pub preparer: Box<dyn TargetPreparer>,
    /// Recovery strategy installed on the device handle for the duration.
    pub recovery: Arc<dyn DeviceRecovery>,
    /// The tests to execute against the prepared device.
    pub payload: TestPayload,
    /// Result sink; fan out to several listeners by registering them here.
    pub listener: ListenerFanout,
}

/// Runs invocations.
#[derive(Debug, Default)]
pub struct Invocation;

impl Invocation {
    pub fn new() -> Self {
        Self
    }

    /// Run one invocation of `config` against `device`.
    ///
    /// Returns `Err` only when the device became unavailable; the error is
    /// re-raised after logs are attached, the terminal callback has fired,
    /// and the build's artifacts are released. All other failures are
    /// reported through the listener and absorbed.
    ///
    /// When the provider has nothing to test, the invocation ends silently:
    /// no listener callbacks fire and no build cleanup is owed.
    #[instrument(skip(self, device, config), fields(serial = device.serial_number()))]
    pub async fn invoke(
        &self,
        device: &dyn TestDevice,
        config: &mut InvocationConfig,
    ) -> std::result::Result<(), DeviceError> {
        let mut log = HarnessLog::new();
        let mut build = match config.build_provider.get_build().await {
            Ok(Some(build)) => build,
            Ok(None) => {
                info!("no build to test");
                return Ok(());
            }
            Err(e) => {
                // no listener contract has begun yet, so there is no one to
                // report this to beyond the harness's own log
                error!("failed to obtain a build: {}", e);
                return Ok(());
            }
        };
        info!("starting invocation for build {}", build.info().build_id());
        log.record(format!(
            "invocation started for build {} on device {}",
            build.info().build_id(),
            device.serial_number()
        ));
        build
            .info_mut()
            .add_attribute(DEVICE_SERIAL_ATTRIBUTE, device.serial_number());
        device.set_recovery(Arc::clone(&config.recovery));

        let result = self.perform(device, config, &mut build, &mut log).await;
        // artifacts are released exactly once, whatever happened above
        build.release();
        result
    }

    /// The reporting core: emits the start callback, runs preparation and
    /// the payload, classifies the outcome, attaches logs, and fires exactly
    /// one terminal callback.
    async fn perform(
        &self,
        device: &dyn TestDevice,
        config: &mut InvocationConfig,
        build: &mut Build,
        log: &mut HarnessLog,
    ) -> std::result::Result<(), DeviceError> {
        let InvocationConfig {
            build_provider,
            preparer,
            payload,
            listener,
            ..
        } = config;

        let start = Instant::now();
        listener.invocation_started(build.info());

        let outcome = run_phases(device, preparer.as_mut(), payload, listener, build, log).await;

        let status = match &outcome {
            Ok(()) => InvocationStatus::Success,
            Err(e) => InvocationStatus::for_error(e),
        };
        if let Err(e) = &outcome {
            match status {
                InvocationStatus::BuildError => warn!(
                    "build {} failed on device {}: {}",
                    build.info().build_id(),
                    device.serial_number(),
                    e
                ),
                _ => error!("invocation failed: {}", e),
            }
            log.record(format!("{}: {}", status.as_str(), e));
        }

        // log artifacts always precede the terminal callback
        match device.logcat().await {
            Ok(contents) => listener.test_log(DEVICE_LOG_NAME, LogKind::Logcat, &contents),
            Err(e) => warn!("failed to capture device log: {}", e),
        }
        listener.test_log(HARNESS_LOG_NAME, LogKind::Text, log.contents().as_bytes());

        let elapsed = start.elapsed();
        let message = outcome
            .as_ref()
            .err()
            .map(ToString::to_string)
            .unwrap_or_default();
        match status {
            InvocationStatus::Success => listener.invocation_ended(elapsed),
            InvocationStatus::BuildError => listener.invocation_build_error(elapsed, &message),
            InvocationStatus::Failed => {
                if let Err(cause) = &outcome {
                    listener.invocation_failed(elapsed, &message, cause);
                }
                build_provider.build_not_tested(build).await;
            }
        }

        // device unavailability is the one condition the caller observes
        match outcome {
            Err(TetherError::Device(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

/// The failable phases, in fixed order: target preparation, then payload
/// execution. The first failure short-circuits what remains.
async fn run_phases(
    device: &dyn TestDevice,
    preparer: &mut dyn TargetPreparer,
    payload: &mut TestPayload,
    listener: &mut ListenerFanout,
    build: &Build,
    log: &mut HarnessLog,
) -> Result<()> {
    preparer.set_up(device, build).await?;
    log.record("target preparation complete");
    payload.run(device, listener).await?;
    log.record("test payload complete");
    Ok(())
}
