//! Shared fixtures for the integration suites: a scriptable fake device, a
//! recording listener, and canned collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::build::{Build, BuildInfo, DeviceBuildInfo, FIRMWARE_METADATA_ARTIFACT};
use tether_core::device::{CommandResult, CommandStatus, DeviceRecovery, TestDevice};
use tether_core::errors::{DeviceError, InternalError, Result, TetherError};
use tether_core::invocation::DEVICE_SERIAL_ATTRIBUTE;
use tether_core::listener::{InvocationListener, LogKind, TestId};
use tether_core::payload::{CaseOutcome, PassiveCase, RemoteTest};
use tether_core::provider::BuildProvider;

pub const SERIAL: &str = "FAKESER01";

/// One scripted response to a flash-mode command.
pub enum FlashReply {
    /// Success whose payload (getvar style) arrives on stderr.
    Output(&'static str),
    /// Command ran but reported failure.
    Failure(&'static str),
    /// The device vanished while running the command.
    Unavailable(&'static str),
}

/// Scriptable in-memory device. Flash-mode commands consume replies from a
/// queue in order and every issued command is recorded for assertions; an
/// unscripted flash-mode command panics so tests cannot silently drift.
pub struct FakeDevice {
    serial: String,
    product: Option<String>,
    logcat: Vec<u8>,
    replies: Mutex<VecDeque<FlashReply>>,
    issued: Mutex<Vec<String>>,
    recovery_installed: Mutex<bool>,
    flash_mode_reboot_error: Mutex<Option<DeviceError>>,
    never_boots: bool,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            serial: SERIAL.to_string(),
            product: Some("trout".to_string()),
            logcat: b"--------- beginning of main\n".to_vec(),
            replies: Mutex::new(VecDeque::new()),
            issued: Mutex::new(Vec::new()),
            recovery_installed: Mutex::new(false),
            flash_mode_reboot_error: Mutex::new(None),
            never_boots: false,
        }
    }

    pub fn with_product(mut self, product: Option<&str>) -> Self {
        self.product = product.map(str::to_string);
        self
    }

    pub fn with_logcat(mut self, contents: &[u8]) -> Self {
        self.logcat = contents.to_vec();
        self
    }

    /// A device that never finishes booting; used to exercise wait bounds.
    pub fn that_never_boots(mut self) -> Self {
        self.never_boots = true;
        self
    }

    pub fn fail_flash_mode_reboot(self, error: DeviceError) -> Self {
        *self.flash_mode_reboot_error.lock().unwrap() = Some(error);
        self
    }

    pub fn push_reply(&self, reply: FlashReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Every command issued so far, flash-mode and otherwise, in order.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    pub fn recovery_installed(&self) -> bool {
        *self.recovery_installed.lock().unwrap()
    }

    fn record(&self, command: String) {
        self.issued.lock().unwrap().push(command);
    }
}

#[async_trait]
impl TestDevice for FakeDevice {
    fn serial_number(&self) -> &str {
        &self.serial
    }

    fn set_recovery(&self, _recovery: Arc<dyn DeviceRecovery>) {
        *self.recovery_installed.lock().unwrap() = true;
    }

    async fn execute_shell_command(
        &self,
        command: &str,
        _timeout: Duration,
    ) -> std::result::Result<CommandResult, DeviceError> {
        self.record(format!("shell {}", command));
        Ok(CommandResult::new(CommandStatus::Success))
    }

    async fn execute_flash_command(
        &self,
        args: &[&str],
        _timeout: Duration,
    ) -> std::result::Result<CommandResult, DeviceError> {
        let command = args.join(" ");
        self.record(command.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted flash-mode command: {}", command));
        match reply {
            FlashReply::Output(stderr) => {
                let mut result = CommandResult::new(CommandStatus::Success);
                result.stderr = stderr.to_string();
                Ok(result)
            }
            FlashReply::Failure(stderr) => {
                let mut result = CommandResult::new(CommandStatus::Failed);
                result.stderr = stderr.to_string();
                Ok(result)
            }
            FlashReply::Unavailable(message) => {
                Err(DeviceError::not_available(&self.serial, message))
            }
        }
    }

    async fn reboot_into_flash_mode(&self) -> std::result::Result<(), DeviceError> {
        if let Some(error) = self.flash_mode_reboot_error.lock().unwrap().take() {
            return Err(error);
        }
        self.record("reboot-flash-mode".to_string());
        Ok(())
    }

    async fn reboot(&self) -> std::result::Result<(), DeviceError> {
        self.record("reboot".to_string());
        Ok(())
    }

    async fn wait_for_available(&self) -> std::result::Result<(), DeviceError> {
        if self.never_boots {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn product_type(&self) -> std::result::Result<Option<String>, DeviceError> {
        Ok(self.product.clone())
    }

    async fn logcat(&self) -> std::result::Result<Vec<u8>, DeviceError> {
        Ok(self.logcat.clone())
    }

    async fn push_file(
        &self,
        local: &Path,
        remote: &str,
    ) -> std::result::Result<(), DeviceError> {
        self.record(format!("push {} {}", local.display(), remote));
        Ok(())
    }
}

/// Everything a listener can observe, flattened for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started {
        build_id: String,
        device_serial: Option<String>,
    },
    RunStarted(usize),
    Passed(String),
    Failed(String),
    Errored(String),
    RunEnded,
    Log(String),
    Ended,
    BuildError(String),
    InvocationFailed(String),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingListener {
    /// The listener to register and a handle to inspect afterwards.
    pub fn new() -> (Self, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: events.clone(),
            },
            events,
        )
    }
}

impl InvocationListener for RecordingListener {
    fn invocation_started(&mut self, build: &BuildInfo) {
        self.events.lock().unwrap().push(Event::Started {
            build_id: build.build_id().to_string(),
            device_serial: build.attribute(DEVICE_SERIAL_ATTRIBUTE).map(str::to_string),
        });
    }

    fn test_run_started(&mut self, count: usize) {
        self.events.lock().unwrap().push(Event::RunStarted(count));
    }

    fn test_passed(&mut self, test: &TestId) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Passed(test.to_string()));
    }

    fn test_failed(&mut self, test: &TestId, _trace: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Failed(test.to_string()));
    }

    fn test_errored(&mut self, test: &TestId, _trace: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Errored(test.to_string()));
    }

    fn test_run_ended(&mut self, _elapsed: Duration, _metrics: &HashMap<String, String>) {
        self.events.lock().unwrap().push(Event::RunEnded);
    }

    fn test_log(&mut self, name: &str, _kind: LogKind, _contents: &[u8]) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Log(name.to_string()));
    }

    fn invocation_ended(&mut self, _elapsed: Duration) {
        self.events.lock().unwrap().push(Event::Ended);
    }

    fn invocation_build_error(&mut self, _elapsed: Duration, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::BuildError(message.to_string()));
    }

    fn invocation_failed(&mut self, _elapsed: Duration, message: &str, _cause: &TetherError) {
        self.events
            .lock()
            .unwrap()
            .push(Event::InvocationFailed(message.to_string()));
    }
}

/// Provider yielding one canned build, recording `build_not_tested` calls.
pub struct FakeProvider {
    build: Option<Build>,
    not_tested: Arc<Mutex<Vec<String>>>,
}

impl FakeProvider {
    pub fn none() -> (Self, Arc<Mutex<Vec<String>>>) {
        Self::with(None)
    }

    pub fn with_build(build: Build) -> (Self, Arc<Mutex<Vec<String>>>) {
        Self::with(Some(build))
    }

    fn with(build: Option<Build>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let not_tested = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                build,
                not_tested: not_tested.clone(),
            },
            not_tested,
        )
    }
}

#[async_trait]
impl BuildProvider for FakeProvider {
    async fn get_build(&mut self) -> Result<Option<Build>> {
        Ok(self.build.take())
    }

    async fn build_not_tested(&mut self, build: &Build) {
        self.not_tested
            .lock()
            .unwrap()
            .push(build.info().build_id().to_string());
    }
}

/// Passive case with a canned outcome.
pub struct ScriptedCase {
    id: TestId,
    outcome: Option<Result<CaseOutcome>>,
}

impl ScriptedCase {
    pub fn passing(name: &str) -> Box<dyn PassiveCase> {
        Self::boxed(name, Ok(CaseOutcome::Passed))
    }

    pub fn failing(name: &str, trace: &str) -> Box<dyn PassiveCase> {
        Self::boxed(name, Ok(CaseOutcome::Failed(trace.to_string())))
    }

    pub fn losing_device(name: &str) -> Box<dyn PassiveCase> {
        Self::boxed(
            name,
            Err(DeviceError::not_available(SERIAL, "went away mid-case").into()),
        )
    }

    fn boxed(name: &str, outcome: Result<CaseOutcome>) -> Box<dyn PassiveCase> {
        Box::new(Self {
            id: TestId::new("FakeSuite", name),
            outcome: Some(outcome),
        })
    }
}

#[async_trait]
impl PassiveCase for ScriptedCase {
    fn id(&self) -> &TestId {
        &self.id
    }

    async fn run(&mut self, _device: &dyn TestDevice) -> Result<CaseOutcome> {
        self.outcome.take().expect("case ran twice")
    }
}

/// Self-reporting payload that emits a fixed run through the listener.
pub struct ScriptedRemoteTest;

#[async_trait]
impl RemoteTest for ScriptedRemoteTest {
    async fn run(
        &mut self,
        _device: &dyn TestDevice,
        listener: &mut dyn InvocationListener,
    ) -> Result<()> {
        listener.test_run_started(1);
        listener.test_passed(&TestId::new("RemoteSuite", "testRemote"));
        listener.test_run_ended(Duration::from_millis(1), &HashMap::new());
        Ok(())
    }
}

/// Retriever serving images from an in-memory map.
#[derive(Default)]
pub struct FakeRetriever {
    images: HashMap<(String, String), PathBuf>,
}

impl FakeRetriever {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, name: &str, version: &str, path: impl Into<PathBuf>) -> Self {
        self.images
            .insert((name.to_string(), version.to_string()), path.into());
        self
    }
}

#[async_trait]
impl tether_core::flash::ImageRetriever for FakeRetriever {
    async fn retrieve_image(&self, name: &str, version: &str) -> Result<PathBuf> {
        self.images
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| {
                TetherError::Internal(InternalError::Generic {
                    message: format!("no canned image for {} {}", name, version),
                })
            })
    }
}

/// Tests-zip installer that records how often it ran.
#[derive(Default)]
pub struct FakeZipInstaller {
    pushes: Arc<Mutex<usize>>,
}

impl FakeZipInstaller {
    pub fn new() -> (Self, Arc<Mutex<usize>>) {
        let pushes = Arc::new(Mutex::new(0));
        (
            Self {
                pushes: pushes.clone(),
            },
            pushes,
        )
    }
}

#[async_trait]
impl tether_core::flash::TestsZipInstaller for FakeZipInstaller {
    async fn push_tests_zip(
        &self,
        _device: &dyn TestDevice,
        _build: &DeviceBuildInfo,
    ) -> Result<()> {
        *self.pushes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Write a device build into `dir`: metadata text plus placeholder images.
pub fn device_build_in(dir: &Path, metadata: &str) -> DeviceBuildInfo {
    let metadata_path = dir.join("firmware-metadata.txt");
    std::fs::write(&metadata_path, metadata).unwrap();
    let device_image = dir.join("device.img");
    std::fs::write(&device_image, b"device image").unwrap();
    let userdata_image = dir.join("userdata.img");
    std::fs::write(&userdata_image, b"userdata image").unwrap();

    let mut info = BuildInfo::new("1234", "smoke", "trout-userdebug");
    info.add_artifact(FIRMWARE_METADATA_ARTIFACT, &metadata_path);
    DeviceBuildInfo::new(info, device_image, userdata_image)
}
