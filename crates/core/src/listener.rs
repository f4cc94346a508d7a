//! Invocation result listeners
//!
//! Listeners receive the ordered lifecycle callbacks for one invocation:
//! start, zero or more run-level callbacks, log attachments, and exactly one
//! terminal callback. Results are forwarded as they happen; nothing is
//! buffered, so a listener has every result delivered before an abort.

use crate::build::BuildInfo;
use crate::errors::TetherError;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Identifies one test case within a suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestId {
    pub suite: String,
    pub name: String,
}

impl TestId {
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.suite, self.name)
    }
}

/// Content classification of an attached log artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Plain text
    Text,
    /// On-device log stream
    Logcat,
}

/// Receives lifecycle and result callbacks for one invocation.
///
/// All methods have empty default bodies so listeners only implement what
/// they care about. Callback order within one invocation is fixed:
/// `invocation_started`, run-level callbacks, `test_log` attachments, then
/// exactly one of `invocation_ended` / `invocation_build_error` /
/// `invocation_failed`.
pub trait InvocationListener: Send {
    /// The invocation acquired a build and is starting.
    fn invocation_started(&mut self, _build: &BuildInfo) {}

    /// A test run with the given case count is starting.
    fn test_run_started(&mut self, _count: usize) {}

    fn test_passed(&mut self, _test: &TestId) {}

    fn test_failed(&mut self, _test: &TestId, _trace: &str) {}

    fn test_errored(&mut self, _test: &TestId, _trace: &str) {}

    /// The test run finished; `metrics` carries run-level measurements.
    fn test_run_ended(&mut self, _elapsed: Duration, _metrics: &HashMap<String, String>) {}

    /// A named log artifact is attached to the invocation.
    fn test_log(&mut self, _name: &str, _kind: LogKind, _contents: &[u8]) {}

    /// Terminal callback: the invocation completed successfully.
    fn invocation_ended(&mut self, _elapsed: Duration) {}

    /// Terminal callback: the build itself was unusable.
    fn invocation_build_error(&mut self, _elapsed: Duration, _message: &str) {}

    /// Terminal callback: the run or environment failed.
    fn invocation_failed(&mut self, _elapsed: Duration, _message: &str, _cause: &TetherError) {}
}

/// Forwards every callback to an ordered set of listeners.
///
/// Callers fan an invocation out to several sinks (console reporter, result
/// uploader, metrics collector) by registering each with the fanout and
/// handing the fanout to the invocation.
#[derive(Default)]
pub struct ListenerFanout {
    listeners: Vec<Box<dyn InvocationListener>>,
}

impl ListenerFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Box<dyn InvocationListener>) {
        self.listeners.push(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl InvocationListener for ListenerFanout {
    fn invocation_started(&mut self, build: &BuildInfo) {
        for listener in &mut self.listeners {
            listener.invocation_started(build);
        }
    }

    fn test_run_started(&mut self, count: usize) {
        for listener in &mut self.listeners {
            listener.test_run_started(count);
        }
    }

    fn test_passed(&mut self, test: &TestId) {
        for listener in &mut self.listeners {
            listener.test_passed(test);
        }
    }

    fn test_failed(&mut self, test: &TestId, trace: &str) {
        for listener in &mut self.listeners {
            listener.test_failed(test, trace);
        }
    }

    fn test_errored(&mut self, test: &TestId, trace: &str) {
        for listener in &mut self.listeners {
            listener.test_errored(test, trace);
        }
    }

    fn test_run_ended(&mut self, elapsed: Duration, metrics: &HashMap<String, String>) {
        for listener in &mut self.listeners {
            listener.test_run_ended(elapsed, metrics);
        }
    }

    fn test_log(&mut self, name: &str, kind: LogKind, contents: &[u8]) {
        for listener in &mut self.listeners {
            listener.test_log(name, kind, contents);
        }
    }

    fn invocation_ended(&mut self, elapsed: Duration) {
        for listener in &mut self.listeners {
            listener.invocation_ended(elapsed);
        }
    }

    fn invocation_build_error(&mut self, elapsed: Duration, message: &str) {
        for listener in &mut self.listeners {
            listener.invocation_build_error(elapsed, message);
        }
    }

    fn invocation_failed(&mut self, elapsed: Duration, message: &str, cause: &TetherError) {
        for listener in &mut self.listeners {
            listener.invocation_failed(elapsed, message, cause);
        }
    }
}
