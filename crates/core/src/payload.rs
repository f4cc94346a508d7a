//! Test payloads
//!
//! Two payload shapes run against a prepared device, distinguished by a
//! tagged variant rather than downcasting:
//!
//! - A self-reporting payload drives its own run/result callbacks on the
//!   listener; the harness only injects the device handle and listener.
//! - A passive payload is a fixed collection of cases with no reporting of
//!   its own; the adapter here brackets the collection with run callbacks
//!   and forwards each case's outcome to the listener as it happens, one to
//!   one, so nothing is lost if the device disappears mid-run.

use crate::device::TestDevice;
use crate::errors::Result;
use crate::listener::{InvocationListener, TestId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// A payload that reports its own start/end/result callbacks.
#[async_trait]
pub trait RemoteTest: Send {
    async fn run(
        &mut self,
        device: &dyn TestDevice,
        listener: &mut dyn InvocationListener,
    ) -> Result<()>;
}

/// Outcome of one passive test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Failed(String),
    Errored(String),
}

/// One test case in a passive collection.
#[async_trait]
pub trait PassiveCase: Send {
    fn id(&self) -> &TestId;

    /// Run the case. `Err` is reserved for harness-level failures (device
    /// lost); an assertion failure is a [`CaseOutcome::Failed`].
    async fn run(&mut self, device: &dyn TestDevice) -> Result<CaseOutcome>;
}

/// The test payload of one invocation.
pub enum TestPayload {
    /// Invoked directly with the listener; solely responsible for its own
    /// run callbacks.
    SelfReporting(Box<dyn RemoteTest>),
    /// A fixed case collection, adapted to the listener by the harness.
    Passive(Vec<Box<dyn PassiveCase>>),
}

impl TestPayload {
    /// Execute the payload against the listener. Results are forwarded
    /// directly, never buffered.
    pub async fn run(
        &mut self,
        device: &dyn TestDevice,
        listener: &mut dyn InvocationListener,
    ) -> Result<()> {
        match self {
            TestPayload::SelfReporting(test) => {
                debug!("running self-reporting payload");
                test.run(device, listener).await
            }
            TestPayload::Passive(cases) => run_passive(cases, device, listener).await,
        }
    }
}

/// Bridge a passive case collection onto the listener protocol.
async fn run_passive(
    cases: &mut [Box<dyn PassiveCase>],
    device: &dyn TestDevice,
    listener: &mut dyn InvocationListener,
) -> Result<()> {
    info!("running {} test cases", cases.len());
    listener.test_run_started(cases.len());
    let start = Instant::now();
    let mut outcome = Ok(());
    for case in cases.iter_mut() {
        match case.run(device).await {
            Ok(CaseOutcome::Passed) => listener.test_passed(case.id()),
            Ok(CaseOutcome::Failed(trace)) => listener.test_failed(case.id(), &trace),
            Ok(CaseOutcome::Errored(trace)) => listener.test_errored(case.id(), &trace),
            Err(e) => {
                // abort the remaining cases; delivered results stand
                outcome = Err(e);
                break;
            }
        }
    }
    listener.test_run_ended(start.elapsed(), &HashMap::new());
    outcome
}
