// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    coordinator::{HostFailure, HostRunSummary, RunSummary, TestCoordinator},
    identity::TestIdentity,
};
use std::sync::Arc;
use tracing::debug;

/// The numeric status of a TestNG `ITestResult`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestngStatus {
    /// `SUCCESS` (1).
    Success,
    /// `FAILURE` (2).
    Failure,
    /// `SKIP` (3).
    Skip,
    /// `SUCCESS_PERCENTAGE_FAILURE` (4).
    SuccessPercentageFailure,
    /// `STARTED` (16).
    Started,
}

impl TestngStatus {
    /// Maps a raw status code, returning `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Success),
            2 => Some(Self::Failure),
            3 => Some(Self::Skip),
            4 => Some(Self::SuccessPercentageFailure),
            16 => Some(Self::Started),
            _ => None,
        }
    }
}

/// The parts of a TestNG `ITestResult` that are needed here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestngResult {
    /// The real class name of the test.
    pub class_name: String,

    /// The test method name.
    pub method_name: String,

    /// The raw status code.
    pub status: i32,

    /// The message of the throwable, if the test threw.
    pub throwable: Option<String>,
}

impl TestngResult {
    /// The identity of this test.
    pub fn identity(&self) -> TestIdentity {
        TestIdentity::new(&self.class_name, &self.method_name)
    }
}

/// The parts of a TestNG `ITestContext` that are needed here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestngContext {
    /// The context name, usually the `<test>` tag name.
    pub name: String,

    /// Failed results collected by the context, including configuration failures attributed to
    /// test methods.
    pub failed_tests: Vec<TestngResult>,
}

/// Forwards TestNG `ITestListener` callbacks to a [`TestCoordinator`].
#[derive(Clone, Debug)]
pub struct TestngListener {
    coordinator: Arc<TestCoordinator>,
}

impl TestngListener {
    /// Creates a new listener.
    pub fn new(coordinator: Arc<TestCoordinator>) -> Self {
        Self { coordinator }
    }

    /// `onStart`.
    pub fn on_start(&self, context: &TestngContext) {
        debug!("testng context `{}` started", context.name);
        self.coordinator.run_started();
    }

    /// `onTestStart`.
    pub fn on_test_start(&self, result: &TestngResult) {
        self.coordinator.test_started(result.identity());
    }

    /// `onTestSuccess`.
    pub fn on_test_success(&self, result: &TestngResult) {
        self.coordinator.test_finished(result.identity());
    }

    /// `onTestFailure`.
    pub fn on_test_failure(&self, result: &TestngResult) {
        let identity = result.identity();
        self.coordinator
            .test_failed(&identity, result.throwable.clone());
        self.coordinator.test_finished(identity);
    }

    /// `onTestSkipped`.
    pub fn on_test_skipped(&self, result: &TestngResult) {
        self.coordinator.test_ignored(result.identity());
    }

    /// `onTestFailedButWithinSuccessPercentage`. The test counts as succeeded.
    pub fn on_test_failed_but_within_success_percentage(&self, result: &TestngResult) {
        self.coordinator.test_finished(result.identity());
    }

    /// Dispatches on the status code carried by `result`.
    ///
    /// This is for hosts that forward results generically rather than through the typed
    /// callbacks. An unknown status code is a protocol mismatch and ends the test as failed.
    pub fn on_test_result(&self, result: &TestngResult) {
        match TestngStatus::from_code(result.status) {
            Some(TestngStatus::Started) => self.on_test_start(result),
            Some(TestngStatus::Success) => self.on_test_success(result),
            Some(TestngStatus::Failure) => self.on_test_failure(result),
            Some(TestngStatus::Skip) => self.on_test_skipped(result),
            Some(TestngStatus::SuccessPercentageFailure) => {
                self.on_test_failed_but_within_success_percentage(result)
            }
            None => self.coordinator.finish_with_mismatch(
                result.identity(),
                &format!("unknown TestNG result status {}", result.status),
            ),
        }
    }

    /// `onFinish`. Failures recorded by the context that were not already reported are applied
    /// before results are flushed.
    pub fn on_finish(&self, context: &TestngContext) -> RunSummary {
        debug!("testng context `{}` finished", context.name);
        let failures = context
            .failed_tests
            .iter()
            .map(|result| HostFailure {
                identity: result.identity(),
                assumption: false,
                cause: result.throwable.clone(),
            })
            .collect();
        self.coordinator.run_finished(HostRunSummary { failures })
    }
}
