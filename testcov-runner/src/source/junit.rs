// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    coordinator::{HostFailure, HostRunSummary, RunSummary, TestCoordinator},
    identity::TestIdentity,
};
use std::sync::Arc;

/// Describes a test the way JUnit's `Description` does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Description {
    /// The fully qualified class name.
    pub class_name: String,

    /// The method name. Suite-level descriptions have none.
    pub method_name: Option<String>,
}

impl Description {
    /// Creates a description of a test method.
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: Some(method_name.into()),
        }
    }

    /// Creates a suite-level description of a class.
    pub fn class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: None,
        }
    }

    /// The identity of the described test.
    pub fn identity(&self) -> TestIdentity {
        match &self.method_name {
            Some(method) => TestIdentity::new(&self.class_name, method),
            None => TestIdentity::from_qualified(&self.class_name),
        }
    }
}

/// A failure reported by JUnit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    /// The test that failed.
    pub description: Description,

    /// The failure message, if any.
    pub message: Option<String>,
}

/// The result of a whole JUnit run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JunitResult {
    /// Every failure collected during the run.
    pub failures: Vec<Failure>,

    /// Every assumption failure collected during the run.
    pub assumption_failures: Vec<Failure>,
}

/// Forwards JUnit `RunListener` callbacks to a [`TestCoordinator`].
#[derive(Clone, Debug)]
pub struct JunitRunListener {
    coordinator: Arc<TestCoordinator>,
}

impl JunitRunListener {
    /// Creates a new listener.
    pub fn new(coordinator: Arc<TestCoordinator>) -> Self {
        Self { coordinator }
    }

    /// `testRunStarted`.
    pub fn test_run_started(&self, _description: &Description) {
        self.coordinator.run_started();
    }

    /// `testStarted`.
    pub fn test_started(&self, description: &Description) {
        self.coordinator.test_started(description.identity());
    }

    /// `testFailure`.
    pub fn test_failure(&self, failure: &Failure) {
        self.coordinator
            .test_failed(&failure.description.identity(), failure.message.clone());
    }

    /// `testAssumptionFailure`.
    pub fn test_assumption_failure(&self, failure: &Failure) {
        self.coordinator
            .test_assumption_failed(&failure.description.identity(), failure.message.clone());
    }

    /// `testIgnored`.
    pub fn test_ignored(&self, description: &Description) {
        self.coordinator.test_ignored(description.identity());
    }

    /// `testFinished`.
    pub fn test_finished(&self, description: &Description) {
        self.coordinator.test_finished(description.identity());
    }

    /// `testRunFinished`. Failures in `result` that were not already reported are applied before
    /// results are flushed.
    pub fn test_run_finished(&self, result: &JunitResult) -> RunSummary {
        let failures = result
            .failures
            .iter()
            .map(|failure| (failure, false))
            .chain(result.assumption_failures.iter().map(|failure| (failure, true)))
            .map(|(failure, assumption)| HostFailure {
                identity: failure.description.identity(),
                assumption,
                cause: failure.message.clone(),
            })
            .collect();
        self.coordinator.run_finished(HostRunSummary { failures })
    }
}
