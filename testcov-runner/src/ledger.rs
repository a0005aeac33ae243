// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test status tracking.
//!
//! A [`TestRecord`] collects the lifecycle events reported for one test occurrence in arrival
//! order. The final verdict is folded from those events only when the record is closed, which
//! happens after the host framework's run-level failure sweep has been applied.

use crate::identity::TestIdentity;
use serde::Serialize;
use std::fmt;
use testcov_metadata::FinalStatus;

/// A lifecycle event for a single test occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusEvent {
    /// The test started running.
    Started,

    /// The test was skipped. This is terminal.
    Ignored,

    /// The test reported a failure.
    Failed,

    /// An assumption of the test did not hold.
    AssumptionFailed,

    /// The test finished running.
    Finished,
}

impl StatusEvent {
    /// Returns true if this event ends the execution of a test.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ignored | Self::Finished)
    }

    /// Returns true if this event can be reported after a test has finished.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::AssumptionFailed)
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
            Self::AssumptionFailed => "assumption failed",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Folds an event sequence into a final status.
///
/// Precedence is `Ignored > AssumptionFailed > Failed > Succeeded`; a sequence with no
/// failure-like event is `Succeeded`.
pub fn fold_events(events: &[StatusEvent]) -> FinalStatus {
    events
        .iter()
        .filter_map(|event| match event {
            StatusEvent::Ignored => Some(FinalStatus::Ignored),
            StatusEvent::AssumptionFailed => Some(FinalStatus::AssumptionFailed),
            StatusEvent::Failed => Some(FinalStatus::Failed),
            StatusEvent::Started | StatusEvent::Finished => None,
        })
        .max()
        .unwrap_or(FinalStatus::Succeeded)
}

/// The events and diagnostics reported for one test occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestRecord {
    identity: TestIdentity,
    occurrence: u32,
    events: Vec<StatusEvent>,
    causes: Vec<String>,
}

impl TestRecord {
    /// Creates a record whose first event is `first`.
    pub fn new(identity: TestIdentity, occurrence: u32, first: StatusEvent) -> Self {
        Self {
            identity,
            occurrence,
            events: vec![first],
            causes: Vec::new(),
        }
    }

    /// The identity of this test.
    pub fn identity(&self) -> &TestIdentity {
        &self.identity
    }

    /// The zero-based occurrence of this test's name in the coordinator's lifetime.
    pub fn occurrence(&self) -> u32 {
        self.occurrence
    }

    /// All events registered so far, in arrival order.
    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    /// Diagnostic messages attached to failure events.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// Returns true once a terminal event has been registered.
    pub fn is_terminal(&self) -> bool {
        self.events.iter().any(|event| event.is_terminal())
    }

    /// Appends an event, along with an optional diagnostic cause.
    pub fn register(&mut self, event: StatusEvent, cause: Option<String>) {
        self.events.push(event);
        if let Some(cause) = cause {
            self.causes.push(cause);
        }
    }

    /// Attaches a diagnostic cause to the most recent event.
    pub fn add_cause(&mut self, cause: String) {
        self.causes.push(cause);
    }

    /// Returns true if a failure with exactly this cause was already registered.
    pub fn has_cause(&self, cause: &str) -> bool {
        self.causes.iter().any(|c| c == cause)
    }

    /// Closes the record, computing its final status.
    pub fn close(self) -> ClosedRecord {
        let final_status = fold_events(&self.events);
        ClosedRecord {
            record: self,
            final_status,
        }
    }
}

/// A record whose final status has been computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosedRecord {
    /// The underlying record.
    pub record: TestRecord,

    /// The final status.
    pub final_status: FinalStatus,
}

/// Counters for every event kind registered by one coordinator.
///
/// Counters are never reset, so a coordinator that sees several runs reports cumulative
/// numbers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunStatistics {
    /// The number of `Started` events.
    pub started: usize,

    /// The number of `Ignored` events.
    pub ignored: usize,

    /// The number of `Failed` events.
    pub failed: usize,

    /// The number of `AssumptionFailed` events.
    pub assumption_failed: usize,

    /// The number of `Finished` events.
    pub finished: usize,
}

impl RunStatistics {
    /// Increments the counter for `event`.
    pub fn record(&mut self, event: StatusEvent) {
        let counter = match event {
            StatusEvent::Started => &mut self.started,
            StatusEvent::Ignored => &mut self.ignored,
            StatusEvent::Failed => &mut self.failed,
            StatusEvent::AssumptionFailed => &mut self.assumption_failed,
            StatusEvent::Finished => &mut self.finished,
        };
        *counter += 1;
    }

    /// Returns the counter for `event`.
    pub fn count(&self, event: StatusEvent) -> usize {
        match event {
            StatusEvent::Started => self.started,
            StatusEvent::Ignored => self.ignored,
            StatusEvent::Failed => self.failed,
            StatusEvent::AssumptionFailed => self.assumption_failed,
            StatusEvent::Finished => self.finished,
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} started, {} finished, {} failed, {} assumption failed, {} ignored",
            self.started, self.finished, self.failed, self.assumption_failed, self.ignored
        )
    }
}
