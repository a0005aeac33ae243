// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test execution coordinator.
//!
//! A [`TestCoordinator`] receives lifecycle events from host-framework adapters, folds them into
//! per-test records, captures one coverage snapshot as each test ends, and flushes results to
//! disk when a run finishes. One coordinator is created per process and shared through an
//! [`Arc`](std::sync::Arc) by every adapter.

use crate::{
    agent::{CoverageAgent, agent_from_config},
    aggregator::{FlushBatch, ResultsAggregator},
    config::TestcovConfig,
    errors::DisplayErrorChain,
    identity::TestIdentity,
    ledger::{RunStatistics, StatusEvent, TestRecord},
    snapshot::{CoverageOutcome, SnapshotClient},
};
use debug_ignore::DebugIgnore;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};
use testcov_metadata::{DEFAULT_SNAPSHOT_EXTENSION, FinalStatus, RunLayout};
use tracing::{debug, info, warn};

/// A lifecycle event reported by a host framework.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A run is starting.
    RunStarted,

    /// A test started.
    TestStarted(TestIdentity),

    /// A test was skipped without running.
    TestIgnored(TestIdentity),

    /// A test reported a failure.
    TestFailed {
        /// The test.
        identity: TestIdentity,
        /// A description of the failure, if the framework supplied one.
        cause: Option<String>,
    },

    /// An assumption of a test did not hold.
    TestAssumptionFailed {
        /// The test.
        identity: TestIdentity,
        /// A description of the failure, if the framework supplied one.
        cause: Option<String>,
    },

    /// A test finished.
    TestFinished(TestIdentity),

    /// The framework reported something this crate does not understand about a test.
    ProtocolMismatch {
        /// The test the report was about.
        identity: TestIdentity,
        /// What was not understood.
        reason: String,
    },

    /// A run finished.
    RunFinished(HostRunSummary),
}

/// Failures collected by the host framework over a whole run.
///
/// Some frameworks only report certain failures (for example those raised by teardown hooks)
/// in their run summary. These are folded into records that have not been flushed yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostRunSummary {
    /// The failures, in the order the framework reported them.
    pub failures: Vec<HostFailure>,
}

/// One failure in a [`HostRunSummary`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostFailure {
    /// The test that failed.
    pub identity: TestIdentity,

    /// Whether this is an assumption failure rather than a failure.
    pub assumption: bool,

    /// A description of the failure.
    pub cause: Option<String>,
}

impl HostFailure {
    fn event(&self) -> StatusEvent {
        if self.assumption {
            StatusEvent::AssumptionFailed
        } else {
            StatusEvent::Failed
        }
    }
}

/// What one run-finished flush wrote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    /// The sanitized run ID results were written under.
    pub run_id: String,

    /// The number of records flushed, per final status.
    pub tallies: BTreeMap<FinalStatus, usize>,

    /// The number of snapshot files written for flushed records.
    pub snapshots_written: usize,

    /// The number of flushed records whose coverage is unavailable.
    pub coverage_losses: usize,

    /// The number of flushed records for which coverage capture was turned off.
    pub coverage_disabled: usize,

    /// Failure events that matched no record since the previous run finished.
    pub orphan_events: usize,

    /// Protocol mismatches observed since the previous run finished.
    pub protocol_mismatches: usize,

    /// The number of files that could not be written.
    pub store_errors: usize,

    /// Event counters for the lifetime of the coordinator.
    pub statistics: RunStatistics,
}

impl RunSummary {
    /// The number of flushed records with this final status.
    pub fn count(&self, status: FinalStatus) -> usize {
        self.tallies.get(&status).copied().unwrap_or(0)
    }

    /// The total number of flushed records.
    pub fn total(&self) -> usize {
        self.tallies.values().sum()
    }

    fn new(run_id: &str, batch: &FlushBatch, store_errors: usize, counters: EventCounters) -> Self {
        let mut tallies = BTreeMap::new();
        let mut snapshots_written = 0;
        let mut coverage_losses = 0;
        let mut coverage_disabled = 0;
        for flushed in batch.records() {
            *tallies.entry(flushed.final_status()).or_default() += 1;
            match flushed.outcome {
                CoverageOutcome::Captured(_) => snapshots_written += 1,
                CoverageOutcome::Unavailable { .. } => coverage_losses += 1,
                CoverageOutcome::Disabled => coverage_disabled += 1,
            }
        }
        Self {
            run_id: run_id.to_owned(),
            tallies,
            snapshots_written,
            coverage_losses,
            coverage_disabled,
            orphan_events: counters.orphan_events,
            protocol_mismatches: counters.protocol_mismatches,
            store_errors,
            statistics: counters.statistics,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}: {} tests flushed (", self.run_id, self.total())?;
        let mut first = true;
        for status in FinalStatus::ALL {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{} {status}", self.count(status))?;
        }
        write!(
            f,
            "), {} snapshots written, {} coverage unavailable",
            self.snapshots_written, self.coverage_losses
        )?;
        if self.orphan_events > 0 {
            write!(f, ", {} orphan events", self.orphan_events)?;
        }
        if self.protocol_mismatches > 0 {
            write!(f, ", {} protocol mismatches", self.protocol_mismatches)?;
        }
        Ok(())
    }
}

/// Builder for a [`TestCoordinator`].
#[derive(Debug)]
pub struct TestCoordinatorBuilder {
    layout: RunLayout,
    agent: DebugIgnore<Option<Box<dyn CoverageAgent>>>,
    extension: String,
}

impl TestCoordinatorBuilder {
    /// Sets the coverage agent. Without one, coverage capture is disabled.
    pub fn set_agent(&mut self, agent: Box<dyn CoverageAgent>) -> &mut Self {
        self.agent = DebugIgnore(Some(agent));
        self
    }

    /// Sets the extension of snapshot files.
    pub fn set_extension(&mut self, extension: impl Into<String>) -> &mut Self {
        self.extension = extension.into();
        self
    }

    /// Creates the coordinator.
    pub fn build(self) -> TestCoordinator {
        let snapshots = self.agent.0.map(|agent| {
            SnapshotClient::new(agent, self.layout.raw_coverage_dir(), self.extension)
        });
        TestCoordinator {
            layout: self.layout,
            snapshots,
            state: Mutex::new(CoordinatorState::default()),
        }
    }
}

/// Drives status tracking, coverage capture and result aggregation for a test process.
///
/// All methods take `&self` and may be called from several threads: each event's bookkeeping
/// happens under one internal lock, while agent exchanges and file I/O happen outside it.
#[derive(Debug)]
pub struct TestCoordinator {
    layout: RunLayout,
    snapshots: Option<SnapshotClient>,
    state: Mutex<CoordinatorState>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    open: HashMap<String, TestRecord>,
    occurrences: HashMap<String, u32>,
    aggregator: ResultsAggregator,
    counters: EventCounters,
}

#[derive(Clone, Copy, Debug, Default)]
struct EventCounters {
    statistics: RunStatistics,
    orphan_events: usize,
    protocol_mismatches: usize,
}

impl CoordinatorState {
    fn next_occurrence(&mut self, identity: &TestIdentity) -> u32 {
        let counter = self
            .occurrences
            .entry(identity.qualified_name().to_owned())
            .or_default();
        let occurrence = *counter;
        *counter += 1;
        occurrence
    }

    fn open_record(&mut self, identity: TestIdentity, first: StatusEvent) -> Option<TestRecord> {
        let occurrence = self.next_occurrence(&identity);
        self.counters.statistics.record(first);
        let record = TestRecord::new(identity, occurrence, first);
        if first.is_terminal() {
            return Some(record);
        }
        let name = record.identity().qualified_name().to_owned();
        self.open.insert(name, record);
        None
    }

    /// Registers a failure on the open record for `identity`, falling back to the latest
    /// unflushed record. Returns false if neither exists.
    fn register_failure(
        &mut self,
        identity: &TestIdentity,
        event: StatusEvent,
        cause: Option<String>,
    ) -> bool {
        let name = identity.qualified_name();
        let record = match self.open.get_mut(name) {
            Some(record) => record,
            None => match self.aggregator.latest_unflushed_mut(name) {
                Some(record) => {
                    debug!("{identity}: {event} reported after finish, folding into record");
                    record
                }
                None => {
                    self.counters.orphan_events += 1;
                    warn!("{identity}: {event} reported for a test that is not running or pending");
                    return false;
                }
            },
        };
        record.register(event, cause);
        self.counters.statistics.record(event);
        true
    }
}

impl TestCoordinator {
    /// Returns a builder for a coordinator writing to `layout`.
    pub fn builder(layout: RunLayout) -> TestCoordinatorBuilder {
        TestCoordinatorBuilder {
            layout,
            agent: DebugIgnore(None),
            extension: DEFAULT_SNAPSHOT_EXTENSION.to_owned(),
        }
    }

    /// Creates a coordinator from configuration.
    pub fn from_config(config: &TestcovConfig) -> Self {
        let mut builder = Self::builder(config.layout());
        builder.set_extension(config.agent.extension.clone());
        if let Some(agent) = agent_from_config(&config.agent) {
            builder.set_agent(agent);
        }
        builder.build()
    }

    /// The layout results are written to.
    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Returns true if coverage is captured for each test.
    pub fn captures_coverage(&self) -> bool {
        self.snapshots.is_some()
    }

    /// Returns a copy of the event counters.
    pub fn statistics(&self) -> RunStatistics {
        self.lock_state().counters.statistics
    }

    /// Dispatches a lifecycle event. Returns a summary for [`LifecycleEvent::RunFinished`].
    pub fn handle_event(&self, event: LifecycleEvent) -> Option<RunSummary> {
        match event {
            LifecycleEvent::RunStarted => self.run_started(),
            LifecycleEvent::TestStarted(identity) => self.test_started(identity),
            LifecycleEvent::TestIgnored(identity) => self.test_ignored(identity),
            LifecycleEvent::TestFailed { identity, cause } => self.test_failed(&identity, cause),
            LifecycleEvent::TestAssumptionFailed { identity, cause } => {
                self.test_assumption_failed(&identity, cause)
            }
            LifecycleEvent::TestFinished(identity) => self.test_finished(identity),
            LifecycleEvent::ProtocolMismatch { identity, reason } => {
                self.protocol_mismatch(identity, &reason)
            }
            LifecycleEvent::RunFinished(summary) => return Some(self.run_finished(summary)),
        }
        None
    }

    /// Called when a run starts.
    pub fn run_started(&self) {
        info!(
            "testcov run {} started (coverage {})",
            self.layout.run_id(),
            if self.captures_coverage() {
                "enabled"
            } else {
                "disabled"
            }
        );
    }

    /// Called when a test starts.
    pub fn test_started(&self, identity: TestIdentity) {
        debug!("{identity}: started");
        let stale = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            state
                .open
                .remove(identity.qualified_name())
                .map(|mut record| {
                    Self::mark_mismatch(state, &mut record, "started again before it finished");
                    record
                })
        };
        if let Some(record) = stale {
            // The stale occurrence owns the coverage accumulated so far.
            self.complete(record);
        }
        self.lock_state().open_record(identity, StatusEvent::Started);
    }

    /// Called when a test is skipped. This ends the test.
    ///
    /// Some frameworks start a test before deciding to skip it, in which case the open
    /// record is ended as ignored.
    pub fn test_ignored(&self, identity: TestIdentity) {
        debug!("{identity}: ignored");
        let record = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            match state.open.remove(identity.qualified_name()) {
                Some(mut record) => {
                    record.register(StatusEvent::Ignored, None);
                    state.counters.statistics.record(StatusEvent::Ignored);
                    Some(record)
                }
                None => state.open_record(identity, StatusEvent::Ignored),
            }
        };
        if let Some(record) = record {
            self.complete(record);
        }
    }

    /// Called when a test reports a failure.
    pub fn test_failed(&self, identity: &TestIdentity, cause: Option<String>) {
        debug!("{identity}: failed");
        self.lock_state()
            .register_failure(identity, StatusEvent::Failed, cause);
    }

    /// Called when an assumption of a test does not hold.
    pub fn test_assumption_failed(&self, identity: &TestIdentity, cause: Option<String>) {
        debug!("{identity}: assumption failed");
        self.lock_state()
            .register_failure(identity, StatusEvent::AssumptionFailed, cause);
    }

    /// Called when a test finishes. Returns once the test's coverage has been captured.
    pub fn test_finished(&self, identity: TestIdentity) {
        debug!("{identity}: finished");
        let record = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let mut record = match state.open.remove(identity.qualified_name()) {
                Some(record) => record,
                None => Self::mismatch_record(state, identity, "finished without being started"),
            };
            record.register(StatusEvent::Finished, None);
            state.counters.statistics.record(StatusEvent::Finished);
            record
        };
        self.complete(record);
    }

    /// Called when an adapter cannot make sense of how a test ended.
    ///
    /// The test's open record, or a new one if none is open, is marked as failed with `reason`
    /// as the cause and then finished like [`Self::test_finished`]. This counts as a single
    /// protocol mismatch.
    pub fn finish_with_mismatch(&self, identity: TestIdentity, reason: &str) {
        debug!("{identity}: finished with protocol mismatch");
        let record = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let mut record = match state.open.remove(identity.qualified_name()) {
                Some(mut record) => {
                    Self::mark_mismatch(state, &mut record, reason);
                    record
                }
                None => Self::mismatch_record(state, identity, reason),
            };
            record.register(StatusEvent::Finished, None);
            state.counters.statistics.record(StatusEvent::Finished);
            record
        };
        self.complete(record);
    }

    /// Called when an adapter cannot make sense of what the framework reported about a test.
    ///
    /// The affected record is marked as failed with `reason` as the cause.
    pub fn protocol_mismatch(&self, identity: TestIdentity, reason: &str) {
        let mut state = self.lock_state();
        state.counters.protocol_mismatches += 1;
        warn!("{identity}: protocol mismatch: {reason}");
        state.register_failure(
            &identity,
            StatusEvent::Failed,
            Some(format!("protocol mismatch: {reason}")),
        );
    }

    /// Called when a run finishes.
    ///
    /// Applies the failures in `summary` to records that do not have them yet, then flushes
    /// every finished record to disk. A failure is applied to the most recently finished
    /// unflushed record of that name, or else to the test's open record, which keeps it until it
    /// is flushed.
    pub fn run_finished(&self, summary: HostRunSummary) -> RunSummary {
        let (batch, counters, still_open) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            for failure in summary.failures {
                let event = failure.event();
                let name = failure.identity.qualified_name();
                let record = match state.aggregator.latest_unflushed_mut(name) {
                    Some(record) => record,
                    None => match state.open.get_mut(name) {
                        Some(record) => record,
                        None => {
                            state.counters.orphan_events += 1;
                            warn!(
                                "{}: run summary reports {event} for an unknown test",
                                failure.identity
                            );
                            continue;
                        }
                    },
                };
                let already_present = match &failure.cause {
                    Some(cause) => record.has_cause(cause),
                    None => record.events().contains(&event),
                };
                if !already_present {
                    debug!("{}: applying {event} from run summary", failure.identity);
                    record.register(event, failure.cause);
                    state.counters.statistics.record(event);
                }
            }
            let batch = state.aggregator.take_batch();
            let counters = state.counters;
            state.counters = EventCounters {
                statistics: counters.statistics,
                ..EventCounters::default()
            };
            (batch, counters, state.open.len())
        };

        if still_open > 0 {
            debug!("{still_open} tests still running at run finish, deferring them to a later flush");
        }

        let report = batch.persist(&self.layout);
        let summary = RunSummary::new(
            self.layout.run_id(),
            &batch,
            report.store_errors.len(),
            counters,
        );
        info!("testcov {summary}");
        summary
    }

    fn complete(&self, record: TestRecord) {
        let outcome = match &self.snapshots {
            Some(client) => match client.capture(record.identity(), record.occurrence()) {
                Ok(snapshot) => {
                    debug!(
                        "{}: wrote {} bytes of coverage to {}",
                        record.identity(),
                        snapshot.len,
                        snapshot.path
                    );
                    CoverageOutcome::Captured(snapshot)
                }
                Err(error) => {
                    warn!(
                        "{}: coverage unavailable: {}",
                        record.identity(),
                        DisplayErrorChain::new(&error)
                    );
                    CoverageOutcome::Unavailable {
                        reason: error.summary(),
                    }
                }
            },
            None => CoverageOutcome::Disabled,
        };
        for cause in record.causes() {
            debug!("{}: cause: {cause}", record.identity());
        }
        self.lock_state().aggregator.record(record, outcome);
    }

    fn mark_mismatch(state: &mut CoordinatorState, record: &mut TestRecord, reason: &str) {
        Self::note_mismatch(state, record, reason);
        record.register(StatusEvent::Failed, Some(format!("protocol mismatch: {reason}")));
        state.counters.statistics.record(StatusEvent::Failed);
    }

    /// Opens a failed record for a test whose events made no sense from the start.
    fn mismatch_record(
        state: &mut CoordinatorState,
        identity: TestIdentity,
        reason: &str,
    ) -> TestRecord {
        let occurrence = state.next_occurrence(&identity);
        let mut record = TestRecord::new(identity, occurrence, StatusEvent::Failed);
        record.add_cause(format!("protocol mismatch: {reason}"));
        state.counters.statistics.record(StatusEvent::Failed);
        Self::note_mismatch(state, &record, reason);
        record
    }

    fn note_mismatch(state: &mut CoordinatorState, record: &TestRecord, reason: &str) {
        state.counters.protocol_mismatches += 1;
        warn!("{}: protocol mismatch: {reason}", record.identity());
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        // State is updated one event at a time, so it is consistent even if a previous holder
        // panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
