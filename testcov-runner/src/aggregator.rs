// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Accumulating finished tests and appending them to durable storage.
//!
//! Records are held in a pending list between a test finishing and the next flush, so that
//! failures the host framework reports late can still be folded into them. A flush drains the
//! pending list into a [`FlushBatch`], which can then be persisted without holding any lock that
//! protects the pending list.

use crate::{
    errors::StoreError,
    ledger::{ClosedRecord, TestRecord},
    snapshot::CoverageOutcome,
};
use camino::Utf8Path;
use std::{
    fs::{File, OpenOptions, TryLockError},
    io::Write as _,
    thread,
    time::{Duration, Instant},
};
use swrite::{SWrite, swriteln};
use testcov_metadata::{CoverageLossLine, FinalStatus, HashMapLine, ResultLine, RunLayout};
use tracing::{debug, warn};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A finished test along with what happened to its coverage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRecord {
    /// The record. More failures may still be registered on it until it is flushed.
    pub record: TestRecord,

    /// The outcome of the coverage capture.
    pub outcome: CoverageOutcome,
}

/// Collects finished tests until they are flushed.
#[derive(Debug, Default)]
pub struct ResultsAggregator {
    pending: Vec<PendingRecord>,
}

impl ResultsAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finished test.
    pub fn record(&mut self, record: TestRecord, outcome: CoverageOutcome) {
        debug!(
            "aggregator: recorded {} (occurrence {})",
            record.identity(),
            record.occurrence()
        );
        self.pending.push(PendingRecord { record, outcome });
    }

    /// The number of records not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the most recently recorded unflushed record with this qualified name.
    pub fn latest_unflushed_mut(&mut self, qualified_name: &str) -> Option<&mut TestRecord> {
        self.pending
            .iter_mut()
            .rev()
            .map(|pending| &mut pending.record)
            .find(|record| record.identity().qualified_name() == qualified_name)
    }

    /// Closes every pending record and returns them as a batch, leaving the aggregator empty.
    ///
    /// Taking a batch twice in a row returns an empty second batch.
    pub fn take_batch(&mut self) -> FlushBatch {
        let records = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|pending| FlushedRecord {
                closed: pending.record.close(),
                outcome: pending.outcome,
            })
            .collect();
        FlushBatch { records }
    }

    /// Takes a batch and appends it to the files under `layout`.
    pub fn flush(&mut self, layout: &RunLayout) -> FlushReport {
        self.take_batch().persist(layout)
    }
}

/// A closed record ready to be persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushedRecord {
    /// The record and its final status.
    pub closed: ClosedRecord,

    /// The outcome of the coverage capture.
    pub outcome: CoverageOutcome,
}

impl FlushedRecord {
    /// The final status of this record.
    pub fn final_status(&self) -> FinalStatus {
        self.closed.final_status
    }
}

/// Records drained from a [`ResultsAggregator`] by one flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushBatch {
    records: Vec<FlushedRecord>,
}

impl FlushBatch {
    /// The records in this batch, in the order they finished.
    pub fn records(&self) -> &[FlushedRecord] {
        &self.records
    }

    /// Returns true if the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends this batch to the results, hash map and coverage-loss files of `layout`.
    ///
    /// Each file is appended to under an exclusive lock, so batches from concurrent writers
    /// never interleave within one file. Errors are logged and returned in the report, and do
    /// not stop the remaining files from being written.
    pub fn persist(&self, layout: &RunLayout) -> FlushReport {
        let mut report = FlushReport {
            records: self.records.len(),
            store_errors: Vec::new(),
        };
        if self.records.is_empty() {
            debug!("aggregator: nothing to flush");
            return report;
        }

        let run_dir = layout.run_dir();
        if let Err(error) = std::fs::create_dir_all(&run_dir) {
            let error = StoreError::DirCreate {
                path: run_dir,
                error,
            };
            warn!("{}", crate::errors::DisplayErrorChain::new(&error));
            report.store_errors.push(error);
            return report;
        }

        let mut results = String::new();
        let mut hash_map = String::new();
        let mut losses = String::new();
        for flushed in &self.records {
            let identity = flushed.closed.record.identity();
            let result = ResultLine {
                status: flushed.final_status(),
                qualified_name: identity.qualified_name().to_owned(),
            };
            let hash = HashMapLine {
                fingerprint: identity.fingerprint(),
                qualified_name: identity.qualified_name().to_owned(),
            };
            swriteln!(results, "{result}");
            swriteln!(hash_map, "{hash}");
            if let CoverageOutcome::Unavailable { reason } = &flushed.outcome {
                let loss =
                    CoverageLossLine::new(identity.fingerprint(), identity.qualified_name(), reason);
                swriteln!(losses, "{loss}");
            }
        }

        let files = [
            (layout.results_file(), results),
            (layout.hash_map_file(), hash_map),
            (layout.coverage_loss_file(), losses),
        ];
        for (path, contents) in files {
            if contents.is_empty() {
                continue;
            }
            if let Err(error) = append_locked(&path, contents.as_bytes()) {
                warn!("{}", crate::errors::DisplayErrorChain::new(&error));
                report.store_errors.push(error);
            }
        }

        debug!(
            "aggregator: flushed {} records to {}",
            self.records.len(),
            layout.run_dir()
        );
        report
    }
}

/// The result of persisting one batch.
#[derive(Debug)]
pub struct FlushReport {
    /// The number of records in the batch.
    pub records: usize,

    /// Errors encountered while writing. These never abort a flush.
    pub store_errors: Vec<StoreError>,
}

fn append_locked(path: &Utf8Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|error| StoreError::Open {
            path: path.to_owned(),
            error,
        })?;
    acquire_lock_with_retry(&file, path)?;

    // The lock is released when the file is closed.
    file.write_all(contents)
        .and_then(|()| file.flush())
        .map_err(|error| StoreError::Write {
            path: path.to_owned(),
            error,
        })
}

fn acquire_lock_with_retry(file: &File, path: &Utf8Path) -> Result<(), StoreError> {
    let start = Instant::now();
    loop {
        match file.try_lock() {
            Ok(()) => return Ok(()),
            Err(TryLockError::WouldBlock) => {
                // Another writer is appending a batch.
                if start.elapsed() >= LOCK_TIMEOUT {
                    return Err(StoreError::LockTimeout {
                        path: path.to_owned(),
                        timeout: LOCK_TIMEOUT,
                    });
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(TryLockError::Error(error)) => {
                return Err(StoreError::Lock {
                    path: path.to_owned(),
                    error,
                });
            }
        }
    }
}
