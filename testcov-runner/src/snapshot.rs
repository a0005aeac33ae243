// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capturing one coverage snapshot per test.

use crate::{agent::CoverageAgent, errors::CaptureError, identity::TestIdentity};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use std::{
    io::{self, Write},
    sync::{Mutex, PoisonError},
};
use testcov_metadata::SnapshotFileName;
use tracing::debug;

/// A snapshot file written for one test occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageSnapshot {
    /// The name of the snapshot file within the raw coverage directory.
    pub file_name: SnapshotFileName,

    /// The full path to the snapshot file.
    pub path: Utf8PathBuf,

    /// The number of bytes written.
    pub len: usize,
}

/// What happened to the coverage of one test occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverageOutcome {
    /// A snapshot was written.
    Captured(CoverageSnapshot),

    /// The snapshot could not be captured. This is distinct from zero coverage.
    Unavailable {
        /// A single-line description of the failure.
        reason: String,
    },

    /// Coverage capture is turned off.
    Disabled,
}

impl CoverageOutcome {
    /// Returns true if this outcome is a coverage loss.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Requests per-test dumps from a coverage agent and writes them to the raw coverage directory.
///
/// Only one exchange with the agent runs at a time, even if several coordinators share a client.
#[derive(Debug)]
pub struct SnapshotClient {
    agent: DebugIgnore<Box<dyn CoverageAgent>>,
    raw_dir: Utf8PathBuf,
    extension: String,
    capture_lock: Mutex<()>,
}

impl SnapshotClient {
    /// Creates a new client writing `<raw_dir>/<fingerprint>[.<n>].<extension>` files.
    pub fn new(
        agent: Box<dyn CoverageAgent>,
        raw_dir: impl Into<Utf8PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            agent: DebugIgnore(agent),
            raw_dir: raw_dir.into(),
            extension: extension.into(),
            capture_lock: Mutex::new(()),
        }
    }

    /// The raw coverage directory.
    pub fn raw_dir(&self) -> &Utf8Path {
        &self.raw_dir
    }

    /// Dumps and resets the agent, writing the dump to the snapshot file for this occurrence.
    ///
    /// The file is only created once the full response has been received, so a failed capture
    /// leaves nothing behind. Existing snapshots are never replaced: if the file for
    /// `occurrence` already exists (for example because another coordinator in this process
    /// wrote it), the next free occurrence is used instead.
    pub fn capture(
        &self,
        identity: &TestIdentity,
        occurrence: u32,
    ) -> Result<CoverageSnapshot, CaptureError> {
        let bytes = {
            // The guard protects no data, so a poisoned lock is still usable.
            let _guard = self
                .capture_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            debug!(
                "capturing {} coverage for {identity} (occurrence {occurrence})",
                self.agent.name()
            );
            self.agent.dump_and_reset()?
        };

        std::fs::create_dir_all(&self.raw_dir).map_err(|error| CaptureError::DirCreate {
            path: self.raw_dir.clone(),
            error,
        })?;

        let mut occurrence = occurrence;
        loop {
            let file_name =
                SnapshotFileName::new(identity.fingerprint(), occurrence, self.extension.clone());
            let path = self.raw_dir.join(file_name.to_string());
            match AtomicFile::new(&path, OverwriteBehavior::DisallowOverwrite)
                .write(|file| file.write_all(&bytes))
            {
                Ok(()) => {
                    return Ok(CoverageSnapshot {
                        file_name,
                        path,
                        len: bytes.len(),
                    });
                }
                Err(atomicwrites::Error::Internal(error))
                    if error.kind() == io::ErrorKind::AlreadyExists =>
                {
                    let Some(next) = occurrence.checked_add(1) else {
                        return Err(CaptureError::Write {
                            path,
                            error: atomicwrites::Error::Internal(error),
                        });
                    };
                    debug!("{file_name} already exists, trying occurrence {next}");
                    occurrence = next;
                }
                Err(error) => return Err(CaptureError::Write { path, error }),
            }
        }
    }
}
