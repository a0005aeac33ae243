// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{sanitize_name, Fingerprint, SnapshotNameParseError};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// The base directory used when none is configured, relative to the working directory.
pub const DEFAULT_BASE_DIR: &str = "target/jacoco";

/// The run identifier used when the caller does not supply one.
pub const DEFAULT_RUN_ID: &str = "0";

/// The extension of snapshot files written by the JaCoCo backend.
pub const DEFAULT_SNAPSHOT_EXTENSION: &str = "exec";

/// Prefix of the results file name.
pub const RESULTS_FILE_PREFIX: &str = "TestResults";

/// Prefix of the hash-to-name map file name.
pub const HASH_MAP_FILE_PREFIX: &str = "HashToTest";

/// Prefix of the coverage-loss file name.
pub const COVERAGE_LOSS_FILE_PREFIX: &str = "CoverageUnavailable";

/// Separator between fields of the hash map and coverage-loss files.
pub const MAP_FILE_SEPARATOR: &str = "\t";

/// Where the artifacts of one run live on disk.
///
/// The run ID is sanitized with [`sanitize_name`] so that it always names a single directory
/// under the base directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunLayout {
    base_dir: Utf8PathBuf,
    run_id: String,
}

impl RunLayout {
    /// Creates a new layout rooted at `base_dir` for the given run ID.
    ///
    /// An empty (or entirely unrepresentable) run ID falls back to [`DEFAULT_RUN_ID`].
    pub fn new(base_dir: impl Into<Utf8PathBuf>, run_id: &str) -> Self {
        let run_id = match sanitize_name(run_id) {
            // "." and ".." survive sanitization but don't name a fresh directory.
            id if id.is_empty() || id == "." || id == ".." => DEFAULT_RUN_ID.to_owned(),
            id => id,
        };
        Self {
            base_dir: base_dir.into(),
            run_id,
        }
    }

    /// The base directory.
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// The sanitized run ID.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The directory snapshot files are written to: `<base>/coverage/raw`.
    pub fn raw_coverage_dir(&self) -> Utf8PathBuf {
        self.base_dir.join("coverage").join("raw")
    }

    /// The directory holding this run's results: `<base>/<run-id>`.
    pub fn run_dir(&self) -> Utf8PathBuf {
        self.base_dir.join(&self.run_id)
    }

    /// `<base>/<run-id>/TestResults.r<run-id>`.
    pub fn results_file(&self) -> Utf8PathBuf {
        self.run_file(RESULTS_FILE_PREFIX)
    }

    /// `<base>/<run-id>/HashToTest.r<run-id>`.
    pub fn hash_map_file(&self) -> Utf8PathBuf {
        self.run_file(HASH_MAP_FILE_PREFIX)
    }

    /// `<base>/<run-id>/CoverageUnavailable.r<run-id>`.
    pub fn coverage_loss_file(&self) -> Utf8PathBuf {
        self.run_file(COVERAGE_LOSS_FILE_PREFIX)
    }

    /// The path of the snapshot for `name` within the raw coverage directory.
    pub fn snapshot_file(&self, name: &SnapshotFileName) -> Utf8PathBuf {
        self.raw_coverage_dir().join(name.to_string())
    }

    fn run_file(&self, prefix: &str) -> Utf8PathBuf {
        self.run_dir().join(format!("{prefix}.r{}", self.run_id))
    }
}

/// The name of one snapshot file: `<fingerprint>[.<disambiguator>].<extension>`.
///
/// The first occurrence of a test name has no disambiguator; reruns of the same name get `.1`,
/// `.2`, and so on so that no occurrence overwrites another.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotFileName {
    /// The fingerprint of the test's qualified name.
    pub fingerprint: Fingerprint,

    /// The zero-based occurrence of this name. Zero is not rendered.
    pub occurrence: u32,

    /// The file extension, without a leading dot.
    pub extension: String,
}

impl SnapshotFileName {
    /// Creates a new snapshot file name.
    pub fn new(fingerprint: Fingerprint, occurrence: u32, extension: impl Into<String>) -> Self {
        Self {
            fingerprint,
            occurrence,
            extension: extension.into(),
        }
    }

    /// Parses a file name found in the raw coverage directory.
    pub fn parse(file_name: &str) -> Result<Self, SnapshotNameParseError> {
        let err = || SnapshotNameParseError::new(file_name);

        let (stem, extension) = file_name.rsplit_once('.').ok_or_else(err)?;
        if extension.is_empty() {
            return Err(err());
        }
        let (fingerprint, occurrence) = match stem.split_once('.') {
            Some((fingerprint, occurrence)) => {
                let parsed: u32 = occurrence.parse().map_err(|_| err())?;
                // Occurrence 0 is never rendered, and neither are leading zeroes.
                if parsed == 0 || parsed.to_string() != occurrence {
                    return Err(err());
                }
                (fingerprint, parsed)
            }
            None => (stem, 0),
        };
        let fingerprint = fingerprint.parse().map_err(|_| err())?;

        Ok(Self {
            fingerprint,
            occurrence,
            extension: extension.to_owned(),
        })
    }
}

impl fmt::Display for SnapshotFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.occurrence {
            0 => write!(f, "{}.{}", self.fingerprint, self.extension),
            n => write!(f, "{}.{n}.{}", self.fingerprint, self.extension),
        }
    }
}
