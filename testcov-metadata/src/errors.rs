// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::FinalStatus;
use std::{error, fmt};

/// A string could not be parsed as a [`Fingerprint`](crate::Fingerprint).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerprintParseError {
    input: String,
}

impl FingerprintParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// The input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for FingerprintParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid fingerprint `{}`: expected 32 lowercase hex characters",
            self.input
        )
    }
}

impl error::Error for FingerprintParseError {}

/// A string could not be parsed as a [`FinalStatus`] code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusCodeParseError {
    input: String,
}

impl StatusCodeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

impl fmt::Display for StatusCodeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unrecognized status code `{}` (known codes: {})",
            self.input,
            FinalStatus::codes().join(", ")
        )
    }
}

impl error::Error for StatusCodeParseError {}

/// A line of a persisted artifact could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineParseError {
    line_number: usize,
    kind: LineParseErrorKind,
}

impl LineParseError {
    pub(crate) fn new(kind: LineParseErrorKind) -> Self {
        Self {
            line_number: 0,
            kind,
        }
    }

    pub(crate) fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self
    }

    /// The one-based line number the error occurred on, or 0 if the error came from parsing a
    /// single line.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The kind of error that occurred.
    pub fn kind(&self) -> &LineParseErrorKind {
        &self.kind
    }
}

impl fmt::Display for LineParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line_number > 0 {
            write!(f, "line {}: ", self.line_number)?;
        }
        match &self.kind {
            LineParseErrorKind::MissingSeparator { separator } => {
                write!(f, "missing separator {separator:?}")
            }
            LineParseErrorKind::EmptyName => write!(f, "empty test name"),
            LineParseErrorKind::Status(_) => write!(f, "invalid status code"),
            LineParseErrorKind::Fingerprint(_) => write!(f, "invalid fingerprint"),
        }
    }
}

impl error::Error for LineParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            LineParseErrorKind::MissingSeparator { .. } | LineParseErrorKind::EmptyName => None,
            LineParseErrorKind::Status(error) => Some(error),
            LineParseErrorKind::Fingerprint(error) => Some(error),
        }
    }
}

/// The kind of a [`LineParseError`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum LineParseErrorKind {
    /// The field separator was not found.
    MissingSeparator {
        /// The separator that was expected.
        separator: &'static str,
    },

    /// The test name was empty.
    EmptyName,

    /// The status code was not recognized.
    Status(StatusCodeParseError),

    /// The fingerprint was malformed.
    Fingerprint(FingerprintParseError),
}

/// A file name in the raw coverage directory is not a snapshot name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotNameParseError {
    file_name: String,
}

impl SnapshotNameParseError {
    pub(crate) fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl fmt::Display for SnapshotNameParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "`{}` is not a snapshot file name \
             (expected <fingerprint>[.<disambiguator>].<extension>)",
            self.file_name
        )
    }
}

impl error::Error for SnapshotNameParseError {}
