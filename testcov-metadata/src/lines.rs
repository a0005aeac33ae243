// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    FinalStatus, Fingerprint, LineParseError, LineParseErrorKind, MAP_FILE_SEPARATOR,
};
use std::{fmt, str::FromStr};

const RESULT_SEPARATOR: &str = ": ";

/// One line of the results file: `<CODE>: <qualified name>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultLine {
    /// The final status of the test.
    pub status: FinalStatus,

    /// The sanitized qualified name of the test.
    pub qualified_name: String,
}

impl fmt::Display for ResultLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{RESULT_SEPARATOR}{}", self.status, self.qualified_name)
    }
}

impl FromStr for ResultLine {
    type Err = LineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, name) = s.split_once(RESULT_SEPARATOR).ok_or_else(|| {
            LineParseError::new(LineParseErrorKind::MissingSeparator {
                separator: RESULT_SEPARATOR,
            })
        })?;
        let status = code
            .parse()
            .map_err(|error| LineParseError::new(LineParseErrorKind::Status(error)))?;
        Ok(Self {
            status,
            qualified_name: non_empty_name(name)?,
        })
    }
}

/// One line of the hash map file: `<fingerprint>\t<qualified name>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashMapLine {
    /// The fingerprint of `qualified_name`.
    pub fingerprint: Fingerprint,

    /// The sanitized qualified name of the test.
    pub qualified_name: String,
}

impl fmt::Display for HashMapLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{MAP_FILE_SEPARATOR}{}",
            self.fingerprint, self.qualified_name
        )
    }
}

impl FromStr for HashMapLine {
    type Err = LineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fingerprint, name) = split_map_field(s)?;
        Ok(Self {
            fingerprint: parse_fingerprint(fingerprint)?,
            qualified_name: non_empty_name(name)?,
        })
    }
}

/// One line of the coverage-loss file: `<fingerprint>\t<qualified name>\t<reason>`.
///
/// Each line marks a test whose snapshot could not be captured. Such tests have no snapshot
/// file, which must not be read as "covered nothing".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageLossLine {
    /// The fingerprint of `qualified_name`.
    pub fingerprint: Fingerprint,

    /// The sanitized qualified name of the test.
    pub qualified_name: String,

    /// A one-line description of why the capture failed.
    pub reason: String,
}

impl CoverageLossLine {
    /// Creates a new line, flattening `reason` onto one line.
    pub fn new(fingerprint: Fingerprint, qualified_name: impl Into<String>, reason: &str) -> Self {
        let reason = reason
            .split(['\n', '\r', '\t'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            fingerprint,
            qualified_name: qualified_name.into(),
            reason,
        }
    }
}

impl fmt::Display for CoverageLossLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{MAP_FILE_SEPARATOR}{}{MAP_FILE_SEPARATOR}{}",
            self.fingerprint, self.qualified_name, self.reason
        )
    }
}

impl FromStr for CoverageLossLine {
    type Err = LineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fingerprint, rest) = split_map_field(s)?;
        let (name, reason) = split_map_field(rest)?;
        Ok(Self {
            fingerprint: parse_fingerprint(fingerprint)?,
            qualified_name: non_empty_name(name)?,
            reason: reason.to_owned(),
        })
    }
}

/// Parses every non-empty line of `contents` as a `T`.
///
/// Errors carry the one-based line number they occurred on.
pub fn parse_lines<T>(contents: &str) -> Result<Vec<T>, LineParseError>
where
    T: FromStr<Err = LineParseError>,
{
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(index, line)| line.parse().map_err(|error: LineParseError| error.at_line(index + 1)))
        .collect()
}

fn split_map_field(s: &str) -> Result<(&str, &str), LineParseError> {
    s.split_once(MAP_FILE_SEPARATOR).ok_or_else(|| {
        LineParseError::new(LineParseErrorKind::MissingSeparator {
            separator: MAP_FILE_SEPARATOR,
        })
    })
}

fn parse_fingerprint(s: &str) -> Result<Fingerprint, LineParseError> {
    s.parse()
        .map_err(|error| LineParseError::new(LineParseErrorKind::Fingerprint(error)))
}

fn non_empty_name(name: &str) -> Result<String, LineParseError> {
    if name.is_empty() {
        Err(LineParseError::new(LineParseErrorKind::EmptyName))
    } else {
        Ok(name.to_owned())
    }
}
