// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StatusCodeParseError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The verdict recorded for one test occurrence in the results file.
///
/// Variants are declared in ascending precedence: when several apply to one test, the greatest
/// one wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FinalStatus {
    /// The test started and finished with no failure reported.
    #[serde(rename = "PASS")]
    Succeeded,

    /// The test reported at least one failure.
    #[serde(rename = "FAIL")]
    Failed,

    /// An assumption of the test did not hold.
    #[serde(rename = "AFAIL")]
    AssumptionFailed,

    /// The test was skipped by the host framework.
    #[serde(rename = "IGNR")]
    Ignored,
}

impl FinalStatus {
    /// All statuses, in ascending precedence.
    pub const ALL: [Self; 4] = [
        Self::Succeeded,
        Self::Failed,
        Self::AssumptionFailed,
        Self::Ignored,
    ];

    /// The short code written to the results file.
    pub fn code(self) -> &'static str {
        match self {
            Self::Succeeded => "PASS",
            Self::Failed => "FAIL",
            Self::AssumptionFailed => "AFAIL",
            Self::Ignored => "IGNR",
        }
    }

    /// Returns the list of known codes.
    pub fn codes() -> [&'static str; 4] {
        Self::ALL.map(Self::code)
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for FinalStatus {
    type Err = StatusCodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == s)
            .ok_or_else(|| StatusCodeParseError::new(s))
    }
}
