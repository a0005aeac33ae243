// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the files written by testcov listeners.
//!
//! A test run instrumented by `testcov-runner` leaves behind a directory tree that a later,
//! decoupled reporting stage consumes:
//!
//! ```text
//! <base-dir>/
//!   coverage/raw/<fingerprint>[.<disambiguator>].<ext>   one snapshot per test occurrence
//!   <run-id>/TestResults.r<run-id>                       "<CODE>: <qualified name>"
//!   <run-id>/HashToTest.r<run-id>                        "<fingerprint>\t<qualified name>"
//!   <run-id>/CoverageUnavailable.r<run-id>               "<fingerprint>\t<qualified name>\t<reason>"
//! ```
//!
//! This crate defines that layout ([`RunLayout`]), the per-line formats ([`ResultLine`],
//! [`HashMapLine`], [`CoverageLossLine`]), and the identifiers they are keyed by
//! ([`Fingerprint`], [`FinalStatus`]).

mod errors;
mod fingerprint;
mod layout;
mod lines;
mod name;
mod status;

pub use errors::*;
pub use fingerprint::*;
pub use layout::*;
pub use lines::*;
pub use name::*;
pub use status::*;
