// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Per-test coverage attribution for test runs.
//!
//! A host test framework reports lifecycle events (test started, failed, finished and so on) to
//! a [`TestCoordinator`](coordinator::TestCoordinator). After each test ends, the coordinator
//! asks an external coverage agent to dump and reset its counters, so that each snapshot holds
//! the coverage of exactly one test. When the run finishes, verdicts and the fingerprint-to-name
//! table are appended to files laid out by [`testcov_metadata::RunLayout`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use testcov_runner::{
//!     config::TestcovConfig,
//!     coordinator::TestCoordinator,
//!     source::{Description, JunitResult, JunitRunListener},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TestcovConfig::from_env()?;
//! let coordinator = Arc::new(TestCoordinator::from_config(&config));
//! let listener = JunitRunListener::new(coordinator);
//!
//! let test = Description::new("com.example.FooTest", "bar");
//! listener.test_started(&test);
//! listener.test_finished(&test);
//! let summary = listener.test_run_finished(&JunitResult::default());
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod snapshot;
pub mod source;
