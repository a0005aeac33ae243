// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testcov.
//!
//! None of these errors are ever propagated into a host framework callback: capture and storage
//! errors degrade the coverage data of a run, not its verdict.

use camino::Utf8PathBuf;
use std::{error, fmt, io, time::Duration};
use thiserror::Error;

/// An error that occurred while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read testcov config at `{path}`")]
    Read {
        /// The path to the config file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The config file was explicitly requested but does not exist.
    #[error("testcov config file not found at `{path}`")]
    FileNotFound {
        /// The path that was requested.
        path: Utf8PathBuf,
    },

    /// The config file could not be parsed.
    #[error("failed to parse testcov config at `{path}`")]
    Parse {
        /// The path to the config file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },

    /// An environment variable override had an invalid value.
    #[error("invalid value `{value}` for environment variable `{var}`: {reason}")]
    InvalidEnv {
        /// The name of the environment variable.
        var: &'static str,

        /// The value that was found.
        value: String,

        /// Why the value was rejected.
        reason: String,
    },
}

/// An error that occurred while capturing a coverage snapshot for one test.
///
/// A capture error means the coverage of that one test is unavailable. It is never retried:
/// repeating a dump-and-reset would attribute the next test's counters to this one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// The agent's address did not resolve to any socket address.
    #[error("failed to resolve coverage agent address `{address}`")]
    Resolve {
        /// The configured address.
        address: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Connecting to the agent failed, for example because it refused the connection.
    #[error("failed to connect to coverage agent at `{address}`")]
    Connect {
        /// The address that was connected to.
        address: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The agent did not complete the exchange within the configured timeout.
    #[error("coverage agent at `{address}` did not complete a dump within {timeout:?}")]
    Timeout {
        /// The address of the agent.
        address: String,

        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// An I/O error occurred while talking to the agent.
    #[error("I/O error while talking to coverage agent at `{address}`")]
    Io {
        /// The address of the agent.
        address: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The agent closed the connection before acknowledging the dump.
    #[error(
        "coverage agent at `{address}` closed the connection after {bytes_read} bytes, \
         before the dump completed"
    )]
    PartialRead {
        /// The address of the agent.
        address: String,

        /// The number of response bytes read before the connection closed.
        bytes_read: usize,
    },

    /// The agent's response did not follow the wire protocol.
    #[error("coverage agent at `{address}` sent a malformed response: {reason}")]
    MalformedResponse {
        /// The address of the agent.
        address: String,

        /// What was wrong with the response.
        reason: String,
    },

    /// The raw coverage directory could not be created.
    #[error("failed to create raw coverage directory `{path}`")]
    DirCreate {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The snapshot file could not be written.
    #[error("failed to write coverage snapshot `{path}`")]
    Write {
        /// The snapshot path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },
}

impl CaptureError {
    /// A short, single-line description used in the coverage-loss file.
    pub fn summary(&self) -> String {
        DisplayErrorChain::new(self).to_string()
    }
}

/// An error that occurred while appending results to durable storage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A results directory could not be created.
    #[error("failed to create results directory `{path}`")]
    DirCreate {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A results file could not be opened for appending.
    #[error("failed to open `{path}` for appending")]
    Open {
        /// The file that could not be opened.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// An exclusive lock on a results file could not be acquired.
    #[error("failed to lock `{path}`")]
    Lock {
        /// The file that could not be locked.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Another writer held the lock for longer than the lock timeout.
    #[error("timed out after {timeout:?} waiting for lock on `{path}`")]
    LockTimeout {
        /// The file that could not be locked.
        path: Utf8PathBuf,

        /// How long the lock was waited for.
        timeout: Duration,
    },

    /// Appending to a results file failed.
    #[error("failed to append to `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while reading events from a host framework.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventSourceError {
    /// Reading from the underlying stream failed.
    #[error("failed to read {flavor} event stream")]
    Read {
        /// The host framework flavor.
        flavor: &'static str,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while setting up the log file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("failed to create log directory `{path}`")]
    DirCreate {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The log file could not be opened.
    #[error("failed to open log file `{path}`")]
    Open {
        /// The log file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A global subscriber was already installed.
    #[error("failed to install log subscriber")]
    Init(#[source] Box<dyn error::Error + Send + Sync + 'static>),
}

/// Displays an error along with its chain of sources.
///
/// ```text
/// failed to connect to coverage agent at `localhost:9999`
///   caused by:
///   - Connection refused (os error 111)
/// ```
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(error) = source {
            write!(f, "\n  - {error}")?;
            source = error.source();
        }

        Ok(())
    }
}
