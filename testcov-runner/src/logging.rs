// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional log file for hosts that do not set up `tracing` themselves.

use crate::{
    config::{LogLevel, TestcovConfig},
    errors::LoggingError,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs::OpenOptions, sync::Mutex};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    Layer, filter::Targets, layer::SubscriberExt, util::SubscriberInitExt,
};

/// The name of the log file within the base directory.
pub const LOG_FILE_NAME: &str = "testcov.log";

/// Installs a global subscriber appending events at `level` or above to
/// `<base_dir>/testcov.log`.
///
/// Returns the path of the log file. Fails if the file cannot be opened or if a global
/// subscriber is already installed.
pub fn init_file_logging(base_dir: &Utf8Path, level: LogLevel) -> Result<Utf8PathBuf, LoggingError> {
    std::fs::create_dir_all(base_dir).map_err(|error| LoggingError::DirCreate {
        path: base_dir.to_owned(),
        error,
    })?;
    let path = base_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|error| LoggingError::Open {
            path: path.clone(),
            error,
        })?;

    let targets = Targets::new().with_default(LevelFilter::from_level(level.to_tracing()));
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_target(true)
        .with_filter(targets);
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|error| LoggingError::Init(Box::new(error)))?;

    Ok(path)
}

/// Calls [`init_file_logging`] if the `[log]` section of `config` enables it.
pub fn init_from_config(config: &TestcovConfig) -> Result<Option<Utf8PathBuf>, LoggingError> {
    if !config.log.enabled {
        return Ok(None);
    }
    init_file_logging(&config.store.base_dir, config.log.level).map(Some)
}
