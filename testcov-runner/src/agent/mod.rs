// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coverage agent backends.
//!
//! A coverage agent is an external process that accumulates execution counters. Every backend
//! offers one operation: atomically dump the current counters and reset them to zero.

mod jacoco;

pub use jacoco::*;

use crate::{
    config::{AgentConfig, CoverageBackend},
    errors::CaptureError,
};

/// A connection to an external coverage agent.
pub trait CoverageAgent: Send + Sync {
    /// A short name for this backend, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Dumps the agent's current counters and resets them.
    ///
    /// On success, returns the bytes to write to the snapshot file. Implementations must not
    /// retry: a second dump would observe an already-reset agent.
    fn dump_and_reset(&self) -> Result<Vec<u8>, CaptureError>;
}

/// Creates the agent configured by `config`.
///
/// Returns `None` if coverage capture is disabled.
pub fn agent_from_config(config: &AgentConfig) -> Option<Box<dyn CoverageAgent>> {
    match config.backend {
        CoverageBackend::Jacoco => Some(Box::new(JacocoAgent::new(
            format!("{}:{}", config.address, config.port),
            config.timeout,
        ))),
        CoverageBackend::None => None,
    }
}
