// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapters from host test frameworks to [`LifecycleEvent`]s.
//!
//! Push-style frameworks call listener methods ([`JunitRunListener`], [`TestngListener`]), which
//! forward to a shared [`TestCoordinator`]. Pull-style frameworks that write an event stream are
//! read through a [`LifecycleEventSource`] and [`drive`]n into the coordinator.

mod junit;
mod libtest;
mod testng;

pub use junit::*;
pub use libtest::*;
pub use testng::*;

use crate::{
    coordinator::{LifecycleEvent, RunSummary, TestCoordinator},
    errors::EventSourceError,
};
use std::collections::VecDeque;
use tracing::debug;

/// A source of lifecycle events that is read from, rather than called into.
pub trait LifecycleEventSource {
    /// The name of the host framework, used in diagnostics.
    fn flavor(&self) -> &'static str;

    /// Returns the next event, or `None` once the source is exhausted.
    fn next_event(&mut self) -> Result<Option<LifecycleEvent>, EventSourceError>;
}

/// Feeds every event from `source` into `coordinator`.
///
/// Returns one summary per run that finished. Each event is fully handled, including any
/// coverage capture, before the next one is read.
pub fn drive<S>(
    source: &mut S,
    coordinator: &TestCoordinator,
) -> Result<Vec<RunSummary>, EventSourceError>
where
    S: LifecycleEventSource + ?Sized,
{
    let mut summaries = Vec::new();
    while let Some(event) = source.next_event()? {
        if let Some(summary) = coordinator.handle_event(event) {
            summaries.push(summary);
        }
    }
    debug!(
        "{} event source exhausted after {} runs",
        source.flavor(),
        summaries.len()
    );
    Ok(summaries)
}

/// A source that replays a fixed list of events.
#[derive(Clone, Debug, Default)]
pub struct EventReplay {
    events: VecDeque<LifecycleEvent>,
}

impl EventReplay {
    /// Creates a new replay of `events`.
    pub fn new(events: impl IntoIterator<Item = LifecycleEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

impl LifecycleEventSource for EventReplay {
    fn flavor(&self) -> &'static str {
        "replay"
    }

    fn next_event(&mut self) -> Result<Option<LifecycleEvent>, EventSourceError> {
        Ok(self.events.pop_front())
    }
}
