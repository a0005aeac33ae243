// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading libtest's JSON event stream.
//!
//! The stream is produced by `cargo test -- -Z unstable-options --format json` (or by nextest's
//! libtest-compatible output) and consists of one JSON object per line:
//!
//! * `{ "type": "suite", "event": "started", "test_count": <u32> }`
//! * `{ "type": "test", "event": "started", "name": "<name>" }`
//! * `{ "type": "test", "event": "ok" | "failed" | "ignored" | "timeout", "name": "<name>", ... }`
//! * `{ "type": "suite", "event": "ok" | "failed", "passed": <u32>, ... }`

use super::LifecycleEventSource;
use crate::{
    coordinator::{HostRunSummary, LifecycleEvent},
    errors::EventSourceError,
    identity::TestIdentity,
};
use serde::Deserialize;
use std::{collections::VecDeque, io::BufRead};
use tracing::{debug, warn};

const KIND_TEST: &str = "test";
const KIND_SUITE: &str = "suite";

const EVENT_STARTED: &str = "started";
const EVENT_OK: &str = "ok";
const EVENT_FAILED: &str = "failed";
const EVENT_IGNORED: &str = "ignored";
const EVENT_TIMEOUT: &str = "timeout";

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    event: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// A [`LifecycleEventSource`] over a libtest JSON stream.
#[derive(Debug)]
pub struct LibtestEventSource<R> {
    reader: R,
    container: String,
    queued: VecDeque<LifecycleEvent>,
    line: String,
    line_number: usize,
}

impl<R: BufRead> LibtestEventSource<R> {
    /// Creates a new source reading from `reader`.
    ///
    /// libtest only reports test paths within one binary, so `container` (typically the crate
    /// or test binary name) is used as the qualifying part of every identity.
    pub fn new(reader: R, container: impl Into<String>) -> Self {
        Self {
            reader,
            container: container.into(),
            queued: VecDeque::new(),
            line: String::new(),
            line_number: 0,
        }
    }

    fn identity(&self, name: &str) -> TestIdentity {
        TestIdentity::new(&self.container, name)
    }

    fn translate(&mut self, raw: RawEvent) {
        match raw.kind.as_str() {
            KIND_SUITE => match raw.event.as_str() {
                EVENT_STARTED => self.queued.push_back(LifecycleEvent::RunStarted),
                EVENT_OK | EVENT_FAILED => self
                    .queued
                    .push_back(LifecycleEvent::RunFinished(HostRunSummary::default())),
                other => debug!("libtest: ignoring suite event `{other}`"),
            },
            KIND_TEST => {
                let Some(name) = raw.name.as_deref() else {
                    warn!(
                        "libtest line {}: test event `{}` has no name, skipping",
                        self.line_number, raw.event
                    );
                    return;
                };
                let identity = self.identity(name);
                match raw.event.as_str() {
                    EVENT_STARTED => self.queued.push_back(LifecycleEvent::TestStarted(identity)),
                    EVENT_OK => self.queued.push_back(LifecycleEvent::TestFinished(identity)),
                    EVENT_FAILED => {
                        let cause = raw.reason.or(raw.stdout);
                        self.queued.push_back(LifecycleEvent::TestFailed {
                            identity: identity.clone(),
                            cause,
                        });
                        self.queued.push_back(LifecycleEvent::TestFinished(identity));
                    }
                    EVENT_IGNORED => self.queued.push_back(LifecycleEvent::TestIgnored(identity)),
                    // A warning that the test is running long, not an outcome.
                    EVENT_TIMEOUT => debug!("libtest: {identity} is running long"),
                    other => self.queued.push_back(LifecycleEvent::ProtocolMismatch {
                        identity,
                        reason: format!("unknown libtest event `{other}`"),
                    }),
                }
            }
            other => debug!("libtest: ignoring `{other}` event"),
        }
    }
}

impl<R: BufRead> LifecycleEventSource for LibtestEventSource<R> {
    fn flavor(&self) -> &'static str {
        "libtest"
    }

    fn next_event(&mut self) -> Result<Option<LifecycleEvent>, EventSourceError> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(Some(event));
            }

            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .map_err(|error| EventSourceError::Read {
                    flavor: self.flavor(),
                    error,
                })?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.line.trim();
            if !line.starts_with('{') {
                // libtest prints human-readable lines alongside JSON in some modes.
                if !line.is_empty() {
                    debug!("libtest line {}: not JSON, skipping", self.line_number);
                }
                continue;
            }
            match serde_json::from_str::<RawEvent>(line) {
                Ok(raw) => self.translate(raw),
                Err(error) => warn!(
                    "libtest line {}: failed to parse event, skipping: {error}",
                    self.line_number
                ),
            }
        }
    }
}
