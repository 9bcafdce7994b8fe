// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Codewars protocol output.
//!
//! The grading harness reads standard output line by line. Every event becomes one marker line
//! preceded by a blank line:
//!
//! * `<DESCRIBE::>name` and `<IT::>name` when a container or a test starts (or is skipped, with a
//!   `[SKIPPED] ` prefix)
//! * `<PASSED::>Test Passed`, `<FAILED::>message` or `<ERROR::>message` when it finishes
//! * `<LOG:MODE:LABEL>text` for skip reasons, stack traces and report entries
//! * `<COMPLETEDIN::>millis` to close the node, with an empty payload for skipped nodes
//!
//! Free-form text never spans lines: line separators inside it are replaced with
//! [`LINE_FEED_TOKEN`].

use super::{ExecutionListener, ExecutionOutcome, FailureCause, ReportEntry};
use crate::{
    helpers::lock,
    plan::{NodeId, TestNode},
};
use codewars_metadata::{LINE_FEED_TOKEN, LogKind, Marker};
use itertools::Itertools;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    io::{self, Write},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use swrite::{SWrite, swrite};
use tracing::warn;

/// A source of timestamps for node timings.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// A [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// An [`ExecutionListener`] that writes the Codewars protocol and counts tests and failures.
///
/// Each event is rendered in full and then written with a single locked write, so the lines for
/// one event are never split by lines from another.
pub struct CodewarsReporter<W> {
    output: Mutex<W>,
    clock: Box<dyn Clock>,
    start_instants: Mutex<HashMap<NodeId, Instant>>,
    end_instants: Mutex<HashMap<NodeId, Instant>>,
    report_entries: Mutex<HashMap<NodeId, BTreeSet<String>>>,
    test_count: AtomicUsize,
    failures: AtomicUsize,
    write_error: Mutex<Option<io::Error>>,
}

impl<W: Write + Send> CodewarsReporter<W> {
    /// Creates a new reporter writing to `output`.
    pub fn new(output: W) -> Self {
        Self::with_clock(output, SystemClock)
    }

    /// Creates a new reporter writing to `output`, timing nodes with `clock`.
    pub fn with_clock(output: W, clock: impl Clock + 'static) -> Self {
        Self {
            output: Mutex::new(output),
            clock: Box::new(clock),
            start_instants: Mutex::new(HashMap::new()),
            end_instants: Mutex::new(HashMap::new()),
            report_entries: Mutex::new(HashMap::new()),
            test_count: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            write_error: Mutex::new(None),
        }
    }

    /// Returns the number of leaf tests that failed or were aborted, plus the number of containers
    /// that crashed.
    ///
    /// Only meaningful once the engine has finished executing the plan.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    /// Returns the number of leaf tests that started.
    ///
    /// Only meaningful once the engine has finished executing the plan.
    pub fn test_count(&self) -> usize {
        self.test_count.load(Ordering::Acquire)
    }

    /// Consumes the reporter, returning the output it wrote to.
    ///
    /// Returns the first error encountered while writing output, if any.
    pub fn finish(self) -> io::Result<W> {
        let write_error = self
            .write_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match write_error {
            Some(error) => Err(error),
            None => Ok(self
                .output
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)),
        }
    }

    fn mark_started(&self, id: NodeId) {
        lock(&self.start_instants).insert(id, self.clock.now());
    }

    fn mark_finished(&self, id: NodeId) {
        lock(&self.end_instants).insert(id, self.clock.now());
    }

    fn duration(&self, id: NodeId) -> Duration {
        let start = lock(&self.start_instants).get(&id).copied();
        let end = lock(&self.end_instants).get(&id).copied();
        match (start, end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    fn take_report_entries(&self, id: NodeId) -> BTreeSet<String> {
        lock(&self.report_entries).remove(&id).unwrap_or_default()
    }

    fn write_failure(&self, out: &mut String, kind: &str, cause: Option<&FailureCause>) {
        let Some(cause) = cause else {
            write_marker(out, Marker::Failed, format_args!("{kind} for unknown cause"));
            return;
        };
        match &cause.message {
            Some(message) => write_marker(out, Marker::Failed, escape_message(Some(message))),
            None => write_marker(out, Marker::Failed, format_args!("Test {kind}")),
        }
        write_marker(
            out,
            Marker::Log(LogKind::CollapsedStackTrace),
            escape_message(cause.stack_trace.as_deref()),
        );
    }

    fn write_error(&self, out: &mut String, cause: Option<&FailureCause>) {
        let Some(cause) = cause else {
            write_marker(out, Marker::Error, "Unexpected error occurred");
            return;
        };
        // A crash with a message shows its stack trace expanded.
        let (message, log_kind) = match &cause.message {
            Some(message) => (escape_message(Some(message)), LogKind::StackTrace),
            None => ("Test Crashed".to_owned(), LogKind::CollapsedStackTrace),
        };
        write_marker(out, Marker::Error, message);
        write_marker(
            out,
            Marker::Log(log_kind),
            escape_message(cause.stack_trace.as_deref()),
        );
    }

    fn emit(&self, out: &str) {
        let res = {
            let mut output = lock(&self.output);
            output
                .write_all(out.as_bytes())
                .and_then(|()| output.flush())
        };
        if let Err(error) = res {
            let mut write_error = lock(&self.write_error);
            if write_error.is_none() {
                warn!("error writing test output: {error}");
                *write_error = Some(error);
            }
        }
    }
}

impl<W: Write + Send> ExecutionListener for CodewarsReporter<W> {
    fn execution_started(&self, node: &TestNode) {
        // The synthetic root has no counterpart in the output.
        if node.is_root() {
            return;
        }
        self.mark_started(node.id());

        let mut out = String::new();
        if node.is_container() {
            write_marker(&mut out, Marker::Describe, node.display_name());
        } else {
            self.test_count.fetch_add(1, Ordering::AcqRel);
            write_marker(&mut out, Marker::It, node.display_name());
        }
        self.emit(&out);
    }

    fn execution_skipped(&self, node: &TestNode, reason: &str) {
        let marker = if node.is_container() {
            Marker::Describe
        } else {
            Marker::It
        };

        let mut out = String::new();
        write_marker(
            &mut out,
            marker,
            format_args!("[SKIPPED] {}", node.display_name()),
        );
        if !reason.is_empty() {
            write_marker(
                &mut out,
                Marker::Log(LogKind::SkippedReason),
                escape_message(Some(reason)),
            );
        }
        write_marker(&mut out, Marker::CompletedIn, "");
        self.emit(&out);
    }

    fn execution_finished(&self, node: &TestNode, outcome: &ExecutionOutcome) {
        if node.is_root() {
            return;
        }
        self.mark_finished(node.id());

        let mut out = String::new();
        let reports = self.take_report_entries(node.id());
        if !reports.is_empty() {
            let reports = reports.iter().join("\n\n");
            write_marker(
                &mut out,
                Marker::Log(LogKind::Reports),
                escape_message(Some(&reports)),
            );
        }

        match outcome {
            ExecutionOutcome::Successful => {
                if node.is_leaf() {
                    write_marker(&mut out, Marker::Passed, "Test Passed");
                }
            }
            ExecutionOutcome::Aborted { cause } => {
                // An aborted container only means its tests were not run.
                if node.is_leaf() {
                    self.failures.fetch_add(1, Ordering::AcqRel);
                    self.write_failure(&mut out, "Aborted", cause.as_ref());
                }
            }
            ExecutionOutcome::Failed { cause } => {
                self.failures.fetch_add(1, Ordering::AcqRel);
                if node.is_leaf() {
                    self.write_failure(&mut out, "Failed", cause.as_ref());
                } else {
                    self.write_error(&mut out, cause.as_ref());
                }
            }
        }

        write_marker(
            &mut out,
            Marker::CompletedIn,
            self.duration(node.id()).as_millis(),
        );
        self.emit(&out);
    }

    fn reporting_entry_published(&self, node: &TestNode, entry: &ReportEntry) {
        let entry = entry.to_string();
        lock(&self.report_entries)
            .entry(node.id())
            .or_default()
            .insert(entry);
    }
}

/// Makes free-form text safe to use as a marker payload.
///
/// Every line separator is replaced with [`LINE_FEED_TOKEN`]. Absent text becomes the empty
/// string.
pub fn escape_message(text: Option<&str>) -> String {
    match text {
        Some(text) => text
            .replace("\r\n", LINE_FEED_TOKEN)
            .replace('\n', LINE_FEED_TOKEN),
        None => String::new(),
    }
}

fn write_marker(out: &mut String, marker: Marker, payload: impl fmt::Display) {
    swrite!(out, "\n{marker}{payload}\n");
}
