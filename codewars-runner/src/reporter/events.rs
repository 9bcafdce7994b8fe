// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// How a node finished executing.
///
/// Delivered to [`ExecutionListener::execution_finished`](super::ExecutionListener).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecutionOutcome {
    /// The node ran to completion.
    Successful,

    /// The node stopped because a precondition was not met.
    Aborted {
        /// What caused the abort, if known.
        cause: Option<FailureCause>,
    },

    /// The node failed. For a leaf this is a test failure, for a container it means the container
    /// itself crashed.
    Failed {
        /// What caused the failure, if known.
        cause: Option<FailureCause>,
    },
}

impl ExecutionOutcome {
    /// Returns a failed outcome with the given cause.
    pub fn failed(cause: FailureCause) -> Self {
        Self::Failed { cause: Some(cause) }
    }
}

/// The cause of an aborted or failed node.
///
/// The message and the stack trace are independently optional.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FailureCause {
    /// A short description of the failure.
    pub message: Option<String>,

    /// Detailed diagnostic output: for a Rust test, everything the test process printed.
    pub stack_trace: Option<String>,
}

impl FailureCause {
    /// Creates a new cause with the given message and stack trace.
    pub fn new(message: Option<String>, stack_trace: Option<String>) -> Self {
        Self {
            message,
            stack_trace,
        }
    }
}

/// A set of key/value pairs published by a running node, independent of its outcome.
///
/// Pairs are kept in the order they were added.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReportEntry {
    pairs: Vec<(String, String)>,
}

impl ReportEntry {
    /// Creates a new, empty report entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key/value pair to the entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ReportEntry {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Displays as `key = value` lines joined by newlines.
impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}
