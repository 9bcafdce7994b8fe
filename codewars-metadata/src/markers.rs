// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// The token that replaces line separators inside marker payloads.
///
/// Payloads are always written on a single line, so the harness can split the stream on newlines
/// and treat every `<...>` prefix as the start of a new event.
pub const LINE_FEED_TOKEN: &str = "<:LF:>";

/// The kinds of marker lines in the Codewars output protocol.
///
/// Every marker is written as `\n<TAG:MODE:LABEL>payload\n`. `MODE` and `LABEL` are only used by
/// [`Marker::Log`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Marker {
    /// A container started or was skipped.
    Describe,

    /// A leaf test started or was skipped.
    It,

    /// A leaf test passed.
    Passed,

    /// A leaf test failed or was aborted.
    Failed,

    /// A container crashed.
    Error,

    /// A free-form diagnostic block.
    Log(LogKind),

    /// A node finished or was skipped.
    CompletedIn,
}

impl Marker {
    /// Returns the tag, mode and label of this marker.
    pub fn parts(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Describe => ("DESCRIBE", "", ""),
            Self::It => ("IT", "", ""),
            Self::Passed => ("PASSED", "", ""),
            Self::Failed => ("FAILED", "", ""),
            Self::Error => ("ERROR", "", ""),
            Self::Log(kind) => ("LOG", kind.mode(), kind.label()),
            Self::CompletedIn => ("COMPLETEDIN", "", ""),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, mode, label) = self.parts();
        write!(f, "<{tag}:{mode}:{label}>")
    }
}

/// The flavors of [`Marker::Log`] blocks.
///
/// A label starting with `-` asks the harness to render the block collapsed. The `ESC` mode marks
/// the payload as already escaped, to be displayed raw.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogKind {
    /// Why a node was skipped.
    SkippedReason,

    /// Report entries published by a node.
    Reports,

    /// The stack trace of a failure, displayed expanded.
    StackTrace,

    /// The stack trace of a failure, displayed collapsed.
    CollapsedStackTrace,
}

impl LogKind {
    fn mode(self) -> &'static str {
        match self {
            Self::SkippedReason | Self::Reports => "",
            Self::StackTrace | Self::CollapsedStackTrace => "ESC",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::SkippedReason => "Skipped Reason",
            Self::Reports => "-Reports",
            Self::StackTrace => "Stack Trace",
            Self::CollapsedStackTrace => "-Stack Trace",
        }
    }
}
