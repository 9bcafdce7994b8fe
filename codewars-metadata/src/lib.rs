// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-facing vocabulary for the Codewars test runner.
//!
//! The grading harness consumes two things from a runner process: the marker lines written to
//! standard output, and the process exit status. Both are defined here so that tools on either
//! side of the protocol agree on them.

mod exit_codes;
mod markers;

pub use exit_codes::*;
pub use markers::*;
