// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `codewars-test-runner`.
///
/// The grading harness only distinguishes three outcomes. Setup problems (bad arguments, bad
/// configuration, unreadable path entries) share the failure code, since in every case the
/// submission cannot be considered passing.
pub enum RunnerExitCode {}

impl RunnerExitCode {
    /// Every discovered test passed.
    pub const OK: i32 = 0;

    /// At least one test failed, or a container crashed.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// No tests were discovered.
    pub const NO_TESTS_FOUND: i32 = 2;

    /// The command line could not be parsed. No tests were run.
    pub const USAGE_ERROR: i32 = 1;

    /// A user issue happened while setting up the run: invalid configuration or an unreadable
    /// path entry. No tests were run.
    pub const SETUP_ERROR: i32 = 1;

    /// Writing protocol output to stdout failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 1;
}
