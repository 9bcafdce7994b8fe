// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A copy of codewars-test-runner's main.rs, so integration tests can run the runner through
//! `CARGO_BIN_EXE_codewars-test-runner-dup`.

use color_eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    codewars_test_runner::main_impl()
}
