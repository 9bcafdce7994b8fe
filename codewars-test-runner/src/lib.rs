// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs Rust test binaries and reports their results in the Codewars protocol.
//!
//! This crate exposes its entry point so that the binary can be duplicated for tests.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod halt;
mod output;

pub use dispatch::{CodewarsRunnerApp, main_impl};
