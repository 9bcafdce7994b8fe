// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for `codewars-test-runner`.
//!
//! The flow of a run is:
//!
//! 1. The [`driver`] expands the path list given on the command line, builds a
//!    [`loading_context`] and a [`DiscoveryRequest`](engine::DiscoveryRequest).
//! 2. An [`engine`] discovers a [`plan`] of containers and tests, and executes it, delivering
//!    lifecycle events to an [`ExecutionListener`](reporter::ExecutionListener).
//! 3. The [`CodewarsReporter`](reporter::CodewarsReporter) turns those events into marker lines
//!    on standard output and counts tests and failures.
//! 4. The driver classifies the run from those counts.

pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
mod helpers;
pub mod loading_context;
pub mod plan;
pub mod reporter;
