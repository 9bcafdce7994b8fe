// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test engines: discover a [`TestPlan`](crate::plan::TestPlan) and execute it.

mod libtest;

pub use libtest::*;

use crate::{errors::EngineError, reporter::ExecutionListener};
use camino::Utf8PathBuf;

/// What an engine should discover: the directories to scan for tests.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiscoveryRequest {
    roots: Vec<Utf8PathBuf>,
}

impl DiscoveryRequest {
    /// Creates a new request for the given roots, scanned in order.
    pub fn new(roots: Vec<Utf8PathBuf>) -> Self {
        Self { roots }
    }

    /// Returns the roots to scan.
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }
}

/// Discovers and executes tests, reporting progress to a listener.
pub trait TestEngine {
    /// Returns the identifier of this engine, used as the root of its plans.
    fn id(&self) -> &str;

    /// Discovers the tests under the request's roots and executes them.
    ///
    /// The engine calls [`ExecutionListener::plan_execution_started`] once discovery is done,
    /// then delivers an event for every node in the plan, and finally calls
    /// [`ExecutionListener::plan_execution_finished`]. Test failures are reported to the
    /// listener; an error is returned only if the plan could not be executed at all.
    fn execute(
        &self,
        request: &DiscoveryRequest,
        listener: &dyn ExecutionListener,
    ) -> Result<(), EngineError>;
}
