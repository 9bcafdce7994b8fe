// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumers of test lifecycle events.
//!
//! An engine reports progress through the [`ExecutionListener`] trait. The
//! [`CodewarsReporter`] implements it by writing the Codewars marker protocol.

mod codewars;
mod events;

pub use codewars::*;
pub use events::*;

use crate::plan::{TestNode, TestPlan};

/// Receives lifecycle events for the nodes of a [`TestPlan`].
///
/// Engines may call these methods from several threads at once, including for sibling nodes
/// running in parallel. For a single node, events are delivered in order: either
/// `execution_skipped`, or `execution_started` followed by any number of
/// `reporting_entry_published` and then `execution_finished`.
///
/// Implementations must return promptly: the engine's scheduler waits on them.
pub trait ExecutionListener: Send + Sync {
    /// Called once the plan has been discovered, before any node starts.
    fn plan_execution_started(&self, _plan: &TestPlan) {}

    /// Called once every node of the plan has finished or been skipped.
    fn plan_execution_finished(&self, _plan: &TestPlan) {}

    /// Called when a node is added to the plan while the plan is executing.
    fn dynamic_test_registered(&self, _node: &TestNode) {}

    /// Called when a node starts executing.
    fn execution_started(&self, node: &TestNode);

    /// Called when a node is skipped. Skipped nodes never start or finish.
    fn execution_skipped(&self, node: &TestNode, reason: &str);

    /// Called when a node finishes executing.
    fn execution_finished(&self, node: &TestNode, outcome: &ExecutionOutcome);

    /// Called when a running node publishes a report entry.
    fn reporting_entry_published(&self, node: &TestNode, entry: &ReportEntry);
}
