// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tree of containers and tests that an engine executes.
//!
//! A [`TestPlan`] is an arena: every node gets a [`NodeId`] when it is added, and the id stays
//! valid for the lifetime of the plan. Listeners key their per-node state by `NodeId`, which is
//! cheap to copy and hash from any thread.

use std::fmt;

/// The identity of a node within a [`TestPlan`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(usize);

impl NodeId {
    /// The id of the synthetic root of every plan.
    pub const ROOT: Self = Self(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a node groups other nodes or is a single test.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// A grouping node: a test binary or a module within one.
    Container,

    /// A single test with a terminal outcome.
    Leaf,
}

/// A node within a [`TestPlan`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestNode {
    id: NodeId,
    parent: Option<NodeId>,
    unique_id: String,
    display_name: String,
    kind: NodeKind,
}

impl TestNode {
    /// Returns the id of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the id of the parent of this node, or `None` for the synthetic root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns true if this is the synthetic root of the plan.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns a string that identifies this node across runs, for example
    /// `[engine:libtest]/[binary:integration]/[test:adds]`.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Returns the name shown for this node in the output.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the kind of this node.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns true if this node is a container.
    pub fn is_container(&self) -> bool {
        self.kind == NodeKind::Container
    }

    /// Returns true if this node is a leaf test.
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }
}

/// A tree of containers and tests.
#[derive(Clone, Debug)]
pub struct TestPlan {
    nodes: Vec<TestNode>,
    children: Vec<Vec<NodeId>>,
}

impl TestPlan {
    /// Creates a new plan containing only the synthetic root, identified as `[engine:<engine>]`.
    pub fn new(engine: &str) -> Self {
        let root = TestNode {
            id: NodeId::ROOT,
            parent: None,
            unique_id: format!("[engine:{engine}]"),
            display_name: engine.to_owned(),
            kind: NodeKind::Container,
        };
        Self {
            nodes: vec![root],
            children: vec![Vec::new()],
        }
    }

    /// Returns the synthetic root.
    pub fn root(&self) -> &TestNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Adds a node under `parent`.
    ///
    /// `segment_type` and `segment` extend the parent's unique id as `/[<type>:<segment>]`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a container of this plan.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        segment_type: &str,
        segment: &str,
        display_name: impl Into<String>,
    ) -> NodeId {
        let parent_node = self.node(parent);
        assert!(
            parent_node.is_container(),
            "parent {parent} of a new node must be a container"
        );

        let id = NodeId(self.nodes.len());
        let unique_id = format!("{}/[{segment_type}:{segment}]", parent_node.unique_id);
        self.nodes.push(TestNode {
            id,
            parent: Some(parent),
            unique_id,
            display_name: display_name.into(),
            kind,
        });
        self.children.push(Vec::new());
        self.children[parent.0].push(id);
        id
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this plan.
    pub fn node(&self, id: NodeId) -> &TestNode {
        &self.nodes[id.0]
    }

    /// Returns the children of the given node, in the order they were added.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.children[id.0]
    }

    /// Returns the number of leaf tests in the plan.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }
}
