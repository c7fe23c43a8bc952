//! The logical step graph a task executes.
//!
//! Produced by the plan compiler and consumed read-only here. Nodes are a
//! tagged enum; scopes are the edges and carry the fields visible on them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use flowstack_core::id::NodeId;
use flowstack_core::schema::{Fields, Selector};

use crate::error::{Result, StageError};
use crate::join::Joiner;
use crate::traits::{Aggregator, Buffer, Filter, Function, Sink, Source};

#[derive(Clone)]
pub enum TransformOp {
    Function(Arc<dyn Function>),
    Filter(Arc<dyn Filter>),
}

/// What a function stage forwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Only the function's results.
    #[default]
    Results,
    /// The incoming tuple followed by each result.
    All,
}

#[derive(Clone)]
pub enum NodeKind {
    Source {
        source: Arc<dyn Source>,
    },
    Transform {
        op: TransformOp,
        arguments: Selector,
        output: OutputMode,
    },
    Aggregate {
        aggregator: Arc<dyn Aggregator>,
        arguments: Selector,
    },
    Buffer {
        buffer: Arc<dyn Buffer>,
        arguments: Selector,
    },
    GroupBoundary {
        /// Grouping fields per input, in input position order.
        key_fields: Vec<Fields>,
        num_self_joins: usize,
        joiner: Option<Arc<dyn Joiner>>,
    },
    Sink {
        sink: Arc<dyn Sink>,
    },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Source { .. } => "source",
            NodeKind::Transform { .. } => "transform",
            NodeKind::Aggregate { .. } => "aggregate",
            NodeKind::Buffer { .. } => "buffer",
            NodeKind::GroupBoundary { .. } => "group boundary",
            NodeKind::Sink { .. } => "sink",
        }
    }
}

#[derive(Clone)]
pub struct LogicalNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

impl fmt::Debug for LogicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub index: usize,
    pub from: NodeId,
    pub to: NodeId,
    /// Fields of the tuples travelling along this edge.
    pub fields: Fields,
    /// Set on the outgoing edge of a group boundary.
    pub grouping: Option<Fields>,
}

#[derive(Default)]
pub struct StepGraph {
    nodes: Vec<LogicalNode>,
    scopes: Vec<Scope>,
    traps: HashMap<String, Arc<dyn Sink>>,
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        self.nodes.push(LogicalNode {
            id,
            name: name.into(),
            kind,
        });
        id
    }

    /// Add an edge. Incoming edges of a group boundary take input positions in
    /// the order they are connected.
    pub fn connect(&mut self, from: NodeId, to: NodeId, fields: Fields) -> usize {
        self.push_scope(from, to, fields, None)
    }

    pub fn connect_grouped(
        &mut self,
        from: NodeId,
        to: NodeId,
        fields: Fields,
        grouping: Fields,
    ) -> usize {
        self.push_scope(from, to, fields, Some(grouping))
    }

    fn push_scope(
        &mut self,
        from: NodeId,
        to: NodeId,
        fields: Fields,
        grouping: Option<Fields>,
    ) -> usize {
        let index = self.scopes.len();
        self.scopes.push(Scope {
            index,
            from,
            to,
            fields,
            grouping,
        });
        index
    }

    /// Divert failures of the node named `node_name` to `sink`.
    pub fn set_trap(&mut self, node_name: impl Into<String>, sink: Arc<dyn Sink>) {
        self.traps.insert(node_name.into(), sink);
    }

    pub fn node(&self, id: NodeId) -> Result<&LogicalNode> {
        self.nodes
            .get(id.get() as usize)
            .ok_or_else(|| StageError::Config(format!("unknown node {id}")))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn next_scopes(&self, id: NodeId) -> Vec<&Scope> {
        self.scopes.iter().filter(|s| s.from == id).collect()
    }

    /// The single outgoing scope of a node.
    pub fn next_scope(&self, id: NodeId) -> Result<&Scope> {
        let next = self.next_scopes(id);
        match next.as_slice() {
            [one] => Ok(one),
            [] => Err(StageError::Config(format!(
                "node '{}' has no outgoing scope",
                self.node(id)?.name
            ))),
            many => Err(StageError::Config(format!(
                "node '{}' branches into {} scopes",
                self.node(id)?.name,
                many.len()
            ))),
        }
    }

    pub fn next_element(&self, scope: &Scope) -> Result<&LogicalNode> {
        self.node(scope.to)
    }

    pub fn previous_scopes(&self, id: NodeId) -> Vec<&Scope> {
        self.scopes.iter().filter(|s| s.to == id).collect()
    }

    pub fn error_target(&self, node_name: &str) -> Option<Arc<dyn Sink>> {
        self.traps.get(node_name).cloned()
    }
}
