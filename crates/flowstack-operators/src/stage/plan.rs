//! Pure planning of stage chains from the step graph.
//!
//! Walks the graph forward from an entry node and records one descriptor per
//! stage, in execution order. Nothing is opened or resolved here.

use flowstack_core::id::NodeId;
use flowstack_core::schema::Fields;

use crate::error::{Result, StageError};
use crate::step::{LogicalNode, NodeKind, Scope, StepGraph};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePlan {
    /// A function or filter; `incoming` describes the tuples it receives.
    Each { node: NodeId, incoming: Fields },
    /// Consecutive aggregators folded into one pass over the group.
    CombinedAggregate { nodes: Vec<NodeId>, incoming: Fields },
    Buffer { node: NodeId, incoming: Fields },
    /// Mapper-side end of a chain: select the key and emit to the shuffle.
    GroupEmit {
        node: NodeId,
        position: usize,
        incoming: Fields,
    },
    /// Reducer-side head: co-group one key and hand joined tuples on.
    GroupJoin { node: NodeId },
    Sink { node: NodeId },
}

impl StagePlan {
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            StagePlan::CombinedAggregate { nodes, .. } => nodes.clone(),
            StagePlan::Each { node, .. }
            | StagePlan::Buffer { node, .. }
            | StagePlan::GroupEmit { node, .. }
            | StagePlan::GroupJoin { node }
            | StagePlan::Sink { node } => vec![*node],
        }
    }
}

/// Bounds every walk; a longer path means the graph has a cycle.
fn step_limit(graph: &StepGraph) -> usize {
    graph.node_count() + 1
}

fn unexpected(node: &LogicalNode, side: &str) -> StageError {
    StageError::Config(format!(
        "unexpected {} '{}' on the {side} side",
        node.kind.label(),
        node.name
    ))
}

/// One chain per outgoing scope of `source`.
pub fn plan_mapper_chains(graph: &StepGraph, source: NodeId) -> Result<Vec<Vec<StagePlan>>> {
    let source_node = graph.node(source)?;
    if !matches!(source_node.kind, NodeKind::Source { .. }) {
        return Err(StageError::Config(format!(
            "mapper chains must start at a source, '{}' is a {}",
            source_node.name,
            source_node.kind.label()
        )));
    }

    let outgoing = graph.next_scopes(source);
    if outgoing.is_empty() {
        return Err(StageError::Config(format!(
            "source '{}' has no outgoing scope",
            source_node.name
        )));
    }

    outgoing
        .into_iter()
        .map(|scope| plan_mapper_chain(graph, scope))
        .collect()
}

fn plan_mapper_chain(graph: &StepGraph, first: &Scope) -> Result<Vec<StagePlan>> {
    let mut plans = Vec::new();
    let mut scope = first;

    for _ in 0..step_limit(graph) {
        let node = graph.next_element(scope)?;
        match &node.kind {
            NodeKind::Transform { .. } => {
                plans.push(StagePlan::Each {
                    node: node.id,
                    incoming: scope.fields.clone(),
                });
                scope = graph.next_scope(node.id)?;
            }
            NodeKind::GroupBoundary { .. } => {
                let position = graph
                    .previous_scopes(node.id)
                    .iter()
                    .position(|s| s.index == scope.index)
                    .ok_or_else(|| {
                        StageError::Config(format!("scope into '{}' is not registered", node.name))
                    })?;
                plans.push(StagePlan::GroupEmit {
                    node: node.id,
                    position,
                    incoming: scope.fields.clone(),
                });
                return Ok(plans);
            }
            NodeKind::Sink { .. } => {
                plans.push(StagePlan::Sink { node: node.id });
                return Ok(plans);
            }
            _ => return Err(unexpected(node, "mapper")),
        }
    }
    Err(StageError::Config("mapper walk did not terminate".into()))
}

/// Step-bounded forward walk along single outgoing scopes.
struct Walk<'g> {
    graph: &'g StepGraph,
    steps: usize,
}

impl<'g> Walk<'g> {
    fn new(graph: &'g StepGraph) -> Self {
        Self { graph, steps: 0 }
    }

    fn advance(&mut self, from: &LogicalNode) -> Result<(&'g Scope, &'g LogicalNode)> {
        self.steps += 1;
        if self.steps > step_limit(self.graph) {
            return Err(StageError::Config("reducer walk did not terminate".into()));
        }
        let next = self.graph.next_scope(from.id)?;
        Ok((next, self.graph.next_element(next)?))
    }
}

/// The single chain that starts at the group boundary `group`.
pub fn plan_reducer_chain(graph: &StepGraph, group: NodeId) -> Result<Vec<StagePlan>> {
    let group_node = graph.node(group)?;
    if !matches!(group_node.kind, NodeKind::GroupBoundary { .. }) {
        return Err(StageError::Config(format!(
            "reducer chains must start at a group boundary, '{}' is a {}",
            group_node.name,
            group_node.kind.label()
        )));
    }

    let mut plans = vec![StagePlan::GroupJoin { node: group }];
    let mut walk = Walk::new(graph);
    let mut scope = graph.next_scope(group)?;
    let mut node = graph.next_element(scope)?;

    if matches!(node.kind, NodeKind::Aggregate { .. }) {
        let incoming = scope.fields.clone();
        let mut nodes = Vec::new();
        while matches!(node.kind, NodeKind::Aggregate { .. }) {
            nodes.push(node.id);
            (scope, node) = walk.advance(node)?;
        }
        plans.push(StagePlan::CombinedAggregate { nodes, incoming });
    } else {
        while matches!(node.kind, NodeKind::Buffer { .. }) {
            plans.push(StagePlan::Buffer {
                node: node.id,
                incoming: scope.fields.clone(),
            });
            (scope, node) = walk.advance(node)?;
        }
    }

    while matches!(node.kind, NodeKind::Transform { .. }) {
        plans.push(StagePlan::Each {
            node: node.id,
            incoming: scope.fields.clone(),
        });
        (scope, node) = walk.advance(node)?;
    }

    match node.kind {
        NodeKind::Sink { .. } => {
            plans.push(StagePlan::Sink { node: node.id });
            Ok(plans)
        }
        _ => Err(unexpected(node, "reducer")),
    }
}
