//! Runtime stage chain built from a list of [`StagePlan`]s.

use std::sync::Arc;

use flowstack_core::schema::Fields;
use flowstack_core::types::Tuple;
use flowstack_mem::{SpillCounters, TupleCollectionFactory};

use crate::error::{Result, StageError};
use crate::join::{CoGroupClosure, GroupInput};
use crate::stage::element::{
    push_joined, push_record, AggregateSlot, BufferStage, EachStage, GroupEmitStage,
    GroupJoinStage, SinkStage, Stage, StageKind, Trap,
};
use crate::stage::plan::StagePlan;
use crate::step::{LogicalNode, NodeKind, StepGraph};
use crate::traits::ShuffleWriter;

/// Task-scoped collaborators a chain may need while it is being built.
#[derive(Clone, Default)]
pub struct ChainResources {
    /// Required by mapper chains that end at a group boundary.
    pub shuffle: Option<Arc<dyn ShuffleWriter>>,
    /// Required by reducer chains; backs the co-group buffers.
    pub collections: Option<Arc<dyn TupleCollectionFactory>>,
    pub spill_counters: Arc<SpillCounters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    Built,
    Open,
    Closed,
}

pub struct StageChain {
    stages: Vec<Stage>,
    state: ChainState,
    records_in: u64,
    groups_in: u64,
}

impl StageChain {
    /// Construct every stage of `plans` in order. Nothing is opened.
    pub fn build(
        graph: &StepGraph,
        plans: &[StagePlan],
        resources: &ChainResources,
    ) -> Result<Self> {
        if plans.is_empty() {
            return Err(StageError::Config("cannot build an empty chain".into()));
        }
        let stages = plans
            .iter()
            .map(|plan| build_stage(graph, plan, resources))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            stages = stages.len(),
            names = ?stages.iter().map(Stage::name).collect::<Vec<_>>(),
            "built stage chain"
        );

        Ok(Self {
            stages,
            state: ChainState::Built,
            records_in: 0,
            groups_in: 0,
        })
    }

    /// Open every sink and trap writer of the chain.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            ChainState::Open => return Ok(()),
            ChainState::Closed => {
                return Err(StageError::Protocol("cannot reopen a closed chain".into()))
            }
            ChainState::Built => {}
        }
        self.state = ChainState::Open;
        for stage in self.stages.iter_mut() {
            stage.open()?;
        }
        Ok(())
    }

    pub fn push_record(&mut self, tuple: Tuple) -> Result<()> {
        self.ensure_open()?;
        self.records_in += 1;
        push_record(&mut self.stages, tuple)
    }

    /// Feed one key's tagged tuples through a reducer chain.
    pub fn push_group(&mut self, key: &Tuple, values: GroupInput) -> Result<()> {
        self.ensure_open()?;
        self.groups_in += 1;
        push_joined(&mut self.stages, key, values)
    }

    /// Close every writer that was opened. Safe to call after a failure and
    /// more than once; the first close error is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ChainState::Closed {
            return Ok(());
        }
        self.state = ChainState::Closed;

        let mut first_err = None;
        for stage in self.stages.iter_mut() {
            if let Err(e) = stage.close() {
                first_err.get_or_insert(e);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            records = self.records_in,
            groups = self.groups_in,
            diverted = self.diverted(),
            failed = first_err.is_some(),
            "closed stage chain"
        );

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ChainState::Open => Ok(()),
            ChainState::Built => Err(StageError::Protocol(
                "chain received input before open".into(),
            )),
            ChainState::Closed => Err(StageError::Protocol(
                "chain received input after close".into(),
            )),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn records_in(&self) -> u64 {
        self.records_in
    }

    pub fn groups_in(&self) -> u64 {
        self.groups_in
    }

    /// Records diverted to traps across the chain.
    pub fn diverted(&self) -> u64 {
        self.stages.iter().map(Stage::diverted).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.state == ChainState::Closed
    }
}

impl Drop for StageChain {
    fn drop(&mut self) {
        if self.state == ChainState::Open {
            if let Err(_e) = self.close() {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "closing stage chain on drop failed");
            }
        }
    }
}

fn mismatch(node: &LogicalNode, expected: &str) -> StageError {
    StageError::Config(format!(
        "node '{}' is a {}, expected a {expected}",
        node.name,
        node.kind.label()
    ))
}

fn trap_for(graph: &StepGraph, node: &LogicalNode) -> Option<Trap> {
    graph.error_target(&node.name).map(Trap::new)
}

fn build_stage(graph: &StepGraph, plan: &StagePlan, resources: &ChainResources) -> Result<Stage> {
    match plan {
        StagePlan::Each { node, incoming } => {
            let node = graph.node(*node)?;
            let NodeKind::Transform {
                op,
                arguments,
                output,
            } = &node.kind
            else {
                return Err(mismatch(node, "transform"));
            };
            Ok(Stage {
                name: node.name.clone(),
                kind: StageKind::Each(EachStage {
                    op: op.clone(),
                    arguments: arguments.resolve(incoming)?,
                    output: *output,
                }),
                trap: trap_for(graph, node),
            })
        }
        StagePlan::CombinedAggregate { nodes, incoming } => {
            let mut slots = Vec::with_capacity(nodes.len());
            for id in nodes {
                let node = graph.node(*id)?;
                let NodeKind::Aggregate {
                    aggregator,
                    arguments,
                } = &node.kind
                else {
                    return Err(mismatch(node, "aggregate"));
                };
                slots.push(AggregateSlot {
                    name: node.name.clone(),
                    aggregator: Arc::clone(aggregator),
                    arguments: arguments.resolve(incoming)?,
                    trap: trap_for(graph, node),
                });
            }
            let name = slots
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join("+");
            Ok(Stage {
                name,
                kind: StageKind::Aggregate(slots),
                trap: None,
            })
        }
        StagePlan::Buffer { node, incoming } => {
            let node = graph.node(*node)?;
            let NodeKind::Buffer { buffer, arguments } = &node.kind else {
                return Err(mismatch(node, "buffer"));
            };
            Ok(Stage {
                name: node.name.clone(),
                kind: StageKind::Buffer(BufferStage {
                    buffer: Arc::clone(buffer),
                    arguments: arguments.resolve(incoming)?,
                }),
                trap: trap_for(graph, node),
            })
        }
        StagePlan::GroupEmit {
            node,
            position,
            incoming,
        } => {
            let node = graph.node(*node)?;
            let NodeKind::GroupBoundary {
                key_fields,
                num_self_joins,
                ..
            } = &node.kind
            else {
                return Err(mismatch(node, "group boundary"));
            };
            let fields = if *num_self_joins > 0 {
                key_fields.first()
            } else {
                key_fields.get(*position)
            }
            .ok_or_else(|| {
                StageError::Config(format!(
                    "group '{}' has no grouping fields for input {position}",
                    node.name
                ))
            })?;
            let shuffle = resources.shuffle.clone().ok_or_else(|| {
                StageError::Config(format!(
                    "chain into group '{}' needs a shuffle writer",
                    node.name
                ))
            })?;
            Ok(Stage {
                name: node.name.clone(),
                kind: StageKind::GroupEmit(GroupEmitStage {
                    key_positions: incoming.positions_of(fields)?,
                    position: *position,
                    shuffle,
                }),
                trap: trap_for(graph, node),
            })
        }
        StagePlan::GroupJoin { node } => {
            let node = graph.node(*node)?;
            let NodeKind::GroupBoundary {
                key_fields,
                num_self_joins,
                joiner,
            } = &node.kind
            else {
                return Err(mismatch(node, "group boundary"));
            };
            check_group_inputs(graph, node, key_fields, *num_self_joins)?;

            let width = if *num_self_joins > 0 {
                num_self_joins + 1
            } else {
                key_fields.len()
            };
            if width > 1 && joiner.is_none() {
                return Err(StageError::Config(format!(
                    "group '{}' joins {width} inputs but has no joiner",
                    node.name
                )));
            }
            let factory = resources.collections.as_ref().ok_or_else(|| {
                StageError::Config(format!(
                    "group '{}' needs a tuple collection factory",
                    node.name
                ))
            })?;
            let closure = CoGroupClosure::new(
                node.name.clone(),
                key_fields,
                *num_self_joins,
                factory.as_ref(),
                Arc::clone(&resources.spill_counters),
            )?;
            Ok(Stage {
                name: node.name.clone(),
                kind: StageKind::GroupJoin(GroupJoinStage {
                    closure,
                    joiner: joiner.clone(),
                }),
                trap: trap_for(graph, node),
            })
        }
        StagePlan::Sink { node } => {
            let node = graph.node(*node)?;
            let NodeKind::Sink { sink } = &node.kind else {
                return Err(mismatch(node, "sink"));
            };
            Ok(Stage {
                name: node.name.clone(),
                kind: StageKind::Sink(SinkStage {
                    sink: Arc::clone(sink),
                    writer: None,
                }),
                trap: None,
            })
        }
    }
}

/// A group fed by several scopes must declare grouping fields for each;
/// a self-join is fed by exactly one. Graphs holding only the reducer side
/// have no incoming scopes and are not checked.
fn check_group_inputs(
    graph: &StepGraph,
    node: &LogicalNode,
    key_fields: &[Fields],
    num_self_joins: usize,
) -> Result<()> {
    let inputs = graph.previous_scopes(node.id).len();
    let expected = if num_self_joins > 0 {
        1
    } else {
        key_fields.len()
    };
    if inputs > 0 && inputs != expected {
        return Err(StageError::Config(format!(
            "group '{}' has {inputs} incoming scopes but expects {expected}",
            node.name
        )));
    }
    Ok(())
}
