#![forbid(unsafe_code)]
//! flowstack-operators: operation traits, the step graph, stage chains, and
//! the co-group closure.
//!
//! Design intent:
//! - Operations are stateless trait objects shared through `Arc`; per-task
//!   state (aggregation contexts, open writers, buffers) lives in the stages.
//! - Chains are planned as plain descriptors first (`stage::plan`), then built
//!   in one pass (`stage::StageChain::build`).
//! - Everything is synchronous and single-threaded per unit of work.

pub mod error;
pub mod join;
pub mod stage;
pub mod step;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OpError, Result, StageError};
pub use join::{CoGroupClosure, Joiner, JoinerClosure};
pub use stage::{plan_mapper_chains, plan_reducer_chain, ChainResources, StageChain, StagePlan};
pub use step::{LogicalNode, NodeKind, OutputMode, Scope, StepGraph, TransformOp};
pub use traits::{Aggregator, Buffer, Filter, Function, ShuffleWriter, Sink, SinkWriter, Source};
