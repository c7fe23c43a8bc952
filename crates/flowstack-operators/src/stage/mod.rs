//! Stage chains: planning from the step graph and execution.

mod chain;
mod element;
mod plan;

pub use chain::{ChainResources, StageChain};
pub use element::Stage;
pub use plan::{plan_mapper_chains, plan_reducer_chain, StagePlan};
