#![forbid(unsafe_code)]
//! flowstack-exec: the per-task runners.
//!
//! A host builds a [`TaskContext`] from configuration, then drives either a
//! [`MapperStack`] (raw records in, tagged tuples out to the shuffle) or a
//! [`ReducerStack`] (one sorted group at a time in, sink output out).
//! Both own their chains for exactly one unit of work and must be closed.

pub mod context;
pub mod error;
pub mod local;
#[cfg(feature = "tracing")]
pub mod logging;
pub mod mapper;
pub mod metrics;
pub mod reducer;

pub use context::TaskContext;
pub use error::{ExecError, Result};
pub use local::LocalShuffle;
pub use mapper::MapperStack;
pub use metrics::{TaskCounters, TaskCountersSnapshot};
pub use reducer::ReducerStack;
