#![forbid(unsafe_code)]
//! flowstack-mem: spill manager, spillable tuple lists, and spill counters.
//!
//! A `SpillableList` keeps tuples in memory until a threshold is crossed and
//! then writes them as checksummed segments through a `SpillManager`. The
//! `Storage` trait the manager writes to is implemented by `flowstack-io`.
//!
//! Everything here is synchronous; a spill blocks the caller.

pub mod collection;
pub mod error;
pub mod list;
pub mod spill;
pub mod tracking;

pub use collection::{SpillableListFactory, TupleCollection, TupleCollectionFactory};
pub use error::{Error, Result};
pub use list::SpillableList;
pub use spill::{Codec, SpillManager, Storage};
pub use tracking::{SpillCounters, SpillCountersSnapshot, SpillEvent, SpillListener, spill_listener};
