#![forbid(unsafe_code)]
//! flowstack-core: values, tuples, field lists, ids, and task configuration.
//!
//! Everything here is plain data shared by the spill layer, the stage chain,
//! and the task runners. No I/O lives in this crate.

pub mod config;
pub mod error;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod types;

pub use error::{Error, Result};
pub use schema::{Fields, Selector};
pub use types::{TaggedTuple, Tuple, Value};
