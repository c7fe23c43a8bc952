//! Convenient re-exports for downstream crates.

pub use crate::config::{StorageConfig, TaskConfig};
pub use crate::error::{Error, Result};
pub use crate::id::{NodeId, SpillId, TaskId};
pub use crate::schema::{Fields, Selector};
pub use crate::types::{TaggedTuple, Tuple, Value};
