#![forbid(unsafe_code)]
//! flowstack-io: spill storage backends and split readers.
//!
//! - `storage`: `FsStorage` and the config-driven backend builder.
//! - `memory_storage`: map-backed storage for `memory://` spill URIs.
//! - `split`: the sequential reader over a source's splits.
//! - `readers`: concrete split sources.

pub mod error;
pub mod memory_storage;
pub mod readers;
pub mod split;
pub mod storage;

pub use error::{Error, Result};
pub use memory_storage::MemoryStorage;
pub use readers::{LineSplitSource, VecSplitSource};
pub use split::{MultiSplitReader, RecordReader, SplitSource};
pub use storage::{build_storage_from_config, FsStorage};
