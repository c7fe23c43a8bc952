//! Storage adapters implementing `flowstack_mem::Storage`.
//!
//! The backend is chosen from the spill URI scheme: `file://` (or no URI)
//! selects the local filesystem, `memory://` a process-local map.

mod fs;
pub use fs::FsStorage;

use flowstack_core::config::StorageConfig;
use flowstack_mem::Storage;

use crate::error::{Error, Result};
use crate::memory_storage::MemoryStorage;

/// Build the correct storage backend using the provided configuration.
pub fn build_storage_from_config(cfg: &StorageConfig) -> Result<Box<dyn Storage>> {
    match cfg.scheme() {
        Some("file") | None => Ok(Box::new(FsStorage::new())),
        Some("memory") | Some("mem") => Ok(Box::new(MemoryStorage::new())),
        Some(other) => Err(Error::Config(format!("unsupported spill scheme '{other}'"))),
    }
}
