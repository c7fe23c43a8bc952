//! In-memory storage backend.
//!
//! HashMap-backed `Storage` used for the `memory://` spill scheme, mostly by
//! tests and small tasks that should not touch the filesystem.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use flowstack_mem::error::{Error as MemError, Result as MemResult};
use flowstack_mem::Storage;

/// Thread-safe in-memory storage. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MemResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|_| MemError::Storage("memory storage lock poisoned".into()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().map(|d| d.contains_key(path)).unwrap_or(false)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutate a stored object in place; returns false when absent.
    pub fn corrupt_with<F: FnOnce(&mut Vec<u8>)>(&self, path: &str, f: F) -> bool {
        match self.lock() {
            Ok(mut data) => match data.get_mut(path) {
                Some(bytes) => {
                    f(bytes);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

impl Storage for MemoryStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        self.lock()?.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, path: &str) -> MemResult<Vec<u8>> {
        self.lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| MemError::Storage(format!("path not found: {path}")))
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        self.lock()?.remove(path);
        Ok(())
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        let mut result: Vec<String> = self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }
}
