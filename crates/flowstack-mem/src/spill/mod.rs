//! Spill manager for spillable tuple lists.
//!
//! Writes batches of tuples as checksummed segments and reads them back.

pub mod codec;
pub mod segment;

use std::sync::atomic::{AtomicU64, Ordering};

use flowstack_core::id::SpillId;
use flowstack_core::types::Tuple;

use crate::error::{Error, Result};

pub use codec::Codec;
pub use segment::{SegmentHeader, SegmentMeta, SegmentName, HEADER_LEN};

/// Abstract storage interface for spill segments.
///
/// Implemented by `flowstack-io::FsStorage` for the local filesystem and by
/// `flowstack-io::MemoryStorage` for tests and small tasks.
pub trait Storage: Send + Sync {
    /// Write bytes to a path. Creates parent directories if needed.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read the whole object at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete a path. Idempotent (no error if path doesn't exist).
    fn delete(&self, path: &str) -> Result<()>;

    /// List all paths under a prefix.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Serializes tuple batches into segments under one root directory.
///
/// Shared by every spillable list of a task (`Arc<SpillManager>`), so all
/// methods take `&self`.
pub struct SpillManager {
    storage: Box<dyn Storage>,
    codec: Codec,
    root_dir: String,
    next_spill: AtomicU64,
    next_run: AtomicU64,
}

impl SpillManager {
    pub fn new(storage: Box<dyn Storage>, codec: Codec, root_dir: impl Into<String>) -> Self {
        Self {
            storage,
            codec,
            root_dir: root_dir.into().trim_end_matches('/').to_string(),
            next_spill: AtomicU64::new(0),
            next_run: AtomicU64::new(0),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    /// Allocate an id for a new spillable list.
    pub fn next_spill_id(&self) -> SpillId {
        SpillId::new(self.next_spill.fetch_add(1, Ordering::Relaxed))
    }

    /// Write a batch of tuples and return its metadata.
    ///
    /// The payload is serde_json, compressed with the configured codec, and
    /// checksummed with blake3 over header and payload.
    pub fn write_segment(&self, tuples: &[Tuple], spill_id: SpillId) -> Result<SegmentMeta> {
        let uncompressed =
            serde_json::to_vec(tuples).map_err(|e| Error::Codec(format!("json serialize: {e}")))?;
        let compressed = codec::compress(self.codec, &uncompressed)?;

        let header = SegmentHeader::new(
            self.codec,
            tuples.len() as u64,
            uncompressed.len() as u64,
            compressed.len() as u64,
        );
        let header_bytes = header.to_bytes();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(&compressed);
        let checksum: [u8; 32] = hasher.finalize().into();

        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let name = SegmentName::new(spill_id, run);
        let path = format!("{}/{}.seg", self.root_dir, name.0);

        let mut full_segment = Vec::with_capacity(header_bytes.len() + compressed.len());
        full_segment.extend_from_slice(&header_bytes);
        full_segment.extend_from_slice(&compressed);
        self.storage.write(&path, &full_segment)?;

        Ok(SegmentMeta {
            name,
            path,
            codec: self.codec,
            tuple_count: tuples.len() as u64,
            compressed_len: compressed.len() as u64,
            checksum,
        })
    }

    /// Read a segment back, verifying checksum and header.
    pub fn read_segment(&self, meta: &SegmentMeta) -> Result<Vec<Tuple>> {
        let full_segment = self.storage.read(&meta.path)?;

        let computed: [u8; 32] = blake3::hash(&full_segment).into();
        if computed != meta.checksum {
            return Err(Error::ChecksumMismatch(meta.name.0.clone()));
        }

        let header = SegmentHeader::from_bytes(&full_segment)?;
        header.validate_sizes(segment::MAX_SEGMENT_BYTES)?;
        let payload = &full_segment[HEADER_LEN..];
        if payload.len() as u64 != header.compressed_len {
            return Err(Error::Header(format!(
                "payload is {} bytes, header says {}",
                payload.len(),
                header.compressed_len
            )));
        }

        let uncompressed = codec::decompress(header.codec, payload)?;
        let tuples: Vec<Tuple> = serde_json::from_slice(&uncompressed)
            .map_err(|e| Error::Codec(format!("json deserialize: {e}")))?;

        if tuples.len() as u64 != header.tuple_count {
            return Err(Error::Header(format!(
                "decoded {} tuples, header says {}",
                tuples.len(),
                header.tuple_count
            )));
        }
        Ok(tuples)
    }

    pub fn delete_segment(&self, meta: &SegmentMeta) -> Result<()> {
        self.storage.delete(&meta.path)
    }

    /// Paths of every segment currently under the root.
    pub fn list_segments(&self) -> Result<Vec<String>> {
        self.storage.list(&self.root_dir)
    }
}


#[cfg(test)]
mod tests {
    use super::test_storage::MapStorage;
    use super::*;
    use flowstack_core::tuple;

    #[test]
    fn test_run_index_does_not_wrap() {
        let mgr = SpillManager::new(Box::new(MapStorage::default()), Codec::None, "/spill");
        let id = mgr.next_spill_id();
        mgr.next_run.store(u64::from(u32::MAX), Ordering::Relaxed);

        let first = mgr.write_segment(&[tuple!["a"]], id).unwrap();
        let second = mgr.write_segment(&[tuple!["b"]], id).unwrap();
        assert_eq!(second.name.0, "spill0_run4294967296");
        assert_ne!(first.path, second.path);
        assert_eq!(mgr.read_segment(&first).unwrap(), vec![tuple!["a"]]);
    }

    #[test]
    fn test_write_then_read_segment() {
        let storage = MapStorage::default();
        let mgr = SpillManager::new(Box::new(storage.clone()), Codec::None, "/spill/");
        let id = mgr.next_spill_id();

        let batch = vec![tuple!["K1", "a"], tuple!["K1", "b"]];
        let meta = mgr.write_segment(&batch, id).unwrap();
        assert_eq!(meta.tuple_count, 2);
        assert!(meta.path.starts_with("/spill/spill0_run0"));

        assert_eq!(mgr.read_segment(&meta).unwrap(), batch);
        assert_eq!(mgr.list_segments().unwrap().len(), 1);

        mgr.delete_segment(&meta).unwrap();
        assert!(mgr.list_segments().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_segment_fails_checksum() {
        let storage = MapStorage::default();
        let mgr = SpillManager::new(Box::new(storage.clone()), Codec::None, "/spill");
        let meta = mgr.write_segment(&[tuple!["x"]], SpillId::new(9)).unwrap();

        {
            let mut objects = storage.objects.lock().unwrap();
            let bytes = objects.get_mut(&meta.path).unwrap();
            let last = bytes.len() - 1;
            bytes[last] ^= 0x01;
        }

        assert!(matches!(
            mgr.read_segment(&meta),
            Err(Error::ChecksumMismatch(_))
        ));
    }

    #[test]
    fn test_run_indices_are_unique() {
        let mgr = SpillManager::new(Box::new(MapStorage::default()), Codec::None, "/s");
        let id = mgr.next_spill_id();
        let a = mgr.write_segment(&[tuple![1i64]], id).unwrap();
        let b = mgr.write_segment(&[tuple![2i64]], id).unwrap();
        assert_ne!(a.path, b.path);
    }
}
