//! Segment file header and metadata.
//!
//! Layout on disk:
//! [ magic: u32 ][ version: u16 ][ codec: u8 ][ reserved: u8 ]
//! [ tuple_count: u64 ][ uncompressed_len: u64 ][ compressed_len: u64 ]
//! [ payload bytes … ]
//!
//! End-to-end checksum is computed over (header || payload) using blake3.

use serde::{Deserialize, Serialize};

use flowstack_core::id::SpillId;

use super::Codec;
use crate::error::{Error, Result};

pub const MAGIC: u32 = 0x464C_5354; // "FLST"
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 8 + 8 + 8;

/// Upper bound on a single decoded segment.
pub const MAX_SEGMENT_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u16,
    pub codec: Codec,
    pub tuple_count: u64,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

impl SegmentHeader {
    pub fn new(codec: Codec, tuple_count: u64, uncompressed_len: u64, compressed_len: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            codec,
            tuple_count,
            uncompressed_len,
            compressed_len,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.codec as u8);
        out.push(0u8); // reserved
        out.extend_from_slice(&self.tuple_count.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_len.to_le_bytes());
        out.extend_from_slice(&self.compressed_len.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Header(format!(
                "short header: {} of {HEADER_LEN} bytes",
                bytes.len()
            )));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if magic != MAGIC || version != VERSION {
            return Err(Error::Header(format!(
                "bad magic/version {magic:#x}/{version}"
            )));
        }
        let codec = Codec::from_u8(bytes[6])?;
        // bytes[7] reserved

        Ok(Self {
            magic,
            version,
            codec,
            tuple_count: le_u64(bytes, 8),
            uncompressed_len: le_u64(bytes, 16),
            compressed_len: le_u64(bytes, 24),
        })
    }

    /// Reject sizes a corrupted header could use to force huge allocations.
    pub fn validate_sizes(&self, max_len: u64) -> Result<()> {
        if self.uncompressed_len > max_len || self.compressed_len > max_len {
            return Err(Error::Header(format!(
                "segment lengths {}/{} exceed max {max_len}",
                self.compressed_len, self.uncompressed_len
            )));
        }
        Ok(())
    }
}

/// Segment name derived from the owning list's spill id and a run index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentName(pub String);

impl SegmentName {
    pub fn new(id: SpillId, run_index: u64) -> Self {
        SegmentName(format!("spill{}_run{}", id.get(), run_index))
    }
}

/// What a list keeps for each spilled segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: SegmentName,
    pub path: String,
    pub codec: Codec,
    pub tuple_count: u64,
    pub compressed_len: u64,
    pub checksum: [u8; 32],
}
