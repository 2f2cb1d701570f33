//! The byte source collaborator: a read-only, synchronous provider of the
//! bytes the disassembler decodes.

use crate::error::{Error, Result};

/// A read-only byte stream of known total length. Reads are total within
/// `[0, length())`; reads that would run past the end fail rather than
/// silently truncating.
///
/// Implementations are expected to be synchronous and side-effect free; the
/// driver may call `read` from multiple worker threads concurrently for
/// different procedures.
pub trait ByteSource: Send + Sync {
    /// Total number of bytes available.
    fn length(&self) -> u64;

    /// Read `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`Error::Region`] if `offset + len` exceeds [`length`](Self::length).
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>>;
}

/// A [`ByteSource`] backed by an in-memory buffer, the common case for
/// tests and for callers that have already mapped a file into memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    /// Wrap `bytes` as a byte source.
    pub fn new(bytes: Vec<u8>) -> MemorySource {
        MemorySource { bytes }
    }
}

impl ByteSource for MemorySource {
    fn length(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| Error::Region(format!("offset {} + len {} overflows", offset, len)))?;
        if end > self.length() {
            return Err(Error::Region(format!(
                "read [{}, {}) exceeds source length {}",
                offset,
                end,
                self.length()
            )));
        }
        Ok(self.bytes[offset as usize..end as usize].to_vec())
    }
}
