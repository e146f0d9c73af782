//! Chunk sizing and planning for batch uploads.
//!
//! Large batches are cut into smaller chunks so a single bad request affects
//! fewer records and each request carries a bounded payload.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};

/// Record count above which the large-dataset chunk size applies.
pub const DEFAULT_LARGE_THRESHOLD: usize = 500;
/// Chunk size for batches at or below the threshold.
pub const DEFAULT_CHUNK_SIZE: usize = 100;
/// Chunk size for batches above the threshold.
pub const DEFAULT_LARGE_CHUNK_SIZE: usize = 50;

/// Chunk sizing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPolicy {
    /// Batches strictly larger than this use `large_chunk_size`
    pub large_threshold: usize,
    /// Chunk size for ordinary batches
    pub chunk_size: usize,
    /// Chunk size for large batches
    pub large_chunk_size: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            large_chunk_size: DEFAULT_LARGE_CHUNK_SIZE,
        }
    }
}

impl ChunkPolicy {
    /// Build a policy, rejecting zero chunk sizes.
    pub fn new(large_threshold: usize, chunk_size: usize, large_chunk_size: usize) -> Result<Self> {
        let policy = Self {
            large_threshold,
            chunk_size,
            large_chunk_size,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check that both chunk sizes are usable.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkSize(self.chunk_size));
        }
        if self.large_chunk_size == 0 {
            return Err(Error::InvalidChunkSize(self.large_chunk_size));
        }
        Ok(())
    }

    /// Chunk size for a batch of `len` records. An explicit override wins.
    ///
    /// The fields are public, so the policy is checked here as well as in
    /// [`ChunkPolicy::new`].
    pub fn chunk_size_for(&self, len: usize, override_size: Option<usize>) -> Result<usize> {
        if override_size.is_none() {
            self.validate()?;
        }
        match override_size {
            Some(0) => Err(Error::InvalidChunkSize(0)),
            Some(size) => Ok(size),
            None if len > self.large_threshold => Ok(self.large_chunk_size),
            None => Ok(self.chunk_size),
        }
    }

    /// Split `items` into consecutive chunks according to the policy.
    pub fn plan<'a, T>(
        &self,
        items: &'a [T],
        override_size: Option<usize>,
    ) -> Result<std::slice::Chunks<'a, T>> {
        let size = self.chunk_size_for(items.len(), override_size)?;
        Ok(items.chunks(size))
    }
}
