//! An in-memory backend. Worlds that never need to survive the process
//! (tests, benchmarks, throwaway singleplayer sessions) use this as their
//! "dummy" store.

use std::collections::BTreeMap;

use voxen_core::BlockPos;

use super::{DatabaseError, MapDatabase, block_as_integer, integer_as_block};

/// See the module docs.
#[derive(Default)]
pub struct MemoryDatabase {
    blobs: BTreeMap<i64, Vec<u8>>,
}

impl MemoryDatabase {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl MapDatabase for MemoryDatabase {
    fn save_block(&mut self, pos: BlockPos, blob: &[u8]) -> Result<(), DatabaseError> {
        self.blobs.insert(block_as_integer(pos), blob.to_vec());
        Ok(())
    }

    fn load_block(&self, pos: BlockPos) -> Result<Option<Vec<u8>>, DatabaseError> {
        Ok(self.blobs.get(&block_as_integer(pos)).cloned())
    }

    fn delete_block(&mut self, pos: BlockPos) -> Result<bool, DatabaseError> {
        Ok(self.blobs.remove(&block_as_integer(pos)).is_some())
    }

    fn list_all_loadable(&self, out: &mut Vec<BlockPos>) -> Result<(), DatabaseError> {
        out.extend(self.blobs.keys().map(|key| integer_as_block(*key)));
        Ok(())
    }
}
