//! A wrapper that exposes another backend read-only, e.g. for examining a
//! world without risking writes, or as the lower layer of a
//! copy-on-emerge setup where a pristine template world backs a live one.

use voxen_core::BlockPos;

use super::{DatabaseError, MapDatabase};

/// See the module docs.
pub struct ReadOnlyDatabase {
    inner: Box<dyn MapDatabase>,
}

impl ReadOnlyDatabase {
    /// Wraps a backend; every mutating call will fail with
    /// [`DatabaseError::ReadOnly`] from here on.
    #[must_use]
    pub fn new(inner: Box<dyn MapDatabase>) -> Self {
        Self { inner }
    }
}

impl MapDatabase for ReadOnlyDatabase {
    fn begin_save(&mut self) -> Result<(), DatabaseError> {
        Err(DatabaseError::ReadOnly)
    }

    fn save_block(&mut self, _pos: BlockPos, _blob: &[u8]) -> Result<(), DatabaseError> {
        Err(DatabaseError::ReadOnly)
    }

    fn end_save(&mut self) -> Result<(), DatabaseError> {
        Err(DatabaseError::ReadOnly)
    }

    fn load_block(&self, pos: BlockPos) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.inner.load_block(pos)
    }

    fn delete_block(&mut self, _pos: BlockPos) -> Result<bool, DatabaseError> {
        Err(DatabaseError::ReadOnly)
    }

    fn list_all_loadable(&self, out: &mut Vec<BlockPos>) -> Result<(), DatabaseError> {
        self.inner.list_all_loadable(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use glam::I16Vec3;

    #[test]
    fn reads_pass_through_writes_fail() {
        let pos = BlockPos::new(I16Vec3::new(4, 5, 6)).unwrap();
        let mut inner = MemoryDatabase::new();
        inner.save_block(pos, b"frozen").unwrap();

        let mut readonly = ReadOnlyDatabase::new(Box::new(inner));
        assert_eq!(
            readonly.load_block(pos).unwrap().as_deref(),
            Some(&b"frozen"[..])
        );
        assert!(matches!(
            readonly.save_block(pos, b"nope"),
            Err(DatabaseError::ReadOnly)
        ));
        assert!(matches!(
            readonly.delete_block(pos),
            Err(DatabaseError::ReadOnly)
        ));
    }
}
