//! A database backend keeping one file per block in a flat directory,
//! named by the decimal block key. Slow for huge worlds but dependency-free
//! and easy to inspect, which makes it the default for tools and tests
//! that want durability.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::warn;
use voxen_core::BlockPos;

use super::{DatabaseError, MapDatabase, block_as_integer, integer_as_block};
use crate::fs_util::{TMP_SUFFIX, safe_write};

/// See the module docs.
pub struct FlatFileDatabase {
    dir: PathBuf,
}

impl FlatFileDatabase {
    /// Opens (and if needed creates) the block directory.
    ///
    /// # Errors
    /// [`DatabaseError::Io`] when the directory cannot be created or is not
    /// accessible.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        // fail early on unusable directories instead of on the first save
        fs::metadata(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, pos: BlockPos) -> PathBuf {
        self.dir.join(block_as_integer(pos).to_string())
    }
}

impl MapDatabase for FlatFileDatabase {
    fn save_block(&mut self, pos: BlockPos, blob: &[u8]) -> Result<(), DatabaseError> {
        safe_write(&self.path_for(pos), blob)?;
        Ok(())
    }

    fn load_block(&self, pos: BlockPos) -> Result<Option<Vec<u8>>, DatabaseError> {
        match fs::read(self.path_for(pos)) {
            Ok(blob) => Ok(Some(blob)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn delete_block(&mut self, pos: BlockPos) -> Result<bool, DatabaseError> {
        match fs::remove_file(self.path_for(pos)) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn list_all_loadable(&self, out: &mut Vec<BlockPos>) -> Result<(), DatabaseError> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                // leftover from an interrupted save; harmless
                continue;
            }
            match name.parse::<i64>() {
                Ok(key) => out.push(integer_as_block(key)),
                Err(_) => warn!("ignoring stray file in block store: {name}"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::I16Vec3;

    fn temp_database(tag: &str) -> FlatFileDatabase {
        let dir = std::env::temp_dir().join(format!("voxen_flatfile_{tag}"));
        let _ = fs::remove_dir_all(&dir);
        FlatFileDatabase::open(dir).unwrap()
    }

    #[test]
    fn save_load_delete_cycle() {
        let mut database = temp_database("cycle");
        let pos = BlockPos::new(I16Vec3::new(1, -2, 3)).unwrap();

        assert_eq!(database.load_block(pos).unwrap(), None);
        database.save_block(pos, b"blob-a").unwrap();
        assert_eq!(database.load_block(pos).unwrap().as_deref(), Some(&b"blob-a"[..]));

        database.save_block(pos, b"blob-b").unwrap();
        assert_eq!(database.load_block(pos).unwrap().as_deref(), Some(&b"blob-b"[..]));

        assert!(database.delete_block(pos).unwrap());
        assert!(!database.delete_block(pos).unwrap());
        assert_eq!(database.load_block(pos).unwrap(), None);
    }

    #[test]
    fn listing_returns_saved_positions() {
        let mut database = temp_database("list");
        let positions = [
            BlockPos::new(I16Vec3::new(0, 0, 0)).unwrap(),
            BlockPos::new(I16Vec3::new(-5, 9, 2)).unwrap(),
        ];
        for pos in positions {
            database.save_block(pos, b"x").unwrap();
        }
        let mut listed = Vec::new();
        database.list_all_loadable(&mut listed).unwrap();
        listed.sort();
        let mut expected = positions.to_vec();
        expected.sort();
        assert_eq!(listed, expected);
    }
}
