//! Durable block storage: a pure blob key-value contract plus the bundled
//! backends (directory of flat files, in-memory, readonly overlay).
//!
//! Keys are the classic 64-bit packing `z·2²⁴ + y·2¹² + x` with each axis
//! reduced to a 12-bit signed value, which keeps every historical world
//! readable.

pub(crate) mod flatfile;
pub(crate) mod memory;
pub(crate) mod readonly;

pub use flatfile::FlatFileDatabase;
pub use memory::MemoryDatabase;
pub use readonly::ReadOnlyDatabase;

use glam::I16Vec3;
use voxen_core::BlockPos;

/// Backend failures.
#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    /// An I/O error from the underlying store.
    #[error("database i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A write arrived at a readonly backend.
    #[error("database is readonly")]
    ReadOnly,
    /// The stored data is not usable.
    #[error("database corruption: {0}")]
    Corrupt(String),
}

/// The blob store contract. Implementations must tolerate out-of-order
/// writes; save order across blocks is not preserved by the map.
pub trait MapDatabase: Send + Sync {
    /// Marks the start of a batch of saves; backends may open a
    /// transaction here.
    ///
    /// # Errors
    /// Backend-specific I/O failures.
    fn begin_save(&mut self) -> Result<(), DatabaseError> {
        Ok(())
    }

    /// Stores one block blob, replacing any previous blob for the position.
    ///
    /// # Errors
    /// Backend-specific I/O failures.
    fn save_block(&mut self, pos: BlockPos, blob: &[u8]) -> Result<(), DatabaseError>;

    /// Marks the end of a batch of saves; backends may commit here.
    ///
    /// # Errors
    /// Backend-specific I/O failures.
    fn end_save(&mut self) -> Result<(), DatabaseError> {
        Ok(())
    }

    /// Loads one block blob, `None` when the position was never saved.
    ///
    /// # Errors
    /// Backend-specific I/O failures.
    fn load_block(&self, pos: BlockPos) -> Result<Option<Vec<u8>>, DatabaseError>;

    /// Removes one block blob, reporting whether it existed.
    ///
    /// # Errors
    /// Backend-specific I/O failures.
    fn delete_block(&mut self, pos: BlockPos) -> Result<bool, DatabaseError>;

    /// Appends every loadable position to `out`, in no particular order.
    ///
    /// # Errors
    /// Backend-specific I/O failures.
    fn list_all_loadable(&self, out: &mut Vec<BlockPos>) -> Result<(), DatabaseError>;
}

const AXIS_BITS: u64 = 12;
const AXIS_RANGE: i64 = 1 << AXIS_BITS; // 4096
const AXIS_CENTER: i64 = AXIS_RANGE / 2; // 2048

fn unsigned_to_signed(value: i64, max_positive: i64) -> i64 {
    if value < max_positive {
        value
    } else {
        value - max_positive * 2
    }
}

/// Packs a block position into its database key.
#[must_use]
pub fn block_as_integer(pos: BlockPos) -> i64 {
    let vec = pos.vec();
    i64::from(vec.z) * AXIS_RANGE * AXIS_RANGE
        + i64::from(vec.y) * AXIS_RANGE
        + i64::from(vec.x)
}

/// Unpacks a database key into a block position.
///
/// Inverse of [`block_as_integer`] for every position whose components lie
/// in `[-2048, 2047]`.
#[must_use]
pub fn integer_as_block(key: i64) -> BlockPos {
    let x = unsigned_to_signed(key.rem_euclid(AXIS_RANGE), AXIS_CENTER);
    let rest = (key - x) / AXIS_RANGE;
    let y = unsigned_to_signed(rest.rem_euclid(AXIS_RANGE), AXIS_CENTER);
    let rest = (rest - y) / AXIS_RANGE;
    let z = unsigned_to_signed(rest.rem_euclid(AXIS_RANGE), AXIS_CENTER);
    #[expect(
        clippy::cast_possible_truncation,
        reason = "each component was reduced to 12 bits above"
    )]
    BlockPos::new(I16Vec3::new(x as i16, y as i16, z as i16))
        .unwrap_or(BlockPos::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_packing_round_trip() {
        for x in [-2048_i16, -1, 0, 1, 2047] {
            for y in [-2048_i16, -7, 0, 13, 2047] {
                for z in [-2048_i16, -100, 0, 99, 2047] {
                    let pos = BlockPos::new(I16Vec3::new(x, y, z)).unwrap();
                    assert_eq!(integer_as_block(block_as_integer(pos)), pos);
                }
            }
        }
    }

    #[test]
    fn key_packing_round_trip_fuzz() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..10_000 {
            let pos = BlockPos::new(I16Vec3::new(
                rng.random_range(-2048..=2047),
                rng.random_range(-2048..=2047),
                rng.random_range(-2048..=2047),
            ))
            .unwrap();
            assert_eq!(integer_as_block(block_as_integer(pos)), pos);
        }
    }

    #[test]
    fn known_keys_stay_stable() {
        // regression anchors so the on-disk format can never drift silently
        let origin = BlockPos::new(I16Vec3::ZERO).unwrap();
        assert_eq!(block_as_integer(origin), 0);
        let one_up = BlockPos::new(I16Vec3::new(0, 1, 0)).unwrap();
        assert_eq!(block_as_integer(one_up), 4096);
        let minus_x = BlockPos::new(I16Vec3::new(-1, 0, 0)).unwrap();
        assert_eq!(block_as_integer(minus_x), -1);
    }
}
