//! The voxel manipulator: a contiguous scratch buffer shadowing a
//! rectangular span of blocks, used for bulk work (generation, large
//! edits) that would be far too slow through per-node map calls. Changes
//! are blitted back block-wise afterwards.

use std::collections::BTreeMap;

use glam::{I16Vec3, IVec3};
use log::warn;
use voxen_core::{BlockPos, MapNode, NodeIndex, NodePos};

use crate::map::Map;
use crate::map_block::{MapBlock, ModifiedState, mod_reason};

/// Per-node scratch flags.
pub mod voxel_flags {
    /// The node carries no data (source block missing at emerge).
    pub const NO_DATA: u8 = 1 << 0;
    /// Generic scratch bit for single-pass algorithms.
    pub const CHECKED1: u8 = 1 << 1;
    /// Second generic scratch bit.
    pub const CHECKED2: u8 = 1 << 2;
    /// The node was carved by a cave pass; later passes must not refill it.
    pub const CAVE: u8 = 1 << 3;
}

/// An inclusive axis-aligned box of node positions with the index math to
/// address a flat buffer spanning it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxelArea {
    /// Minimum corner, inclusive.
    pub min: I16Vec3,
    /// Maximum corner, inclusive.
    pub max: I16Vec3,
}

impl VoxelArea {
    /// An area spanning the given corners (they are sorted for you).
    #[must_use]
    pub fn new(corner_a: I16Vec3, corner_b: I16Vec3) -> Self {
        Self {
            min: corner_a.min(corner_b),
            max: corner_a.max(corner_b),
        }
    }

    /// An area spanning whole blocks, in node coordinates.
    #[must_use]
    pub fn from_blocks(bmin: BlockPos, bmax: BlockPos) -> Self {
        Self::new(bmin.min_node().0, bmax.max_node().0)
    }

    /// Nodes per axis.
    #[must_use]
    pub fn extent(&self) -> IVec3 {
        self.max.as_ivec3() - self.min.as_ivec3() + IVec3::ONE
    }

    /// Total node count.
    #[must_use]
    pub fn volume(&self) -> usize {
        let extent = self.extent();
        extent.x as usize * extent.y as usize * extent.z as usize
    }

    /// Whether a position lies inside the area.
    #[must_use]
    pub fn contains(&self, pos: I16Vec3) -> bool {
        pos.cmpge(self.min).all() && pos.cmple(self.max).all()
    }

    /// Flat index of a position; the caller promises `contains(pos)`.
    #[must_use]
    pub fn index(&self, pos: I16Vec3) -> usize {
        let rel = pos.as_ivec3() - self.min.as_ivec3();
        let extent = self.extent();
        ((rel.z * extent.y + rel.y) * extent.x + rel.x) as usize
    }

    /// Flat index from explicit coordinates.
    #[must_use]
    pub fn index_xyz(&self, x: i16, y: i16, z: i16) -> usize {
        self.index(I16Vec3::new(x, y, z))
    }

    /// Distance between two consecutive y rows at fixed (x, z).
    #[must_use]
    pub fn y_stride(&self) -> usize {
        self.extent().x as usize
    }

    /// Distance between two consecutive z slices at fixed (x, y).
    #[must_use]
    pub fn z_stride(&self) -> usize {
        let extent = self.extent();
        (extent.x * extent.y) as usize
    }
}

/// The manipulator itself. `data` and `flags` are deliberately public:
/// generators and carvers address them directly through [`VoxelArea`]
/// strides in their hot loops.
pub struct MMVManip {
    /// The node span this buffer shadows.
    pub area: VoxelArea,
    /// One node per cell, row-major in `area` order.
    pub data: Vec<MapNode>,
    /// One [`voxel_flags`] byte per cell.
    pub flags: Vec<u8>,
    /// Every block the buffer has been populated from; `false` marks
    /// blocks that were absent and not created.
    loaded_blocks: BTreeMap<BlockPos, bool>,
}

impl MMVManip {
    /// An empty manipulator covering the given block span.
    #[must_use]
    pub fn new(bmin: BlockPos, bmax: BlockPos) -> Self {
        let area = VoxelArea::from_blocks(bmin, bmax);
        let volume = area.volume();
        Self {
            area,
            data: vec![MapNode::IGNORE; volume],
            flags: vec![voxel_flags::NO_DATA; volume],
            loaded_blocks: BTreeMap::new(),
        }
    }

    /// Populates the buffer from the map. Missing blocks are created blank
    /// in the map when `load_if_missing` is set (the generation path), or
    /// left as `NO_DATA` holes otherwise.
    pub fn initial_emerge(
        &mut self,
        map: &mut Map,
        bmin: BlockPos,
        bmax: BlockPos,
        load_if_missing: bool,
    ) {
        let min_vec = bmin.vec();
        let max_vec = bmax.vec();
        for block_z in min_vec.z..=max_vec.z {
            for block_y in min_vec.y..=max_vec.y {
                for block_x in min_vec.x..=max_vec.x {
                    let Some(block_pos) =
                        BlockPos::new(I16Vec3::new(block_x, block_y, block_z))
                    else {
                        continue;
                    };
                    self.emerge_one(map, block_pos, load_if_missing);
                }
            }
        }
    }

    fn emerge_one(&mut self, map: &mut Map, block_pos: BlockPos, load_if_missing: bool) {
        if self.loaded_blocks.contains_key(&block_pos) {
            return;
        }
        if let Err(load_error) = map.load_block(block_pos) {
            warn!("vmanip emerge: loading {block_pos} failed: {load_error}");
        }
        let mut present = map
            .get_block_no_create(block_pos)
            .is_some_and(|block| !block.is_dummy());
        if !present && load_if_missing {
            map.insert_block(block_pos, MapBlock::new());
            present = true;
        }
        if present {
            self.copy_block_in(map, block_pos);
        }
        self.loaded_blocks.insert(block_pos, present);
    }

    fn copy_block_in(&mut self, map: &Map, block_pos: BlockPos) {
        let Some(block) = map.get_block_no_create(block_pos) else {
            return;
        };
        let Some(nodes) = block.nodes() else {
            return;
        };
        for index in NodeIndex::iter_all() {
            let pos = block_pos.node_pos(index);
            if !self.area.contains(pos.0) {
                continue;
            }
            let flat = self.area.index(pos.0);
            #[expect(
                clippy::indexing_slicing,
                reason = "`contains` guarantees the index is in range"
            )]
            {
                self.data[flat] = nodes[index];
                self.flags[flat] &= !voxel_flags::NO_DATA;
            }
        }
    }

    /// The node at a world position; IGNORE outside the area or where the
    /// source block was missing.
    #[must_use]
    pub fn get_node(&self, pos: NodePos) -> MapNode {
        if !self.area.contains(pos.0) {
            return MapNode::IGNORE;
        }
        let flat = self.area.index(pos.0);
        #[expect(
            clippy::indexing_slicing,
            reason = "`contains` guarantees the index is in range"
        )]
        if self.flags[flat] & voxel_flags::NO_DATA != 0 {
            MapNode::IGNORE
        } else {
            self.data[flat]
        }
    }

    /// Writes a node; silently ignored outside the area.
    pub fn set_node(&mut self, pos: NodePos, node: MapNode) {
        if !self.area.contains(pos.0) {
            return;
        }
        let flat = self.area.index(pos.0);
        #[expect(
            clippy::indexing_slicing,
            reason = "`contains` guarantees the index is in range"
        )]
        {
            self.data[flat] = node;
            self.flags[flat] &= !voxel_flags::NO_DATA;
        }
    }

    /// Whether the cell has usable data.
    #[must_use]
    pub fn has_data(&self, pos: NodePos) -> bool {
        self.area.contains(pos.0)
            && self
                .flags
                .get(self.area.index(pos.0))
                .is_some_and(|flags| flags & voxel_flags::NO_DATA == 0)
    }

    /// Blocks this manipulator was emerged over, with their presence flag.
    #[must_use]
    pub fn loaded_blocks(&self) -> &BTreeMap<BlockPos, bool> {
        &self.loaded_blocks
    }

    /// Writes the buffer back into the map, block-wise. Blocks whose
    /// source was never loaded are skipped, as are blocks already marked
    /// generated unless `overwrite_generated` is set. Touched block
    /// positions are appended to `modified_blocks`.
    pub fn blit_back_all(
        &self,
        map: &mut Map,
        modified_blocks: &mut Vec<BlockPos>,
        overwrite_generated: bool,
    ) {
        for (&block_pos, &was_present) in &self.loaded_blocks {
            if !was_present {
                continue;
            }
            let Some(block) = map.get_block_mut(block_pos) else {
                continue;
            };
            if block.generated && !overwrite_generated {
                continue;
            }
            block.allocate();
            let mut any = false;
            for index in NodeIndex::iter_all() {
                let pos = block_pos.node_pos(index);
                if !self.area.contains(pos.0) {
                    continue;
                }
                let flat = self.area.index(pos.0);
                #[expect(
                    clippy::indexing_slicing,
                    reason = "`contains` guarantees the index is in range"
                )]
                if self.flags[flat] & voxel_flags::NO_DATA == 0 {
                    block.set_no_check(index, self.data[flat]);
                    any = true;
                }
            }
            if any {
                block.raise_modified(ModifiedState::WriteNeeded, mod_reason::VMANIP);
                modified_blocks.push(block_pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_block::MapBlock;
    use crate::settings::Settings;
    use std::sync::Arc;
    use voxen_core::{BlockNodes, ContentFeatures, ContentId, NodeRegistry};

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures::simple("base:stone"))
            .unwrap();
        registry.finalize().unwrap();
        Arc::new(registry)
    }

    #[test]
    fn area_index_math() {
        let area = VoxelArea::new(I16Vec3::new(-16, 0, -16), I16Vec3::new(15, 31, 15));
        assert_eq!(area.extent(), IVec3::new(32, 32, 32));
        assert_eq!(area.volume(), 32 * 32 * 32);
        assert_eq!(area.index(area.min), 0);
        assert_eq!(area.index(area.max), area.volume() - 1);
        assert_eq!(
            area.index(I16Vec3::new(-15, 0, -16)),
            1,
            "x is the fastest axis"
        );
        assert_eq!(area.index_xyz(-16, 1, -16), area.y_stride());
        assert_eq!(area.index_xyz(-16, 0, -15), area.z_stride());
    }

    #[test]
    fn emerge_copies_and_blit_writes_back() {
        let registry = registry();
        let stone = registry.get_id("base:stone").unwrap();
        let mut map = Map::new(Arc::clone(&registry), None, &Settings::new());

        let mut block = MapBlock::with_nodes(BlockNodes::filled(MapNode::AIR));
        block.generated = true;
        map.insert_block(BlockPos::ZERO, block);

        let mut vm = MMVManip::new(BlockPos::ZERO, BlockPos::ZERO);
        vm.initial_emerge(&mut map, BlockPos::ZERO, BlockPos::ZERO, false);
        assert_eq!(vm.get_node(NodePos::new(5, 5, 5)).content, ContentId::AIR);

        vm.set_node(NodePos::new(5, 5, 5), MapNode::of(stone));
        let mut modified = Vec::new();
        vm.blit_back_all(&mut map, &mut modified, true);
        assert_eq!(modified, vec![BlockPos::ZERO]);
        assert_eq!(
            map.get_node(NodePos::new(5, 5, 5)).unwrap().content,
            stone
        );
    }

    #[test]
    fn generated_blocks_survive_unless_overwriting() {
        let registry = registry();
        let stone = registry.get_id("base:stone").unwrap();
        let mut map = Map::new(Arc::clone(&registry), None, &Settings::new());

        let mut block = MapBlock::with_nodes(BlockNodes::filled(MapNode::AIR));
        block.generated = true;
        map.insert_block(BlockPos::ZERO, block);

        let mut vm = MMVManip::new(BlockPos::ZERO, BlockPos::ZERO);
        vm.initial_emerge(&mut map, BlockPos::ZERO, BlockPos::ZERO, true);
        vm.set_node(NodePos::new(1, 1, 1), MapNode::of(stone));

        let mut modified = Vec::new();
        vm.blit_back_all(&mut map, &mut modified, false);
        assert!(modified.is_empty(), "generated block must not be touched");
        assert_eq!(
            map.get_node(NodePos::new(1, 1, 1)).unwrap().content,
            ContentId::AIR
        );
    }

    #[test]
    fn missing_blocks_without_creation_stay_holes() {
        let registry = registry();
        let mut map = Map::new(Arc::clone(&registry), None, &Settings::new());
        let mut vm = MMVManip::new(BlockPos::ZERO, BlockPos::ZERO);
        vm.initial_emerge(&mut map, BlockPos::ZERO, BlockPos::ZERO, false);

        assert!(!vm.has_data(NodePos::new(3, 3, 3)));
        assert_eq!(vm.get_node(NodePos::new(3, 3, 3)).content, ContentId::IGNORE);
        assert!(!map.has_block(BlockPos::ZERO));

        let mut modified = Vec::new();
        vm.blit_back_all(&mut map, &mut modified, true);
        assert!(modified.is_empty());
    }

    #[test]
    fn creation_path_materializes_blank_blocks() {
        let registry = registry();
        let stone = registry.get_id("base:stone").unwrap();
        let mut map = Map::new(Arc::clone(&registry), None, &Settings::new());
        let mut vm = MMVManip::new(BlockPos::ZERO, BlockPos::ZERO);
        vm.initial_emerge(&mut map, BlockPos::ZERO, BlockPos::ZERO, true);
        assert!(map.has_block(BlockPos::ZERO));

        vm.set_node(NodePos::new(0, 0, 0), MapNode::of(stone));
        let mut modified = Vec::new();
        vm.blit_back_all(&mut map, &mut modified, false);
        assert_eq!(modified, vec![BlockPos::ZERO]);
        assert_eq!(map.get_node(NodePos::new(0, 0, 0)).unwrap().content, stone);
    }
}
