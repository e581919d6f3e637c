//! Contains all kinds of map position primitives and conversions between them.

use std::fmt::{self, Display};
use std::ops::{Index, IndexMut};

use glam::{I16Vec3, IVec3, U8Vec3, U16Vec3, UVec3};

use crate::map_node::MapNode;

/// Hard bound on world coordinates; generation never reaches past this,
/// regardless of the configured `mapgen_limit`.
pub const MAX_MAP_GENERATION_LIMIT: i16 = 31_000;

/// The six face-neighbour offsets, ordered top, bottom, east, west, south,
/// north. Light and liquid propagation iterate these in this order.
pub const FACE_DIRS: [I16Vec3; 6] = [
    I16Vec3::new(0, 1, 0),
    I16Vec3::new(0, -1, 0),
    I16Vec3::new(1, 0, 0),
    I16Vec3::new(-1, 0, 0),
    I16Vec3::new(0, 0, 1),
    I16Vec3::new(0, 0, -1),
];

/// The coordinates of a single node within the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodePos(pub I16Vec3);

impl NodePos {
    /// Position of the node at the world's center.
    pub const ZERO: Self = Self(I16Vec3::ZERO);
    /// Position of the node with the lowest possible coordinates.
    pub const MIN: Self = Self(I16Vec3::MIN);
    /// Position of the node with the highest possible coordinates.
    pub const MAX: Self = Self(I16Vec3::MAX);

    /// Shorthand for building a position from raw coordinates.
    #[must_use]
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self(I16Vec3::new(x, y, z))
    }

    /// Splits a node position into its block position and its index therein.
    #[must_use]
    pub fn split_index(self) -> (BlockPos, NodeIndex) {
        (self.block_pos(), self.index())
    }

    /// Returns the position of the block which contains this node.
    #[must_use]
    pub const fn block_pos(self) -> BlockPos {
        BlockPos::for_node(self)
    }

    /// Returns the index of this node within its containing block.
    #[must_use]
    pub fn index(self) -> NodeIndex {
        NodeIndex::for_node(self)
    }

    /// Returns the node position with a given displacement, or `None` when
    /// the result would leave the coordinate space.
    #[must_use]
    pub fn checked_add(self, delta: I16Vec3) -> Option<Self> {
        self.0.checked_add(delta).map(Self)
    }

    /// Whether every coordinate lies within `±limit`.
    #[must_use]
    pub fn is_within_limit(self, limit: i16) -> bool {
        let limit_vec = I16Vec3::splat(limit);
        self.0.cmpge(-limit_vec).all() && self.0.cmple(limit_vec).all()
    }
}

impl Display for NodePos {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}

impl From<NodePos> for I16Vec3 {
    fn from(value: NodePos) -> Self {
        value.0
    }
}

impl From<NodePos> for IVec3 {
    fn from(value: NodePos) -> Self {
        value.0.as_ivec3()
    }
}

/// The position of a map block.
///
/// The position is _not_ measured in world coordinates. It can be viewed as
/// a signed 3D-index, where `(0, 0, 0)` is located at the world's center.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos(I16Vec3);

impl BlockPos {
    /// number of bit shifts to perform in order to convert between node and
    /// block coordinates.
    pub const SIZE_BITS: u32 = 4;
    /// Number of nodes per block in each dimension.
    pub const SIZE: u16 = 1 << Self::SIZE_BITS;
    /// Mask to be used to address the bits of a node coordinate that make up
    /// the position within their block.
    pub const SIZE_MASK: u16 = Self::SIZE - 1;
    /// number of nodes within a single block
    pub const NODE_COUNT: u16 = Self::SIZE * Self::SIZE * Self::SIZE;
    /// mask to be used to make a number a valid node index by wrapping around
    pub const NODE_COUNT_MASK: u16 = Self::NODE_COUNT - 1;

    /// Position of the block at the world's center.
    pub const ZERO: Self = Self(I16Vec3::ZERO);
    /// Position of the block with the lowest possible coordinates.
    pub const MIN: Self = Self::for_node(NodePos::MIN);
    /// Position of the block with the highest possible coordinates.
    pub const MAX: Self = Self::for_node(NodePos::MAX);

    /// Creates a new `BlockPos` as long as the resulting position would fit
    /// into the world. Returns `None` otherwise.
    #[must_use]
    pub fn new(position: I16Vec3) -> Option<Self> {
        (position.cmpge(Self::MIN.0).all() && position.cmple(Self::MAX.0).all())
            .then_some(Self(position))
    }

    /// Converts a given node position into that of the containing block.
    #[must_use]
    pub const fn for_node(node_pos: NodePos) -> Self {
        Self::for_pos(node_pos.0)
    }

    /// Converts a given raw vector into that of the containing block.
    ///
    /// `for_node` is preferred in most cases but sometimes we only have a raw
    /// vector and it would be unnecessary to wrap that in a `NodePos`.
    #[must_use]
    pub const fn for_pos(pos: I16Vec3) -> Self {
        Self(I16Vec3 {
            x: pos.x >> Self::SIZE_BITS,
            y: pos.y >> Self::SIZE_BITS,
            z: pos.z >> Self::SIZE_BITS,
        })
    }

    /// returns the inner position vector of this block which is measured in
    /// block steps from the origin
    #[must_use]
    pub const fn vec(self) -> I16Vec3 {
        self.0
    }

    /// Returns the block position with a given displacement.
    ///
    /// e.g. `pos.checked_add(I16Vec3::new(0, 1, 0))` returns the block above
    /// (`Y + 1`) the current one.
    ///
    /// Returns `None` if the resulting block would be located out of this map.
    #[must_use]
    pub fn checked_add(self, delta: I16Vec3) -> Option<Self> {
        self.0.checked_add(delta).map(Self)
    }

    /// Check whether the given node is located within this block.
    #[must_use]
    pub fn contains(self, node_pos: NodePos) -> bool {
        Self::for_node(node_pos) == self
    }

    /// returns the node position for a certain node index in this block
    #[must_use]
    pub fn node_pos(self, index: NodeIndex) -> NodePos {
        NodePos(NodePos::from(self).0 + UVec3::from(index).as_i16vec3())
    }

    /// The world position of this block's minimum corner.
    #[must_use]
    pub fn min_node(self) -> NodePos {
        NodePos::from(self)
    }

    /// The world position of this block's maximum corner.
    #[must_use]
    pub fn max_node(self) -> NodePos {
        #[expect(
            clippy::cast_possible_wrap,
            reason = "the mask is a small constant"
        )]
        NodePos(NodePos::from(self).0 + I16Vec3::splat(Self::SIZE_MASK as i16))
    }

    /// Whether the whole block lies within `±limit` node coordinates.
    #[must_use]
    pub fn is_within_limit(self, limit: i16) -> bool {
        self.min_node().is_within_limit(limit) && self.max_node().is_within_limit(limit)
    }
}

impl Display for BlockPos {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        // use double parentheses to indicate that a block is bigger than a single node
        write!(formatter, "(({}, {}, {}))", self.0.x, self.0.y, self.0.z)
    }
}

impl From<BlockPos> for NodePos {
    fn from(value: BlockPos) -> Self {
        Self(value.0 << BlockPos::SIZE_BITS)
    }
}

impl From<BlockPos> for I16Vec3 {
    fn from(value: BlockPos) -> Self {
        value.vec()
    }
}

/// The index of a node within its block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u16);

impl NodeIndex {
    /// Bit indices of the individual coordinates within the index.
    const SHIFT: UVec3 = UVec3::new(0, BlockPos::SIZE_BITS, 2 * BlockPos::SIZE_BITS);
    /// Bit masks of the individual coordinates when they've been aligned
    /// towards the least significant bit.
    const MASK: U16Vec3 = U16Vec3::splat(BlockPos::SIZE_MASK);
    /// index of the first node within a block (0, 0, 0)
    pub const MIN: Self = Self(0);
    /// index of the last node within a block (15, 15, 15)
    pub const MAX: Self = Self(BlockPos::NODE_COUNT - 1);

    /// Converts a given node position into the index within its containing
    /// block.
    #[must_use]
    pub fn for_node(node_pos: NodePos) -> Self {
        // only retain the lower-most bits of the coordinates and align them next to each other
        let vec = (node_pos.0.as_u16vec3() & Self::MASK) << Self::SHIFT;
        Self(vec.x | vec.y | vec.z)
    }

    /// Builds an index from block-relative coordinates, wrapping each into
    /// `0..16`.
    #[must_use]
    pub fn from_rel(rel: UVec3) -> Self {
        let vec = (rel.as_u16vec3() & Self::MASK) << Self::SHIFT;
        Self(vec.x | vec.y | vec.z)
    }

    /// Iterates all node indices of a block in memory order.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..BlockPos::NODE_COUNT).map(Self)
    }
}

impl From<NodeIndex> for U16Vec3 {
    fn from(value: NodeIndex) -> Self {
        // right-align the bits of all three coordinates and mask off excessive high-bits
        (U16Vec3::splat(value.0) >> NodeIndex::SHIFT) & NodeIndex::MASK
    }
}

impl From<NodeIndex> for U8Vec3 {
    fn from(value: NodeIndex) -> Self {
        U16Vec3::from(value).as_u8vec3()
    }
}

impl From<NodeIndex> for UVec3 {
    fn from(value: NodeIndex) -> Self {
        U16Vec3::from(value).as_uvec3()
    }
}

impl From<NodeIndex> for u16 {
    fn from(value: NodeIndex) -> Self {
        value.0
    }
}

impl From<NodeIndex> for usize {
    fn from(value: NodeIndex) -> Self {
        value.0.into()
    }
}

impl From<usize> for NodeIndex {
    fn from(value: usize) -> Self {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "truncation is the expected behavior"
        )]
        Self((value as u16) & BlockPos::NODE_COUNT_MASK)
    }
}

impl From<u16> for NodeIndex {
    fn from(value: u16) -> Self {
        Self(value & BlockPos::NODE_COUNT_MASK)
    }
}

/// Contains all `MapNode`s of a single block.
#[derive(Clone)]
pub struct BlockNodes(pub Box<[MapNode; BlockPos::NODE_COUNT as usize]>);

impl BlockNodes {
    /// A block filled entirely with one node.
    #[must_use]
    pub fn filled(node: MapNode) -> Self {
        Self(Box::new(
            [node; BlockPos::NODE_COUNT as usize],
        ))
    }
}

impl Default for BlockNodes {
    fn default() -> Self {
        Self::filled(MapNode::default())
    }
}

impl Index<NodeIndex> for BlockNodes {
    type Output = MapNode;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        #[expect(
            clippy::indexing_slicing,
            reason = "NodeIndex by construction is guaranteed to be within bounds"
        )]
        &self.0[usize::from(index)]
    }
}

impl IndexMut<NodeIndex> for BlockNodes {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Self::Output {
        #[expect(
            clippy::indexing_slicing,
            reason = "NodeIndex by construction is guaranteed to be within bounds"
        )]
        &mut self.0[usize::from(index)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_index_round_trip() {
        for index in NodeIndex::iter_all() {
            let vec = UVec3::from(index);
            assert!(vec.cmplt(UVec3::splat(16)).all(), "coordinate out of range");
            assert_eq!(NodeIndex::from_rel(vec), index);
        }
    }

    #[test]
    fn block_pos_of_negative_nodes() {
        assert_eq!(
            NodePos::new(-1, -16, -17).block_pos(),
            BlockPos::new(I16Vec3::new(-1, -1, -2)).unwrap()
        );
        assert_eq!(
            NodePos::new(0, 15, 16).block_pos(),
            BlockPos::new(I16Vec3::new(0, 0, 1)).unwrap()
        );
    }

    #[test]
    fn split_and_rebuild() {
        let samples = [
            NodePos::new(0, 0, 0),
            NodePos::new(-1, -1, -1),
            NodePos::new(123, -456, 789),
            NodePos::new(-30_999, 30_999, 5),
        ];
        for pos in samples {
            let (block, index) = pos.split_index();
            assert_eq!(block.node_pos(index), pos);
        }
    }
}
