//! The sparse block store: sectors of vertically stacked blocks, the edit
//! operations the rest of the engine issues, edit-event fan-out, the
//! unload sweeper and the occlusion query used by renderers.
//!
//! Ownership is arena-style: the map owns sectors, sectors own blocks,
//! blocks own their node arrays and side tables. Nothing here hands out
//! long-lived pointers; everything is addressed by position.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use glam::{I16Vec3, Vec3};
use log::{error, trace, warn};
use tokio::sync::mpsc::UnboundedSender;
use voxen_core::{
    BlockPos, ContentId, MapNode, NodeIndex, NodePos, NodeRegistry, MAX_MAP_GENERATION_LIMIT,
};

use crate::database::MapDatabase;
use crate::map_block::{MapBlock, ModifiedState, NodeMetadata, NodeTimer};
use crate::serialize::{SerializeError, deserialize_block, serialize_block};
use crate::settings::Settings;
use crate::{light, liquid};

/// Map operation failures.
#[derive(thiserror::Error, Debug)]
pub enum MapError {
    /// The position is outside the configured world bounds or its block is
    /// not currently loaded; recoverable by emerging the block.
    #[error("position {0} is not addressable")]
    InvalidPosition(NodePos),
    /// Writing IGNORE over a real node would corrupt invariants and is
    /// always refused.
    #[error("refusing to write ignore at {0}")]
    IgnoreRefused(NodePos),
    /// A block blob could not be decoded.
    #[error(transparent)]
    Serialization(#[from] SerializeError),
    /// The backend failed.
    #[error(transparent)]
    Database(#[from] crate::database::DatabaseError),
}

/// What a [`MapEditEvent`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapEditEventType {
    /// A node was placed.
    AddNode,
    /// A node was dug (replaced by air).
    RemoveNode,
    /// A node was replaced keeping its metadata.
    SwapNode,
    /// A bulk change, e.g. lighting written back by generation.
    Other,
}

/// Broadcast to subscribers after every map edit.
#[derive(Clone, Debug)]
pub struct MapEditEvent {
    /// What happened.
    pub event_type: MapEditEventType,
    /// The edited position (for `Other`: the anchor of the bulk change).
    pub pos: NodePos,
    /// The node now present at `pos`.
    pub node: MapNode,
    /// Every block whose contents changed, including relit neighbours.
    pub modified_blocks: Vec<BlockPos>,
}

/// A vertical column of blocks sharing one `(x, z)` block index.
pub struct MapSector {
    blocks: BTreeMap<i16, MapBlock>,
}

impl MapSector {
    fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
        }
    }

    /// The block at the given y index, if present.
    #[must_use]
    pub fn get_block(&self, block_y: i16) -> Option<&MapBlock> {
        self.blocks.get(&block_y)
    }

    /// Mutable access to the block at the given y index.
    pub fn get_block_mut(&mut self, block_y: i16) -> Option<&mut MapBlock> {
        self.blocks.get_mut(&block_y)
    }

    fn insert_block(&mut self, block_y: i16, block: MapBlock) {
        self.blocks.insert(block_y, block);
    }

    fn remove_block(&mut self, block_y: i16) -> Option<MapBlock> {
        self.blocks.remove(&block_y)
    }

    /// Whether the sector holds no blocks (and can itself be dropped).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterates `(block_y, block)` bottom-up.
    pub fn iter(&self) -> impl Iterator<Item = (i16, &MapBlock)> {
        self.blocks.iter().map(|(y, block)| (*y, block))
    }
}

type SectorKey = (i16, i16);

fn sector_key(pos: BlockPos) -> SectorKey {
    let vec = pos.vec();
    (vec.x, vec.z)
}

/// The default seconds-without-use after which the sweeper unloads a block.
pub const DEFAULT_UNLOAD_TIMEOUT: f32 = 29.0;

/// The map itself. All mutation is expected to happen on one logic thread;
/// the emerge workers only touch it through a write lock around their blit.
pub struct Map {
    registry: Arc<NodeRegistry>,
    sectors: HashMap<SectorKey, MapSector>,
    /// Single-slot cache of the most recently accessed sector key; the
    /// columns-of-blocks access pattern makes consecutive hits very likely.
    cache_key: Option<SectorKey>,
    database: Option<Box<dyn MapDatabase>>,
    subscribers: Vec<UnboundedSender<MapEditEvent>>,
    /// Positions queued for the liquid transformer, oldest first.
    pub(crate) transforming_liquid: VecDeque<NodePos>,
    mapgen_limit: i16,
    compression_level: i8,
    ignore_world_load_errors: bool,
}

impl Map {
    /// Builds a map over an optional database backend.
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        database: Option<Box<dyn MapDatabase>>,
        settings: &Settings,
    ) -> Self {
        let mapgen_limit = settings
            .get_i16_or("mapgen_limit", MAX_MAP_GENERATION_LIMIT)
            .clamp(0, MAX_MAP_GENERATION_LIMIT);
        let compression_level = settings.get_i32_or("map_compression_level_disk", -1);
        Self {
            registry,
            sectors: HashMap::new(),
            cache_key: None,
            database,
            subscribers: Vec::new(),
            transforming_liquid: VecDeque::new(),
            mapgen_limit,
            compression_level: i8::try_from(compression_level.clamp(-1, 9)).unwrap_or(-1),
            ignore_world_load_errors: settings.get_bool_or("ignore_world_load_errors", false),
        }
    }

    /// The shared node registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// The configured generation bound, in nodes.
    #[must_use]
    pub fn mapgen_limit(&self) -> i16 {
        self.mapgen_limit
    }

    /// Whether a node position is addressable at all.
    #[must_use]
    pub fn is_valid_position(&self, pos: NodePos) -> bool {
        pos.is_within_limit(self.mapgen_limit)
    }

    // --- block access ---------------------------------------------------

    /// The block at `pos` if currently loaded; never touches the database.
    #[must_use]
    pub fn get_block_no_create(&self, pos: BlockPos) -> Option<&MapBlock> {
        self.sectors
            .get(&sector_key(pos))
            .and_then(|sector| sector.get_block(pos.vec().y))
    }

    /// Mutable sibling of [`Self::get_block_no_create`].
    pub fn get_block_mut(&mut self, pos: BlockPos) -> Option<&mut MapBlock> {
        let key = sector_key(pos);
        self.cache_key = Some(key);
        self.sectors
            .get_mut(&key)
            .and_then(|sector| sector.get_block_mut(pos.vec().y))
    }

    /// Whether the block is currently in memory (loaded or dummy).
    #[must_use]
    pub fn has_block(&self, pos: BlockPos) -> bool {
        self.get_block_no_create(pos).is_some()
    }

    /// Inserts a block, displacing whatever was at the position.
    pub fn insert_block(&mut self, pos: BlockPos, block: MapBlock) {
        let key = sector_key(pos);
        self.cache_key = Some(key);
        self.sectors
            .entry(key)
            .or_insert_with(MapSector::new)
            .insert_block(pos.vec().y, block);
    }

    fn remove_block(&mut self, pos: BlockPos) -> Option<MapBlock> {
        let key = sector_key(pos);
        let sector = self.sectors.get_mut(&key)?;
        let block = sector.remove_block(pos.vec().y);
        if sector.is_empty() {
            self.sectors.remove(&key);
            if self.cache_key == Some(key) {
                self.cache_key = None;
            }
        }
        block
    }

    /// Tries to load the block from the database into the map. Returns
    /// whether the block is present afterwards.
    ///
    /// # Errors
    /// Database failures always; decode failures unless
    /// `ignore_world_load_errors` is set, in which case the block is
    /// skipped with a warning.
    pub fn load_block(&mut self, pos: BlockPos) -> Result<bool, MapError> {
        if self.has_block(pos) {
            return Ok(true);
        }
        let Some(database) = &self.database else {
            return Ok(false);
        };
        let Some(blob) = database.load_block(pos)? else {
            return Ok(false);
        };
        match deserialize_block(&blob, &self.registry) {
            Ok(block) => {
                self.insert_block(pos, block);
                Ok(true)
            }
            Err(error) if self.ignore_world_load_errors => {
                warn!("skipping unreadable block {pos}: {error}");
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Loads the block from the database, optionally inserting a dummy
    /// placeholder when nothing is stored. Returns the block if present
    /// afterwards.
    ///
    /// # Errors
    /// See [`Self::load_block`].
    pub fn emerge_block(
        &mut self,
        pos: BlockPos,
        create_blank: bool,
    ) -> Result<Option<&mut MapBlock>, MapError> {
        if !self.load_block(pos)? && create_blank {
            self.insert_block(pos, MapBlock::new_dummy());
        }
        Ok(self.get_block_mut(pos))
    }

    // --- node access ----------------------------------------------------

    pub(crate) fn block_and_index(
        &mut self,
        pos: NodePos,
    ) -> Option<(&mut MapBlock, NodeIndex)> {
        let (block_pos, index) = pos.split_index();
        self.get_block_mut(block_pos).map(|block| (block, index))
    }

    /// The node at `pos`, or `None` when its block is absent or a dummy.
    #[must_use]
    pub fn get_node(&self, pos: NodePos) -> Option<MapNode> {
        let (block_pos, index) = pos.split_index();
        let block = self.get_block_no_create(block_pos)?;
        if block.is_dummy() {
            return None;
        }
        Some(block.get(index))
    }

    /// Like [`Self::get_node`] but degrading to IGNORE, the shape most
    /// bulk passes want.
    #[must_use]
    pub fn get_node_or_ignore(&self, pos: NodePos) -> MapNode {
        self.get_node(pos).unwrap_or(MapNode::IGNORE)
    }

    /// Writes a node: updates the block, re-lights the neighbourhood and
    /// queues liquid re-examination. Returns every block the write touched.
    ///
    /// # Errors
    /// [`MapError::IgnoreRefused`] for IGNORE writes,
    /// [`MapError::InvalidPosition`] for unloaded or out-of-bounds targets.
    pub fn set_node(&mut self, pos: NodePos, node: MapNode) -> Result<Vec<BlockPos>, MapError> {
        if node.content == ContentId::IGNORE {
            return Err(MapError::IgnoreRefused(pos));
        }
        if !self.is_valid_position(pos) {
            return Err(MapError::InvalidPosition(pos));
        }
        let Some((block, index)) = self.block_and_index(pos) else {
            return Err(MapError::InvalidPosition(pos));
        };
        if block.is_dummy() {
            return Err(MapError::InvalidPosition(pos));
        }

        let old_node = block.get(index);
        block.set(index, node);

        let mut modified_blocks = vec![pos.block_pos()];
        light::update_lighting_nodes(self, &[(pos, old_node)], &mut modified_blocks);
        self.enqueue_liquid_neighborhood(pos);

        modified_blocks.sort_unstable();
        modified_blocks.dedup();
        Ok(modified_blocks)
    }

    /// Public edit entry point: performs [`Self::set_node`], optionally
    /// strips metadata, and notifies subscribers.
    ///
    /// # Errors
    /// See [`Self::set_node`].
    pub fn add_node_with_event(
        &mut self,
        pos: NodePos,
        node: MapNode,
        remove_metadata: bool,
    ) -> Result<(), MapError> {
        let event_type = if node.content == ContentId::AIR {
            MapEditEventType::RemoveNode
        } else {
            MapEditEventType::AddNode
        };
        if remove_metadata {
            // a missing block surfaces through set_node below
            self.remove_node_metadata(pos).ok();
        }
        let modified_blocks = self.set_node(pos, node)?;
        self.dispatch_event(&MapEditEvent {
            event_type,
            pos,
            node,
            modified_blocks,
        });
        Ok(())
    }

    /// Replaces a node while keeping its metadata, firing `SwapNode`.
    ///
    /// # Errors
    /// See [`Self::set_node`].
    pub fn swap_node(&mut self, pos: NodePos, node: MapNode) -> Result<(), MapError> {
        let modified_blocks = self.set_node(pos, node)?;
        self.dispatch_event(&MapEditEvent {
            event_type: MapEditEventType::SwapNode,
            pos,
            node,
            modified_blocks,
        });
        Ok(())
    }

    // --- events ----------------------------------------------------------

    /// Registers an edit-event receiver. Closed receivers are pruned on the
    /// next dispatch.
    pub fn subscribe(&mut self, receiver: UnboundedSender<MapEditEvent>) {
        self.subscribers.push(receiver);
    }

    /// Sends an event to all live subscribers.
    pub fn dispatch_event(&mut self, event: &MapEditEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    // --- liquid queue -----------------------------------------------------

    /// Queues a single position for the liquid transformer.
    pub fn enqueue_liquid(&mut self, pos: NodePos) {
        self.transforming_liquid.push_back(pos);
    }

    /// Queues `pos` and its six neighbours where liquids might react to a
    /// change at `pos`: liquid neighbours always, floodable neighbours when
    /// the changed node itself is a liquid.
    pub fn enqueue_liquid_neighborhood(&mut self, pos: NodePos) {
        self.enqueue_liquid(pos);
        let center = self.get_node_or_ignore(pos);
        let center_is_liquid = self.registry.get_features(center.content).is_liquid();
        for dir in voxen_core::FACE_DIRS {
            if let Some(neighbor) = pos.checked_add(dir) {
                let node = self.get_node_or_ignore(neighbor);
                let features = self.registry.get_features(node.content);
                if features.is_liquid() || (center_is_liquid && features.floodable) {
                    self.enqueue_liquid(neighbor);
                }
            }
        }
    }

    /// Current length of the liquid queue.
    #[must_use]
    pub fn transforming_liquid_len(&self) -> usize {
        self.transforming_liquid.len()
    }

    // --- node metadata / timers ------------------------------------------

    fn emerged_block_and_index(
        &mut self,
        pos: NodePos,
    ) -> Result<(&mut MapBlock, NodeIndex), MapError> {
        let (block_pos, index) = pos.split_index();
        self.load_block(block_pos)?;
        self.get_block_mut(block_pos)
            .map(|block| (block, index))
            .ok_or(MapError::InvalidPosition(pos))
    }

    /// Metadata of the node at `pos`, loading its block if needed.
    ///
    /// # Errors
    /// [`MapError::InvalidPosition`] when no block exists even on disk.
    pub fn get_node_metadata(&mut self, pos: NodePos) -> Result<Option<NodeMetadata>, MapError> {
        let (block, index) = self.emerged_block_and_index(pos)?;
        Ok(block.metadata(index).cloned())
    }

    /// Installs metadata at `pos`, loading its block if needed.
    ///
    /// # Errors
    /// [`MapError::InvalidPosition`] when no block exists even on disk.
    pub fn set_node_metadata(
        &mut self,
        pos: NodePos,
        meta: NodeMetadata,
    ) -> Result<(), MapError> {
        let (block, index) = self.emerged_block_and_index(pos)?;
        block.set_metadata(index, meta);
        Ok(())
    }

    /// Removes metadata at `pos`, reporting whether something was there.
    ///
    /// # Errors
    /// [`MapError::InvalidPosition`] when no block exists even on disk.
    pub fn remove_node_metadata(&mut self, pos: NodePos) -> Result<bool, MapError> {
        let (block, index) = self.emerged_block_and_index(pos)?;
        Ok(block.remove_metadata(index))
    }

    /// Timer of the node at `pos`, loading its block if needed.
    ///
    /// # Errors
    /// [`MapError::InvalidPosition`] when no block exists even on disk.
    pub fn get_node_timer(&mut self, pos: NodePos) -> Result<Option<NodeTimer>, MapError> {
        let (block, index) = self.emerged_block_and_index(pos)?;
        Ok(block.node_timer(index))
    }

    /// Installs a node timer at `pos`, loading its block if needed.
    ///
    /// # Errors
    /// [`MapError::InvalidPosition`] when no block exists even on disk.
    pub fn set_node_timer(&mut self, pos: NodePos, timer: NodeTimer) -> Result<(), MapError> {
        let (block, index) = self.emerged_block_and_index(pos)?;
        block.set_node_timer(index, timer);
        Ok(())
    }

    /// Removes a node timer at `pos`, reporting whether one existed.
    ///
    /// # Errors
    /// [`MapError::InvalidPosition`] when no block exists even on disk.
    pub fn remove_node_timer(&mut self, pos: NodePos) -> Result<bool, MapError> {
        let (block, index) = self.emerged_block_and_index(pos)?;
        Ok(block.remove_node_timer(index))
    }

    /// Every position in the inclusive cuboid `[p1, p2]` whose node carries
    /// metadata. Only searches blocks already in memory.
    #[must_use]
    pub fn find_nodes_with_meta(&self, p1: NodePos, p2: NodePos) -> Vec<NodePos> {
        let min = p1.0.min(p2.0);
        let max = p1.0.max(p2.0);
        let block_min = BlockPos::for_pos(min);
        let block_max = BlockPos::for_pos(max);

        let mut found = Vec::new();
        for block_x in block_min.vec().x..=block_max.vec().x {
            for block_z in block_min.vec().z..=block_max.vec().z {
                for block_y in block_min.vec().y..=block_max.vec().y {
                    let Some(block_pos) =
                        BlockPos::new(I16Vec3::new(block_x, block_y, block_z))
                    else {
                        continue;
                    };
                    let Some(block) = self.get_block_no_create(block_pos) else {
                        continue;
                    };
                    for (index, _meta) in block.iter_metadata() {
                        let pos = block_pos.node_pos(index);
                        if pos.0.cmpge(min).all() && pos.0.cmple(max).all() {
                            found.push(pos);
                        }
                    }
                }
            }
        }
        found
    }

    // --- persistence ------------------------------------------------------

    fn save_block_to_database(
        registry: &NodeRegistry,
        database: &mut Box<dyn MapDatabase>,
        compression_level: i8,
        pos: BlockPos,
        block: &mut MapBlock,
    ) -> Result<(), MapError> {
        let blob = serialize_block(block, registry, compression_level)?;
        // transient backend hiccups get one retry before surfacing
        if let Err(first_error) = database.save_block(pos, &blob) {
            warn!("saving block {pos} failed ({first_error}), retrying once");
            database.save_block(pos, &blob)?;
        }
        block.clear_modified();
        Ok(())
    }

    /// Writes every block whose modified state demands it. Returns the
    /// number of blocks written.
    ///
    /// # Errors
    /// Serialization or database failures of an individual block abort the
    /// pass.
    pub fn save_dirty_blocks(&mut self, save_at_unload_too: bool) -> Result<usize, MapError> {
        let Some(database) = &mut self.database else {
            return Ok(0);
        };
        let mut saved = 0;
        database.begin_save()?;
        for (key, sector) in &mut self.sectors {
            for (block_y, block) in &mut sector.blocks {
                let needs_write = match block.modified() {
                    ModifiedState::Clean => false,
                    ModifiedState::WriteAtUnload => save_at_unload_too,
                    ModifiedState::WriteNeeded => true,
                };
                if !needs_write || block.is_dummy() {
                    continue;
                }
                let Some(pos) = BlockPos::new(I16Vec3::new(key.0, *block_y, key.1)) else {
                    continue;
                };
                Self::save_block_to_database(
                    &self.registry,
                    database,
                    self.compression_level,
                    pos,
                    block,
                )?;
                saved += 1;
            }
        }
        database.end_save()?;
        Ok(saved)
    }

    /// The unload sweeper: advances usage timers by `dt`, saves and drops
    /// blocks unused for longer than `unload_timeout` (holding no external
    /// references), then evicts the least recently used blocks beyond
    /// `max_loaded` if a cap is given. Unloaded positions are appended to
    /// `unloaded` when provided.
    ///
    /// # Errors
    /// Serialization or database failures while saving a dirty block.
    pub fn timer_update(
        &mut self,
        dt: f32,
        unload_timeout: f32,
        max_loaded: Option<usize>,
        mut unloaded: Option<&mut Vec<BlockPos>>,
    ) -> Result<(), MapError> {
        let mut to_unload: Vec<BlockPos> = Vec::new();
        let mut total_blocks = 0_usize;
        for (key, sector) in &mut self.sectors {
            for (block_y, block) in &mut sector.blocks {
                block.usage_timer += dt;
                total_blocks += 1;
                if block.usage_timer >= unload_timeout && block.refcount == 0 {
                    if let Some(pos) = BlockPos::new(I16Vec3::new(key.0, *block_y, key.1)) {
                        to_unload.push(pos);
                    }
                }
            }
        }

        // beyond the cap, evict whatever has idled longest
        if let Some(max_loaded) = max_loaded {
            let remaining = total_blocks - to_unload.len();
            if remaining > max_loaded {
                let mut candidates: Vec<(f32, BlockPos)> = Vec::new();
                for (key, sector) in &self.sectors {
                    for (block_y, block) in &sector.blocks {
                        let Some(pos) = BlockPos::new(I16Vec3::new(key.0, *block_y, key.1))
                        else {
                            continue;
                        };
                        if block.refcount == 0 && !to_unload.contains(&pos) {
                            candidates.push((block.usage_timer, pos));
                        }
                    }
                }
                candidates
                    .sort_by(|left, right| right.0.total_cmp(&left.0));
                to_unload.extend(
                    candidates
                        .into_iter()
                        .take(remaining - max_loaded)
                        .map(|(_, pos)| pos),
                );
            }
        }

        for pos in to_unload {
            let dirty = self
                .get_block_no_create(pos)
                .is_some_and(|block| block.modified() != ModifiedState::Clean);
            if dirty {
                if let (Some(database), Some(block)) = (
                    &mut self.database,
                    self.sectors
                        .get_mut(&sector_key(pos))
                        .and_then(|sector| sector.get_block_mut(pos.vec().y)),
                ) {
                    if block.is_dummy() {
                        // nothing worth saving
                    } else if let Err(save_error) = Self::save_block_to_database(
                        &self.registry,
                        database,
                        self.compression_level,
                        pos,
                        block,
                    ) {
                        error!("not unloading {pos}: save failed: {save_error}");
                        continue;
                    }
                }
            }
            self.remove_block(pos);
            trace!("unloaded block {pos}");
            if let Some(out) = unloaded.as_mut() {
                out.push(pos);
            }
        }
        Ok(())
    }

    // --- occlusion --------------------------------------------------------

    fn ray_hits_blocker(&self, from: Vec3, to: Vec3) -> bool {
        let delta = to - from;
        let length = delta.length();
        if length < 1.0 {
            return false;
        }
        let steps = length.ceil();
        let step = delta / steps;
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "ray lengths are bounded by the view distance"
        )]
        let count = steps as u32;
        // skip the endpoints themselves; only nodes strictly between matter
        let mut sample = from + step;
        for _ in 1..count {
            let node_pos = NodePos(sample.round().as_i16vec3());
            let node = self.get_node_or_ignore(node_pos);
            if node.content != ContentId::IGNORE {
                let features = self.registry.get_features(node.content);
                if !features.light_propagates && features.solidity == 2 {
                    return true;
                }
            }
            sample += step;
        }
        false
    }

    /// Whether `block_pos` is occluded as seen from `camera`, given in node
    /// coordinates. Tests rays towards the block's eight corners, its
    /// centre and the face point nearest the camera; at least two rays
    /// must be blocked before the block counts as occluded, which avoids
    /// single-ray false positives along mapchunk seams.
    #[must_use]
    pub fn is_block_occluded(&self, block_pos: BlockPos, camera: Vec3) -> bool {
        let min = block_pos.min_node().0.as_vec3();
        let size = f32::from(BlockPos::SIZE);
        let center = min + Vec3::splat(size / 2.0);

        if (center - camera).length() < size * 1.5 {
            // the camera is basically inside; never occlude
            return false;
        }

        let mut targets: Vec<Vec3> = Vec::with_capacity(10);
        for corner_x in [0.0, size] {
            for corner_y in [0.0, size] {
                for corner_z in [0.0, size] {
                    targets.push(min + Vec3::new(corner_x, corner_y, corner_z));
                }
            }
        }
        targets.push(center);
        // the closest axis-aligned face point catches thin occluders that
        // slip between the corner rays
        let clamped = camera.clamp(min, min + Vec3::splat(size));
        targets.push(clamped);

        let mut blocked = 0;
        for target in targets {
            if self.ray_hits_blocker(camera, target) {
                blocked += 1;
                if blocked >= 2 {
                    return true;
                }
            }
        }
        false
    }

    // --- bulk iteration ---------------------------------------------------

    /// Every loaded block position.
    #[must_use]
    pub fn loaded_blocks(&self) -> Vec<BlockPos> {
        let mut out = Vec::new();
        for (key, sector) in &self.sectors {
            for (block_y, _block) in sector.iter() {
                if let Some(pos) = BlockPos::new(I16Vec3::new(key.0, block_y, key.1)) {
                    out.push(pos);
                }
            }
        }
        out
    }

    /// Runs the liquid transformer over the queued positions; see the
    /// `liquid` module for the algorithm.
    pub fn transform_liquids(
        &mut self,
        processor: &mut liquid::LiquidProcessor,
        dt: f32,
    ) -> liquid::LiquidStepReport {
        liquid::transform_liquids(self, processor, dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use voxen_core::{BlockNodes, ContentFeatures};

    fn test_registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures {
                is_ground_content: true,
                ..ContentFeatures::simple("base:stone")
            })
            .unwrap();
        registry.finalize().unwrap();
        Arc::new(registry)
    }

    fn air_block() -> MapBlock {
        let mut block = MapBlock::with_nodes(BlockNodes::filled(MapNode::AIR));
        block.generated = true;
        block
    }

    fn test_map() -> Map {
        Map::new(
            test_registry(),
            Some(Box::new(MemoryDatabase::new())),
            &Settings::new(),
        )
    }

    #[test]
    fn set_then_get_round_trip() {
        let mut map = test_map();
        map.insert_block(BlockPos::ZERO, air_block());
        let stone = map.registry().get_id("base:stone").unwrap();
        let pos = NodePos::new(3, 4, 5);

        map.set_node(pos, MapNode::of(stone)).unwrap();
        assert_eq!(map.get_node(pos).unwrap().content, stone);

        // no other node content in the block changed
        for index in NodeIndex::iter_all() {
            let other = BlockPos::ZERO.node_pos(index);
            if other != pos {
                assert_eq!(map.get_node(other).unwrap().content, ContentId::AIR);
            }
        }
    }

    #[test]
    fn ignore_writes_are_refused() {
        let mut map = test_map();
        map.insert_block(BlockPos::ZERO, air_block());
        assert!(matches!(
            map.set_node(NodePos::new(1, 1, 1), MapNode::IGNORE),
            Err(MapError::IgnoreRefused(_))
        ));
    }

    #[test]
    fn set_node_outside_loaded_world_fails() {
        let mut map = test_map();
        assert!(matches!(
            map.set_node(NodePos::new(100, 100, 100), MapNode::AIR),
            Err(MapError::InvalidPosition(_))
        ));
    }

    #[test]
    fn emerge_creates_dummy_only_when_asked() {
        let mut map = test_map();
        let pos = BlockPos::new(I16Vec3::new(2, 3, 4)).unwrap();
        assert!(map.emerge_block(pos, false).unwrap().is_none());
        assert!(!map.has_block(pos));
        assert!(map.emerge_block(pos, true).unwrap().unwrap().is_dummy());
        assert!(map.has_block(pos));
    }

    #[test]
    fn events_reach_subscribers() {
        let mut map = test_map();
        map.insert_block(BlockPos::ZERO, air_block());
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        map.subscribe(sender);

        let stone = map.registry().get_id("base:stone").unwrap();
        map.add_node_with_event(NodePos::new(1, 2, 3), MapNode::of(stone), true)
            .unwrap();

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event_type, MapEditEventType::AddNode);
        assert_eq!(event.pos, NodePos::new(1, 2, 3));
        assert!(event.modified_blocks.contains(&BlockPos::ZERO));

        map.add_node_with_event(NodePos::new(1, 2, 3), MapNode::AIR, true)
            .unwrap();
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event_type, MapEditEventType::RemoveNode);
    }

    #[test]
    fn metadata_survives_unload_and_reload() {
        let mut map = test_map();
        map.insert_block(BlockPos::ZERO, air_block());

        let pos = NodePos::new(1, 2, 3);
        let mut meta = NodeMetadata::new();
        meta.set("note", "hello");
        map.set_node_metadata(pos, meta).unwrap();
        map.set_node_timer(
            pos,
            NodeTimer {
                timeout: 5.0,
                elapsed: 0.0,
            },
        )
        .unwrap();

        // push the block past the unload threshold
        map.timer_update(100.0, DEFAULT_UNLOAD_TIMEOUT, None, None)
            .unwrap();
        assert!(!map.has_block(BlockPos::ZERO), "block should have unloaded");

        let restored = map.get_node_metadata(pos).unwrap().unwrap();
        assert_eq!(restored.get("note"), Some("hello"));
        let timer = map.get_node_timer(pos).unwrap().unwrap();
        assert!((timer.timeout - 5.0).abs() < 1e-3);
    }

    #[test]
    fn find_nodes_with_meta_respects_bounds() {
        let mut map = test_map();
        map.insert_block(BlockPos::ZERO, air_block());
        let inside = NodePos::new(2, 2, 2);
        let outside = NodePos::new(12, 12, 12);
        for pos in [inside, outside] {
            let mut meta = NodeMetadata::new();
            meta.set("k", "v");
            map.set_node_metadata(pos, meta).unwrap();
        }
        let found = map.find_nodes_with_meta(NodePos::new(0, 0, 0), NodePos::new(5, 5, 5));
        assert_eq!(found, vec![inside]);
    }

    #[test]
    fn occlusion_needs_a_real_wall() {
        let mut map = test_map();
        map.insert_block(BlockPos::ZERO, air_block());
        map.insert_block(BlockPos::new(I16Vec3::new(1, 0, 0)).unwrap(), air_block());
        let camera = Vec3::new(40.0, 8.0, 8.0);

        assert!(
            !map.is_block_occluded(BlockPos::ZERO, camera),
            "open air must not occlude"
        );

        // a full plane between camera and target blocks every ray
        let stone = map.registry().get_id("base:stone").unwrap();
        for y in 0..16_i16 {
            for z in 0..16_i16 {
                map.set_node(NodePos::new(24, y, z), MapNode::of(stone))
                    .unwrap();
            }
        }
        assert!(map.is_block_occluded(BlockPos::ZERO, camera));
    }

    #[test]
    fn eviction_cap_prefers_idle_blocks() {
        let mut map = test_map();
        for x in 0..4_i16 {
            let pos = BlockPos::new(I16Vec3::new(x, 0, 0)).unwrap();
            map.insert_block(pos, air_block());
        }
        // touch one block so it is the most recently used
        map.get_block_mut(BlockPos::new(I16Vec3::new(3, 0, 0)).unwrap())
            .unwrap()
            .usage_timer = 0.0;
        if let Some(block) = map.get_block_mut(BlockPos::new(I16Vec3::new(0, 0, 0)).unwrap()) {
            block.usage_timer = 50.0;
        }

        let mut unloaded = Vec::new();
        map.timer_update(1.0, 1000.0, Some(2), Some(&mut unloaded))
            .unwrap();
        assert_eq!(unloaded.len(), 2);
        assert!(
            unloaded.contains(&BlockPos::new(I16Vec3::new(0, 0, 0)).unwrap()),
            "the most idle block must go first"
        );
        assert_eq!(map.loaded_blocks().len(), 2);
    }
}
