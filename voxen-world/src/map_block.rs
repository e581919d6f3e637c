//! The map block: a 16³ cube of nodes plus the block-scoped side tables
//! (metadata, node timers, static objects) and the bookkeeping the map
//! store needs (modified state, usage timer, generation flags).

use std::collections::BTreeMap;

use flexstr::SharedStr;
use glam::Vec3;
use voxen_core::{
    BlockNodes, ContentId, LightBank, MapNode, NodeIndex, NodeRegistry,
};

/// How urgently a block needs to reach the database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModifiedState {
    /// In sync with the database.
    #[default]
    Clean,
    /// May be written whenever convenient, at the latest at unload.
    WriteAtUnload,
    /// Should be written in the next save pass.
    WriteNeeded,
}

/// Bit-set of reasons a block was marked modified; purely diagnostic.
pub mod mod_reason {
    /// A node was overwritten through `set`.
    pub const SET_NODE: u32 = 1 << 0;
    /// The lighting pass rewrote `param1` bytes.
    pub const LIGHTING: u32 = 1 << 1;
    /// The liquid transformer rewrote nodes.
    pub const LIQUID: u32 = 1 << 2;
    /// Node metadata was added, changed or removed.
    pub const METADATA: u32 = 1 << 3;
    /// A node timer was added, changed or removed.
    pub const NODE_TIMER: u32 = 1 << 4;
    /// The block was populated by a map generator.
    pub const GENERATED: u32 = 1 << 5;
    /// A VManip blitted data into the block.
    pub const VMANIP: u32 = 1 << 6;
    /// The block was created blank.
    pub const NEW_BLANK: u32 = 1 << 7;
    /// Static objects changed.
    pub const STATIC_OBJECTS: u32 = 1 << 8;
}

/// An opaque string bag attached to a single node, e.g. the text of a sign
/// or the inventory serialization of a chest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeMetadata {
    vars: BTreeMap<SharedStr, String>,
}

impl NodeMetadata {
    /// An empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a variable up.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Stores a variable.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Whether no variables are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterates all variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&SharedStr, &String)> {
        self.vars.iter()
    }
}

/// A countdown attached to a single node, driven by the environment tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeTimer {
    /// Seconds until the timer fires.
    pub timeout: f32,
    /// Seconds already elapsed.
    pub elapsed: f32,
}

/// An object stored statically inside a block while no environment holds it
/// active; the world core treats the payload as opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticObject {
    /// Discriminator interpreted by the gameplay layer.
    pub type_id: u8,
    /// World position in node units.
    pub pos: Vec3,
    /// Serialized object state.
    pub data: Vec<u8>,
}

/// A single 16³ block of the world.
///
/// A block exists in one of two shapes: a *dummy* that only records that
/// the position was probed but no data exists, and a fully loaded block
/// with all 4096 nodes valid.
pub struct MapBlock {
    nodes: Option<BlockNodes>,
    /// Whether a map generator has finished this block.
    pub generated: bool,
    /// Hint that no sunlight can arrive from above.
    pub underground: bool,
    day_night_differs: bool,
    day_night_differs_expired: bool,
    /// Whether light inside the block and towards its loaded neighbours is
    /// settled.
    pub lighting_complete: bool,
    modified: ModifiedState,
    modified_reasons: u32,
    /// Seconds since the block was last touched by anyone.
    pub usage_timer: f32,
    /// Number of external handles; the sweeper never unloads while nonzero.
    pub refcount: u32,
    /// World-epoch seconds of the last save.
    pub timestamp: u32,
    metadata: BTreeMap<NodeIndex, NodeMetadata>,
    node_timers: BTreeMap<NodeIndex, NodeTimer>,
    static_objects: Vec<StaticObject>,
}

impl MapBlock {
    /// A fully loaded block initialized to all-IGNORE.
    #[must_use]
    pub fn new() -> Self {
        Self::with_nodes(BlockNodes::filled(MapNode::IGNORE))
    }

    /// A fully loaded block with the given node array.
    #[must_use]
    pub fn with_nodes(nodes: BlockNodes) -> Self {
        Self::with_storage(Some(nodes))
    }

    fn with_storage(nodes: Option<BlockNodes>) -> Self {
        Self {
            nodes,
            generated: false,
            underground: false,
            day_night_differs: false,
            day_night_differs_expired: true,
            lighting_complete: false,
            modified: ModifiedState::Clean,
            modified_reasons: 0,
            usage_timer: 0.0,
            refcount: 0,
            timestamp: 0,
            metadata: BTreeMap::new(),
            node_timers: BTreeMap::new(),
            static_objects: Vec::new(),
        }
    }

    /// A dummy placeholder carrying no node data.
    #[must_use]
    pub fn new_dummy() -> Self {
        Self::with_storage(None)
    }

    /// Whether this is a placeholder without node storage.
    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.nodes.is_none()
    }

    /// Upgrades a dummy into a loaded block filled with IGNORE. No-op on
    /// loaded blocks.
    pub fn allocate(&mut self) {
        if self.nodes.is_none() {
            self.nodes = Some(BlockNodes::filled(MapNode::IGNORE));
        }
    }

    /// Reads one node; dummies yield IGNORE.
    #[must_use]
    pub fn get(&self, index: NodeIndex) -> MapNode {
        self.nodes
            .as_ref()
            .map_or(MapNode::IGNORE, |nodes| nodes[index])
    }

    /// Writes one node, raising the `SET_NODE` modification reason and
    /// expiring the day/night cache. Dummies are allocated on first write.
    pub fn set(&mut self, index: NodeIndex, node: MapNode) {
        self.allocate();
        if let Some(nodes) = &mut self.nodes {
            nodes[index] = node;
        }
        self.raise_modified(ModifiedState::WriteNeeded, mod_reason::SET_NODE);
        self.day_night_differs_expired = true;
    }

    /// Writes one node without touching the modified state; used by bulk
    /// paths that account for dirtiness themselves.
    pub fn set_no_check(&mut self, index: NodeIndex, node: MapNode) {
        self.allocate();
        if let Some(nodes) = &mut self.nodes {
            nodes[index] = node;
        }
        self.day_night_differs_expired = true;
    }

    /// Direct read access to the node array of a loaded block.
    #[must_use]
    pub fn nodes(&self) -> Option<&BlockNodes> {
        self.nodes.as_ref()
    }

    /// Direct write access to the node array of a loaded block.
    pub fn nodes_mut(&mut self) -> Option<&mut BlockNodes> {
        self.day_night_differs_expired = true;
        self.nodes.as_mut()
    }

    /// Escalates the modified state and records the reason.
    pub fn raise_modified(&mut self, state: ModifiedState, reason: u32) {
        self.modified = self.modified.max(state);
        self.modified_reasons |= reason;
        self.usage_timer = 0.0;
    }

    /// Resets the modified state after a successful save.
    pub fn clear_modified(&mut self) {
        self.modified = ModifiedState::Clean;
        self.modified_reasons = 0;
    }

    /// Current modified state.
    #[must_use]
    pub fn modified(&self) -> ModifiedState {
        self.modified
    }

    /// Accumulated modification reasons since the last save.
    #[must_use]
    pub fn modified_reasons(&self) -> u32 {
        self.modified_reasons
    }

    /// Whether day and night lighting differ anywhere in the block,
    /// recomputing the cached answer if a write expired it.
    pub fn day_night_differs(&mut self, registry: &NodeRegistry) -> bool {
        if self.day_night_differs_expired {
            self.day_night_differs = self.compute_day_night_differs(registry);
            self.day_night_differs_expired = false;
        }
        self.day_night_differs
    }

    /// The cached answer without recomputation, for serialization.
    #[must_use]
    pub fn day_night_differs_cached(&self) -> bool {
        self.day_night_differs
    }

    /// Overwrites the cache, e.g. from a deserialized flag byte.
    pub fn set_day_night_differs(&mut self, differs: bool) {
        self.day_night_differs = differs;
        self.day_night_differs_expired = false;
    }

    fn compute_day_night_differs(&self, registry: &NodeRegistry) -> bool {
        let Some(nodes) = &self.nodes else {
            return false;
        };
        nodes.0.iter().any(|node| {
            let features = registry.get_features(node.content);
            node.light(LightBank::Day, features) != node.light(LightBank::Night, features)
        })
    }

    /// Whether the block consists only of air with no side tables, which
    /// lets some passes skip it entirely.
    #[must_use]
    pub fn is_air_only(&self) -> bool {
        self.metadata.is_empty()
            && self.static_objects.is_empty()
            && self
                .nodes
                .as_ref()
                .is_some_and(|nodes| nodes.0.iter().all(|node| node.content == ContentId::AIR))
    }

    // --- node metadata -------------------------------------------------

    /// Metadata of one node, if any.
    #[must_use]
    pub fn metadata(&self, index: NodeIndex) -> Option<&NodeMetadata> {
        self.metadata.get(&index)
    }

    /// Installs metadata for a node, replacing any previous bag.
    pub fn set_metadata(&mut self, index: NodeIndex, meta: NodeMetadata) {
        self.metadata.insert(index, meta);
        self.raise_modified(ModifiedState::WriteNeeded, mod_reason::METADATA);
    }

    /// Removes a node's metadata, reporting whether something was there.
    pub fn remove_metadata(&mut self, index: NodeIndex) -> bool {
        let removed = self.metadata.remove(&index).is_some();
        if removed {
            self.raise_modified(ModifiedState::WriteNeeded, mod_reason::METADATA);
        }
        removed
    }

    /// Iterates all `(index, metadata)` pairs.
    pub fn iter_metadata(&self) -> impl Iterator<Item = (NodeIndex, &NodeMetadata)> {
        self.metadata.iter().map(|(index, meta)| (*index, meta))
    }

    // --- node timers ---------------------------------------------------

    /// Timer of one node, if any.
    #[must_use]
    pub fn node_timer(&self, index: NodeIndex) -> Option<NodeTimer> {
        self.node_timers.get(&index).copied()
    }

    /// Installs a timer for a node.
    pub fn set_node_timer(&mut self, index: NodeIndex, timer: NodeTimer) {
        self.node_timers.insert(index, timer);
        self.raise_modified(ModifiedState::WriteNeeded, mod_reason::NODE_TIMER);
    }

    /// Removes a node's timer, reporting whether one existed.
    pub fn remove_node_timer(&mut self, index: NodeIndex) -> bool {
        let removed = self.node_timers.remove(&index).is_some();
        if removed {
            self.raise_modified(ModifiedState::WriteNeeded, mod_reason::NODE_TIMER);
        }
        removed
    }

    /// Iterates all `(index, timer)` pairs.
    pub fn iter_node_timers(&self) -> impl Iterator<Item = (NodeIndex, NodeTimer)> {
        self.node_timers.iter().map(|(index, timer)| (*index, *timer))
    }

    /// Advances all timers by `dt` seconds and returns the indices of those
    /// that fired (they are removed from the block).
    pub fn step_node_timers(&mut self, dt: f32) -> Vec<NodeIndex> {
        let mut fired = Vec::new();
        for (index, timer) in &mut self.node_timers {
            timer.elapsed += dt;
            if timer.elapsed >= timer.timeout {
                fired.push(*index);
            }
        }
        for index in &fired {
            self.node_timers.remove(index);
        }
        if !fired.is_empty() {
            self.raise_modified(ModifiedState::WriteNeeded, mod_reason::NODE_TIMER);
        }
        fired
    }

    // --- static objects ------------------------------------------------

    /// The static-object list.
    #[must_use]
    pub fn static_objects(&self) -> &[StaticObject] {
        &self.static_objects
    }

    /// Appends a static object.
    pub fn add_static_object(&mut self, object: StaticObject) {
        self.static_objects.push(object);
        self.raise_modified(ModifiedState::WriteAtUnload, mod_reason::STATIC_OBJECTS);
    }

    /// Replaces the whole static-object list (deserialization path).
    pub fn set_static_objects(&mut self, objects: Vec<StaticObject>) {
        self.static_objects = objects;
    }
}

impl Default for MapBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxen_core::NodePos;

    #[test]
    fn dummy_reads_ignore_and_allocates_on_write() {
        let mut block = MapBlock::new_dummy();
        assert!(block.is_dummy());
        let index = NodePos::new(1, 2, 3).index();
        assert_eq!(block.get(index), MapNode::IGNORE);

        block.set(index, MapNode::AIR);
        assert!(!block.is_dummy());
        assert_eq!(block.get(index), MapNode::AIR);
        assert_eq!(block.modified(), ModifiedState::WriteNeeded);
        assert_ne!(block.modified_reasons() & mod_reason::SET_NODE, 0);
    }

    #[test]
    fn modified_state_only_escalates() {
        let mut block = MapBlock::new();
        block.raise_modified(ModifiedState::WriteNeeded, mod_reason::LIQUID);
        block.raise_modified(ModifiedState::WriteAtUnload, mod_reason::METADATA);
        assert_eq!(block.modified(), ModifiedState::WriteNeeded);
        assert_eq!(
            block.modified_reasons(),
            mod_reason::LIQUID | mod_reason::METADATA
        );
    }

    #[test]
    fn timers_fire_and_disappear() {
        let mut block = MapBlock::new();
        let index = NodeIndex::from(7_u16);
        block.set_node_timer(
            index,
            NodeTimer {
                timeout: 1.0,
                elapsed: 0.0,
            },
        );
        assert!(block.step_node_timers(0.5).is_empty());
        assert_eq!(block.step_node_timers(0.6), vec![index]);
        assert_eq!(block.node_timer(index), None);
    }

    #[test]
    fn day_night_cache_recomputes_after_write() {
        let registry = NodeRegistry::new();
        let mut block = MapBlock::new();
        assert!(!block.day_night_differs(&registry));

        let mut node = MapNode::AIR;
        node.set_light(voxen_core::LightBank::Day, 10);
        block.set(NodeIndex::MIN, node);
        assert!(block.day_night_differs(&registry));
    }
}
