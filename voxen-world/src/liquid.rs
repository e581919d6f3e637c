//! The cellular liquid transformer.
//!
//! Called on a cadence by the environment, it drains a bounded number of
//! positions from the map's liquid queue and equilibrates each against its
//! six neighbours: sources stay, pairs of renewable sources breed new
//! ones, flowing levels follow the best supplying neighbour, and
//! unsupplied flow decays back to the floodable fallback. Every change is
//! re-enqueued outward, so equilibrium is reached over a handful of ticks
//! without unbounded work per tick.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use voxen_core::{
    ContentId, FACE_DIRS, LIQUID_LEVEL_MAX, LiquidKind, MapNode, NodePos,
};

use crate::light;
use crate::map::Map;
use crate::map_block::{ModifiedState, mod_reason};
use crate::settings::Settings;

/// Levels gained when supplied from directly above.
pub const WATER_DROP_BOOST: u8 = 4;

/// A hook consulted before receding liquid erases a node; returning `true`
/// consumes the flood and keeps the node untouched.
pub type FloodHook = Box<dyn FnMut(NodePos, MapNode) -> bool + Send>;

/// The transformer's tuning knobs plus the cross-tick state of the queue
/// purge policy. Owned by the environment, passed into every step.
pub struct LiquidProcessor {
    /// Maximum queue items drained per step.
    pub loop_max: usize,
    /// Seconds the queue may grow monotonically before it is trimmed.
    pub queue_purge_time: f32,
    flood_hook: Option<FloodHook>,
    growing_for: f32,
    previous_len: usize,
}

impl LiquidProcessor {
    /// Builds a processor from the settings keys `liquid_loop_max` and
    /// `liquid_queue_purge_time`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            loop_max: usize::try_from(settings.get_i64_or("liquid_loop_max", 100_000))
                .unwrap_or(100_000),
            queue_purge_time: settings.get_f32_or("liquid_queue_purge_time", 0.0),
            flood_hook: None,
            growing_for: 0.0,
            previous_len: 0,
        }
    }

    /// Installs the flood hook.
    pub fn set_flood_hook(&mut self, hook: FloodHook) {
        self.flood_hook = Some(hook);
    }
}

impl Default for LiquidProcessor {
    fn default() -> Self {
        Self::from_settings(&Settings::new())
    }
}

/// What one transformer step did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiquidStepReport {
    /// Queue items inspected.
    pub processed: usize,
    /// Nodes actually rewritten.
    pub changed: usize,
    /// Stale queue entries dropped by the purge policy.
    pub purged: usize,
}

struct NeighborInfo {
    pos: NodePos,
    node: MapNode,
    above: bool,
    below: bool,
}

/// Effective level of a liquid node: sources always count as full.
fn effective_level(node: MapNode, kind: LiquidKind) -> u8 {
    match kind {
        LiquidKind::Source => LIQUID_LEVEL_MAX,
        LiquidKind::Flowing => node.liquid_level(),
        LiquidKind::None => 0,
    }
}

/// One bounded transformer step over `map`'s queue.
#[expect(
    clippy::too_many_lines,
    reason = "the classification/decision table reads best as one unit"
)]
pub fn transform_liquids(
    map: &mut Map,
    processor: &mut LiquidProcessor,
    dt: f32,
) -> LiquidStepReport {
    let registry = Arc::clone(map.registry());
    let mut report = LiquidStepReport::default();

    // purge policy: a queue that keeps growing for too long gets trimmed
    // from the old end so memory stays bounded under pathological terrain
    let queue_len = map.transforming_liquid.len();
    if queue_len > processor.previous_len {
        processor.growing_for += dt;
    } else {
        processor.growing_for = 0.0;
    }
    if processor.queue_purge_time > 0.0
        && processor.growing_for > processor.queue_purge_time
        && queue_len > processor.loop_max
    {
        let excess = queue_len - processor.loop_max;
        map.transforming_liquid.drain(..excess);
        report.purged = excess;
        processor.growing_for = 0.0;
        debug!("liquid queue purged {excess} stale entries");
    }
    processor.previous_len = map.transforming_liquid.len();

    let budget = map.transforming_liquid.len().min(processor.loop_max);
    let mut changes: Vec<(NodePos, MapNode)> = Vec::new();
    let mut modified_blocks = Vec::new();
    let mut requeue: VecDeque<NodePos> = VecDeque::new();

    for _ in 0..budget {
        let Some(pos) = map.transforming_liquid.pop_front() else {
            break;
        };
        report.processed += 1;

        let Some(node) = map.get_node(pos) else {
            // unloaded in the meantime; silently skip
            continue;
        };
        if node.content == ContentId::IGNORE {
            continue;
        }
        let features = registry.get_features(node.content);
        let own_kind = features.liquid_kind;
        if own_kind == LiquidKind::None && !features.floodable {
            continue;
        }

        // gather the six neighbours once
        let mut neighbors: Vec<NeighborInfo> = Vec::with_capacity(6);
        for dir in FACE_DIRS {
            let Some(neighbor_pos) = pos.checked_add(dir) else {
                continue;
            };
            let Some(neighbor) = map.get_node(neighbor_pos) else {
                continue;
            };
            if neighbor.content == ContentId::IGNORE {
                continue;
            }
            neighbors.push(NeighborInfo {
                pos: neighbor_pos,
                node: neighbor,
                above: dir.y > 0,
                below: dir.y < 0,
            });
        }

        // the liquid domain at this position: the node's own, or the one of
        // the first liquid neighbour when the node is floodable
        let domain = if own_kind == LiquidKind::None {
            neighbors.iter().find_map(|info| {
                let neighbor_features = registry.get_features(info.node.content);
                neighbor_features
                    .is_liquid()
                    .then(|| neighbor_features.liquid_alternative_source_id)
            })
        } else {
            Some(features.liquid_alternative_source_id)
        };
        let Some(domain_source) = domain else {
            continue;
        };
        let domain_features = registry.get_features(domain_source);
        let flowing_id = domain_features.liquid_alternative_flowing_id;
        let range = domain_features.liquid_range.min(8);
        let viscosity = domain_features.liquid_viscosity.max(1);

        let same_kind = |content: ContentId| {
            let neighbor_features = registry.get_features(content);
            neighbor_features.is_liquid()
                && neighbor_features.liquid_alternative_source_id == domain_source
        };

        // sources stay sources; nothing to equilibrate
        if own_kind == LiquidKind::Source {
            continue;
        }

        let mut adjacent_sources = 0_u32;
        let mut flowing_down = false;
        let mut max_level: i16 = -1;
        for info in &neighbors {
            if !same_kind(info.node.content) {
                if info.below {
                    let below_features = registry.get_features(info.node.content);
                    if below_features.floodable {
                        flowing_down = true;
                    }
                }
                continue;
            }
            let neighbor_features = registry.get_features(info.node.content);
            let kind = neighbor_features.liquid_kind;
            let level = i16::from(effective_level(info.node, kind));

            if info.below {
                flowing_down = true;
                continue;
            }
            if kind == LiquidKind::Source && !info.below {
                adjacent_sources += 1;
            }
            let candidate = if info.above {
                (level + i16::from(WATER_DROP_BOOST)).min(i16::from(LIQUID_LEVEL_MAX))
            } else if kind == LiquidKind::Flowing && info.node.liquid_flows_down() {
                // its water is committed downward, not sideways
                continue;
            } else {
                level - 1
            };
            max_level = max_level.max(candidate);
        }

        let current_level: i16 = match own_kind {
            LiquidKind::Flowing => i16::from(node.liquid_level()),
            _ => -1,
        };

        // decide the target node
        let threshold = i16::from(LIQUID_LEVEL_MAX) - i16::from(range) + 1;
        let mut target_level = max_level;
        if viscosity > 1 && target_level != current_level && current_level >= 0 {
            // viscous liquids close the gap one level per tick
            target_level = if target_level > current_level {
                current_level + 1
            } else {
                current_level - 1
            };
            if target_level != max_level {
                requeue.push_back(pos);
            }
        }

        let new_node = if adjacent_sources >= 2 && domain_features.liquid_renewable {
            MapNode::of(domain_source)
        } else if target_level >= threshold && target_level >= 0 {
            #[expect(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "the level was checked non-negative and is at most 7"
            )]
            let level = target_level as u8;
            let mut flowing = MapNode::of(flowing_id);
            flowing.set_liquid_level(level, flowing_down);
            flowing
        } else if own_kind == LiquidKind::Flowing {
            // unsupplied flow recedes; the hook may veto the erase
            if let Some(hook) = &mut processor.flood_hook {
                if hook(pos, node) {
                    continue;
                }
            }
            MapNode::AIR
        } else {
            // floodable non-liquid with no supply: nothing happens
            continue;
        };

        if new_node.content == node.content && new_node.param2 == node.param2 {
            continue;
        }

        // apply with cleared light; the relight pass below fixes it up
        let Some((block, index)) = map.block_and_index(pos) else {
            continue;
        };
        let old_node = block.get(index);
        let mut applied = new_node;
        applied.clear_light();
        block.set_no_check(index, applied);
        block.raise_modified(ModifiedState::WriteNeeded, mod_reason::LIQUID);
        modified_blocks.push(pos.block_pos());
        changes.push((pos, old_node));
        report.changed += 1;
        trace!("liquid rewrote {pos}");

        // ripple outward
        let new_is_liquid = registry.get_features(applied.content).is_liquid();
        for dir in FACE_DIRS {
            let Some(neighbor_pos) = pos.checked_add(dir) else {
                continue;
            };
            let Some(neighbor) = map.get_node(neighbor_pos) else {
                continue;
            };
            let neighbor_features = registry.get_features(neighbor.content);
            if neighbor_features.is_liquid() || (new_is_liquid && neighbor_features.floodable)
            {
                requeue.push_back(neighbor_pos);
            }
        }
    }

    map.transforming_liquid.extend(requeue);

    if !changes.is_empty() {
        light::update_lighting_nodes(map, &changes, &mut modified_blocks);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_block::MapBlock;
    use std::sync::Arc;
    use voxen_core::{BlockNodes, BlockPos, ContentFeatures, DrawType, NodeRegistry};

    fn water_registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures::simple("base:stone"))
            .unwrap();
        for (name, kind, draw) in [
            ("base:water_source", LiquidKind::Source, DrawType::Liquid),
            (
                "base:water_flowing",
                LiquidKind::Flowing,
                DrawType::FlowingLiquid,
            ),
        ] {
            registry
                .register_node(ContentFeatures {
                    liquid_kind: kind,
                    drawtype: draw,
                    liquid_alternative_source: Some("base:water_source".into()),
                    liquid_alternative_flowing: Some("base:water_flowing".into()),
                    walkable: false,
                    light_propagates: true,
                    ..ContentFeatures::simple(name)
                })
                .unwrap();
        }
        registry.finalize().unwrap();
        Arc::new(registry)
    }

    fn world_with_platform(registry: &Arc<NodeRegistry>) -> Map {
        let mut map = Map::new(Arc::clone(registry), None, &Settings::new());
        for x in -1..=1_i16 {
            for y in -1..=1_i16 {
                for z in -1..=1_i16 {
                    let pos = BlockPos::new(glam::I16Vec3::new(x, y, z)).unwrap();
                    let mut block = MapBlock::with_nodes(BlockNodes::filled(MapNode::AIR));
                    block.generated = true;
                    map.insert_block(pos, block);
                }
            }
        }
        let stone = registry.get_id("base:stone").unwrap();
        for x in -8..=8_i16 {
            for z in -8..=8_i16 {
                map.set_node(NodePos::new(x, 4, z), MapNode::of(stone))
                    .unwrap();
            }
        }
        map
    }

    fn settle(map: &mut Map, processor: &mut LiquidProcessor, max_ticks: usize) -> usize {
        for tick in 0..max_ticks {
            let report = map.transform_liquids(processor, 1.0);
            if report.changed == 0 && map.transforming_liquid_len() == 0 {
                return tick;
            }
        }
        max_ticks
    }

    #[test]
    fn source_builds_a_decreasing_ring() {
        let registry = water_registry();
        let mut map = world_with_platform(&registry);
        let source = registry.get_id("base:water_source").unwrap();
        let flowing = registry.get_id("base:water_flowing").unwrap();

        map.set_node(NodePos::new(0, 5, 0), MapNode::of(source))
            .unwrap();
        let mut processor = LiquidProcessor::default();
        let ticks = settle(&mut map, &mut processor, 64);
        assert!(ticks <= 28, "equilibrium took {ticks} ticks");

        for x in -7..=7_i16 {
            for z in -7..=7_i16 {
                let distance = x.abs() + z.abs();
                let node = map.get_node(NodePos::new(x, 5, z)).unwrap();
                if distance == 0 {
                    assert_eq!(node.content, source);
                } else if distance <= 7 {
                    assert_eq!(
                        node.content, flowing,
                        "expected flowing water at ({x}, 5, {z})"
                    );
                    assert_eq!(
                        i16::from(node.liquid_level()),
                        7 - distance,
                        "wrong level at ({x}, 5, {z})"
                    );
                } else {
                    assert_eq!(node.content, ContentId::AIR);
                }
            }
        }
    }

    #[test]
    fn removing_the_source_drains_the_ring() {
        let registry = water_registry();
        let mut map = world_with_platform(&registry);
        let source = registry.get_id("base:water_source").unwrap();

        map.set_node(NodePos::new(0, 5, 0), MapNode::of(source))
            .unwrap();
        let mut processor = LiquidProcessor::default();
        settle(&mut map, &mut processor, 64);

        map.set_node(NodePos::new(0, 5, 0), MapNode::AIR).unwrap();
        settle(&mut map, &mut processor, 128);

        for x in -8..=8_i16 {
            for z in -8..=8_i16 {
                let node = map.get_node(NodePos::new(x, 5, z)).unwrap();
                assert_eq!(
                    node.content,
                    ContentId::AIR,
                    "stale liquid at ({x}, 5, {z})"
                );
            }
        }
    }

    #[test]
    fn two_sources_renew_the_gap_between_them() {
        let registry = water_registry();
        let mut map = world_with_platform(&registry);
        let source = registry.get_id("base:water_source").unwrap();

        map.set_node(NodePos::new(-1, 5, 0), MapNode::of(source))
            .unwrap();
        map.set_node(NodePos::new(1, 5, 0), MapNode::of(source))
            .unwrap();
        let mut processor = LiquidProcessor::default();
        settle(&mut map, &mut processor, 64);

        assert_eq!(
            map.get_node(NodePos::new(0, 5, 0)).unwrap().content,
            source,
            "two adjacent renewable sources must breed a third"
        );
    }

    #[test]
    fn flood_hook_can_keep_a_node() {
        let registry = water_registry();
        let mut map = world_with_platform(&registry);
        let source = registry.get_id("base:water_source").unwrap();
        let flowing = registry.get_id("base:water_flowing").unwrap();

        map.set_node(NodePos::new(0, 5, 0), MapNode::of(source))
            .unwrap();
        let mut processor = LiquidProcessor::default();
        settle(&mut map, &mut processor, 64);

        processor.set_flood_hook(Box::new(|_pos, _node| true));
        map.set_node(NodePos::new(0, 5, 0), MapNode::AIR).unwrap();
        settle(&mut map, &mut processor, 128);

        // the hook vetoed every erase, so the ring is still wet
        assert_eq!(
            map.get_node(NodePos::new(1, 5, 0)).unwrap().content,
            flowing
        );
    }

    #[test]
    fn queue_purge_trims_monotonic_growth() {
        let registry = water_registry();
        let mut map = Map::new(Arc::clone(&registry), None, &Settings::new());
        let mut processor = LiquidProcessor::default();
        processor.loop_max = 4;
        processor.queue_purge_time = 2.0;

        // the map has no blocks, so entries are skipped but keep arriving
        for step in 0..10_i16 {
            for extra in 0..8_i16 {
                map.enqueue_liquid(NodePos::new(step, extra, 0));
            }
            map.transform_liquids(&mut processor, 1.0);
        }
        assert!(
            map.transforming_liquid_len() <= processor.loop_max + 8,
            "queue was never trimmed: {}",
            map.transforming_liquid_len()
        );
    }
}
