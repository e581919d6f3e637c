//! The two-bank lighting engine.
//!
//! Light lives in the two nibbles of `param1`: day in the low bank, night
//! in the high bank. Propagation is a plain 6-neighbour BFS losing one
//! level per step, with one exception: sunlight (level 15) passes straight
//! down through sunlight-propagating nodes without decay. Darkening runs
//! the inverse walk, collecting the bright boundary it exposes so the
//! region can be re-lit from it.

use std::collections::VecDeque;
use std::sync::Arc;

use voxen_core::{
    BlockPos, ContentId, FACE_DIRS, LIGHT_SUN, LightBank, MapNode, NodePos, NodeRegistry,
};

use crate::map::Map;
use crate::map_block::{ModifiedState, mod_reason};

const DOWN: glam::I16Vec3 = glam::I16Vec3::new(0, -1, 0);
const UP: glam::I16Vec3 = glam::I16Vec3::new(0, 1, 0);

/// Parameters of the light decode curve mapping the 0..15 levels onto
/// display brightness; read from the `lighting_*` settings keys.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightCurveParams {
    /// Linear share of the curve; 0 is fully gamma-shaped.
    pub alpha: f32,
    /// Gamma exponent of the non-linear share.
    pub beta: f32,
    /// Strength of the mid-tone boost.
    pub boost: f32,
    /// Centre of the boost bump, in normalized light.
    pub boost_center: f32,
    /// Width of the boost bump.
    pub boost_spread: f32,
}

impl Default for LightCurveParams {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            beta: 1.5,
            boost: 0.2,
            boost_center: 0.5,
            boost_spread: 0.2,
        }
    }
}

impl LightCurveParams {
    /// Reads the curve parameters from settings, defaulting each knob.
    #[must_use]
    pub fn from_settings(settings: &crate::settings::Settings) -> Self {
        let defaults = Self::default();
        Self {
            alpha: settings.get_f32_or("lighting_alpha", defaults.alpha),
            beta: settings.get_f32_or("lighting_beta", defaults.beta),
            boost: settings.get_f32_or("lighting_boost", defaults.boost),
            boost_center: settings.get_f32_or("lighting_boost_center", defaults.boost_center),
            boost_spread: settings.get_f32_or("lighting_boost_spread", defaults.boost_spread),
        }
    }

    /// Builds the 16-entry decode table. Entry 15 (sunlight) is always
    /// full brightness; the rest follow a linear/gamma mix plus a
    /// gaussian mid-tone boost.
    #[must_use]
    pub fn decode_table(&self) -> [u8; 16] {
        let mut table = [0_u8; 16];
        for (level, entry) in table.iter_mut().enumerate() {
            #[expect(
                clippy::cast_precision_loss,
                reason = "levels are at most 15"
            )]
            let x = level as f32 / f32::from(LIGHT_SUN);
            let base = self.alpha * x + (1.0 - self.alpha) * x.powf(self.beta);
            let bump = if self.boost_spread > 0.0 {
                let distance = (x - self.boost_center) / self.boost_spread;
                self.boost * (-0.5 * distance * distance).exp()
            } else {
                0.0
            };
            #[expect(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "the value was clamped into 0..=1"
            )]
            {
                *entry = ((base + bump).clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
        table[usize::from(LIGHT_SUN)] = 255;
        table
    }
}

/// Writes one bank of one node, bookkeeping the owning block. Returns
/// whether anything changed.
fn set_light_at(
    map: &mut Map,
    pos: NodePos,
    bank: LightBank,
    light: u8,
    modified_blocks: &mut Vec<BlockPos>,
) -> bool {
    let Some((block, index)) = map.block_and_index(pos) else {
        return false;
    };
    let mut node = block.get(index);
    if node.content == ContentId::IGNORE || node.light_raw(bank) == light {
        return false;
    }
    node.set_light(bank, light);
    block.set_no_check(index, node);
    block.raise_modified(ModifiedState::WriteNeeded, mod_reason::LIGHTING);
    modified_blocks.push(pos.block_pos());
    true
}

/// Forward propagation: pops `(pos, light)` pairs and brightens any
/// neighbour that currently has less than the propagated value.
pub fn spread_light(
    map: &mut Map,
    bank: LightBank,
    seeds: Vec<(NodePos, u8)>,
    modified_blocks: &mut Vec<BlockPos>,
) {
    let registry = Arc::clone(map.registry());
    let mut queue: VecDeque<(NodePos, u8)> = seeds.into();

    while let Some((pos, light)) = queue.pop_front() {
        if light <= 1 {
            continue;
        }
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
            let features = registry.get_features(neighbor.content);
            if !features.light_propagates {
                continue;
            }
            // sunlight falls straight down without losing a level
            let propagated = if bank == LightBank::Day
                && light == LIGHT_SUN
                && dir == DOWN
                && features.sunlight_propagates
            {
                LIGHT_SUN
            } else {
                light - 1
            };
            if neighbor.light_raw(bank) < propagated
                && set_light_at(map, neighbor_pos, bank, propagated, modified_blocks)
            {
                queue.push_back((neighbor_pos, propagated));
            }
        }
    }
}

/// Reverse propagation: pops `(pos, old_light)` pairs of freshly darkened
/// nodes, zeroes everything that depended on them and collects the bright
/// boundary (plus own emissions) into `sources_out` for re-spreading.
pub fn unspread_light(
    map: &mut Map,
    bank: LightBank,
    seeds: Vec<(NodePos, u8)>,
    sources_out: &mut Vec<(NodePos, u8)>,
    modified_blocks: &mut Vec<BlockPos>,
) {
    let registry = Arc::clone(map.registry());
    let mut queue: VecDeque<(NodePos, u8)> = seeds.into();

    while let Some((pos, old_light)) = queue.pop_front() {
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
            let light = neighbor.light_raw(bank);
            if light == 0 {
                continue;
            }
            let features = registry.get_features(neighbor.content);

            // a sun column below a darkened node has lost its sky access
            let cut_sun_column =
                bank == LightBank::Day && dir == DOWN && light == LIGHT_SUN;

            if (light < old_light || cut_sun_column) && features.light_propagates {
                set_light_at(map, neighbor_pos, bank, 0, modified_blocks);
                if features.light_source > 0 {
                    sources_out.push((neighbor_pos, features.light_source));
                }
                queue.push_back((neighbor_pos, light));
            } else {
                // brighter than the darkened region: keep it and relight
                // from here afterwards
                sources_out.push((neighbor_pos, light));
            }
        }
    }
}

/// Drops sunlight down a single column starting at `top` (inclusive) until
/// a non-sunlight-propagating node or `stop_y` is reached. Returns the y
/// below the last sunlit node.
pub fn propagate_sunlight(
    map: &mut Map,
    top: NodePos,
    stop_y: i16,
    modified_blocks: &mut Vec<BlockPos>,
) -> i16 {
    let registry = Arc::clone(map.registry());
    let mut y = top.0.y;
    while y >= stop_y {
        let pos = NodePos::new(top.0.x, y, top.0.z);
        let Some(node) = map.get_node(pos) else {
            break;
        };
        if node.content == ContentId::IGNORE
            || !registry.get_features(node.content).sunlight_propagates
        {
            break;
        }
        set_light_at(map, pos, LightBank::Day, LIGHT_SUN, modified_blocks);
        y -= 1;
    }
    y
}

/// The light a node produces by itself at `pos`: its registered emission,
/// plus sunlight when it continues an unobstructed column from above.
fn own_light(
    map: &Map,
    registry: &NodeRegistry,
    pos: NodePos,
    node: MapNode,
    bank: LightBank,
) -> u8 {
    let features = registry.get_features(node.content);
    let mut light = features.light_source;
    if bank == LightBank::Day && features.sunlight_propagates {
        if let Some(above_pos) = pos.checked_add(UP) {
            if let Some(above) = map.get_node(above_pos) {
                if above.light_raw(LightBank::Day) == LIGHT_SUN {
                    light = LIGHT_SUN;
                }
            }
        }
    }
    light
}

/// Re-lights the map after node changes: darkens everything the old nodes
/// were holding up, then re-spreads from the recovered boundary plus
/// whatever the new nodes emit (including re-opened sun columns).
///
/// `changes` carries `(position, node before the change)`; the new nodes
/// are read from the map.
pub fn update_lighting_nodes(
    map: &mut Map,
    changes: &[(NodePos, MapNode)],
    modified_blocks: &mut Vec<BlockPos>,
) {
    let registry = Arc::clone(map.registry());

    for bank in LightBank::BOTH {
        let mut unlight_seeds: Vec<(NodePos, u8)> = Vec::new();
        let mut relight_seeds: Vec<(NodePos, u8)> = Vec::new();

        for (pos, old_node) in changes {
            let old_features = registry.get_features(old_node.content);
            let old_light = old_node.light(bank, old_features);

            let Some(new_node) = map.get_node(*pos) else {
                continue;
            };
            let new_light = own_light(map, &registry, *pos, new_node, bank);

            set_light_at(map, *pos, bank, new_light, modified_blocks);
            if old_light > 0 {
                unlight_seeds.push((*pos, old_light));
            }
            if new_light > 0 {
                relight_seeds.push((*pos, new_light));
            }
        }

        unspread_light(
            map,
            bank,
            unlight_seeds,
            &mut relight_seeds,
            modified_blocks,
        );
        spread_light(map, bank, relight_seeds, modified_blocks);
    }
}

/// Called when a freshly loaded block gains already-loaded neighbours:
/// spreads the border light of both sides so the seam settles without a
/// full relight.
pub fn update_block_border_lighting(
    map: &mut Map,
    block_pos: BlockPos,
    modified_blocks: &mut Vec<BlockPos>,
) {
    let min = block_pos.min_node().0;
    let max = block_pos.max_node().0;

    for bank in LightBank::BOTH {
        let mut seeds: Vec<(NodePos, u8)> = Vec::new();
        let consider = |map: &Map, pos: NodePos, seeds: &mut Vec<(NodePos, u8)>| {
            if let Some(node) = map.get_node(pos) {
                let light = node.light_raw(bank);
                if light > 1 {
                    seeds.push((pos, light));
                }
            }
        };

        // every node on the block's six faces plus the adjacent layer of
        // the neighbouring blocks
        for a in min.x..=max.x {
            for b in min.y..=max.y {
                for (inner, outer) in [
                    (min.z, min.z - 1),
                    (max.z, max.z + 1),
                ] {
                    consider(map, NodePos::new(a, b, inner), &mut seeds);
                    consider(map, NodePos::new(a, b, outer), &mut seeds);
                }
            }
        }
        for a in min.x..=max.x {
            for c in min.z..=max.z {
                for (inner, outer) in [
                    (min.y, min.y - 1),
                    (max.y, max.y + 1),
                ] {
                    consider(map, NodePos::new(a, inner, c), &mut seeds);
                    consider(map, NodePos::new(a, outer, c), &mut seeds);
                }
            }
        }
        for b in min.y..=max.y {
            for c in min.z..=max.z {
                for (inner, outer) in [
                    (min.x, min.x - 1),
                    (max.x, max.x + 1),
                ] {
                    consider(map, NodePos::new(inner, b, c), &mut seeds);
                    consider(map, NodePos::new(outer, b, c), &mut seeds);
                }
            }
        }

        spread_light(map, bank, seeds, modified_blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_block::MapBlock;
    use crate::settings::Settings;
    use voxen_core::{BlockNodes, ContentFeatures};

    fn registry_with_torch_and_stone() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures::simple("base:stone"))
            .unwrap();
        registry
            .register_node(ContentFeatures {
                light_source: 13,
                light_propagates: true,
                walkable: false,
                ..ContentFeatures::simple("base:torch")
            })
            .unwrap();
        registry.finalize().unwrap();
        Arc::new(registry)
    }

    fn air_world(registry: &Arc<NodeRegistry>) -> Map {
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
        map
    }

    #[test]
    fn torch_light_falls_off_by_one_per_step() {
        let registry = registry_with_torch_and_stone();
        let mut map = air_world(&registry);
        let torch = registry.get_id("base:torch").unwrap();

        let origin = NodePos::new(0, 0, 0);
        map.set_node(origin, MapNode::of(torch)).unwrap();

        let node_at = |map: &Map, pos| map.get_node(pos).unwrap();
        assert_eq!(
            node_at(&map, NodePos::new(1, 0, 0)).light_raw(LightBank::Night),
            12
        );
        assert_eq!(
            node_at(&map, NodePos::new(3, 0, 0)).light_raw(LightBank::Night),
            10
        );
        assert_eq!(
            node_at(&map, NodePos::new(2, 1, 0)).light_raw(LightBank::Night),
            10
        );
    }

    #[test]
    fn light_invariant_holds_after_edits() {
        let registry = registry_with_torch_and_stone();
        let mut map = air_world(&registry);
        let torch = registry.get_id("base:torch").unwrap();
        let stone = registry.get_id("base:stone").unwrap();

        map.set_node(NodePos::new(0, 0, 0), MapNode::of(torch)).unwrap();
        map.set_node(NodePos::new(2, 0, 0), MapNode::of(stone)).unwrap();
        map.set_node(NodePos::new(0, 0, 0), MapNode::AIR).unwrap();

        for x in -8..8_i16 {
            for y in -8..8_i16 {
                for z in -8..8_i16 {
                    let pos = NodePos::new(x, y, z);
                    let node = map.get_node(pos).unwrap();
                    if !registry.get_features(node.content).light_propagates {
                        continue;
                    }
                    for dir in FACE_DIRS {
                        let neighbor_pos = pos.checked_add(dir).unwrap();
                        let Some(neighbor) = map.get_node(neighbor_pos) else {
                            continue;
                        };
                        let features = registry.get_features(neighbor.content);
                        if !features.light_propagates {
                            continue;
                        }
                        let own = i16::from(node.light_raw(LightBank::Night));
                        let other = i16::from(neighbor.light_raw(LightBank::Night));
                        assert!(
                            (own - other).abs() <= 1,
                            "invariant broken at {pos}: {own} vs {other}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn removing_torch_clears_its_light() {
        let registry = registry_with_torch_and_stone();
        let mut map = air_world(&registry);
        let torch = registry.get_id("base:torch").unwrap();

        map.set_node(NodePos::new(0, 0, 0), MapNode::of(torch)).unwrap();
        map.set_node(NodePos::new(0, 0, 0), MapNode::AIR).unwrap();

        for x in -5..5_i16 {
            for z in -5..5_i16 {
                let node = map.get_node(NodePos::new(x, 0, z)).unwrap();
                assert_eq!(
                    node.light_raw(LightBank::Night),
                    0,
                    "stale light at ({x}, 0, {z})"
                );
            }
        }
    }

    #[test]
    fn sunlight_column_reopens_after_dig() {
        let registry = registry_with_torch_and_stone();
        let mut map = air_world(&registry);
        let stone = registry.get_id("base:stone").unwrap();

        // seed a sun column from the top of the loaded region
        let mut modified = Vec::new();
        for x in -2..=2_i16 {
            for z in -2..=2_i16 {
                propagate_sunlight(&mut map, NodePos::new(x, 15, z), -16, &mut modified);
            }
        }
        assert_eq!(
            map.get_node(NodePos::new(0, -5, 0))
                .unwrap()
                .light_raw(LightBank::Day),
            LIGHT_SUN
        );

        // cap the column, the sunlight below must go out
        map.set_node(NodePos::new(0, 10, 0), MapNode::of(stone)).unwrap();
        let below = map
            .get_node(NodePos::new(0, 5, 0))
            .unwrap()
            .light_raw(LightBank::Day);
        assert!(below < LIGHT_SUN, "column not darkened, still {below}");

        // dig it out again, sunlight returns
        map.set_node(NodePos::new(0, 10, 0), MapNode::AIR).unwrap();
        assert_eq!(
            map.get_node(NodePos::new(0, 5, 0))
                .unwrap()
                .light_raw(LightBank::Day),
            LIGHT_SUN
        );
    }

    #[test]
    fn decode_table_is_monotonic_with_full_sun() {
        let table = LightCurveParams::default().decode_table();
        assert!(table[0] < 16, "darkness must stay near black");
        assert_eq!(table[15], 255);
        for window in table.windows(2) {
            assert!(window[0] <= window[1], "decode table must not dip");
        }

        let mut settings = Settings::new();
        settings.set("lighting_boost", 0.0);
        settings.set("lighting_beta", 1.0);
        let linear = LightCurveParams::from_settings(&settings).decode_table();
        assert_eq!(linear[0], 0);
        assert_eq!(linear[15], 255);
        assert!((i16::from(linear[7]) - 119).abs() <= 2, "7/15 of 255, roughly");
    }

    #[test]
    fn cavity_in_solid_stone_stays_dark() {
        let registry = registry_with_torch_and_stone();
        let mut map = air_world(&registry);
        let stone = registry.get_id("base:stone").unwrap();

        for x in -3..=3_i16 {
            for y in -3..=3_i16 {
                for z in -3..=3_i16 {
                    map.set_node(NodePos::new(x, y, z), MapNode::of(stone)).unwrap();
                }
            }
        }
        // hollow out the centre; it is sealed, so no light may appear
        map.set_node(NodePos::new(0, 0, 0), MapNode::AIR).unwrap();
        let node = map.get_node(NodePos::new(0, 0, 0)).unwrap();
        assert_eq!(node.light_raw(LightBank::Day), 0);
        assert_eq!(node.light_raw(LightBank::Night), 0);
    }
}
