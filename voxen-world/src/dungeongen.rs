//! The dungeon generator: rooms connected by corridors, carved into solid
//! ground after the cave passes. A fraction of chunks within the
//! configured y-band roll a dungeon; materials come from the column's
//! biome when it defines them, else from the mapgen's stone.

use glam::I16Vec3;
use voxen_core::{ContentId, MapNode, NodePos, NodeRegistry};

use crate::biome::BiomeGen;
use crate::cavegen::block_seed;
use crate::noise::PcgRandom;
use crate::settings::Settings;
use crate::vmanip::MMVManip;

/// See the module docs.
pub struct DungeonGen {
    y_min: i16,
    y_max: i16,
    /// One chunk in `1/probability` rolls a dungeon.
    probability: u32,
}

struct Room {
    min: I16Vec3,
    max: I16Vec3,
}

impl Room {
    fn center(&self) -> I16Vec3 {
        (self.min + self.max) / 2
    }
}

impl DungeonGen {
    /// Reads the dungeon band and frequency from settings.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            y_min: settings.get_i16_or("dungeon_y_min", i16::MIN),
            y_max: settings.get_i16_or("dungeon_y_max", -10),
            probability: u32::try_from(settings.get_i32_or("dungeon_probability", 4).max(1))
                .unwrap_or(4),
        }
    }

    /// Maybe carves one dungeon into the chunk.
    #[expect(
        clippy::too_many_arguments,
        reason = "the carver call sites pass the full chunk context"
    )]
    pub fn generate(
        &self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        biomegen: Option<&mut BiomeGen>,
        c_stone: ContentId,
        world_seed: u64,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        // band check: the chunk must intersect [y_min, y_max]
        if node_max.0.y < self.y_min || node_min.0.y > self.y_max {
            return;
        }

        let mut rng = PcgRandom::new(
            u64::from(block_seed(world_seed, node_min)) ^ 0xd9b4_57f3_9e1c_0a55,
        );
        if rng.range_upto(self.probability) != 0 {
            return;
        }

        // materials: the biome of the chunk's first column wins
        let (c_wall, c_alt_wall, c_stair) = biomegen
            .and_then(|biomegen| {
                let index = biomegen.column_index(0, 0);
                biomegen
                    .biomemap
                    .get(index)
                    .copied()
                    .flatten()
                    .and_then(|chosen| biomegen.manager().get(chosen))
                    .map(|biome| (biome.c_dungeon, biome.c_dungeon_alt, biome.c_dungeon_stair))
            })
            .filter(|(wall, _, _)| *wall != ContentId::IGNORE)
            .unwrap_or((c_stone, ContentId::IGNORE, c_stone));

        let room_count = rng.range(2, 5);
        let mut rooms: Vec<Room> = Vec::new();
        for _ in 0..room_count {
            let size = I16Vec3::new(
                i16::try_from(rng.range(4, 10)).unwrap_or(6),
                i16::try_from(rng.range(4, 6)).unwrap_or(4),
                i16::try_from(rng.range(4, 10)).unwrap_or(6),
            );
            // keep one node of margin inside the chunk for the walls
            let min = I16Vec3::new(
                i16::try_from(rng.range(
                    i32::from(node_min.0.x) + 1,
                    i32::from(node_max.0.x) - i32::from(size.x) - 1,
                ))
                .unwrap_or(node_min.0.x + 1),
                i16::try_from(rng.range(
                    i32::from(node_min.0.y.max(self.y_min)) + 1,
                    i32::from(node_max.0.y.min(self.y_max)) - i32::from(size.y) - 1,
                ))
                .unwrap_or(node_min.0.y + 1),
                i16::try_from(rng.range(
                    i32::from(node_min.0.z) + 1,
                    i32::from(node_max.0.z) - i32::from(size.z) - 1,
                ))
                .unwrap_or(node_min.0.z + 1),
            );
            let room = Room {
                min,
                max: min + size,
            };
            self.carve_room(vm, registry, &room, c_wall, c_alt_wall, &mut rng);
            rooms.push(room);
        }

        // connect consecutive room centres with L-shaped corridors
        for pair in rooms.windows(2) {
            let from = pair[0].center();
            let to = pair[1].center();
            self.carve_corridor(vm, registry, from, to, c_wall, c_stair);
        }
    }

    fn carve_room(
        &self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        room: &Room,
        c_wall: ContentId,
        c_alt_wall: ContentId,
        rng: &mut PcgRandom,
    ) {
        for z in room.min.z..=room.max.z {
            for y in room.min.y..=room.max.y {
                for x in room.min.x..=room.max.x {
                    let pos = NodePos::new(x, y, z);
                    let node = vm.get_node(pos);
                    if node.content == ContentId::IGNORE
                        || !registry.get_features(node.content).is_ground_content
                    {
                        continue;
                    }
                    let on_shell = x == room.min.x
                        || x == room.max.x
                        || y == room.min.y
                        || y == room.max.y
                        || z == room.min.z
                        || z == room.max.z;
                    if on_shell {
                        // speckle the walls with the alternate material
                        let material = if c_alt_wall != ContentId::IGNORE
                            && rng.range_upto(8) == 0
                        {
                            c_alt_wall
                        } else {
                            c_wall
                        };
                        vm.set_node(pos, MapNode::of(material));
                    } else {
                        vm.set_node(pos, MapNode::AIR);
                    }
                }
            }
        }
    }

    fn carve_corridor(
        &self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        from: I16Vec3,
        to: I16Vec3,
        c_wall: ContentId,
        c_stair: ContentId,
    ) {
        let mut cursor = from;
        let carve_cell = |vm: &mut MMVManip, pos: I16Vec3, rising: bool| {
            // a 1-wide, 2-high gallery with a floor
            for dy in 0..2_i16 {
                let cell = NodePos(pos + I16Vec3::new(0, dy, 0));
                let node = vm.get_node(cell);
                if node.content != ContentId::IGNORE
                    && registry.get_features(node.content).is_ground_content
                {
                    vm.set_node(cell, MapNode::AIR);
                }
            }
            let floor_pos = NodePos(pos + I16Vec3::new(0, -1, 0));
            let floor = vm.get_node(floor_pos);
            if floor.content != ContentId::IGNORE
                && registry.get_features(floor.content).is_ground_content
            {
                let material = if rising { c_stair } else { c_wall };
                vm.set_node(floor_pos, MapNode::of(material));
            }
        };

        while cursor.x != to.x {
            cursor.x += (to.x - cursor.x).signum();
            carve_cell(vm, cursor, false);
        }
        while cursor.z != to.z {
            cursor.z += (to.z - cursor.z).signum();
            carve_cell(vm, cursor, false);
        }
        while cursor.y != to.y {
            cursor.y += (to.y - cursor.y).signum();
            carve_cell(vm, cursor, true);
        }
    }
}
