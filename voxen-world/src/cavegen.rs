//! The three cave carvers, layered in this order by the mapgen loop:
//! cavern noise (huge deep voids), noise-intersection tunnels (winding
//! worm tunnels wherever two 3D noises agree), and random-walk caves
//! (seeded tunnel systems that may stitch across chunk borders).

use glam::Vec3;
use voxen_core::{ContentId, MapNode, NodePos, NodeRegistry};

use crate::biome::BiomeGen;
use crate::noise::{InvalidNoiseParams, Noise, NoiseParams, PseudoRandom, noise_flags};
use crate::settings::Settings;
use crate::vmanip::{MMVManip, voxel_flags};

/// Deterministic per-chunk seed, derived the same way as the lattice noise
/// so identical chunks always carve identically.
#[must_use]
pub fn block_seed(world_seed: u64, node_min: NodePos) -> u32 {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "seed folding is defined as wrapping"
    )]
    let seed32 = world_seed as u32;
    let mut n = 1619_u32
        .wrapping_mul(node_min.0.x as u16 as u32)
        .wrapping_add(31337_u32.wrapping_mul(node_min.0.y as u16 as u32))
        .wrapping_add(52591_u32.wrapping_mul(node_min.0.z as u16 as u32))
        .wrapping_add(1013_u32.wrapping_mul(seed32));
    n = (n >> 13) ^ n;
    n.wrapping_mul(n.wrapping_mul(n).wrapping_mul(60493).wrapping_add(19_990_303))
        .wrapping_add(1_376_312_589)
}

/// Tuning of all three carvers, read from settings with the historical
/// defaults.
#[derive(Clone, Debug)]
pub struct CaveParams {
    /// Threshold of the noise-intersection product; wider tunnels for
    /// larger values.
    pub cave_width: f32,
    /// First tunnel noise.
    pub np_cave1: NoiseParams,
    /// Second tunnel noise.
    pub np_cave2: NoiseParams,
    /// Cavern field noise.
    pub np_cavern: NoiseParams,
    /// Caverns only below this y.
    pub cavern_limit: i16,
    /// Nodes over which the cavern field fades in below the limit.
    pub cavern_taper: i16,
    /// Cavern carve threshold.
    pub cavern_threshold: f32,
    /// Minimum number of small random-walk caves per chunk.
    pub small_cave_num_min: u16,
    /// Maximum number of small random-walk caves per chunk.
    pub small_cave_num_max: u16,
    /// Minimum number of large random-walk caves per chunk.
    pub large_cave_num_min: u16,
    /// Maximum number of large random-walk caves per chunk.
    pub large_cave_num_max: u16,
    /// Large caves only in chunks wholly below this y.
    pub large_cave_y_max: i16,
    /// Fraction of large caves that carry a liquid pool.
    pub large_cave_flooded: f32,
}

impl Default for CaveParams {
    fn default() -> Self {
        Self {
            cave_width: 0.09,
            np_cave1: NoiseParams {
                spread: Vec3::new(61.0, 61.0, 61.0),
                seed: 52534,
                octaves: 3,
                persist: 0.5,
                lacunarity: 2.0,
                flags: noise_flags::DEFAULTS,
                offset: 0.0,
                scale: 12.0,
            },
            np_cave2: NoiseParams {
                spread: Vec3::new(67.0, 67.0, 67.0),
                seed: 10325,
                octaves: 3,
                persist: 0.5,
                lacunarity: 2.0,
                flags: noise_flags::DEFAULTS,
                offset: 0.0,
                scale: 12.0,
            },
            np_cavern: NoiseParams {
                spread: Vec3::new(384.0, 128.0, 384.0),
                seed: 723,
                octaves: 5,
                persist: 0.63,
                lacunarity: 2.0,
                flags: noise_flags::DEFAULTS,
                offset: 0.0,
                scale: 1.0,
            },
            cavern_limit: -256,
            cavern_taper: 256,
            cavern_threshold: 0.7,
            small_cave_num_min: 0,
            small_cave_num_max: 2,
            large_cave_num_min: 0,
            large_cave_num_max: 2,
            large_cave_y_max: -33,
            large_cave_flooded: 0.5,
        }
    }
}

impl CaveParams {
    /// Reads overrides from settings; absent keys keep the defaults.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        Self {
            cave_width: settings.get_f32_or("cave_width", defaults.cave_width),
            cavern_limit: settings.get_i16_or("cavern_limit", defaults.cavern_limit),
            cavern_taper: settings.get_i16_or("cavern_taper", defaults.cavern_taper),
            cavern_threshold: settings
                .get_f32_or("cavern_threshold", defaults.cavern_threshold),
            small_cave_num_min: u16::try_from(
                settings.get_i32_or("small_cave_num_min", i32::from(defaults.small_cave_num_min)),
            )
            .unwrap_or(defaults.small_cave_num_min),
            small_cave_num_max: u16::try_from(
                settings.get_i32_or("small_cave_num_max", i32::from(defaults.small_cave_num_max)),
            )
            .unwrap_or(defaults.small_cave_num_max),
            large_cave_num_min: u16::try_from(
                settings.get_i32_or("large_cave_num_min", i32::from(defaults.large_cave_num_min)),
            )
            .unwrap_or(defaults.large_cave_num_min),
            large_cave_num_max: u16::try_from(
                settings.get_i32_or("large_cave_num_max", i32::from(defaults.large_cave_num_max)),
            )
            .unwrap_or(defaults.large_cave_num_max),
            large_cave_y_max: settings
                .get_i16_or("large_cave_y_max", defaults.large_cave_y_max),
            large_cave_flooded: settings
                .get_f32_or("large_cave_flooded", defaults.large_cave_flooded),
            ..defaults
        }
    }
}

fn contour(value: f32) -> f32 {
    (1.0 - value.abs()).max(0.0)
}

/// Worm tunnels: a cell is carved wherever the contour product of two
/// independent 3D noises exceeds `cave_width`.
pub struct CavesNoiseIntersection {
    noise_cave1: Noise,
    noise_cave2: Noise,
    cave_width: f32,
}

impl CavesNoiseIntersection {
    /// Builds the two noise stacks sized for one chunk.
    ///
    /// # Errors
    /// [`InvalidNoiseParams`] from either stack.
    pub fn new(
        params: &CaveParams,
        world_seed: u64,
        csize: usize,
    ) -> Result<Self, InvalidNoiseParams> {
        Ok(Self {
            noise_cave1: Noise::new_3d(params.np_cave1.clone(), world_seed, csize, csize, csize)?,
            noise_cave2: Noise::new_3d(params.np_cave2.clone(), world_seed, csize, csize, csize)?,
            cave_width: params.cave_width,
        })
    }

    /// Carves the chunk, repairing biome surfaces the tunnels cut through.
    pub fn generate(
        &mut self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        mut biomegen: Option<&mut BiomeGen>,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        self.noise_cave1.perlin_map_3d(
            f32::from(node_min.0.x),
            f32::from(node_min.0.y),
            f32::from(node_min.0.z),
        );
        self.noise_cave2.perlin_map_3d(
            f32::from(node_min.0.x),
            f32::from(node_min.0.y),
            f32::from(node_min.0.z),
        );

        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let column = ((z - node_min.0.z) as usize, (x - node_min.0.x) as usize);
                let mut carved_surface = false;
                for y in (node_min.0.y..=node_max.0.y).rev() {
                    let sample = self.noise_cave1.index_3d(
                        column.1,
                        (y - node_min.0.y) as usize,
                        column.0,
                    );
                    let v1 = self.noise_cave1.result.get(sample).copied().unwrap_or(0.0);
                    let v2 = self.noise_cave2.result.get(sample).copied().unwrap_or(0.0);
                    if contour(v1) * contour(v2) <= self.cave_width {
                        continue;
                    }

                    let pos = NodePos::new(x, y, z);
                    let node = vm.get_node(pos);
                    let features = registry.get_features(node.content);
                    if !features.is_ground_content || node.content == ContentId::AIR {
                        continue;
                    }

                    let biome = biomegen.as_deref_mut().and_then(|biomegen| {
                        let index = biomegen.column_index(
                            (x - node_min.0.x) as usize,
                            (z - node_min.0.z) as usize,
                        );
                        biomegen
                            .biomemap
                            .get(index)
                            .copied()
                            .flatten()
                            .and_then(|chosen| biomegen.manager().get(chosen))
                            .cloned()
                    });

                    let was_surface = biome.as_ref().is_some_and(|biome| {
                        node.content == biome.c_top || node.content == biome.c_filler
                    });

                    vm.set_node(pos, MapNode::AIR);
                    if let Some(above) = pos.checked_add(glam::I16Vec3::new(0, 1, 0)) {
                        if was_surface && !carved_surface {
                            // tunnel roof fix: a hanging top/filler layer
                            // above the cut becomes stone
                            if let Some(biome) = &biome {
                                let above_node = vm.get_node(above);
                                if above_node.content == biome.c_top
                                    || above_node.content == biome.c_filler
                                {
                                    if let Some(stone) = (biome.c_stone
                                        != ContentId::IGNORE)
                                        .then_some(biome.c_stone)
                                        .or(Some(node.content))
                                    {
                                        vm.set_node(above, MapNode::of(stone));
                                    }
                                }
                            }
                        }
                    }
                    carved_surface |= was_surface;

                    let flat = vm.area.index(pos.0);
                    if let Some(flags) = vm.flags.get_mut(flat) {
                        *flags |= voxel_flags::CAVE;
                    }

                    // floor fix: where the cut bottoms out on solid ground
                    // below a surface we chopped, relayer the biome stack
                    if carved_surface {
                        if let Some(biome) = &biome {
                            let below = NodePos::new(x, y - 1, z);
                            let below_node = vm.get_node(below);
                            if registry.get_features(below_node.content).is_ground_content
                                && below_node.content != ContentId::AIR
                                && biome.c_top != ContentId::IGNORE
                            {
                                vm.set_node(below, MapNode::of(biome.c_top));
                                let mut depth = 1_i16;
                                while depth <= i16::try_from(biome.depth_filler).unwrap_or(0) {
                                    let filler_pos = NodePos::new(x, y - 1 - depth, z);
                                    let filler_node = vm.get_node(filler_pos);
                                    if !registry
                                        .get_features(filler_node.content)
                                        .is_ground_content
                                        || filler_node.content == ContentId::AIR
                                        || biome.c_filler == ContentId::IGNORE
                                    {
                                        break;
                                    }
                                    vm.set_node(filler_pos, MapNode::of(biome.c_filler));
                                    depth += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Cavern voids: one 3D noise, faded in below `cavern_limit`.
pub struct CavernsNoise {
    noise_cavern: Noise,
    cavern_limit: i16,
    cavern_taper: i16,
    cavern_threshold: f32,
    csize: usize,
}

impl CavernsNoise {
    /// Builds the cavern stack sized for one chunk.
    ///
    /// # Errors
    /// [`InvalidNoiseParams`] when the stack collapses.
    pub fn new(
        params: &CaveParams,
        world_seed: u64,
        csize: usize,
    ) -> Result<Self, InvalidNoiseParams> {
        Ok(Self {
            noise_cavern: Noise::new_3d(params.np_cavern.clone(), world_seed, csize, csize, csize)?,
            cavern_limit: params.cavern_limit,
            cavern_taper: params.cavern_taper,
            cavern_threshold: params.cavern_threshold,
            csize,
        })
    }

    /// Carves caverns; returns one flag per chunk column marking columns
    /// close enough to a cavern that liquid placement should stay away.
    pub fn generate(
        &mut self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        node_min: NodePos,
        node_max: NodePos,
    ) -> Vec<bool> {
        let mut near_cavern = vec![false; self.csize * self.csize];
        if node_min.0.y > self.cavern_limit {
            return near_cavern;
        }
        self.noise_cavern.perlin_map_3d(
            f32::from(node_min.0.x),
            f32::from(node_min.0.y),
            f32::from(node_min.0.z),
        );

        for z in node_min.0.z..=node_max.0.z {
            for y in node_min.0.y..=node_max.0.y {
                for x in node_min.0.x..=node_max.0.x {
                    let taper = (f32::from(self.cavern_limit) - f32::from(y))
                        / f32::from(self.cavern_taper.max(1));
                    let taper = taper.clamp(0.0, 1.0);
                    if taper <= 0.0 {
                        continue;
                    }
                    let sample = self.noise_cavern.index_3d(
                        (x - node_min.0.x) as usize,
                        (y - node_min.0.y) as usize,
                        (z - node_min.0.z) as usize,
                    );
                    let strength = self
                        .noise_cavern
                        .result
                        .get(sample)
                        .copied()
                        .unwrap_or(0.0)
                        .abs()
                        * taper;

                    let column = (z - node_min.0.z) as usize * self.csize
                        + (x - node_min.0.x) as usize;
                    if strength > self.cavern_threshold - 0.1 {
                        if let Some(flag) = near_cavern.get_mut(column) {
                            *flag = true;
                        }
                    }
                    if strength <= self.cavern_threshold {
                        continue;
                    }

                    let pos = NodePos::new(x, y, z);
                    let node = vm.get_node(pos);
                    if registry.get_features(node.content).is_ground_content
                        && node.content != ContentId::AIR
                    {
                        vm.set_node(pos, MapNode::AIR);
                        let flat = vm.area.index(pos.0);
                        if let Some(flags) = vm.flags.get_mut(flat) {
                            *flags |= voxel_flags::CAVE;
                        }
                    }
                }
            }
        }
        near_cavern
    }
}

/// Random-walk tunnel systems, the carver responsible for long connected
/// caves. Each cave is an independent biased walk whose carving may reach
/// one block past the chunk edge so neighbouring chunks stitch up.
pub struct CavesRandomWalk {
    small_num_min: u16,
    small_num_max: u16,
    large_num_min: u16,
    large_num_max: u16,
    large_cave_y_max: i16,
    large_cave_flooded: f32,
    water_level: i16,
}

impl CavesRandomWalk {
    /// Captures the relevant knobs.
    #[must_use]
    pub fn new(params: &CaveParams, water_level: i16) -> Self {
        Self {
            small_num_min: params.small_cave_num_min,
            small_num_max: params.small_cave_num_max,
            large_num_min: params.large_cave_num_min,
            large_num_max: params.large_cave_num_max,
            large_cave_y_max: params.large_cave_y_max,
            large_cave_flooded: params.large_cave_flooded,
            water_level,
        }
    }

    /// Runs all cave walks for the chunk.
    #[expect(
        clippy::too_many_arguments,
        reason = "the carver call sites pass the full chunk context"
    )]
    pub fn generate(
        &self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        mut biomegen: Option<&mut BiomeGen>,
        world_seed: u64,
        node_min: NodePos,
        node_max: NodePos,
        near_cavern: &[bool],
    ) {
        let mut ps = PseudoRandom::new(block_seed(world_seed, node_min).wrapping_add(21343));

        let num_small = ps.range(
            i32::from(self.small_num_min),
            i32::from(self.small_num_max),
        );
        let num_large = if node_max.0.y <= self.large_cave_y_max {
            ps.range(
                i32::from(self.large_num_min),
                i32::from(self.large_num_max),
            )
        } else {
            0
        };

        for _ in 0..num_small {
            self.carve_one(
                vm,
                registry,
                biomegen.as_deref_mut(),
                &mut ps,
                node_min,
                node_max,
                near_cavern,
                false,
            );
        }
        for _ in 0..num_large {
            self.carve_one(
                vm,
                registry,
                biomegen.as_deref_mut(),
                &mut ps,
                node_min,
                node_max,
                near_cavern,
                true,
            );
        }
    }

    #[expect(
        clippy::too_many_arguments,
        clippy::too_many_lines,
        reason = "one walk is one unit of work; splitting it obscures the state flow"
    )]
    fn carve_one(
        &self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        biomegen: Option<&mut BiomeGen>,
        ps: &mut PseudoRandom,
        node_min: NodePos,
        node_max: NodePos,
        near_cavern: &[bool],
        large: bool,
    ) {
        let (min_diameter, max_diameter) = if large { (7, 13) } else { (2, 6) };
        let rs = ps.range(min_diameter, max_diameter);
        let flat = !large && ps.range(0, 1) == 1;
        let flooded = large
            && f32::from(u16::try_from(ps.range(0, 1000)).unwrap_or(0)) / 1000.0
                < self.large_cave_flooded;

        // allow starts one block-radius past the chunk so neighbouring
        // chunks' caves meet
        let offset = 8;
        let route_min = glam::IVec3::new(
            i32::from(node_min.0.x) - offset,
            i32::from(node_min.0.y) - offset,
            i32::from(node_min.0.z) - offset,
        );
        let route_max = glam::IVec3::new(
            i32::from(node_max.0.x) + offset,
            i32::from(node_max.0.y) + offset,
            i32::from(node_max.0.z) + offset,
        );

        let mut pos = Vec3::new(
            ps.range(route_min.x, route_max.x) as f32,
            ps.range(route_min.y, route_max.y) as f32,
            ps.range(route_min.z, route_max.z) as f32,
        );

        let routepoints = if large {
            ps.range(10, 20)
        } else {
            ps.range(5, 15)
        };
        let dswitchint = u32::try_from(ps.range(1, 14)).unwrap_or(7);

        let mut main_direction = Vec3::ZERO;
        let mut liquid_cells: Vec<NodePos> = Vec::new();
        let mut min_y_carved = i16::MAX;
        let mut max_y_carved = i16::MIN;

        for step in 0..routepoints {
            #[expect(
                clippy::cast_sign_loss,
                reason = "routepoint counter is non-negative"
            )]
            if (step as u32) % dswitchint == 0 {
                main_direction = Vec3::new(
                    ps.range(-100, 100) as f32 / 100.0,
                    ps.range(-30, 30) as f32 / 100.0,
                    ps.range(-100, 100) as f32 / 100.0,
                );
            }
            let mut direction = Vec3::new(
                ps.range(-100, 100) as f32 / 100.0,
                ps.range(-100, 100) as f32 / 100.0,
                ps.range(-100, 100) as f32 / 100.0,
            ) + main_direction * 2.0;
            if flat {
                // flat caves barely move vertically
                direction.y = direction.y.clamp(-1.0 / 3.0, 1.0 / 3.0);
            }
            let step_length = ps.range(1, 3 * rs) as f32;
            pos += direction.normalize_or_zero() * step_length;
            pos = pos.clamp(route_min.as_vec3(), route_max.as_vec3());

            // carve a rough sphere at the routepoint
            let radius = rs as f32 / 2.0;
            let jitter_x = ps.range(-1, 1) as f32;
            let jitter_z = ps.range(-1, 1) as f32;
            let center = pos + Vec3::new(jitter_x, 0.0, jitter_z);

            let carve_min = (center - Vec3::splat(radius)).floor();
            let carve_max = (center + Vec3::splat(radius)).ceil();
            for z in carve_min.z as i32..=carve_max.z as i32 {
                for y in carve_min.y as i32..=carve_max.y as i32 {
                    for x in carve_min.x as i32..=carve_max.x as i32 {
                        let cell = Vec3::new(x as f32, y as f32, z as f32);
                        let mut distance = (cell - center) / radius;
                        if flat {
                            distance.y *= 3.0;
                        }
                        if distance.length_squared() > 1.0 {
                            continue;
                        }
                        let Ok(cx) = i16::try_from(x) else { continue };
                        let Ok(cy) = i16::try_from(y) else { continue };
                        let Ok(cz) = i16::try_from(z) else { continue };
                        let cell_pos = NodePos::new(cx, cy, cz);
                        if !vm.area.contains(cell_pos.0) {
                            continue;
                        }
                        let node = vm.get_node(cell_pos);
                        if node.content == ContentId::AIR
                            || node.content == ContentId::IGNORE
                            || !registry.get_features(node.content).is_ground_content
                        {
                            continue;
                        }
                        vm.set_node(cell_pos, MapNode::AIR);
                        let flat_index = vm.area.index(cell_pos.0);
                        if let Some(flags) = vm.flags.get_mut(flat_index) {
                            *flags |= voxel_flags::CAVE;
                        }
                        min_y_carved = min_y_carved.min(cy);
                        max_y_carved = max_y_carved.max(cy);
                        if large && flooded {
                            liquid_cells.push(cell_pos);
                        }
                    }
                }
            }
        }

        // flooded large caves whose span brackets sea level get their lower
        // half filled, unless a cavern is nearby (it would drain anyway)
        if large && flooded && min_y_carved <= max_y_carved {
            let half = i16::try_from(
                (i32::from(min_y_carved) + i32::from(max_y_carved)) / 2,
            )
            .unwrap_or(min_y_carved);
            let liquid = self.cave_liquid(registry, biomegen, half);
            if liquid == ContentId::IGNORE {
                return;
            }
            let csize = usize::try_from(node_max.0.x - node_min.0.x + 1).unwrap_or(80);
            for cell in liquid_cells {
                if cell.0.y > half {
                    continue;
                }
                let in_chunk = cell.0.x >= node_min.0.x
                    && cell.0.x <= node_max.0.x
                    && cell.0.z >= node_min.0.z
                    && cell.0.z <= node_max.0.z;
                if in_chunk {
                    let column = (cell.0.z - node_min.0.z) as usize * csize
                        + (cell.0.x - node_min.0.x) as usize;
                    if near_cavern.get(column).copied().unwrap_or(false) {
                        continue;
                    }
                }
                vm.set_node(cell, MapNode::of(liquid));
            }
        }
    }

    /// The liquid used to flood a large cave: the biome's configured cave
    /// liquid, else water, else lava deep below sea level.
    fn cave_liquid(
        &self,
        registry: &NodeRegistry,
        biomegen: Option<&mut BiomeGen>,
        fill_y: i16,
    ) -> ContentId {
        if let Some(biomegen) = biomegen {
            let index = biomegen.column_index(0, 0);
            if let Some(biome) = biomegen
                .biomemap
                .get(index)
                .copied()
                .flatten()
                .and_then(|chosen| biomegen.manager().get(chosen))
            {
                if biome.c_cave_liquid != ContentId::IGNORE {
                    return biome.c_cave_liquid;
                }
            }
        }
        if fill_y < self.water_level - 256 {
            registry
                .get_id("mapgen_lava_source")
                .unwrap_or(ContentId::IGNORE)
        } else {
            registry
                .get_id("mapgen_water_source")
                .unwrap_or(ContentId::IGNORE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_seed_is_deterministic_and_position_sensitive() {
        let a = block_seed(42, NodePos::new(0, 0, 0));
        assert_eq!(a, block_seed(42, NodePos::new(0, 0, 0)));
        assert_ne!(a, block_seed(42, NodePos::new(80, 0, 0)));
        assert_ne!(a, block_seed(43, NodePos::new(0, 0, 0)));
    }

    #[test]
    fn contour_clamps_at_zero() {
        assert!((contour(0.0) - 1.0).abs() < f32::EPSILON);
        assert!((contour(0.5) - 0.5).abs() < f32::EPSILON);
        assert!(contour(2.0).abs() < f32::EPSILON);
        assert!(contour(-2.0).abs() < f32::EPSILON);
    }
}
