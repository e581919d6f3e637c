//! The pluggable chunk generators.
//!
//! All variants share one skeleton: emerge a halo'd VManip, lay down the
//! variant's base terrain, then run the common passes (biome surfaces,
//! caves, dungeons, ores, decorations, liquid collection, lighting, dust)
//! and hand the buffer back to the emerge worker for the blit. The
//! variants differ only in the base-terrain step and their spawn-level
//! logic.
//!
//! Generation is deterministic: everything derives from
//! `(world_seed, chunk position, variant, params)` through the seeded
//! noise and PRNG stacks, never from map state outside the chunk.

pub(crate) mod carpathian;
pub(crate) mod decoration;
pub(crate) mod flat;
pub(crate) mod fractal;
pub(crate) mod ore;
pub(crate) mod singlenode;
pub(crate) mod v5;
pub(crate) mod v6;
pub(crate) mod v7;
pub(crate) mod valleys;

pub use decoration::{DecoManager, Decoration};
pub use ore::{Ore, OreManager, OreType};

use std::fmt::{self, Display};
use std::sync::Arc;

use glam::I16Vec3;
use log::trace;
use voxen_core::{
    BlockPos, ContentId, LIGHT_SUN, LightBank, MapNode, NodePos, NodeRegistry, RegistryError,
    MAX_MAP_GENERATION_LIMIT,
};

use crate::biome::{BiomeGen, BiomeManager, BiomeParams};
use crate::cavegen::{CaveParams, CavernsNoise, CavesNoiseIntersection, CavesRandomWalk};
use crate::dungeongen::DungeonGen;
use crate::noise::InvalidNoiseParams;
use crate::settings::Settings;
use crate::vmanip::{MMVManip, voxel_flags};

/// The shared mapgen flag bits, settings key `mg_flags`.
pub mod mg_flags {
    /// Run the cave carvers.
    pub const CAVES: u32 = 1 << 0;
    /// Run the dungeon generator.
    pub const DUNGEONS: u32 = 1 << 1;
    /// Compute lighting during generation.
    pub const LIGHT: u32 = 1 << 2;
    /// Place registered decorations.
    pub const DECORATIONS: u32 = 1 << 3;
    /// Apply biome surface replacement.
    pub const BIOMES: u32 = 1 << 4;
    /// Place registered ores.
    pub const ORES: u32 = 1 << 5;

    /// Everything on, the default.
    pub const ALL: u32 = CAVES | DUNGEONS | LIGHT | DECORATIONS | BIOMES | ORES;
}

/// Parses a comma-separated flag string (`caves,nodungeons,light`), where a
/// `no` prefix clears the bit, on top of `base`.
#[must_use]
pub fn parse_flag_string(text: &str, base: u32, names: &[(&str, u32)]) -> u32 {
    let mut flags = base;
    for token in text.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (cleared, name) = match token.strip_prefix("no") {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        for (flag_name, bit) in names {
            if *flag_name == name {
                if cleared {
                    flags &= !bit;
                } else {
                    flags |= bit;
                }
            }
        }
    }
    flags
}

const MG_FLAG_NAMES: &[(&str, u32)] = &[
    ("caves", mg_flags::CAVES),
    ("dungeons", mg_flags::DUNGEONS),
    ("light", mg_flags::LIGHT),
    ("decorations", mg_flags::DECORATIONS),
    ("biomes", mg_flags::BIOMES),
    ("ores", mg_flags::ORES),
];

/// The registered generator variants, named exactly as they appear in
/// `map_meta.txt` of existing worlds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapgenName {
    /// 3D-noise terrain with overhangs.
    V5,
    /// The legacy heat/humidity generator without the biome subsystem.
    V6,
    /// The default: blended 2D height stacks, rivers, mountains,
    /// floatlands.
    V7,
    /// A constant ground level with optional lakes and hills.
    Flat,
    /// 4D quaternion Julia/Mandelbrot terrain.
    Fractal,
    /// Blended multi-noise hills with ridges and optional rivers.
    Carpathian,
    /// Wide river valleys.
    Valleys,
    /// Fills everything with one registered node.
    Singlenode,
}

impl MapgenName {
    /// All variants in registration order.
    pub const ALL: [Self; 8] = [
        Self::V5,
        Self::V6,
        Self::V7,
        Self::Flat,
        Self::Fractal,
        Self::Carpathian,
        Self::Valleys,
        Self::Singlenode,
    ];

    /// The on-disk name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V5 => "v5",
            Self::V6 => "v6",
            Self::V7 => "v7",
            Self::Flat => "flat",
            Self::Fractal => "fractal",
            Self::Carpathian => "carpathian",
            Self::Valleys => "valleys",
            Self::Singlenode => "singlenode",
        }
    }

    /// Parses an on-disk name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|variant| variant.as_str() == name)
    }
}

impl Display for MapgenName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Construction failures of a mapgen.
#[derive(thiserror::Error, Debug)]
pub enum MapgenError {
    /// `mg_name` did not match any registered variant.
    #[error("unknown mapgen `{0}`")]
    UnknownName(String),
    /// A required node alias (e.g. `mapgen_stone`) is unresolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A noise stack cannot be built with the configured parameters.
    #[error(transparent)]
    Noise(#[from] InvalidNoiseParams),
}

/// The variant-independent generation parameters.
#[derive(Clone, Debug)]
pub struct MapgenParams {
    /// The chosen variant.
    pub name: MapgenName,
    /// The world seed everything derives from.
    pub world_seed: u64,
    /// Sea level in nodes.
    pub water_level: i16,
    /// Generation bound, ± nodes per axis.
    pub mapgen_limit: i16,
    /// Chunk edge length in blocks.
    pub chunksize: u8,
    /// See [`mg_flags`].
    pub flags: u32,
}

impl Default for MapgenParams {
    fn default() -> Self {
        Self {
            name: MapgenName::V7,
            world_seed: 0,
            water_level: 1,
            mapgen_limit: MAX_MAP_GENERATION_LIMIT,
            chunksize: 5,
            flags: mg_flags::ALL,
        }
    }
}

impl MapgenParams {
    /// Reads the shared parameters from settings; unknown keys default.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let seed = settings
            .get("fixed_map_seed")
            .or_else(|| settings.get("seed"))
            .and_then(crate::noise::seed_from_text)
            .unwrap_or(defaults.world_seed);
        let name = settings
            .get("mg_name")
            .and_then(MapgenName::from_name)
            .unwrap_or(defaults.name);
        let flags = settings
            .get("mg_flags")
            .map_or(defaults.flags, |text| {
                parse_flag_string(text, defaults.flags, MG_FLAG_NAMES)
            });
        Self {
            name,
            world_seed: seed,
            water_level: settings.get_i16_or("water_level", defaults.water_level),
            mapgen_limit: settings
                .get_i16_or("mapgen_limit", defaults.mapgen_limit)
                .clamp(0, MAX_MAP_GENERATION_LIMIT),
            chunksize: u8::try_from(settings.get_i32_or("chunksize", 5).clamp(1, 10))
                .unwrap_or(defaults.chunksize),
            flags,
        }
    }

    /// Writes the shared parameters into settings (`map_meta.txt`).
    pub fn write_settings(&self, settings: &mut Settings) {
        settings.set("seed", self.world_seed);
        settings.set("mg_name", self.name);
        settings.set("water_level", self.water_level);
        settings.set("mapgen_limit", self.mapgen_limit);
        settings.set("chunksize", self.chunksize);
        let mut flag_text = String::new();
        for (name, bit) in MG_FLAG_NAMES {
            if !flag_text.is_empty() {
                flag_text.push(',');
            }
            if self.flags & bit == 0 {
                flag_text.push_str("no");
            }
            flag_text.push_str(name);
        }
        settings.set("mg_flags", flag_text);
    }

    /// Chunk edge length in nodes.
    #[must_use]
    pub fn chunk_nodes(&self) -> i16 {
        #[expect(
            clippy::cast_possible_wrap,
            reason = "a block edge is a small constant"
        )]
        {
            i16::from(self.chunksize) * (BlockPos::SIZE as i16)
        }
    }
}

/// The chunk span (in blocks) containing `block`. Chunks are centered so
/// that chunk `(0, 0, 0)` straddles the origin.
#[must_use]
pub fn chunk_bounds_for_block(block: BlockPos, chunksize: u8) -> (BlockPos, BlockPos) {
    let size = i16::from(chunksize);
    let shift = size / 2;
    let floor_div = |value: i16| -> i16 { (value + shift).div_euclid(size) };
    let vec = block.vec();
    let chunk = I16Vec3::new(floor_div(vec.x), floor_div(vec.y), floor_div(vec.z));
    let min = chunk * size - I16Vec3::splat(shift);
    let max = min + I16Vec3::splat(size - 1);
    (
        BlockPos::new(min).unwrap_or(BlockPos::ZERO),
        BlockPos::new(max).unwrap_or(BlockPos::ZERO),
    )
}

/// Everything a `make_chunk` call works on.
pub struct BlockMakeData {
    /// The halo'd scratch buffer, pre-emerged by the caller.
    pub vmanip: MMVManip,
    /// First block of the chunk proper.
    pub blockpos_min: BlockPos,
    /// Last block of the chunk proper.
    pub blockpos_max: BlockPos,
    /// Liquid positions the caller must enqueue after the blit.
    pub liquid_positions: Vec<NodePos>,
}

impl BlockMakeData {
    /// Minimum node of the chunk proper.
    #[must_use]
    pub fn node_min(&self) -> NodePos {
        self.blockpos_min.min_node()
    }

    /// Maximum node of the chunk proper.
    #[must_use]
    pub fn node_max(&self) -> NodePos {
        self.blockpos_max.max_node()
    }

    /// Minimum node including the one-block halo.
    #[must_use]
    pub fn full_node_min(&self) -> NodePos {
        NodePos(self.vmanip.area.min)
    }

    /// Maximum node including the one-block halo.
    #[must_use]
    pub fn full_node_max(&self) -> NodePos {
        NodePos(self.vmanip.area.max)
    }
}

/// One pluggable generator.
pub trait Mapgen: Send {
    /// The variant's registered name.
    fn name(&self) -> MapgenName;

    /// The shared parameters the generator was built with.
    fn params(&self) -> &MapgenParams;

    /// Generates the chunk into `data.vmanip`; see the module docs for the
    /// pass order.
    fn make_chunk(&mut self, data: &mut BlockMakeData);

    /// A y within ±16 of water level that is suitable to spawn at, or
    /// [`MAX_MAP_GENERATION_LIMIT`] as a sentinel so the caller retries
    /// another column.
    fn spawn_level_at_point(&mut self, x: i16, z: i16) -> i16;
}

/// The state and passes shared by every variant; each variant embeds one.
pub struct MapgenCommon {
    /// The finalized node registry.
    pub registry: Arc<NodeRegistry>,
    /// Shared parameters.
    pub params: MapgenParams,
    /// Resolved `mapgen_stone`.
    pub c_stone: ContentId,
    /// Resolved `mapgen_water_source`.
    pub c_water: ContentId,
    /// Resolved `mapgen_river_water_source` (falls back to water).
    pub c_river_water: ContentId,
    /// Resolved `mapgen_lava_source`, IGNORE when not registered.
    pub c_lava: ContentId,
    /// Per-chunk biome machinery, present when biomes are enabled and the
    /// manager is non-empty.
    pub biomegen: Option<BiomeGen>,
    /// Surface height per chunk column, `[z][x]`, filled by the terrain
    /// pass.
    pub heightmap: Vec<i16>,
    caves_noise: Option<CavesNoiseIntersection>,
    caves_walk: CavesRandomWalk,
    caverns: Option<CavernsNoise>,
    dungeons: DungeonGen,
    ores: Arc<OreManager>,
    decorations: Arc<DecoManager>,
}

/// Bundles the registries a mapgen consumes, so variant constructors don't
/// take six arguments each.
pub struct MapgenEnv {
    /// The finalized node registry.
    pub registry: Arc<NodeRegistry>,
    /// Registered biomes.
    pub biomes: Arc<BiomeManager>,
    /// Registered ores.
    pub ores: Arc<OreManager>,
    /// Registered decorations.
    pub decorations: Arc<DecoManager>,
}

impl MapgenCommon {
    /// Resolves the mapgen aliases and builds the shared noise stacks.
    ///
    /// # Errors
    /// [`MapgenError::Registry`] when `mapgen_stone` or
    /// `mapgen_water_source` is unresolved, [`MapgenError::Noise`] when a
    /// cave/cavern stack collapses.
    pub fn new(
        env: &MapgenEnv,
        params: MapgenParams,
        settings: &Settings,
    ) -> Result<Self, MapgenError> {
        let registry = Arc::clone(&env.registry);
        let c_stone = registry.id("mapgen_stone")?;
        let c_water = registry.id("mapgen_water_source")?;
        let c_river_water = registry
            .get_id("mapgen_river_water_source")
            .unwrap_or(c_water);
        let c_lava = registry
            .get_id("mapgen_lava_source")
            .unwrap_or(ContentId::IGNORE);

        let csize = params.chunk_nodes();
        let columns = csize as usize * csize as usize;

        let biomegen = if params.flags & mg_flags::BIOMES != 0 && !env.biomes.is_empty() {
            Some(BiomeGen::new(
                Arc::clone(&env.biomes),
                &BiomeParams::default(),
                params.world_seed,
                csize as usize,
                csize as usize,
            )?)
        } else {
            None
        };

        let cave_params = CaveParams::from_settings(settings);
        let caves_enabled = params.flags & mg_flags::CAVES != 0;
        Ok(Self {
            c_stone,
            c_water,
            c_river_water,
            c_lava,
            biomegen,
            heightmap: vec![params.water_level; columns],
            caves_noise: if caves_enabled {
                Some(CavesNoiseIntersection::new(
                    &cave_params,
                    params.world_seed,
                    csize as usize,
                )?)
            } else {
                None
            },
            caves_walk: CavesRandomWalk::new(&cave_params, params.water_level),
            caverns: if caves_enabled {
                Some(CavernsNoise::new(&cave_params, params.world_seed, csize as usize)?)
            } else {
                None
            },
            dungeons: DungeonGen::new(settings),
            ores: Arc::clone(&env.ores),
            decorations: Arc::clone(&env.decorations),
            registry,
            params,
        })
    }

    /// Column index into [`Self::heightmap`] and the biome maps.
    #[must_use]
    pub fn column_index(&self, node_min: NodePos, x: i16, z: i16) -> usize {
        let csize = self.params.chunk_nodes() as usize;
        (z - node_min.0.z) as usize * csize + (x - node_min.0.x) as usize
    }

    /// Topmost walkable node of a column within `[y_min, y_max]`, or
    /// `y_min - 1` when the column is entirely non-walkable.
    #[must_use]
    pub fn find_ground_level(
        &self,
        vm: &MMVManip,
        x: i16,
        z: i16,
        y_min: i16,
        y_max: i16,
    ) -> i16 {
        for y in (y_min..=y_max).rev() {
            let node = vm.get_node(NodePos::new(x, y, z));
            if node.content != ContentId::IGNORE
                && self.registry.get_features(node.content).walkable
            {
                return y;
            }
        }
        y_min - 1
    }

    /// Recomputes the heightmap from the buffer contents.
    pub fn update_heightmap(&mut self, vm: &MMVManip, node_min: NodePos, node_max: NodePos) {
        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let ground = self.find_ground_level(vm, x, z, node_min.0.y, node_max.0.y);
                let index = self.column_index(node_min, x, z);
                if let Some(slot) = self.heightmap.get_mut(index) {
                    *slot = ground;
                }
            }
        }
    }

    /// Runs every post-terrain pass in order. Called by each variant at
    /// the end of its `make_chunk`.
    pub fn finish_chunk(&mut self, data: &mut BlockMakeData) {
        let node_min = data.node_min();
        let node_max = data.node_max();

        self.update_heightmap(&data.vmanip, node_min, node_max);

        if self.biomegen.is_some() {
            self.generate_biomes(&mut data.vmanip, node_min, node_max);
        }

        if self.params.flags & mg_flags::CAVES != 0 {
            let near_cavern = self
                .caverns
                .as_mut()
                .map(|caverns| {
                    caverns.generate(
                        &mut data.vmanip,
                        &self.registry,
                        node_min,
                        node_max,
                    )
                })
                .unwrap_or_default();
            if let Some(caves) = self.caves_noise.as_mut() {
                caves.generate(
                    &mut data.vmanip,
                    &self.registry,
                    self.biomegen.as_mut(),
                    node_min,
                    node_max,
                );
            }
            self.caves_walk.generate(
                &mut data.vmanip,
                &self.registry,
                self.biomegen.as_mut(),
                self.params.world_seed,
                node_min,
                node_max,
                &near_cavern,
            );
        }

        if self.params.flags & mg_flags::DUNGEONS != 0 {
            self.dungeons.generate(
                &mut data.vmanip,
                &self.registry,
                self.biomegen.as_mut(),
                self.c_stone,
                self.params.world_seed,
                node_min,
                node_max,
            );
        }

        if self.params.flags & mg_flags::ORES != 0 {
            self.ores.place_all(
                &mut data.vmanip,
                &self.registry,
                self.params.world_seed,
                node_min,
                node_max,
            );
        }

        if self.params.flags & mg_flags::DECORATIONS != 0 {
            self.decorations.place_all(
                &mut data.vmanip,
                &self.registry,
                self.params.world_seed,
                node_min,
                node_max,
            );
        }

        self.collect_liquids(data);

        if self.params.flags & mg_flags::LIGHT != 0 {
            self.calculate_lighting(&mut data.vmanip, node_min, node_max);
        }

        if self.biomegen.is_some() {
            self.dust_top_nodes(&mut data.vmanip, node_min, node_max);
        }

        trace!(
            "mapgen {} finished chunk {min}..{max}",
            self.params.name,
            min = data.blockpos_min,
            max = data.blockpos_max
        );
    }

    // --- biome surfaces ---------------------------------------------------

    fn generate_biomes(&mut self, vm: &mut MMVManip, node_min: NodePos, node_max: NodePos) {
        let Some(biomegen) = self.biomegen.as_mut() else {
            return;
        };
        biomegen.calc_noise(node_min.0.x, node_min.0.z);
        let csize = self.params.chunk_nodes() as usize;

        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let index =
                    (z - node_min.0.z) as usize * csize + (x - node_min.0.x) as usize;
                let surface_y = self
                    .heightmap
                    .get(index)
                    .copied()
                    .unwrap_or(self.params.water_level);

                let Some((c_top, c_filler, c_biome_stone, c_biome_water, c_water_top, depths)) =
                    biomegen.biome_at_index(index, surface_y).map(|biome| {
                        (
                            biome.c_top,
                            biome.c_filler,
                            biome.c_stone,
                            biome.c_water,
                            biome.c_water_top,
                            (biome.depth_top, biome.depth_water_top, biome.depth_filler),
                        )
                    })
                else {
                    continue;
                };
                let c_water = if c_biome_water == ContentId::IGNORE {
                    self.c_water
                } else {
                    c_biome_water
                };
                let depth_top = i16::try_from(depths.0).unwrap_or(1);
                let depth_water_top = i16::try_from(depths.1).unwrap_or(0);
                let filler_depth = biomegen.filler_depth_at_index(index, depths.2);

                // walk the column top-down, relayering stone into the
                // biome's surface stack and water into its water nodes
                let mut depth_from_surface: i16 = -1;
                for y in (node_min.0.y..=node_max.0.y).rev() {
                    let pos = NodePos::new(x, y, z);
                    let node = vm.get_node(pos);
                    if node.content == self.c_stone {
                        depth_from_surface += 1;
                        let replacement = if depth_from_surface < depth_top {
                            if y >= self.params.water_level - 1 && c_top != ContentId::IGNORE
                            {
                                c_top
                            } else if c_filler != ContentId::IGNORE {
                                c_filler
                            } else {
                                self.c_stone
                            }
                        } else if depth_from_surface < depth_top + filler_depth {
                            if c_filler != ContentId::IGNORE {
                                c_filler
                            } else {
                                self.c_stone
                            }
                        } else if c_biome_stone != ContentId::IGNORE {
                            c_biome_stone
                        } else {
                            self.c_stone
                        };
                        if replacement != node.content {
                            vm.set_node(pos, MapNode::of(replacement));
                        }
                    } else if node.content == self.c_water {
                        depth_from_surface = -1;
                        let surface_distance = self.params.water_level - y;
                        let replacement = if surface_distance <= depth_water_top
                            && c_water_top != ContentId::IGNORE
                        {
                            c_water_top
                        } else {
                            c_water
                        };
                        if replacement != node.content {
                            vm.set_node(pos, MapNode::of(replacement));
                        }
                    } else if node.content == ContentId::AIR {
                        depth_from_surface = -1;
                    }
                }
            }
        }
    }

    // --- liquids ----------------------------------------------------------

    /// Records every liquid node adjacent to something floodable, plus the
    /// liquid nodes on the chunk surface, so the emerge worker can feed the
    /// map-level queue.
    fn collect_liquids(&self, data: &mut BlockMakeData) {
        let node_min = data.node_min();
        let node_max = data.node_max();
        let vm = &data.vmanip;
        for z in node_min.0.z..=node_max.0.z {
            for y in node_min.0.y..=node_max.0.y {
                for x in node_min.0.x..=node_max.0.x {
                    let pos = NodePos::new(x, y, z);
                    let node = vm.get_node(pos);
                    let features = self.registry.get_features(node.content);
                    if !features.is_liquid() {
                        continue;
                    }
                    let on_chunk_surface = x == node_min.0.x
                        || x == node_max.0.x
                        || y == node_min.0.y
                        || y == node_max.0.y
                        || z == node_min.0.z
                        || z == node_max.0.z;
                    let mut wants_update = on_chunk_surface;
                    if !wants_update {
                        for dir in voxen_core::FACE_DIRS {
                            let Some(neighbor_pos) = pos.checked_add(dir) else {
                                continue;
                            };
                            let neighbor = vm.get_node(neighbor_pos);
                            if self.registry.get_features(neighbor.content).floodable {
                                wants_update = true;
                                break;
                            }
                        }
                    }
                    if wants_update {
                        data.liquid_positions.push(pos);
                    }
                }
            }
        }
    }

    // --- lighting ---------------------------------------------------------

    /// Chunk lighting: clears both banks, drops sunlight where the sky is
    /// known (or assumed) open, then spreads to a fixed point within the
    /// buffer.
    pub fn calculate_lighting(
        &self,
        vm: &mut MMVManip,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        let full_min = vm.area.min;
        let full_max = vm.area.max;

        // zero everything we own
        for index in 0..vm.data.len() {
            #[expect(
                clippy::indexing_slicing,
                reason = "iterating the buffer's own length"
            )]
            if vm.flags[index] & voxel_flags::NO_DATA == 0 {
                vm.data[index].param1 = 0;
            }
        }

        let mut queue: std::collections::VecDeque<(NodePos, u8, LightBank)> =
            std::collections::VecDeque::new();

        // sunlight: per column, find where sun enters. Above the chunk the
        // halo may contain a generated neighbour; if it holds sunlight, the
        // column continues it. With no data above, assume sun only when the
        // chunk ceiling is above sea level, staying conservative underground.
        for z in full_min.z..=full_max.z {
            for x in full_min.x..=full_max.x {
                let top = NodePos::new(x, full_max.y, z);
                let top_node = vm.get_node(top);
                let sun_from_above = if top_node.content == ContentId::IGNORE {
                    node_max.0.y >= self.params.water_level
                } else {
                    // the halo row came from a neighbour block; trust its light
                    top_node.light_raw(LightBank::Day) == LIGHT_SUN
                        || (node_max.0.y >= self.params.water_level
                            && self
                                .registry
                                .get_features(top_node.content)
                                .sunlight_propagates)
                };
                if !sun_from_above {
                    continue;
                }
                let mut y = full_max.y;
                while y >= full_min.y {
                    let pos = NodePos::new(x, y, z);
                    let node = vm.get_node(pos);
                    if node.content == ContentId::IGNORE {
                        // unknown halo space; covered by the assumption above
                        y -= 1;
                        continue;
                    }
                    if !self
                        .registry
                        .get_features(node.content)
                        .sunlight_propagates
                    {
                        break;
                    }
                    let mut lit = node;
                    lit.set_light(LightBank::Day, LIGHT_SUN);
                    vm.set_node(pos, lit);
                    queue.push_back((pos, LIGHT_SUN, LightBank::Day));
                    y -= 1;
                }
            }
        }

        // seed emitters in both banks
        for z in full_min.z..=full_max.z {
            for y in full_min.y..=full_max.y {
                for x in full_min.x..=full_max.x {
                    let pos = NodePos::new(x, y, z);
                    let node = vm.get_node(pos);
                    if node.content == ContentId::IGNORE {
                        continue;
                    }
                    let emission = self.registry.get_features(node.content).light_source;
                    if emission > 0 {
                        let mut lit = node;
                        lit.set_light(LightBank::Day, emission.max(lit.light_raw(LightBank::Day)));
                        lit.set_light(LightBank::Night, emission);
                        vm.set_node(pos, lit);
                        queue.push_back((pos, emission, LightBank::Day));
                        queue.push_back((pos, emission, LightBank::Night));
                    }
                }
            }
        }

        // 6-way spread to fixed point inside the buffer
        while let Some((pos, light, bank)) = queue.pop_front() {
            if light <= 1 {
                continue;
            }
            for dir in voxen_core::FACE_DIRS {
                let Some(neighbor_pos) = pos.checked_add(dir) else {
                    continue;
                };
                if !vm.area.contains(neighbor_pos.0) {
                    continue;
                }
                let neighbor = vm.get_node(neighbor_pos);
                if neighbor.content == ContentId::IGNORE {
                    continue;
                }
                let features = self.registry.get_features(neighbor.content);
                if !features.light_propagates {
                    continue;
                }
                let propagated = if bank == LightBank::Day
                    && light == LIGHT_SUN
                    && dir.y < 0
                    && features.sunlight_propagates
                {
                    LIGHT_SUN
                } else {
                    light - 1
                };
                if neighbor.light_raw(bank) < propagated {
                    let mut lit = neighbor;
                    lit.set_light(bank, propagated);
                    vm.set_node(neighbor_pos, lit);
                    queue.push_back((neighbor_pos, propagated, bank));
                }
            }
        }
    }

    // --- dust -------------------------------------------------------------

    fn dust_top_nodes(&mut self, vm: &mut MMVManip, node_min: NodePos, node_max: NodePos) {
        let Some(biomegen) = self.biomegen.as_ref() else {
            return;
        };
        let csize = self.params.chunk_nodes() as usize;

        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let index =
                    (z - node_min.0.z) as usize * csize + (x - node_min.0.x) as usize;
                let Some(biome) = biomegen
                    .biomemap
                    .get(index)
                    .copied()
                    .flatten()
                    .and_then(|biome_index| biomegen.manager().get(biome_index))
                else {
                    continue;
                };
                if biome.c_dust == ContentId::IGNORE {
                    continue;
                }

                // only dust columns open to the sky above the chunk
                let above = vm.get_node(NodePos::new(x, node_max.0.y + 1, z));
                if above.content != ContentId::AIR && above.content != ContentId::IGNORE {
                    continue;
                }

                let mut y = node_max.0.y;
                let mut target = None;
                while y >= node_min.0.y - 1 {
                    let node = vm.get_node(NodePos::new(x, y, z));
                    if node.content != ContentId::AIR {
                        if node.content != biome.c_dust
                            && self.registry.get_features(node.content).walkable
                        {
                            target = Some((y, node));
                        }
                        break;
                    }
                    y -= 1;
                }
                let Some((surface_y, surface_node)) = target else {
                    continue;
                };
                if !self
                    .registry
                    .get_features(surface_node.content)
                    .drawtype
                    .is_cubic()
                {
                    continue;
                }
                let dust_pos = NodePos::new(x, surface_y + 1, z);
                if vm.get_node(dust_pos).content == ContentId::AIR {
                    vm.set_node(dust_pos, MapNode::of(biome.c_dust));
                }
            }
        }
    }

    // --- spawn helper -----------------------------------------------------

    /// Shared spawn-point acceptance test: `ground_y` must be close to sea
    /// level and leave two nodes of air above.
    #[must_use]
    pub fn acceptable_spawn(&self, ground_y: i16) -> bool {
        (ground_y - self.params.water_level).abs() <= 16
    }
}

/// Instantiates the configured variant.
///
/// # Errors
/// See [`MapgenError`].
pub fn create_mapgen(
    env: &MapgenEnv,
    params: MapgenParams,
    settings: &Settings,
) -> Result<Box<dyn Mapgen>, MapgenError> {
    Ok(match params.name {
        MapgenName::V5 => Box::new(v5::MapgenV5::new(env, params, settings)?),
        MapgenName::V6 => Box::new(v6::MapgenV6::new(env, params, settings)?),
        MapgenName::V7 => Box::new(v7::MapgenV7::new(env, params, settings)?),
        MapgenName::Flat => Box::new(flat::MapgenFlat::new(env, params, settings)?),
        MapgenName::Fractal => Box::new(fractal::MapgenFractal::new(env, params, settings)?),
        MapgenName::Carpathian => {
            Box::new(carpathian::MapgenCarpathian::new(env, params, settings)?)
        }
        MapgenName::Valleys => Box::new(valleys::MapgenValleys::new(env, params, settings)?),
        MapgenName::Singlenode => {
            Box::new(singlenode::MapgenSinglenode::new(env, params, settings)?)
        }
    })
}

/// Fills a whole chunk span of the buffer with stone below a per-column
/// surface function; the workhorse of the simpler 2D-height variants.
pub(crate) fn fill_column(
    vm: &mut MMVManip,
    registry: &NodeRegistry,
    x: i16,
    z: i16,
    y_min: i16,
    y_max: i16,
    surface_y: i16,
    water_level: i16,
    c_stone: ContentId,
    c_water: ContentId,
) {
    for y in y_min..=y_max {
        let pos = NodePos::new(x, y, z);
        let existing = vm.get_node(pos);
        if existing.content != ContentId::IGNORE
            && !registry.get_features(existing.content).buildable_to
            && existing.content != ContentId::AIR
        {
            continue;
        }
        let node = if y <= surface_y {
            MapNode::of(c_stone)
        } else if y <= water_level {
            MapNode::of(c_water)
        } else {
            MapNode::AIR
        };
        vm.set_node(pos, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_string_round_trip() {
        let flags = parse_flag_string(
            "caves,nodungeons,light",
            mg_flags::ALL,
            MG_FLAG_NAMES,
        );
        assert_ne!(flags & mg_flags::CAVES, 0);
        assert_eq!(flags & mg_flags::DUNGEONS, 0);
        assert_ne!(flags & mg_flags::LIGHT, 0);
    }

    #[test]
    fn mapgen_names_are_stable() {
        for name in MapgenName::ALL {
            assert_eq!(MapgenName::from_name(name.as_str()), Some(name));
        }
        assert_eq!(MapgenName::from_name("v8"), None);
    }

    #[test]
    fn chunk_bounds_are_centered_and_cover_every_block() {
        let (min, max) = chunk_bounds_for_block(BlockPos::ZERO, 5);
        assert_eq!(min.vec(), I16Vec3::splat(-2));
        assert_eq!(max.vec(), I16Vec3::splat(2));

        for x in -12..12_i16 {
            let block = BlockPos::new(I16Vec3::new(x, 0, 0)).unwrap();
            let (min, max) = chunk_bounds_for_block(block, 5);
            assert!(min.vec().x <= x && x <= max.vec().x, "block {x} outside its chunk");
            assert_eq!(max.vec().x - min.vec().x, 4);
        }
    }

    #[test]
    fn params_settings_round_trip() {
        let mut settings = Settings::new();
        let params = MapgenParams {
            name: MapgenName::Carpathian,
            world_seed: 987_654,
            water_level: 3,
            chunksize: 4,
            ..MapgenParams::default()
        };
        params.write_settings(&mut settings);
        let reread = MapgenParams::from_settings(&settings);
        assert_eq!(reread.name, MapgenName::Carpathian);
        assert_eq!(reread.world_seed, 987_654);
        assert_eq!(reread.water_level, 3);
        assert_eq!(reread.chunksize, 4);
        assert_eq!(reread.flags, params.flags);
    }
}
