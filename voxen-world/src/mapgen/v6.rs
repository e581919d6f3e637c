//! Mapgen v6: the legacy generator. Predates the biome subsystem; surface
//! selection runs on its own heat/humidity noises and a fixed palette of
//! alias-resolved nodes (dirt, grass, sand, desert sand/stone), with
//! beaches near sea level and mud depth from its own noise.

use glam::Vec3;
use voxen_core::{ContentId, MapNode, NodePos, MAX_MAP_GENERATION_LIMIT};

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
    fill_column,
};
use crate::noise::{NoiseParams, fractal2d};
use crate::settings::Settings;

pub(crate) struct MapgenV6 {
    common: MapgenCommon,
    freq_desert: f32,
    freq_beach: f32,
    np_terrain_base: NoiseParams,
    np_terrain_higher: NoiseParams,
    np_steepness: NoiseParams,
    np_height_select: NoiseParams,
    np_mud: NoiseParams,
    np_beach: NoiseParams,
    np_biome: NoiseParams,
    np_humidity: NoiseParams,
    c_dirt: ContentId,
    c_dirt_with_grass: ContentId,
    c_sand: ContentId,
    c_desert_sand: ContentId,
    c_desert_stone: ContentId,
}

impl MapgenV6 {
    pub(crate) fn new(
        env: &MapgenEnv,
        params: MapgenParams,
        settings: &Settings,
    ) -> Result<Self, MapgenError> {
        let np = |key: &str, fallback: NoiseParams| -> Result<NoiseParams, MapgenError> {
            let params = settings
                .get(key)
                .map(crate::noise::NoiseParams::parse)
                .transpose()?
                .unwrap_or(fallback);
            params.validate()?;
            Ok(params)
        };

        let common = MapgenCommon::new(env, params, settings)?;
        let fallback_stone = common.c_stone;
        let alias = |name: &str| env.registry.get_id(name).unwrap_or(fallback_stone);

        Ok(Self {
            freq_desert: settings.get_f32_or("mgv6_freq_desert", 0.45),
            freq_beach: settings.get_f32_or("mgv6_freq_beach", 0.15),
            np_terrain_base: np(
                "mgv6_np_terrain_base",
                NoiseParams::new(-4.0, 20.0, Vec3::splat(250.0), 82341, 5, 0.6, 2.0),
            )?,
            np_terrain_higher: np(
                "mgv6_np_terrain_higher",
                NoiseParams::new(20.0, 16.0, Vec3::splat(500.0), 85039, 5, 0.6, 2.0),
            )?,
            np_steepness: np(
                "mgv6_np_steepness",
                NoiseParams::new(0.85, 0.5, Vec3::splat(125.0), -932, 5, 0.7, 2.0),
            )?,
            np_height_select: np(
                "mgv6_np_height_select",
                NoiseParams::new(0.0, 1.0, Vec3::splat(250.0), 4213, 5, 0.69, 2.0),
            )?,
            np_mud: np(
                "mgv6_np_mud",
                NoiseParams::new(4.0, 2.0, Vec3::splat(200.0), 91013, 3, 0.55, 2.0),
            )?,
            np_beach: np(
                "mgv6_np_beach",
                NoiseParams::new(0.0, 1.0, Vec3::splat(250.0), 59420, 3, 0.50, 2.0),
            )?,
            np_biome: np(
                "mgv6_np_biome",
                NoiseParams::new(0.0, 1.0, Vec3::splat(500.0), 9130, 3, 0.50, 2.0),
            )?,
            np_humidity: np(
                "mgv6_np_humidity",
                NoiseParams::new(0.5, 0.5, Vec3::splat(500.0), 72384, 3, 0.50, 2.0),
            )?,
            c_dirt: alias("mapgen_dirt"),
            c_dirt_with_grass: alias("mapgen_dirt_with_grass"),
            c_sand: alias("mapgen_sand"),
            c_desert_sand: alias("mapgen_desert_sand"),
            c_desert_stone: alias("mapgen_desert_stone"),
            common,
        })
    }

    fn is_desert(&self, x: i16, z: i16) -> bool {
        fractal2d(
            &self.np_biome,
            f32::from(x),
            f32::from(z),
            self.common.params.world_seed,
        ) > self.freq_desert
    }

    fn has_beach(&self, x: i16, z: i16) -> bool {
        fractal2d(
            &self.np_beach,
            f32::from(x),
            f32::from(z),
            self.common.params.world_seed,
        ) > self.freq_beach
    }

    fn mud_amount(&self, x: i16, z: i16) -> i16 {
        let seed = self.common.params.world_seed;
        let mud = fractal2d(&self.np_mud, f32::from(x), f32::from(z), seed);
        // wetter regions accumulate a little more soil
        let humidity =
            fractal2d(&self.np_humidity, f32::from(x), f32::from(z), seed).clamp(0.0, 1.0);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "mud depths are tiny integers"
        )]
        {
            (mud + humidity * 2.0).clamp(0.0, 8.0).floor() as i16
        }
    }

    /// The classic two-stack blend: a low base terrain and a higher one,
    /// selected by steepness and height-select.
    fn terrain_level(&self, x: i16, z: i16) -> i16 {
        let seed = self.common.params.world_seed;
        let xf = f32::from(x);
        let zf = f32::from(z);

        let base = fractal2d(&self.np_terrain_base, xf, zf, seed);
        let higher = fractal2d(&self.np_terrain_higher, xf, zf, seed).max(base);
        let steepness = fractal2d(&self.np_steepness, xf, zf, seed);
        let select = fractal2d(&self.np_height_select, xf, zf, seed)
            .mul_add(steepness.max(0.0), 0.0)
            .clamp(0.0, 1.0);

        let level = base + (higher - base) * select;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "terrain heights stay far inside i16"
        )]
        {
            level.floor() as i16
        }
    }

    /// Rewrites the top of a column into the legacy surface palette.
    fn apply_surface(
        &self,
        data: &mut BlockMakeData,
        x: i16,
        z: i16,
        surface: i16,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        let water_level = self.common.params.water_level;
        let desert = self.is_desert(x, z);
        let beach = self.has_beach(x, z);
        let mud = self.mud_amount(x, z).max(1);

        let (c_top, c_under) = if desert {
            (self.c_desert_sand, self.c_desert_sand)
        } else if surface <= water_level + 1 && beach {
            (self.c_sand, self.c_sand)
        } else if surface < water_level {
            (self.c_sand, self.c_sand)
        } else {
            (self.c_dirt_with_grass, self.c_dirt)
        };

        for depth in 0..mud {
            let y = surface - depth;
            if y < node_min.0.y || y > node_max.0.y {
                continue;
            }
            let pos = NodePos::new(x, y, z);
            if data.vmanip.get_node(pos).content != self.common.c_stone {
                continue;
            }
            let node = if depth == 0 && surface >= water_level {
                c_top
            } else {
                c_under
            };
            data.vmanip.set_node(pos, MapNode::of(node));
        }

        // deep deserts sit on desert stone rather than regular stone
        if desert {
            for y in node_min.0.y..=(surface - mud).min(node_max.0.y) {
                if y < surface - mud - 8 {
                    continue;
                }
                let pos = NodePos::new(x, y, z);
                if data.vmanip.get_node(pos).content == self.common.c_stone {
                    data.vmanip.set_node(pos, MapNode::of(self.c_desert_stone));
                }
            }
        }
    }
}

impl Mapgen for MapgenV6 {
    fn name(&self) -> MapgenName {
        MapgenName::V6
    }

    fn params(&self) -> &MapgenParams {
        &self.common.params
    }

    fn make_chunk(&mut self, data: &mut BlockMakeData) {
        let node_min = data.node_min();
        let node_max = data.node_max();
        let water_level = self.common.params.water_level;
        let c_stone = self.common.c_stone;
        let c_water = self.common.c_water;

        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let surface = self.terrain_level(x, z);
                fill_column(
                    &mut data.vmanip,
                    &self.common.registry,
                    x,
                    z,
                    node_min.0.y,
                    node_max.0.y,
                    surface,
                    water_level,
                    c_stone,
                    c_water,
                );
                self.apply_surface(data, x, z, surface, node_min, node_max);
            }
        }

        self.common.finish_chunk(data);
    }

    fn spawn_level_at_point(&mut self, x: i16, z: i16) -> i16 {
        let ground = self.terrain_level(x, z);
        if ground >= self.common.params.water_level
            && self.common.acceptable_spawn(ground)
            && !self.is_desert(x, z)
        {
            ground + 1
        } else {
            MAX_MAP_GENERATION_LIMIT
        }
    }
}
