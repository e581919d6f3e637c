//! Mapgen valleys: terrain organized around river valleys. A river noise
//! defines the drainage network; valley depth and profile noises shape
//! how steeply the land rises away from the water.

use glam::Vec3;
use voxen_core::{MapNode, NodePos, MAX_MAP_GENERATION_LIMIT};

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
    fill_column,
};
use crate::noise::{NoiseParams, fractal2d};
use crate::settings::Settings;

pub(crate) struct MapgenValleys {
    common: MapgenCommon,
    river_size: f32,
    river_depth: f32,
    np_terrain_height: NoiseParams,
    np_rivers: NoiseParams,
    np_valley_depth: NoiseParams,
    np_valley_profile: NoiseParams,
}

impl MapgenValleys {
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
        Ok(Self {
            common: MapgenCommon::new(env, params, settings)?,
            river_size: settings.get_f32_or("mgvalleys_river_size", 5.0) / 100.0,
            river_depth: settings.get_f32_or("mgvalleys_river_depth", 4.0),
            np_terrain_height: np(
                "mgvalleys_np_terrain_height",
                NoiseParams::new(-10.0, 50.0, Vec3::splat(1024.0), 5202, 6, 0.4, 2.0),
            )?,
            np_rivers: np(
                "mgvalleys_np_rivers",
                NoiseParams::new(0.0, 1.0, Vec3::splat(512.0), -6050, 5, 0.6, 2.0),
            )?,
            np_valley_depth: np(
                "mgvalleys_np_valley_depth",
                NoiseParams::new(5.0, 4.0, Vec3::splat(512.0), -1914, 1, 1.0, 2.0),
            )?,
            np_valley_profile: np(
                "mgvalleys_np_valley_profile",
                NoiseParams::new(0.6, 0.5, Vec3::splat(512.0), 777, 1, 1.0, 2.0),
            )?,
        })
    }

    /// Surface height and whether the column is a river channel.
    fn column_terrain(&self, x: i16, z: i16) -> (i16, bool) {
        let seed = self.common.params.world_seed;
        let xf = f32::from(x);
        let zf = f32::from(z);

        let base = fractal2d(&self.np_terrain_height, xf, zf, seed);
        let river = fractal2d(&self.np_rivers, xf, zf, seed).abs();
        let depth = fractal2d(&self.np_valley_depth, xf, zf, seed).max(0.0);
        let profile = fractal2d(&self.np_valley_profile, xf, zf, seed).max(0.1);

        let in_river = river < self.river_size;
        // the valley floor follows the river; land rises away from it with
        // the profile exponent controlling the slope
        let valley_rise = ((river - self.river_size).max(0.0) / profile).min(1.0);
        let mut level = base + depth * valley_rise * valley_rise;
        if in_river {
            let water = f32::from(self.common.params.water_level);
            level = level.min(water - self.river_depth.max(1.0));
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "terrain heights stay far inside i16"
        )]
        {
            (level.floor() as i16, in_river)
        }
    }
}

impl Mapgen for MapgenValleys {
    fn name(&self) -> MapgenName {
        MapgenName::Valleys
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
        let c_river_water = self.common.c_river_water;
        let c_riverbed = self
            .common
            .registry
            .get_id("mapgen_riverbed")
            .unwrap_or(c_stone);

        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let (surface, in_river) = self.column_terrain(x, z);
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
                if in_river {
                    // line the channel with riverbed material and fill it
                    // with river water up to sea level
                    for y in (surface - 1).max(node_min.0.y)..=surface {
                        if y > node_max.0.y {
                            continue;
                        }
                        let pos = NodePos::new(x, y, z);
                        if data.vmanip.get_node(pos).content == c_stone {
                            data.vmanip.set_node(pos, MapNode::of(c_riverbed));
                        }
                    }
                    for y in (surface + 1)..=water_level.min(node_max.0.y) {
                        if y < node_min.0.y {
                            continue;
                        }
                        let pos = NodePos::new(x, y, z);
                        if data.vmanip.get_node(pos).content == c_water {
                            data.vmanip.set_node(pos, MapNode::of(c_river_water));
                        }
                    }
                }
            }
        }

        self.common.finish_chunk(data);
    }

    fn spawn_level_at_point(&mut self, x: i16, z: i16) -> i16 {
        let (ground, in_river) = self.column_terrain(x, z);
        if !in_river
            && ground >= self.common.params.water_level
            && self.common.acceptable_spawn(ground)
        {
            ground + 1
        } else {
            MAX_MAP_GENERATION_LIMIT
        }
    }
}
