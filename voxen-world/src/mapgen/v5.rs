//! Mapgen v5: fully 3D terrain. A ground-density noise is compared
//! against the altitude, scaled by a 2D factor noise and lifted by a 2D
//! height noise, which yields overhangs and natural arches the 2D-height
//! generators cannot produce.

use glam::Vec3;
use voxen_core::{ContentId, MapNode, NodePos, MAX_MAP_GENERATION_LIMIT};

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
};
use crate::noise::{NoiseParams, fractal2d, fractal3d};
use crate::settings::Settings;

pub(crate) struct MapgenV5 {
    common: MapgenCommon,
    np_factor: NoiseParams,
    np_height: NoiseParams,
    np_ground: NoiseParams,
}

impl MapgenV5 {
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
            np_factor: np(
                "mgv5_np_factor",
                NoiseParams::new(0.0, 1.0, Vec3::splat(250.0), 920_381, 3, 0.45, 2.0),
            )?,
            np_height: np(
                "mgv5_np_height",
                NoiseParams::new(0.0, 10.0, Vec3::splat(250.0), 84_174, 4, 0.5, 2.0),
            )?,
            np_ground: np(
                "mgv5_np_ground",
                NoiseParams::new(0.0, 40.0, Vec3::splat(80.0), 983_240, 4, 0.55, 2.0),
            )?,
        })
    }

    /// Density test: solid wherever the 3D ground noise beats the
    /// factor-scaled altitude above the height offset.
    fn is_solid(&self, x: i16, y: i16, z: i16) -> bool {
        let seed = self.common.params.world_seed;
        let xf = f32::from(x);
        let zf = f32::from(z);
        let factor = 0.55 + fractal2d(&self.np_factor, xf, zf, seed).abs();
        let height = fractal2d(&self.np_height, xf, zf, seed);
        let ground = fractal3d(&self.np_ground, xf, f32::from(y), zf, seed);
        ground > (f32::from(y) - height) * factor
    }
}

impl Mapgen for MapgenV5 {
    fn name(&self) -> MapgenName {
        MapgenName::V5
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
                for y in node_min.0.y..=node_max.0.y {
                    let pos = NodePos::new(x, y, z);
                    let existing = data.vmanip.get_node(pos);
                    if existing.content != ContentId::IGNORE
                        && existing.content != ContentId::AIR
                    {
                        continue;
                    }
                    let node = if self.is_solid(x, y, z) {
                        MapNode::of(c_stone)
                    } else if y <= water_level {
                        MapNode::of(c_water)
                    } else {
                        MapNode::AIR
                    };
                    data.vmanip.set_node(pos, node);
                }
            }
        }

        self.common.finish_chunk(data);
    }

    fn spawn_level_at_point(&mut self, x: i16, z: i16) -> i16 {
        // walk down from above sea level looking for the first solid cell
        // with two cells of air above it
        let top = self.common.params.water_level + 16;
        let bottom = self.common.params.water_level;
        for y in (bottom..=top).rev() {
            if self.is_solid(x, y, z)
                && !self.is_solid(x, y + 1, z)
                && !self.is_solid(x, y + 2, z)
            {
                return y + 1;
            }
        }
        MAX_MAP_GENERATION_LIMIT
    }
}
