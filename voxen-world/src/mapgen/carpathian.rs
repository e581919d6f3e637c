//! Mapgen carpathian: rolling mountain terrain from four blended hill
//! noises combined with step, ridge and valley terms, plus optional river
//! carving.

use glam::Vec3;
use voxen_core::{MapNode, NodePos, MAX_MAP_GENERATION_LIMIT};

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
    fill_column, parse_flag_string,
};
use crate::noise::{NoiseParams, fractal2d};
use crate::settings::Settings;

/// carpathian-specific flag bits, settings key `mgcarpathian_spflags`.
pub mod carpathian_flags {
    /// Carve river channels.
    pub const RIVERS: u32 = 1 << 0;
}

const CARPATHIAN_FLAG_NAMES: &[(&str, u32)] = &[("rivers", carpathian_flags::RIVERS)];

pub(crate) struct MapgenCarpathian {
    common: MapgenCommon,
    spflags: u32,
    base_level: f32,
    river_width: f32,
    river_depth: f32,
    np_height1: NoiseParams,
    np_height2: NoiseParams,
    np_height3: NoiseParams,
    np_height4: NoiseParams,
    np_hills_terrain: NoiseParams,
    np_ridge_terrain: NoiseParams,
    np_step_terrain: NoiseParams,
    np_hills: NoiseParams,
    np_ridge_mnt: NoiseParams,
    np_step_mnt: NoiseParams,
    np_rivers: NoiseParams,
}

impl MapgenCarpathian {
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
            spflags: settings
                .get("mgcarpathian_spflags")
                .map_or(0, |text| parse_flag_string(text, 0, CARPATHIAN_FLAG_NAMES)),
            base_level: settings.get_f32_or("mgcarpathian_base_level", 12.0),
            river_width: settings.get_f32_or("mgcarpathian_river_width", 0.05),
            river_depth: settings.get_f32_or("mgcarpathian_river_depth", 24.0),
            np_height1: np(
                "mgcarpathian_np_height1",
                NoiseParams::new(0.0, 5.0, Vec3::splat(251.0), 9613, 5, 0.5, 2.0),
            )?,
            np_height2: np(
                "mgcarpathian_np_height2",
                NoiseParams::new(0.0, 5.0, Vec3::splat(383.0), 1949, 5, 0.5, 2.0),
            )?,
            np_height3: np(
                "mgcarpathian_np_height3",
                NoiseParams::new(0.0, 5.0, Vec3::splat(509.0), 3211, 5, 0.5, 2.0),
            )?,
            np_height4: np(
                "mgcarpathian_np_height4",
                NoiseParams::new(0.0, 5.0, Vec3::splat(631.0), 1583, 5, 0.5, 2.0),
            )?,
            np_hills_terrain: np(
                "mgcarpathian_np_hills_terrain",
                NoiseParams::new(1.0, 1.0, Vec3::splat(1301.0), 944, 4, 0.5, 2.0),
            )?,
            np_ridge_terrain: np(
                "mgcarpathian_np_ridge_terrain",
                NoiseParams::new(1.0, 1.0, Vec3::splat(1889.0), 12, 4, 0.5, 2.0),
            )?,
            np_step_terrain: np(
                "mgcarpathian_np_step_terrain",
                NoiseParams::new(1.0, 1.0, Vec3::splat(1889.0), 845, 4, 0.5, 2.0),
            )?,
            np_hills: np(
                "mgcarpathian_np_hills",
                NoiseParams::new(0.0, 3.0, Vec3::splat(257.0), 6604, 6, 0.5, 2.0),
            )?,
            np_ridge_mnt: np(
                "mgcarpathian_np_ridge_mnt",
                NoiseParams::new(0.0, 12.0, Vec3::splat(743.0), 5520, 6, 0.7, 2.0),
            )?,
            np_step_mnt: np(
                "mgcarpathian_np_step_mnt",
                NoiseParams::new(0.0, 8.0, Vec3::splat(509.0), 2590, 6, 0.6, 2.0),
            )?,
            np_rivers: np(
                "mgcarpathian_np_rivers",
                NoiseParams::new(0.0, 1.0, Vec3::splat(1000.0), 85039, 5, 0.6, 2.0),
            )?,
        })
    }

    /// Smoothed lens blend used to mix the four height fields.
    fn lens(base: f32, modulation: f32) -> f32 {
        base * modulation.clamp(0.0, 1.0)
    }

    /// A terraced ("stepped") transform of a mountain term.
    fn steps(value: f32) -> f32 {
        let floor = value.floor();
        let frac = value - floor;
        // quintic ease inside each step keeps the treads walkable
        let eased = frac * frac * frac * (frac * (frac * 6.0 - 15.0) + 10.0);
        floor + eased
    }

    fn terrain_level(&self, x: i16, z: i16) -> i16 {
        let seed = self.common.params.world_seed;
        let xf = f32::from(x);
        let zf = f32::from(z);

        let height1 = fractal2d(&self.np_height1, xf, zf, seed);
        let height2 = fractal2d(&self.np_height2, xf, zf, seed);
        let height3 = fractal2d(&self.np_height3, xf, zf, seed);
        let height4 = fractal2d(&self.np_height4, xf, zf, seed);

        let hills_mod = fractal2d(&self.np_hills_terrain, xf, zf, seed);
        let ridge_mod = fractal2d(&self.np_ridge_terrain, xf, zf, seed);
        let step_mod = fractal2d(&self.np_step_terrain, xf, zf, seed);

        let hills = Self::lens(fractal2d(&self.np_hills, xf, zf, seed), hills_mod);
        let ridge = Self::lens(
            fractal2d(&self.np_ridge_mnt, xf, zf, seed).abs(),
            ridge_mod,
        );
        let step = Self::lens(
            Self::steps(fractal2d(&self.np_step_mnt, xf, zf, seed)),
            step_mod,
        );

        let mut level = self.base_level
            + (height1 + height2).max(height3 + height4) / 2.0
            + hills
            + ridge
            + step;

        if self.spflags & carpathian_flags::RIVERS != 0 {
            let river = fractal2d(&self.np_rivers, xf, zf, seed).abs();
            if river < self.river_width {
                let cut = 1.0 - river / self.river_width;
                level -= cut * self.river_depth;
            }
        }

        #[expect(
            clippy::cast_possible_truncation,
            reason = "terrain heights stay far inside i16"
        )]
        {
            level.floor() as i16
        }
    }
}

impl Mapgen for MapgenCarpathian {
    fn name(&self) -> MapgenName {
        MapgenName::Carpathian
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
        let rivers = self.spflags & carpathian_flags::RIVERS != 0;

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
                if rivers && surface < water_level {
                    let river = fractal2d(
                        &self.np_rivers,
                        f32::from(x),
                        f32::from(z),
                        self.common.params.world_seed,
                    )
                    .abs();
                    if river < self.river_width {
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
        }

        self.common.finish_chunk(data);
    }

    fn spawn_level_at_point(&mut self, x: i16, z: i16) -> i16 {
        let ground = self.terrain_level(x, z);
        if ground >= self.common.params.water_level && self.common.acceptable_spawn(ground) {
            ground + 1
        } else {
            MAX_MAP_GENERATION_LIMIT
        }
    }
}
