//! Mapgen flat: a constant ground level, optionally modulated by lake
//! depressions and low hills driven by one 2D noise.

use glam::Vec3;
use voxen_core::MAX_MAP_GENERATION_LIMIT;

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
    fill_column, parse_flag_string,
};
use crate::noise::{NoiseParams, fractal2d};
use crate::settings::Settings;

/// flat-specific flag bits, settings key `mgflat_spflags`.
pub mod flat_flags {
    /// Carve lake depressions below ground level.
    pub const LAKES: u32 = 1 << 0;
    /// Raise low hills above ground level.
    pub const HILLS: u32 = 1 << 1;
}

const FLAT_FLAG_NAMES: &[(&str, u32)] = &[
    ("lakes", flat_flags::LAKES),
    ("hills", flat_flags::HILLS),
];

pub(crate) struct MapgenFlat {
    common: MapgenCommon,
    spflags: u32,
    ground_level: i16,
    lake_threshold: f32,
    lake_steepness: f32,
    hill_threshold: f32,
    hill_steepness: f32,
    np_terrain: NoiseParams,
}

impl MapgenFlat {
    pub(crate) fn new(
        env: &MapgenEnv,
        params: MapgenParams,
        settings: &Settings,
    ) -> Result<Self, MapgenError> {
        let np_terrain = settings
            .get("mgflat_np_terrain")
            .map(crate::noise::NoiseParams::parse)
            .transpose()?
            .unwrap_or_else(|| {
                NoiseParams::new(0.0, 1.0, Vec3::splat(600.0), 7244, 5, 0.6, 2.0)
            });
        np_terrain.validate()?;
        Ok(Self {
            common: MapgenCommon::new(env, params, settings)?,
            spflags: settings
                .get("mgflat_spflags")
                .map_or(0, |text| parse_flag_string(text, 0, FLAT_FLAG_NAMES)),
            ground_level: settings.get_i16_or("mgflat_ground_level", 8),
            lake_threshold: settings.get_f32_or("mgflat_lake_threshold", -0.45),
            lake_steepness: settings.get_f32_or("mgflat_lake_steepness", 48.0),
            hill_threshold: settings.get_f32_or("mgflat_hill_threshold", 0.45),
            hill_steepness: settings.get_f32_or("mgflat_hill_steepness", 64.0),
            np_terrain,
        })
    }

    fn surface_level(&self, x: i16, z: i16) -> i16 {
        let mut level = f32::from(self.ground_level);
        if self.spflags & (flat_flags::LAKES | flat_flags::HILLS) != 0 {
            let noise = fractal2d(
                &self.np_terrain,
                f32::from(x),
                f32::from(z),
                self.common.params.world_seed,
            );
            if self.spflags & flat_flags::LAKES != 0 && noise < self.lake_threshold {
                level -= (self.lake_threshold - noise) * self.lake_steepness;
            } else if self.spflags & flat_flags::HILLS != 0 && noise > self.hill_threshold {
                level += (noise - self.hill_threshold) * self.hill_steepness;
            }
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "modulated levels stay far inside i16"
        )]
        {
            level.floor() as i16
        }
    }
}

impl Mapgen for MapgenFlat {
    fn name(&self) -> MapgenName {
        MapgenName::Flat
    }

    fn params(&self) -> &MapgenParams {
        &self.common.params
    }

    fn make_chunk(&mut self, data: &mut BlockMakeData) {
        let node_min = data.node_min();
        let node_max = data.node_max();
        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let surface = self.surface_level(x, z);
                fill_column(
                    &mut data.vmanip,
                    &self.common.registry,
                    x,
                    z,
                    node_min.0.y,
                    node_max.0.y,
                    surface,
                    self.common.params.water_level,
                    self.common.c_stone,
                    self.common.c_water,
                );
            }
        }
        self.common.finish_chunk(data);
    }

    fn spawn_level_at_point(&mut self, x: i16, z: i16) -> i16 {
        let ground = self.surface_level(x, z);
        if ground >= self.common.params.water_level && self.common.acceptable_spawn(ground) {
            ground + 1
        } else {
            MAX_MAP_GENERATION_LIMIT
        }
    }
}
