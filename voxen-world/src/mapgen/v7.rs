//! Mapgen v7: two blended 2D height stacks selected by a third noise,
//! river channels, optional 3D mountain displacement and an optional
//! floating-land band high above the surface.

use glam::Vec3;
use voxen_core::{ContentId, MapNode, NodePos, MAX_MAP_GENERATION_LIMIT};

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
    fill_column, parse_flag_string,
};
use crate::noise::{NoiseParams, fractal2d, fractal3d, noise_flags};
use crate::settings::Settings;

/// v7-specific flag bits, settings key `mgv7_spflags`.
pub mod v7_flags {
    /// Enable the 3D mountain displacement.
    pub const MOUNTAINS: u32 = 1 << 0;
    /// Enable river channels.
    pub const RIDGES: u32 = 1 << 1;
    /// Enable the floating-land band.
    pub const FLOATLANDS: u32 = 1 << 2;
}

const V7_FLAG_NAMES: &[(&str, u32)] = &[
    ("mountains", v7_flags::MOUNTAINS),
    ("ridges", v7_flags::RIDGES),
    ("floatlands", v7_flags::FLOATLANDS),
];

pub(crate) struct MapgenV7 {
    common: MapgenCommon,
    spflags: u32,
    np_terrain_base: NoiseParams,
    np_terrain_alt: NoiseParams,
    np_height_select: NoiseParams,
    np_terrain_persist: NoiseParams,
    np_ridge: NoiseParams,
    np_mountain: NoiseParams,
    np_mount_height: NoiseParams,
    np_floatland: NoiseParams,
    float_ymin: i16,
    float_ymax: i16,
    float_taper: f32,
}

impl MapgenV7 {
    pub(crate) fn new(
        env: &MapgenEnv,
        params: MapgenParams,
        settings: &Settings,
    ) -> Result<Self, MapgenError> {
        let spflags = settings.get("mgv7_spflags").map_or(
            v7_flags::MOUNTAINS | v7_flags::RIDGES,
            |text| {
                parse_flag_string(text, v7_flags::MOUNTAINS | v7_flags::RIDGES, V7_FLAG_NAMES)
            },
        );

        let np = |key: &str, fallback: NoiseParams| -> Result<NoiseParams, MapgenError> {
            let params = settings
                .get(key)
                .map(crate::noise::NoiseParams::parse)
                .transpose()?
                .unwrap_or(fallback);
            params.validate()?;
            Ok(params)
        };

        let mapgen = Self {
            common: MapgenCommon::new(env, params, settings)?,
            spflags,
            np_terrain_base: np(
                "mgv7_np_terrain_base",
                NoiseParams::new(4.0, 70.0, Vec3::splat(600.0), 82341, 5, 0.6, 2.0),
            )?,
            np_terrain_alt: np(
                "mgv7_np_terrain_alt",
                NoiseParams::new(4.0, 25.0, Vec3::splat(600.0), 5934, 5, 0.6, 2.0),
            )?,
            np_height_select: np(
                "mgv7_np_height_select",
                NoiseParams::new(-0.5, 1.0, Vec3::splat(250.0), 4213, 5, 0.69, 2.0),
            )?,
            np_terrain_persist: np(
                "mgv7_np_terrain_persist",
                NoiseParams::new(0.6, 0.1, Vec3::splat(2000.0), 539, 3, 0.6, 2.0),
            )?,
            np_ridge: np(
                "mgv7_np_ridge",
                NoiseParams::new(0.0, 1.0, Vec3::splat(100.0), 6467, 4, 0.75, 2.0),
            )?,
            np_mountain: np(
                "mgv7_np_mountain",
                NoiseParams::new(-0.6, 1.0, Vec3::new(250.0, 350.0, 250.0), 5333, 5, 0.63, 2.0),
            )?,
            np_mount_height: np(
                "mgv7_np_mount_height",
                NoiseParams::new(256.0, 112.0, Vec3::splat(1000.0), 72449, 3, 0.6, 2.0),
            )?,
            np_floatland: np(
                "mgv7_np_floatland",
                NoiseParams {
                    offset: 0.0,
                    scale: 0.7,
                    spread: Vec3::splat(384.0),
                    seed: 1009,
                    octaves: 4,
                    persist: 0.75,
                    lacunarity: 1.618,
                    flags: noise_flags::EASED,
                },
            )?,
            float_ymin: settings.get_i16_or("mgv7_floatland_ymin", 1024),
            float_ymax: settings.get_i16_or("mgv7_floatland_ymax", 4096),
            float_taper: settings.get_f32_or("mgv7_float_taper", 0.75),
        };
        Ok(mapgen)
    }

    /// The blended 2D base terrain height at a column.
    fn base_terrain_level(&self, x: i16, z: i16) -> f32 {
        let seed = self.common.params.world_seed;
        let xf = f32::from(x);
        let zf = f32::from(z);

        // persistence modulation keeps plains smooth and hills rough
        let persist = fractal2d(&self.np_terrain_persist, xf, zf, seed).clamp(0.3, 0.9);
        let mut np_base = self.np_terrain_base.clone();
        np_base.persist = persist;
        let mut np_alt = self.np_terrain_alt.clone();
        np_alt.persist = persist;

        let base = fractal2d(&np_base, xf, zf, seed);
        let alt = fractal2d(&np_alt, xf, zf, seed);
        let select = fractal2d(&self.np_height_select, xf, zf, seed).clamp(0.0, 1.0);

        if base > alt {
            alt + (base - alt) * select
        } else {
            alt
        }
    }

    /// River channel factor: 0 at the river centre line, 1 outside.
    fn river_factor(&self, x: i16, z: i16) -> f32 {
        if self.spflags & v7_flags::RIDGES == 0 {
            return 1.0;
        }
        let ridge = fractal2d(
            &self.np_ridge,
            f32::from(x),
            f32::from(z),
            self.common.params.world_seed,
        )
        .abs();
        (ridge / 0.12).min(1.0)
    }

    /// Surface height including river carving.
    fn terrain_level(&self, x: i16, z: i16) -> i16 {
        let base = self.base_terrain_level(x, z);
        let river = self.river_factor(x, z);
        let water = f32::from(self.common.params.water_level);
        // rivers cut the terrain down to just below water level
        let carved = if river < 1.0 {
            let depth = water - 3.0;
            depth + (base - depth) * river
        } else {
            base
        };
        #[expect(
            clippy::cast_possible_truncation,
            reason = "terrain heights stay far inside i16"
        )]
        {
            carved.floor() as i16
        }
    }

    fn mountain_solid(&self, x: i16, y: i16, z: i16) -> bool {
        if self.spflags & v7_flags::MOUNTAINS == 0 {
            return false;
        }
        let seed = self.common.params.world_seed;
        let mount_height = fractal2d(
            &self.np_mount_height,
            f32::from(x),
            f32::from(z),
            seed,
        )
        .max(1.0);
        let density = fractal3d(
            &self.np_mountain,
            f32::from(x),
            f32::from(y),
            f32::from(z),
            seed,
        );
        // density fades with altitude so peaks taper off
        density - f32::from(y) / mount_height > 0.0
    }

    fn floatland_solid(&self, x: i16, y: i16, z: i16) -> bool {
        if self.spflags & v7_flags::FLOATLANDS == 0
            || y < self.float_ymin
            || y > self.float_ymax
        {
            return false;
        }
        let band = f32::from(self.float_ymax - self.float_ymin).max(1.0);
        let mid = f32::from(self.float_ymin) + band / 2.0;
        // taper by distance from the band centre towards both edges
        let edge_distance = 1.0 - ((f32::from(y) - mid).abs() / (band / 2.0));
        let taper = edge_distance.clamp(0.0, 1.0).powf(self.float_taper);
        let density = fractal3d(
            &self.np_floatland,
            f32::from(x),
            f32::from(y),
            f32::from(z),
            self.common.params.world_seed,
        );
        density * taper > 0.6
    }
}

impl Mapgen for MapgenV7 {
    fn name(&self) -> MapgenName {
        MapgenName::V7
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

        for z in node_min.0.z..=node_max.0.z {
            for x in node_min.0.x..=node_max.0.x {
                let surface = self.terrain_level(x, z);
                let river = self.river_factor(x, z);
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

                // river water sits in the carved channel
                if river < 1.0 && surface < water_level {
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

                // mountains and floatlands add solid volume above the base
                if self.spflags & (v7_flags::MOUNTAINS | v7_flags::FLOATLANDS) != 0 {
                    for y in node_min.0.y..=node_max.0.y {
                        if y <= surface {
                            continue;
                        }
                        let pos = NodePos::new(x, y, z);
                        if data.vmanip.get_node(pos).content != ContentId::AIR {
                            continue;
                        }
                        if self.mountain_solid(x, y, z) || self.floatland_solid(x, y, z) {
                            data.vmanip.set_node(pos, MapNode::of(c_stone));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::BiomeManager;
    use crate::mapgen::{DecoManager, OreManager};
    use std::sync::Arc;
    use voxen_core::{ContentFeatures, NodeRegistry};

    fn env() -> MapgenEnv {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures {
                is_ground_content: true,
                ..ContentFeatures::simple("base:stone")
            })
            .unwrap();
        registry
            .register_node(ContentFeatures {
                liquid_kind: voxen_core::LiquidKind::Source,
                liquid_alternative_source: Some("base:water_source".into()),
                liquid_alternative_flowing: Some("base:water_source".into()),
                walkable: false,
                light_propagates: true,
                floodable: false,
                is_ground_content: true,
                ..ContentFeatures::simple("base:water_source")
            })
            .unwrap();
        registry.register_alias("mapgen_stone", "base:stone").unwrap();
        registry
            .register_alias("mapgen_water_source", "base:water_source")
            .unwrap();
        registry.finalize().unwrap();
        MapgenEnv {
            registry: Arc::new(registry),
            biomes: Arc::new(BiomeManager::new()),
            ores: Arc::new(OreManager::new()),
            decorations: Arc::new(DecoManager::new()),
        }
    }

    #[test]
    fn terrain_level_is_deterministic() {
        let env = env();
        let params = MapgenParams {
            world_seed: 42,
            ..MapgenParams::default()
        };
        let settings = Settings::new();
        let first = MapgenV7::new(&env, params.clone(), &settings).unwrap();
        let second = MapgenV7::new(&env, params, &settings).unwrap();
        for x in [-500_i16, -3, 0, 7, 444] {
            for z in [-99_i16, 0, 250] {
                assert_eq!(first.terrain_level(x, z), second.terrain_level(x, z));
            }
        }
    }

    #[test]
    fn spawn_level_is_walkable_or_sentinel() {
        let env = env();
        let params = MapgenParams {
            world_seed: 42,
            ..MapgenParams::default()
        };
        let mut mapgen = MapgenV7::new(&env, params, &Settings::new()).unwrap();
        let mut found_valid = false;
        for x in (0..2000_i16).step_by(61) {
            let level = mapgen.spawn_level_at_point(x, x / 2);
            if level != MAX_MAP_GENERATION_LIMIT {
                assert!(
                    (level - mapgen.common.params.water_level).abs() <= 17,
                    "spawn level {level} too far from sea level"
                );
                found_valid = true;
            }
        }
        assert!(found_valid, "no spawnable column in 33 samples");
    }
}
