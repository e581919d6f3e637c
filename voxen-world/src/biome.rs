//! Column-level biome classification.
//!
//! Biomes are registered by the game with node names; the names resolve to
//! content ids against the finalized registry. Per chunk, the generator
//! computes heat and humidity maps (a coarse noise plus a blend noise for
//! soft borders) and picks, per column, the registered biome whose
//! `(heat, humidity)` centroid is nearest among those whose vertical band
//! contains the surface.

use std::sync::Arc;

use flexstr::SharedStr;
use glam::Vec3;
use voxen_core::{ContentId, NodeRegistry, RegistryError};

use crate::noise::{InvalidNoiseParams, Noise, NoiseParams};

/// One registered biome. Content fields hold names until
/// [`BiomeManager::resolve_all`] rewrites them into ids; `IGNORE` disables
/// the respective feature.
#[derive(Clone, Debug)]
pub struct Biome {
    /// Registry name of the biome.
    pub name: SharedStr,

    /// Surface node, e.g. grass.
    pub node_top: Option<SharedStr>,
    /// Node under the surface, e.g. dirt.
    pub node_filler: Option<SharedStr>,
    /// Deep ground node; `None` keeps the mapgen's stone.
    pub node_stone: Option<SharedStr>,
    /// Topmost water layer node.
    pub node_water_top: Option<SharedStr>,
    /// Bulk water node.
    pub node_water: Option<SharedStr>,
    /// River water node.
    pub node_river_water: Option<SharedStr>,
    /// Riverbed node.
    pub node_riverbed: Option<SharedStr>,
    /// Node sprinkled on exposed surfaces, e.g. snow.
    pub node_dust: Option<SharedStr>,
    /// Liquid placed in large caves; `None` disables cave liquids.
    pub node_cave_liquid: Option<SharedStr>,
    /// Dungeon wall material.
    pub node_dungeon: Option<SharedStr>,
    /// Alternate dungeon material mixed into walls.
    pub node_dungeon_alt: Option<SharedStr>,
    /// Dungeon stair material.
    pub node_dungeon_stair: Option<SharedStr>,

    /// Resolved ids, valid after `resolve_all`.
    pub c_top: ContentId,
    /// See `c_top`.
    pub c_filler: ContentId,
    /// See `c_top`.
    pub c_stone: ContentId,
    /// See `c_top`.
    pub c_water_top: ContentId,
    /// See `c_top`.
    pub c_water: ContentId,
    /// See `c_top`.
    pub c_river_water: ContentId,
    /// See `c_top`.
    pub c_riverbed: ContentId,
    /// See `c_top`.
    pub c_dust: ContentId,
    /// See `c_top`.
    pub c_cave_liquid: ContentId,
    /// See `c_top`.
    pub c_dungeon: ContentId,
    /// See `c_top`.
    pub c_dungeon_alt: ContentId,
    /// See `c_top`.
    pub c_dungeon_stair: ContentId,

    /// Thickness of the top layer in nodes.
    pub depth_top: u16,
    /// Thickness of the filler layer in nodes.
    pub depth_filler: u16,
    /// Thickness of the water-top layer in nodes.
    pub depth_water_top: u16,
    /// Thickness of the riverbed layer in nodes.
    pub depth_riverbed: u16,

    /// Lower bound of the vertical band this biome applies to.
    pub y_min: i16,
    /// Upper bound of the vertical band this biome applies to.
    pub y_max: i16,

    /// Heat centroid, roughly 0..100.
    pub heat_point: f32,
    /// Humidity centroid, roughly 0..100.
    pub humidity_point: f32,
}

impl Biome {
    /// A biome with the given name and every feature disabled; callers
    /// fill in what they need via struct update syntax.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            node_top: None,
            node_filler: None,
            node_stone: None,
            node_water_top: None,
            node_water: None,
            node_river_water: None,
            node_riverbed: None,
            node_dust: None,
            node_cave_liquid: None,
            node_dungeon: None,
            node_dungeon_alt: None,
            node_dungeon_stair: None,
            c_top: ContentId::IGNORE,
            c_filler: ContentId::IGNORE,
            c_stone: ContentId::IGNORE,
            c_water_top: ContentId::IGNORE,
            c_water: ContentId::IGNORE,
            c_river_water: ContentId::IGNORE,
            c_riverbed: ContentId::IGNORE,
            c_dust: ContentId::IGNORE,
            c_cave_liquid: ContentId::IGNORE,
            c_dungeon: ContentId::IGNORE,
            c_dungeon_alt: ContentId::IGNORE,
            c_dungeon_stair: ContentId::IGNORE,
            depth_top: 1,
            depth_filler: 3,
            depth_water_top: 0,
            depth_riverbed: 2,
            y_min: i16::MIN,
            y_max: i16::MAX,
            heat_point: 50.0,
            humidity_point: 50.0,
        }
    }

    fn resolve(&mut self, registry: &NodeRegistry) -> Result<(), RegistryError> {
        let resolve_one = |name: Option<&SharedStr>| -> Result<ContentId, RegistryError> {
            match name {
                None => Ok(ContentId::IGNORE),
                Some(name) => registry
                    .get_id(name)
                    .ok_or_else(|| RegistryError::UnknownNode(name.clone())),
            }
        };
        self.c_top = resolve_one(self.node_top.as_ref())?;
        self.c_filler = resolve_one(self.node_filler.as_ref())?;
        self.c_stone = resolve_one(self.node_stone.as_ref())?;
        self.c_water_top = resolve_one(self.node_water_top.as_ref())?;
        self.c_water = resolve_one(self.node_water.as_ref())?;
        self.c_river_water = resolve_one(self.node_river_water.as_ref())?;
        self.c_riverbed = resolve_one(self.node_riverbed.as_ref())?;
        self.c_dust = resolve_one(self.node_dust.as_ref())?;
        self.c_cave_liquid = resolve_one(self.node_cave_liquid.as_ref())?;
        self.c_dungeon = resolve_one(self.node_dungeon.as_ref())?;
        self.c_dungeon_alt = resolve_one(self.node_dungeon_alt.as_ref())?;
        self.c_dungeon_stair = resolve_one(self.node_dungeon_stair.as_ref())?;
        Ok(())
    }
}

/// The registered biome set; built once at startup, shared via `Arc`.
#[derive(Default)]
pub struct BiomeManager {
    biomes: Vec<Biome>,
}

impl BiomeManager {
    /// An empty manager (mapgens then skip the surface pass).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a biome.
    pub fn register(&mut self, biome: Biome) {
        self.biomes.push(biome);
    }

    /// Rewrites every node name into a content id.
    ///
    /// # Errors
    /// [`RegistryError::UnknownNode`] naming the missing node.
    pub fn resolve_all(&mut self, registry: &NodeRegistry) -> Result<(), RegistryError> {
        for biome in &mut self.biomes {
            biome.resolve(registry)?;
        }
        Ok(())
    }

    /// Number of registered biomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    /// Whether no biome is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    /// The biome at an index of [`BiomeGen::biomemap`].
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Biome> {
        self.biomes.get(index)
    }

    /// Picks the biome for a column: nearest `(heat, humidity)` centroid
    /// among the biomes whose `[y_min, y_max]` band contains `y`.
    #[must_use]
    pub fn classify(&self, heat: f32, humidity: f32, y: i16) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, biome) in self.biomes.iter().enumerate() {
            if y < biome.y_min || y > biome.y_max {
                continue;
            }
            let d_heat = heat - biome.heat_point;
            let d_humidity = humidity - biome.humidity_point;
            // humidity varies less than heat in practice; weigh it down
            let distance = d_heat * d_heat + 0.5 * d_humidity * d_humidity;
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((index, distance));
            }
        }
        best.map(|(index, _)| index)
    }
}

/// Noise parameters of the biome layer.
#[derive(Clone, Debug)]
pub struct BiomeParams {
    /// Base heat field.
    pub np_heat: NoiseParams,
    /// High-frequency heat jitter for soft borders.
    pub np_heat_blend: NoiseParams,
    /// Base humidity field.
    pub np_humidity: NoiseParams,
    /// High-frequency humidity jitter.
    pub np_humidity_blend: NoiseParams,
    /// Per-column filler-depth variation.
    pub np_filler_depth: NoiseParams,
}

impl Default for BiomeParams {
    fn default() -> Self {
        Self {
            np_heat: NoiseParams::new(50.0, 50.0, Vec3::splat(1000.0), 5349, 3, 0.5, 2.0),
            np_heat_blend: NoiseParams::new(0.0, 1.5, Vec3::splat(8.0), 13, 2, 1.0, 2.0),
            np_humidity: NoiseParams::new(50.0, 50.0, Vec3::splat(1000.0), 842, 3, 0.5, 2.0),
            np_humidity_blend: NoiseParams::new(0.0, 1.5, Vec3::splat(8.0), 90003, 2, 1.0, 2.0),
            np_filler_depth: NoiseParams::new(0.0, 1.2, Vec3::splat(150.0), 261, 3, 0.7, 2.0),
        }
    }
}

/// Chunk-sized biome maps: heat, humidity, chosen biome and filler depth
/// per column.
pub struct BiomeGen {
    manager: Arc<BiomeManager>,
    noise_heat: Noise,
    noise_heat_blend: Noise,
    noise_humidity: Noise,
    noise_humidity_blend: Noise,
    noise_filler_depth: Noise,
    size_x: usize,
    size_z: usize,
    /// Heat per column, `[z][x]`.
    pub heatmap: Vec<f32>,
    /// Humidity per column, `[z][x]`.
    pub humidmap: Vec<f32>,
    /// Chosen biome index per column (`None` = no biome matched).
    pub biomemap: Vec<Option<usize>>,
}

impl BiomeGen {
    /// Builds the per-chunk maps generator.
    ///
    /// # Errors
    /// [`InvalidNoiseParams`] from any of the five stacks.
    pub fn new(
        manager: Arc<BiomeManager>,
        params: &BiomeParams,
        world_seed: u64,
        size_x: usize,
        size_z: usize,
    ) -> Result<Self, InvalidNoiseParams> {
        Ok(Self {
            noise_heat: Noise::new_2d(params.np_heat.clone(), world_seed, size_x, size_z)?,
            noise_heat_blend: Noise::new_2d(
                params.np_heat_blend.clone(),
                world_seed,
                size_x,
                size_z,
            )?,
            noise_humidity: Noise::new_2d(params.np_humidity.clone(), world_seed, size_x, size_z)?,
            noise_humidity_blend: Noise::new_2d(
                params.np_humidity_blend.clone(),
                world_seed,
                size_x,
                size_z,
            )?,
            noise_filler_depth: Noise::new_2d(
                params.np_filler_depth.clone(),
                world_seed,
                size_x,
                size_z,
            )?,
            manager,
            size_x,
            size_z,
            heatmap: vec![0.0; size_x * size_z],
            humidmap: vec![0.0; size_x * size_z],
            biomemap: vec![None; size_x * size_z],
        })
    }

    /// The shared biome set.
    #[must_use]
    pub fn manager(&self) -> &Arc<BiomeManager> {
        &self.manager
    }

    /// Computes heat and humidity for the chunk whose minimum corner
    /// column is `(min_x, min_z)`.
    pub fn calc_noise(&mut self, min_x: i16, min_z: i16) {
        let x = f32::from(min_x);
        let z = f32::from(min_z);
        self.noise_heat.perlin_map_2d(x, z);
        self.noise_heat_blend.perlin_map_2d(x, z);
        self.noise_humidity.perlin_map_2d(x, z);
        self.noise_humidity_blend.perlin_map_2d(x, z);
        self.noise_filler_depth.perlin_map_2d(x, z);

        for index in 0..self.size_x * self.size_z {
            #[expect(
                clippy::indexing_slicing,
                reason = "all maps share the same chunk-sized allocation"
            )]
            {
                self.heatmap[index] =
                    self.noise_heat.result[index] + self.noise_heat_blend.result[index];
                self.humidmap[index] =
                    self.noise_humidity.result[index] + self.noise_humidity_blend.result[index];
                self.biomemap[index] = None;
            }
        }
    }

    /// Classifies the column `index` for a surface at `surface_y`, caching
    /// the choice in [`Self::biomemap`].
    pub fn biome_at_index(&mut self, index: usize, surface_y: i16) -> Option<&Biome> {
        let (heat, humidity) = (
            *self.heatmap.get(index)?,
            *self.humidmap.get(index)?,
        );
        let chosen = self.manager.classify(heat, humidity, surface_y)?;
        if let Some(slot) = self.biomemap.get_mut(index) {
            *slot = Some(chosen);
        }
        self.manager.get(chosen)
    }

    /// The filler depth of a column, never below zero.
    #[must_use]
    pub fn filler_depth_at_index(&self, index: usize, base_depth: u16) -> i16 {
        let jitter = self
            .noise_filler_depth
            .result
            .get(index)
            .copied()
            .unwrap_or(0.0);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "filler depths are tiny integers"
        )]
        {
            (f32::from(base_depth) + jitter).max(0.0) as i16
        }
    }

    /// Flat index of a column within the chunk maps.
    #[must_use]
    pub fn column_index(&self, x: usize, z: usize) -> usize {
        z * self.size_x + x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxen_core::ContentFeatures;

    fn manager() -> BiomeManager {
        let mut registry = NodeRegistry::new();
        for name in ["base:dirt_with_grass", "base:dirt", "base:sand"] {
            registry
                .register_node(ContentFeatures::simple(name))
                .unwrap();
        }
        registry.finalize().unwrap();

        let mut manager = BiomeManager::new();
        manager.register(Biome {
            node_top: Some("base:dirt_with_grass".into()),
            node_filler: Some("base:dirt".into()),
            heat_point: 30.0,
            humidity_point: 60.0,
            ..Biome::named("grassland")
        });
        manager.register(Biome {
            node_top: Some("base:sand".into()),
            node_filler: Some("base:sand".into()),
            heat_point: 80.0,
            humidity_point: 20.0,
            y_min: 0,
            ..Biome::named("desert")
        });
        manager.resolve_all(&registry).unwrap();
        manager
    }

    #[test]
    fn classification_picks_the_nearest_centroid() {
        let manager = manager();
        let grassland = manager.classify(25.0, 55.0, 10).unwrap();
        assert_eq!(manager.get(grassland).unwrap().name, "grassland");
        let desert = manager.classify(85.0, 15.0, 10).unwrap();
        assert_eq!(manager.get(desert).unwrap().name, "desert");
    }

    #[test]
    fn vertical_band_is_respected() {
        let manager = manager();
        // below y 0 the desert band excludes it even for desert-ish values
        let chosen = manager.classify(85.0, 15.0, -10).unwrap();
        assert_eq!(manager.get(chosen).unwrap().name, "grassland");
    }

    #[test]
    fn unresolved_node_name_fails_loudly() {
        let registry = NodeRegistry::new();
        let mut manager = BiomeManager::new();
        manager.register(Biome {
            node_top: Some("base:missing".into()),
            ..Biome::named("broken")
        });
        assert!(matches!(
            manager.resolve_all(&registry),
            Err(RegistryError::UnknownNode(_))
        ));
    }

    #[test]
    fn chunk_maps_are_deterministic() {
        let manager = Arc::new(manager());
        let params = BiomeParams::default();
        let mut first = BiomeGen::new(Arc::clone(&manager), &params, 42, 80, 80).unwrap();
        let mut second = BiomeGen::new(manager, &params, 42, 80, 80).unwrap();
        first.calc_noise(-400, 1600);
        second.calc_noise(-400, 1600);
        assert_eq!(first.heatmap, second.heatmap);
        assert_eq!(first.humidmap, second.humidmap);
    }
}
