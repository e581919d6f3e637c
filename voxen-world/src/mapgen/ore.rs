//! Ore placement: scatter clusters and noise-free blobs seeded per chunk,
//! rewriting only the nodes the ore declares it may grow in.

use glam::I16Vec3;
use voxen_core::{ContentId, MapNode, NodePos, NodeRegistry, RegistryError};

use crate::cavegen::block_seed;
use crate::noise::PcgRandom;
use crate::vmanip::MMVManip;

use flexstr::SharedStr;

/// How an ore distributes itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OreType {
    /// Independent small clusters, the classic coal/iron pattern.
    Scatter,
    /// One compact rounded blob per roll, for clay/sand pockets.
    Blob,
}

/// One registered ore.
#[derive(Clone, Debug)]
pub struct Ore {
    /// The node to place.
    pub node_ore: SharedStr,
    /// The nodes it may replace.
    pub nodes_wherein: Vec<SharedStr>,
    /// Resolved id of `node_ore`, valid after `resolve_all`.
    pub c_ore: ContentId,
    /// Resolved ids of `nodes_wherein`.
    pub c_wherein: Vec<ContentId>,
    /// Distribution shape.
    pub ore_type: OreType,
    /// One cluster per this many nodes of chunk volume.
    pub clust_scarcity: u32,
    /// Ore nodes per cluster.
    pub clust_num_ores: u16,
    /// Edge length of the cube a cluster scatters within.
    pub clust_size: u16,
    /// Lower bound of the ore's band.
    pub y_min: i16,
    /// Upper bound of the ore's band.
    pub y_max: i16,
}

impl Ore {
    /// A scatter ore with sane defaults; adjust via struct update syntax.
    #[must_use]
    pub fn scatter(node_ore: &str, wherein: &str) -> Self {
        Self {
            node_ore: node_ore.into(),
            nodes_wherein: vec![wherein.into()],
            c_ore: ContentId::IGNORE,
            c_wherein: Vec::new(),
            ore_type: OreType::Scatter,
            clust_scarcity: 8 * 8 * 8,
            clust_num_ores: 8,
            clust_size: 3,
            y_min: i16::MIN,
            y_max: i16::MAX,
        }
    }
}

/// The registered ore set; resolved once, then shared with every mapgen.
#[derive(Default)]
pub struct OreManager {
    ores: Vec<Ore>,
}

impl OreManager {
    /// An empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an ore.
    pub fn register(&mut self, ore: Ore) {
        self.ores.push(ore);
    }

    /// Whether no ore is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ores.is_empty()
    }

    /// Resolves every node name against the registry.
    ///
    /// # Errors
    /// [`RegistryError::UnknownNode`] naming the missing node.
    pub fn resolve_all(&mut self, registry: &NodeRegistry) -> Result<(), RegistryError> {
        for ore in &mut self.ores {
            ore.c_ore = registry
                .get_id(&ore.node_ore)
                .ok_or_else(|| RegistryError::UnknownNode(ore.node_ore.clone()))?;
            ore.c_wherein = ore
                .nodes_wherein
                .iter()
                .map(|name| {
                    registry
                        .get_id(name)
                        .ok_or_else(|| RegistryError::UnknownNode(name.clone()))
                })
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    /// Places every registered ore into the chunk.
    pub fn place_all(
        &self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        world_seed: u64,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        for (ore_index, ore) in self.ores.iter().enumerate() {
            if node_max.0.y < ore.y_min || node_min.0.y > ore.y_max {
                continue;
            }
            let seed = u64::from(block_seed(world_seed, node_min))
                .wrapping_add(0x9e37_79b9_7f4a_7c15_u64.wrapping_mul(ore_index as u64 + 1));
            let mut rng = PcgRandom::new(seed);
            match ore.ore_type {
                OreType::Scatter => {
                    Self::place_scatter(ore, vm, registry, &mut rng, node_min, node_max);
                }
                OreType::Blob => {
                    Self::place_blob(ore, vm, registry, &mut rng, node_min, node_max);
                }
            }
        }
    }

    fn try_place(
        ore: &Ore,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        pos: NodePos,
    ) {
        let node = vm.get_node(pos);
        if node.content == ContentId::IGNORE {
            return;
        }
        if !registry.get_features(node.content).is_ground_content {
            return;
        }
        if ore.c_wherein.contains(&node.content) {
            vm.set_node(pos, MapNode::of(ore.c_ore));
        }
    }

    fn place_scatter(
        ore: &Ore,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        rng: &mut PcgRandom,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        let extent = (node_max.0.as_ivec3() - node_min.0.as_ivec3() + glam::IVec3::ONE)
            .as_u64vec3();
        let volume = extent.x * extent.y * extent.z;
        let clusters = volume / u64::from(ore.clust_scarcity.max(1));
        let spread = i32::from(ore.clust_size);

        for _ in 0..clusters {
            let base = I16Vec3::new(
                i16::try_from(rng.range(
                    i32::from(node_min.0.x),
                    i32::from(node_max.0.x) - spread,
                ))
                .unwrap_or(node_min.0.x),
                i16::try_from(rng.range(
                    i32::from(node_min.0.y.max(ore.y_min)),
                    i32::from(node_max.0.y.min(ore.y_max)) - spread,
                ))
                .unwrap_or(node_min.0.y),
                i16::try_from(rng.range(
                    i32::from(node_min.0.z),
                    i32::from(node_max.0.z) - spread,
                ))
                .unwrap_or(node_min.0.z),
            );
            for _ in 0..ore.clust_num_ores {
                let offset = I16Vec3::new(
                    i16::try_from(rng.range(0, spread)).unwrap_or(0),
                    i16::try_from(rng.range(0, spread)).unwrap_or(0),
                    i16::try_from(rng.range(0, spread)).unwrap_or(0),
                );
                Self::try_place(ore, vm, registry, NodePos(base + offset));
            }
        }
    }

    fn place_blob(
        ore: &Ore,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        rng: &mut PcgRandom,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        let extent = (node_max.0.as_ivec3() - node_min.0.as_ivec3() + glam::IVec3::ONE)
            .as_u64vec3();
        let volume = extent.x * extent.y * extent.z;
        let blobs = volume / u64::from(ore.clust_scarcity.max(1));
        let radius = i32::from(ore.clust_size.max(1)) / 2 + 1;

        for _ in 0..blobs {
            let center = I16Vec3::new(
                i16::try_from(rng.range(i32::from(node_min.0.x), i32::from(node_max.0.x)))
                    .unwrap_or(node_min.0.x),
                i16::try_from(rng.range(
                    i32::from(node_min.0.y.max(ore.y_min)),
                    i32::from(node_max.0.y.min(ore.y_max)),
                ))
                .unwrap_or(node_min.0.y),
                i16::try_from(rng.range(i32::from(node_min.0.z), i32::from(node_max.0.z)))
                    .unwrap_or(node_min.0.z),
            );
            for dz in -radius..=radius {
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        if dx * dx + dy * dy + dz * dz > radius * radius {
                            continue;
                        }
                        let pos = NodePos(
                            center
                                + I16Vec3::new(
                                    i16::try_from(dx).unwrap_or(0),
                                    i16::try_from(dy).unwrap_or(0),
                                    i16::try_from(dz).unwrap_or(0),
                                ),
                        );
                        Self::try_place(ore, vm, registry, pos);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxen_core::ContentFeatures;

    #[test]
    fn unresolved_ore_name_fails() {
        let registry = NodeRegistry::new();
        let mut manager = OreManager::new();
        manager.register(Ore::scatter("base:coal", "base:stone"));
        assert!(manager.resolve_all(&registry).is_err());
    }

    #[test]
    fn resolve_fills_ids() {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures {
                is_ground_content: true,
                ..ContentFeatures::simple("base:stone")
            })
            .unwrap();
        registry
            .register_node(ContentFeatures {
                is_ground_content: true,
                ..ContentFeatures::simple("base:coal")
            })
            .unwrap();
        registry.finalize().unwrap();

        let mut manager = OreManager::new();
        manager.register(Ore::scatter("base:coal", "base:stone"));
        manager.resolve_all(&registry).unwrap();
        assert!(!manager.is_empty());
    }
}
