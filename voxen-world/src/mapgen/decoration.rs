//! Simple surface decorations: single nodes (plants, shrubs, stones)
//! sprinkled onto matching surface nodes at a configured density.

use glam::I16Vec3;
use voxen_core::{ContentId, MapNode, NodePos, NodeRegistry, RegistryError};

use crate::cavegen::block_seed;
use crate::noise::PcgRandom;
use crate::vmanip::MMVManip;

use flexstr::SharedStr;

/// One registered decoration.
#[derive(Clone, Debug)]
pub struct Decoration {
    /// The node to place.
    pub node_deco: SharedStr,
    /// Surface nodes it may stand on.
    pub nodes_place_on: Vec<SharedStr>,
    /// Resolved id of `node_deco`, valid after `resolve_all`.
    pub c_deco: ContentId,
    /// Resolved ids of `nodes_place_on`.
    pub c_place_on: Vec<ContentId>,
    /// Decorations per surface node, e.g. `0.02`.
    pub fill_ratio: f32,
    /// Lower bound of the surface y band.
    pub y_min: i16,
    /// Upper bound of the surface y band.
    pub y_max: i16,
}

impl Decoration {
    /// A decoration with defaults; adjust via struct update syntax.
    #[must_use]
    pub fn simple(node_deco: &str, place_on: &str) -> Self {
        Self {
            node_deco: node_deco.into(),
            nodes_place_on: vec![place_on.into()],
            c_deco: ContentId::IGNORE,
            c_place_on: Vec::new(),
            fill_ratio: 0.02,
            y_min: i16::MIN,
            y_max: i16::MAX,
        }
    }
}

/// The registered decoration set.
#[derive(Default)]
pub struct DecoManager {
    decorations: Vec<Decoration>,
}

impl DecoManager {
    /// An empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a decoration.
    pub fn register(&mut self, decoration: Decoration) {
        self.decorations.push(decoration);
    }

    /// Whether no decoration is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }

    /// Resolves every node name against the registry.
    ///
    /// # Errors
    /// [`RegistryError::UnknownNode`] naming the missing node.
    pub fn resolve_all(&mut self, registry: &NodeRegistry) -> Result<(), RegistryError> {
        for decoration in &mut self.decorations {
            decoration.c_deco = registry
                .get_id(&decoration.node_deco)
                .ok_or_else(|| RegistryError::UnknownNode(decoration.node_deco.clone()))?;
            decoration.c_place_on = decoration
                .nodes_place_on
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

    /// Sprinkles every registered decoration over the chunk surface.
    pub fn place_all(
        &self,
        vm: &mut MMVManip,
        registry: &NodeRegistry,
        world_seed: u64,
        node_min: NodePos,
        node_max: NodePos,
    ) {
        for (deco_index, decoration) in self.decorations.iter().enumerate() {
            let seed = u64::from(block_seed(world_seed, node_min))
                .wrapping_add(0xc2b2_ae3d_27d4_eb4f_u64.wrapping_mul(deco_index as u64 + 1));
            let mut rng = PcgRandom::new(seed);

            let side_x = i32::from(node_max.0.x) - i32::from(node_min.0.x) + 1;
            let side_z = i32::from(node_max.0.z) - i32::from(node_min.0.z) + 1;
            #[expect(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "chunk areas are tiny relative to the float range"
            )]
            let count = ((side_x * side_z) as f32 * decoration.fill_ratio) as u32;

            for _ in 0..count {
                let x = i16::try_from(rng.range(
                    i32::from(node_min.0.x),
                    i32::from(node_max.0.x),
                ))
                .unwrap_or(node_min.0.x);
                let z = i16::try_from(rng.range(
                    i32::from(node_min.0.z),
                    i32::from(node_max.0.z),
                ))
                .unwrap_or(node_min.0.z);

                // find the surface: the highest non-air node with air above
                for y in (node_min.0.y..node_max.0.y).rev() {
                    let ground_pos = NodePos::new(x, y, z);
                    let ground = vm.get_node(ground_pos);
                    if ground.content == ContentId::AIR {
                        continue;
                    }
                    if ground.content == ContentId::IGNORE {
                        break;
                    }
                    let above = NodePos(ground_pos.0 + I16Vec3::new(0, 1, 0));
                    if y < decoration.y_min
                        || y > decoration.y_max
                        || !decoration.c_place_on.contains(&ground.content)
                        || !registry.get_features(ground.content).walkable
                        || vm.get_node(above).content != ContentId::AIR
                    {
                        break;
                    }
                    vm.set_node(above, MapNode::of(decoration.c_deco));
                    break;
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
    fn resolve_requires_registered_names() {
        let registry = NodeRegistry::new();
        let mut manager = DecoManager::new();
        manager.register(Decoration::simple("base:grass_tuft", "base:dirt_with_grass"));
        assert!(matches!(
            manager.resolve_all(&registry),
            Err(RegistryError::UnknownNode(_))
        ));
    }

    #[test]
    fn resolve_succeeds_with_registered_names() {
        let mut registry = NodeRegistry::new();
        for name in ["base:grass_tuft", "base:dirt_with_grass"] {
            registry
                .register_node(ContentFeatures::simple(name))
                .unwrap();
        }
        registry.finalize().unwrap();
        let mut manager = DecoManager::new();
        manager.register(Decoration::simple("base:grass_tuft", "base:dirt_with_grass"));
        manager.resolve_all(&registry).unwrap();
        assert!(!manager.is_empty());
    }
}
