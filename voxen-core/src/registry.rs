//! The node-type registry: maps dotted node names to content ids and keeps
//! the per-type feature records everything else in the engine consults.
//!
//! The registry goes through two phases. During startup the game registers
//! node definitions and aliases by name; nothing has an id yet. `finalize`
//! then freezes the set, assigns ids deterministically and resolves every
//! pending name reference (liquid alternatives, aliases). After that the
//! registry is immutable and can be shared freely between threads.

use std::collections::HashMap;

use flexstr::SharedStr;
use log::debug;

use crate::content::ContentId;

/// How a node is drawn; the world core only cares about coarse categories
/// (light behavior and whether a dust node may rest on top).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrawType {
    /// A regular opaque cube.
    #[default]
    Normal,
    /// Invisible, like air.
    AirLike,
    /// A liquid source cube.
    Liquid,
    /// The sloped surface of a flowing liquid.
    FlowingLiquid,
    /// A transparent cube such as glass.
    GlassLike,
    /// A cube drawing all faces, such as leaves.
    AllFaces,
    /// A freestanding plant sprite.
    PlantLike,
    /// A torch or other attached decal.
    TorchLike,
}

impl DrawType {
    /// Whether nodes of this drawtype present a full cubic top face that a
    /// dust node could sit on.
    #[must_use]
    pub fn is_cubic(self) -> bool {
        matches!(self, Self::Normal | Self::GlassLike | Self::AllFaces)
    }
}

/// The three dynamic states a material can have with respect to liquids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LiquidKind {
    /// Not a liquid.
    #[default]
    None,
    /// A flowing liquid node with a level in `param2`.
    Flowing,
    /// An infinite source cube.
    Source,
}

/// Everything the world core needs to know about one node type.
///
/// The two `liquid_alternative_*` names may reference nodes that are only
/// registered later; they are resolved into ids at `finalize`.
#[derive(Clone, Debug)]
pub struct ContentFeatures {
    /// The dotted registry name, e.g. `base:stone`.
    pub name: SharedStr,
    /// Coarse render category.
    pub drawtype: DrawType,
    /// 0 = not solid, 1 = solid for purposes of occlusion, 2 = fully opaque.
    pub solidity: u8,
    /// Whether this is a liquid and which state it represents.
    pub liquid_kind: LiquidKind,
    /// Name of the flowing counterpart of this liquid.
    pub liquid_alternative_flowing: Option<SharedStr>,
    /// Name of the source counterpart of this liquid.
    pub liquid_alternative_source: Option<SharedStr>,
    /// Resolved id of `liquid_alternative_flowing`; valid after finalize.
    pub liquid_alternative_flowing_id: ContentId,
    /// Resolved id of `liquid_alternative_source`; valid after finalize.
    pub liquid_alternative_source_id: ContentId,
    /// 1 flows fastest; larger values move one level per that many ticks.
    pub liquid_viscosity: u8,
    /// Horizontal reach of the flowing form, at most 8.
    pub liquid_range: u8,
    /// Whether two adjacent sources spawn a third one.
    pub liquid_renewable: bool,
    /// Whether a liquid may replace this node while spreading.
    pub floodable: bool,
    /// Whether non-sunlight light passes through this node.
    pub light_propagates: bool,
    /// Whether sunlight passes through undiminished.
    pub sunlight_propagates: bool,
    /// Light emitted by the node itself, `0..=14`.
    pub light_source: u8,
    /// Whether entities collide with this node.
    pub walkable: bool,
    /// Whether the node can be selected.
    pub pointable: bool,
    /// Whether placing a node here silently replaces this one.
    pub buildable_to: bool,
    /// Whether mapgen ore and tunnel passes may replace this node.
    pub is_ground_content: bool,
    /// Damage dealt to entities inside this node, per second.
    pub damage_per_second: u32,
    /// Screen tint while the camera is inside this node, RGBA.
    pub post_effect_color: [u8; 4],
    /// Name of the color palette applied via `param2`, if any.
    pub palette_name: Option<SharedStr>,
}

impl ContentFeatures {
    /// A plain opaque cube with the given name and engine defaults for
    /// everything else.
    #[must_use]
    pub fn simple(name: &str) -> Self {
        Self {
            name: name.into(),
            drawtype: DrawType::Normal,
            solidity: 2,
            liquid_kind: LiquidKind::None,
            liquid_alternative_flowing: None,
            liquid_alternative_source: None,
            liquid_alternative_flowing_id: ContentId::IGNORE,
            liquid_alternative_source_id: ContentId::IGNORE,
            liquid_viscosity: 1,
            liquid_range: 8,
            liquid_renewable: true,
            floodable: false,
            light_propagates: false,
            sunlight_propagates: false,
            light_source: 0,
            walkable: true,
            pointable: true,
            buildable_to: false,
            is_ground_content: false,
            damage_per_second: 0,
            post_effect_color: [0, 0, 0, 0],
            palette_name: None,
        }
    }

    fn air() -> Self {
        Self {
            drawtype: DrawType::AirLike,
            solidity: 0,
            floodable: true,
            light_propagates: true,
            sunlight_propagates: true,
            walkable: false,
            pointable: false,
            buildable_to: true,
            ..Self::simple("air")
        }
    }

    fn unknown() -> Self {
        // solid and visible so broken worlds are noticeable instead of hollow
        Self::simple("unknown")
    }

    fn ignore() -> Self {
        Self {
            drawtype: DrawType::AirLike,
            solidity: 0,
            pointable: false,
            walkable: false,
            ..Self::simple("ignore")
        }
    }

    /// Whether this material is a liquid in either state.
    #[must_use]
    pub fn is_liquid(&self) -> bool {
        self.liquid_kind != LiquidKind::None
    }
}

/// Errors of the registry API.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// A name was referenced that was never registered.
    #[error("unknown node name `{0}`")]
    UnknownNode(SharedStr),
    /// The same name was registered twice.
    #[error("node `{0}` is already registered")]
    DuplicateNode(SharedStr),
    /// A mutating call arrived after `finalize`.
    #[error("the node registry is already finalized")]
    AlreadyFinalized,
    /// A query arrived before `finalize`.
    #[error("the node registry is not finalized yet")]
    NotFinalized,
    /// The id space below `ignore` is exhausted.
    #[error("no content ids left to assign")]
    RegistryFull,
}

/// The registry itself; build it, finalize it, then share it via `Arc`.
pub struct NodeRegistry {
    /// Feature records indexed by content id for everything below `ignore`.
    features: Vec<Option<ContentFeatures>>,
    /// `ignore` sits at the top of the id space and gets its own slot so the
    /// vector doesn't have to span the whole 15-bit range.
    ignore: ContentFeatures,
    ids_by_name: HashMap<SharedStr, ContentId>,
    aliases: HashMap<SharedStr, SharedStr>,
    pending: Vec<ContentFeatures>,
    finalized: bool,
}

impl NodeRegistry {
    /// An empty registry with only the three built-in contents.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            features: Vec::new(),
            ignore: ContentFeatures::ignore(),
            ids_by_name: HashMap::new(),
            aliases: HashMap::new(),
            pending: Vec::new(),
            finalized: false,
        };
        registry.insert(ContentId::AIR, ContentFeatures::air());
        registry.insert(ContentId::UNKNOWN, ContentFeatures::unknown());
        registry
            .ids_by_name
            .insert(registry.ignore.name.clone(), ContentId::IGNORE);
        registry
    }

    fn insert(&mut self, id: ContentId, features: ContentFeatures) {
        let index = usize::from(id);
        if self.features.len() <= index {
            self.features.resize(index + 1, None);
        }
        self.ids_by_name.insert(features.name.clone(), id);
        #[expect(
            clippy::indexing_slicing,
            reason = "the vector was just resized to cover `index`"
        )]
        {
            self.features[index] = Some(features);
        }
    }

    /// Registers a node definition under its name.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyFinalized`] after finalize,
    /// [`RegistryError::DuplicateNode`] when the name is taken.
    pub fn register_node(&mut self, features: ContentFeatures) -> Result<(), RegistryError> {
        if self.finalized {
            return Err(RegistryError::AlreadyFinalized);
        }
        if self.ids_by_name.contains_key(&features.name)
            || self.pending.iter().any(|def| def.name == features.name)
        {
            return Err(RegistryError::DuplicateNode(features.name));
        }
        self.pending.push(features);
        Ok(())
    }

    /// Registers an alias so that `from` resolves to whatever `to` resolves
    /// to. Re-registering an alias replaces it.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyFinalized`] after finalize.
    pub fn register_alias(&mut self, from: &str, to: &str) -> Result<(), RegistryError> {
        if self.finalized {
            return Err(RegistryError::AlreadyFinalized);
        }
        if let Some(previous) = self.aliases.insert(from.into(), to.into()) {
            debug!("alias `{from}` moved from `{previous}` to `{to}`");
        }
        Ok(())
    }

    /// Freezes the id assignment and resolves all pending name references.
    ///
    /// Ids are assigned in lexicographic name order so that a given set of
    /// registrations always produces the same mapping.
    ///
    /// # Errors
    /// [`RegistryError::UnknownNode`] when a liquid alternative or an alias
    /// chain references a name that was never registered.
    pub fn finalize(&mut self) -> Result<(), RegistryError> {
        if self.finalized {
            return Err(RegistryError::AlreadyFinalized);
        }

        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by(|left, right| left.name.cmp(&right.name));

        let mut next_id = ContentId::FIRST_FREE;
        for features in pending {
            if next_id >= ContentId::IGNORE.0 {
                return Err(RegistryError::RegistryFull);
            }
            self.insert(ContentId(next_id), features);
            next_id += 1;
        }

        // aliases may chain; resolve them against the final name table
        for (from, target) in self.aliases.clone() {
            let id = self
                .resolve_name(&target)
                .ok_or(RegistryError::UnknownNode(target))?;
            self.ids_by_name.insert(from, id);
        }

        // rewrite the liquid alternative names into ids
        for index in 0..self.features.len() {
            let Some(features) = self.features.get(index).and_then(Clone::clone) else {
                continue;
            };
            let flowing = self.resolve_optional(features.liquid_alternative_flowing.as_ref())?;
            let source = self.resolve_optional(features.liquid_alternative_source.as_ref())?;
            #[expect(
                clippy::indexing_slicing,
                reason = "`index` iterates the vector's own range"
            )]
            if let Some(slot) = &mut self.features[index] {
                slot.liquid_alternative_flowing_id = flowing;
                slot.liquid_alternative_source_id = source;
            }
        }

        self.finalized = true;
        debug!(
            "node registry finalized with {} names",
            self.ids_by_name.len()
        );
        Ok(())
    }

    fn resolve_optional(
        &self,
        name: Option<&SharedStr>,
    ) -> Result<ContentId, RegistryError> {
        match name {
            None => Ok(ContentId::IGNORE),
            Some(name) => self
                .resolve_name(name)
                .ok_or_else(|| RegistryError::UnknownNode(name.clone())),
        }
    }

    fn resolve_name(&self, name: &str) -> Option<ContentId> {
        if let Some(id) = self.ids_by_name.get(name) {
            return Some(*id);
        }
        // alias chains are expected to be shallow; guard against cycles anyway
        let mut current = self.aliases.get(name)?;
        for _ in 0..16 {
            if let Some(id) = self.ids_by_name.get(current) {
                return Some(*id);
            }
            current = self.aliases.get(current)?;
        }
        None
    }

    /// Whether `finalize` has run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Looks a name (or alias) up, returning `None` when unknown.
    #[must_use]
    pub fn get_id(&self, name: &str) -> Option<ContentId> {
        self.resolve_name(name)
    }

    /// Looks a name (or alias) up, failing loudly when unknown.
    ///
    /// # Errors
    /// [`RegistryError::NotFinalized`] before finalize,
    /// [`RegistryError::UnknownNode`] for names without a registration.
    pub fn id(&self, name: &str) -> Result<ContentId, RegistryError> {
        if !self.finalized {
            return Err(RegistryError::NotFinalized);
        }
        self.resolve_name(name)
            .ok_or_else(|| RegistryError::UnknownNode(name.into()))
    }

    /// The feature record for an id; unassigned ids yield the `unknown`
    /// record so callers never have to handle a miss.
    #[must_use]
    pub fn get_features(&self, id: ContentId) -> &ContentFeatures {
        if id == ContentId::IGNORE {
            return &self.ignore;
        }
        let fallback = usize::from(ContentId::UNKNOWN);
        self.features
            .get(usize::from(id))
            .and_then(Option::as_ref)
            .or_else(|| self.features.get(fallback).and_then(Option::as_ref))
            .unwrap_or(&self.ignore)
    }

    /// Shorthand used by the mapgen passes.
    #[must_use]
    pub fn is_ground_content(&self, id: ContentId) -> bool {
        self.get_features(id).is_ground_content
    }

    /// Iterates all assigned `(id, features)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ContentId, &ContentFeatures)> {
        self.features.iter().enumerate().filter_map(|(index, features)| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "ids are created from u16 so the index fits"
            )]
            features
                .as_ref()
                .map(|features| (ContentId(index as u16), features))
        })
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures {
                is_ground_content: true,
                ..ContentFeatures::simple("base:stone")
            })
            .unwrap();
        registry
            .register_node(ContentFeatures {
                liquid_kind: LiquidKind::Source,
                liquid_alternative_flowing: Some("base:water_flowing".into()),
                liquid_alternative_source: Some("base:water_source".into()),
                walkable: false,
                light_propagates: true,
                drawtype: DrawType::Liquid,
                ..ContentFeatures::simple("base:water_source")
            })
            .unwrap();
        registry
            .register_node(ContentFeatures {
                liquid_kind: LiquidKind::Flowing,
                liquid_alternative_flowing: Some("base:water_flowing".into()),
                liquid_alternative_source: Some("base:water_source".into()),
                walkable: false,
                light_propagates: true,
                floodable: false,
                drawtype: DrawType::FlowingLiquid,
                ..ContentFeatures::simple("base:water_flowing")
            })
            .unwrap();
        registry.register_alias("mapgen_stone", "base:stone").unwrap();
        registry.finalize().unwrap();
        registry
    }

    #[test]
    fn ids_are_deterministic_and_resolve_back() {
        let first = sample_registry();
        let second = sample_registry();
        for (id, features) in first.iter() {
            assert_eq!(second.get_id(&features.name), Some(id));
        }
    }

    #[test]
    fn aliases_resolve() {
        let registry = sample_registry();
        assert_eq!(
            registry.get_id("mapgen_stone"),
            registry.get_id("base:stone")
        );
    }

    #[test]
    fn liquid_alternatives_are_resolved() {
        let registry = sample_registry();
        let source_id = registry.get_id("base:water_source").unwrap();
        let features = registry.get_features(source_id);
        assert_eq!(
            features.liquid_alternative_flowing_id,
            registry.get_id("base:water_flowing").unwrap()
        );
        assert_eq!(features.liquid_alternative_source_id, source_id);
    }

    #[test]
    fn unknown_lookup_fails_after_finalize() {
        let registry = sample_registry();
        assert!(matches!(
            registry.id("base:nope"),
            Err(RegistryError::UnknownNode(_))
        ));
        assert_eq!(registry.get_id("base:nope"), None);
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures::simple("base:stone"))
            .unwrap();
        assert!(matches!(
            registry.register_node(ContentFeatures::simple("base:stone")),
            Err(RegistryError::DuplicateNode(_))
        ));
    }

    #[test]
    fn mutation_after_finalize_is_refused() {
        let mut registry = sample_registry();
        assert!(matches!(
            registry.register_node(ContentFeatures::simple("base:late")),
            Err(RegistryError::AlreadyFinalized)
        ));
    }

    #[test]
    fn unassigned_id_yields_unknown_features() {
        let registry = sample_registry();
        assert_eq!(registry.get_features(ContentId(9999)).name, "unknown");
    }
}
