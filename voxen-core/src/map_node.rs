//! Contains a single `MapNode` which is the fundamental building block
//! (voxel, cube) of a voxen world, plus the accessors for the light and
//! liquid data packed into its parameter bytes.

use crate::content::ContentId;
use crate::registry::ContentFeatures;

/// Highest regular light value a node can carry per bank.
pub const LIGHT_MAX: u8 = 14;
/// Sunlight; only valid in the day bank, where it marks an unobstructed
/// vertical column to the sky.
pub const LIGHT_SUN: u8 = 15;

/// Mask for the liquid level stored in the low bits of `param2`.
pub const LIQUID_LEVEL_MASK: u8 = 0x07;
/// Highest liquid level; a source is always considered full.
pub const LIQUID_LEVEL_MAX: u8 = 7;
/// `param2` bit set on flowing liquids that have an outflow straight down.
pub const LIQUID_FLOW_DOWN_MASK: u8 = 0x08;

/// One of the two independent light channels packed into `param1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightBank {
    /// Daylight; may reach [`LIGHT_SUN`].
    Day,
    /// Artificial light at night; capped at [`LIGHT_MAX`].
    Night,
}

impl LightBank {
    /// Both banks in the order they are stored in `param1`.
    pub const BOTH: [Self; 2] = [Self::Day, Self::Night];
}

/// A single map node with its parameters.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MapNode {
    /// describes the _material_ this node is made of.
    pub content: ContentId,
    /// content-dependent auxiliary parameter 1; carries the two light banks
    /// for anything the registry marks as light-bearing
    pub param1: u8,
    /// content-dependent auxiliary parameter 2; carries level and flow
    /// direction for liquids
    pub param2: u8,
}

impl MapNode {
    /// A node of plain air without any light on it.
    pub const AIR: Self = Self::of(ContentId::AIR);
    /// The node standing in for unloaded or undecided space.
    pub const IGNORE: Self = Self::of(ContentId::IGNORE);

    /// A node of the given material with zeroed parameters.
    #[must_use]
    pub const fn of(content: ContentId) -> Self {
        Self {
            content,
            param1: 0,
            param2: 0,
        }
    }

    /// Raw light value of one bank, ignoring any emission of the material.
    #[must_use]
    pub fn light_raw(self, bank: LightBank) -> u8 {
        match bank {
            LightBank::Day => self.param1 & 0x0f,
            LightBank::Night => self.param1 >> 4,
        }
    }

    /// Effective light of one bank: the stored propagated light or the
    /// material's own emission, whichever is brighter.
    #[must_use]
    pub fn light(self, bank: LightBank, features: &ContentFeatures) -> u8 {
        self.light_raw(bank).max(features.light_source)
    }

    /// Stores a light value into one bank. Values above [`LIGHT_SUN`] are
    /// clamped.
    pub fn set_light(&mut self, bank: LightBank, light: u8) {
        let light = light.min(LIGHT_SUN);
        self.param1 = match bank {
            LightBank::Day => (self.param1 & 0xf0) | light,
            LightBank::Night => (self.param1 & 0x0f) | (light << 4),
        };
    }

    /// Clears both light banks, e.g. after a liquid update rewrote the node.
    pub fn clear_light(&mut self) {
        self.param1 = 0;
    }

    /// Level of a flowing liquid node in `0..=LIQUID_LEVEL_MAX`.
    #[must_use]
    pub fn liquid_level(self) -> u8 {
        self.param2 & LIQUID_LEVEL_MASK
    }

    /// Whether a flowing liquid node has an outflow straight down.
    #[must_use]
    pub fn liquid_flows_down(self) -> bool {
        self.param2 & LIQUID_FLOW_DOWN_MASK != 0
    }

    /// Rewrites the liquid level and flow-down bit, leaving the unrelated
    /// high bits of `param2` alone.
    pub fn set_liquid_level(&mut self, level: u8, flow_down: bool) {
        let mut bits = level.min(LIQUID_LEVEL_MAX);
        if flow_down {
            bits |= LIQUID_FLOW_DOWN_MASK;
        }
        self.param2 = (self.param2 & !(LIQUID_LEVEL_MASK | LIQUID_FLOW_DOWN_MASK)) | bits;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_banks_are_independent() {
        let mut node = MapNode::AIR;
        node.set_light(LightBank::Day, 13);
        node.set_light(LightBank::Night, 6);
        assert_eq!(node.light_raw(LightBank::Day), 13);
        assert_eq!(node.light_raw(LightBank::Night), 6);

        node.set_light(LightBank::Day, 0);
        assert_eq!(node.light_raw(LightBank::Day), 0);
        assert_eq!(node.light_raw(LightBank::Night), 6);
    }

    #[test]
    fn light_is_clamped_to_sun() {
        let mut node = MapNode::AIR;
        node.set_light(LightBank::Day, 200);
        assert_eq!(node.light_raw(LightBank::Day), LIGHT_SUN);
    }

    #[test]
    fn liquid_bits() {
        let mut node = MapNode::default();
        node.set_liquid_level(5, true);
        assert_eq!(node.liquid_level(), 5);
        assert!(node.liquid_flows_down());

        node.set_liquid_level(7, false);
        assert_eq!(node.liquid_level(), LIQUID_LEVEL_MAX);
        assert!(!node.liquid_flows_down());
    }
}
