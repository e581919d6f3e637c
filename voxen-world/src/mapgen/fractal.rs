//! Mapgen fractal: terrain as the membership set of a 4D quaternion
//! Julia or Mandelbrot iteration. World coordinates map linearly into
//! fractal space; cells whose orbit stays bounded become stone.

use glam::Vec3;
use voxen_core::{ContentId, MapNode, NodePos, MAX_MAP_GENERATION_LIMIT};

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
};
use crate::settings::Settings;

/// A quaternion with just the arithmetic the iteration needs.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Quaternion {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

impl Quaternion {
    const ZERO: Self = Self {
        w: 0.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    fn squared(self) -> Self {
        // q² for q = (w, v): (w² − |v|², 2wv)
        Self {
            w: self.w * self.w - self.x * self.x - self.y * self.y - self.z * self.z,
            x: 2.0 * self.w * self.x,
            y: 2.0 * self.w * self.y,
            z: 2.0 * self.w * self.z,
        }
    }

    fn add(self, other: Self) -> Self {
        Self {
            w: self.w + other.w,
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    fn norm_squared(self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }
}

pub(crate) struct MapgenFractal {
    common: MapgenCommon,
    /// `true` iterates z² + c with fixed c (Julia); `false` varies c per
    /// cell (Mandelbrot).
    julia: bool,
    iterations: u16,
    /// Extent of fractal space mapped onto world coordinates.
    scale: Vec3,
    /// Fractal-space offset of the world origin.
    offset: Vec3,
    /// The Julia constant / Mandelbrot w-slice.
    julia_c: Quaternion,
    /// The constant w coordinate of the 3D slice through 4D space.
    slice_w: f64,
}

impl MapgenFractal {
    pub(crate) fn new(
        env: &MapgenEnv,
        params: MapgenParams,
        settings: &Settings,
    ) -> Result<Self, MapgenError> {
        Ok(Self {
            common: MapgenCommon::new(env, params, settings)?,
            julia: settings.get_i32_or("mgfractal_fractal", 1) % 2 == 1,
            iterations: u16::try_from(settings.get_i32_or("mgfractal_iterations", 11).max(1))
                .unwrap_or(11),
            scale: Vec3::new(
                settings.get_f32_or("mgfractal_scale_x", 4096.0),
                settings.get_f32_or("mgfractal_scale_y", 1024.0),
                settings.get_f32_or("mgfractal_scale_z", 4096.0),
            ),
            offset: Vec3::new(
                settings.get_f32_or("mgfractal_offset_x", 1.52),
                settings.get_f32_or("mgfractal_offset_y", 0.0),
                settings.get_f32_or("mgfractal_offset_z", 0.0),
            ),
            julia_c: Quaternion {
                w: f64::from(settings.get_f32_or("mgfractal_julia_w", 0.33)),
                x: f64::from(settings.get_f32_or("mgfractal_julia_x", 0.33)),
                y: f64::from(settings.get_f32_or("mgfractal_julia_y", 0.33)),
                z: f64::from(settings.get_f32_or("mgfractal_julia_z", 0.33)),
            },
            slice_w: f64::from(settings.get_f32_or("mgfractal_slice_w", 0.0)),
        })
    }

    /// Maps a world cell into fractal space and tests set membership.
    fn is_solid(&self, x: i16, y: i16, z: i16) -> bool {
        let point = Quaternion {
            w: self.slice_w,
            x: f64::from(f32::from(x) / self.scale.x + self.offset.x),
            y: f64::from(f32::from(y) / self.scale.y + self.offset.y),
            z: f64::from(f32::from(z) / self.scale.z + self.offset.z),
        };

        let (mut orbit, constant) = if self.julia {
            (point, self.julia_c)
        } else {
            (Quaternion::ZERO, point)
        };

        for _ in 0..self.iterations {
            orbit = orbit.squared().add(constant);
            if orbit.norm_squared() > 4.0 {
                return false;
            }
        }
        true
    }
}

impl Mapgen for MapgenFractal {
    fn name(&self) -> MapgenName {
        MapgenName::Fractal
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_square_matches_hand_computation() {
        let q = Quaternion {
            w: 1.0,
            x: 2.0,
            y: 0.0,
            z: -1.0,
        };
        let squared = q.squared();
        assert!((squared.w - (1.0 - 4.0 - 0.0 - 1.0)).abs() < 1e-12);
        assert!((squared.x - 4.0).abs() < 1e-12);
        assert!((squared.y - 0.0).abs() < 1e-12);
        assert!((squared.z + 2.0).abs() < 1e-12);
    }

    #[test]
    fn origin_of_julia_set_is_bounded() {
        // with c = 0 the orbit of 0 never escapes
        let q = Quaternion::ZERO;
        let mut orbit = q;
        for _ in 0..100 {
            orbit = orbit.squared().add(Quaternion::ZERO);
        }
        assert!(orbit.norm_squared() < 4.0);
    }
}
