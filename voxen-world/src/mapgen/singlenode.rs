//! Mapgen singlenode: fills everything with one registered node
//! (`mapgen_singlenode`, defaulting to air). Useful for skyblock-style
//! games and as the minimal reference implementation of the trait.

use voxen_core::{ContentId, MapNode, NodePos, MAX_MAP_GENERATION_LIMIT};

use crate::mapgen::{
    BlockMakeData, Mapgen, MapgenCommon, MapgenEnv, MapgenError, MapgenName, MapgenParams,
};
use crate::settings::Settings;

pub(crate) struct MapgenSinglenode {
    common: MapgenCommon,
    c_node: ContentId,
}

impl MapgenSinglenode {
    pub(crate) fn new(
        env: &MapgenEnv,
        params: MapgenParams,
        settings: &Settings,
    ) -> Result<Self, MapgenError> {
        let c_node = env
            .registry
            .get_id("mapgen_singlenode")
            .unwrap_or(ContentId::AIR);
        Ok(Self {
            common: MapgenCommon::new(env, params, settings)?,
            c_node,
        })
    }
}

impl Mapgen for MapgenSinglenode {
    fn name(&self) -> MapgenName {
        MapgenName::Singlenode
    }

    fn params(&self) -> &MapgenParams {
        &self.common.params
    }

    fn make_chunk(&mut self, data: &mut BlockMakeData) {
        let node_min = data.node_min();
        let node_max = data.node_max();
        let node = MapNode::of(self.c_node);
        for z in node_min.0.z..=node_max.0.z {
            for y in node_min.0.y..=node_max.0.y {
                for x in node_min.0.x..=node_max.0.x {
                    let pos = NodePos::new(x, y, z);
                    if data.vmanip.get_node(pos).content == ContentId::IGNORE {
                        data.vmanip.set_node(pos, node);
                    }
                }
            }
        }
        self.common.finish_chunk(data);
    }

    fn spawn_level_at_point(&mut self, _x: i16, _z: i16) -> i16 {
        // a uniform world has no meaningful ground; spawn at sea level
        // when the fill is passable, otherwise signal unsuitable
        if self
            .common
            .registry
            .get_features(self.c_node)
            .walkable
        {
            MAX_MAP_GENERATION_LIMIT
        } else {
            self.common.params.water_level
        }
    }
}
