//! Durability scenarios over a real world directory: block metadata and
//! node timers must survive a save, an unload and a fresh load through
//! the flat-file backend.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use voxen_core::{
    BlockNodes, BlockPos, ContentFeatures, MapNode, NodePos, NodeRegistry,
};
use voxen_world::map::Map;
use voxen_world::map_block::{MapBlock, NodeMetadata, NodeTimer};
use voxen_world::settings::Settings;
use voxen_world::world::{WorldMeta, load_map_meta, save_map_meta};
use voxen_world::mapgen::{MapgenName, MapgenParams};

fn registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    registry
        .register_node(ContentFeatures::simple("base:stone"))
        .unwrap();
    registry.finalize().unwrap();
    Arc::new(registry)
}

fn temp_world(tag: &str) -> PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = std::env::temp_dir().join(format!("voxen_persistence_{tag}"));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn metadata_and_timer_survive_reload_through_the_backend() {
    let dir = temp_world("meta_timer");
    let meta = WorldMeta::default();
    meta.save(&dir).unwrap();

    let registry = registry();
    let pos = NodePos::new(1, 2, 3);

    // first session: create, annotate, save
    {
        let database = meta.open_database(&dir).unwrap();
        let mut map = Map::new(Arc::clone(&registry), Some(database), &Settings::new());
        let mut block = MapBlock::with_nodes(BlockNodes::filled(MapNode::AIR));
        block.generated = true;
        map.insert_block(BlockPos::ZERO, block);

        let mut note = NodeMetadata::new();
        note.set("note", "hello");
        map.set_node_metadata(pos, note).unwrap();
        map.set_node_timer(
            pos,
            NodeTimer {
                timeout: 5.0,
                elapsed: 0.0,
            },
        )
        .unwrap();

        assert_eq!(map.save_dirty_blocks(true).unwrap(), 1);
    }

    // second session: a brand-new map over the same directory
    {
        let database = meta.open_database(&dir).unwrap();
        let mut map = Map::new(Arc::clone(&registry), Some(database), &Settings::new());
        assert!(!map.has_block(BlockPos::ZERO));

        let block = map.emerge_block(BlockPos::ZERO, false).unwrap().unwrap();
        assert!(block.generated);

        let note = map.get_node_metadata(pos).unwrap().unwrap();
        assert_eq!(note.get("note"), Some("hello"));
        let timer = map.get_node_timer(pos).unwrap().unwrap();
        assert!((timer.timeout - 5.0).abs() < 1e-3);
        assert!(timer.elapsed.abs() < 1e-3);
    }
}

#[test]
fn world_directory_layout_is_complete() {
    let dir = temp_world("layout");
    let meta = WorldMeta {
        world_name: "persistence-test".into(),
        seed: "42".into(),
        ..WorldMeta::default()
    };
    meta.save(&dir).unwrap();

    let params = MapgenParams {
        name: MapgenName::V7,
        world_seed: 42,
        ..MapgenParams::default()
    };
    save_map_meta(&dir, &params).unwrap();

    // write one block so the backend directory materializes
    {
        let database = meta.open_database(&dir).unwrap();
        let mut map = Map::new(registry(), Some(database), &Settings::new());
        let mut block = MapBlock::with_nodes(BlockNodes::filled(MapNode::AIR));
        block.generated = true;
        map.insert_block(BlockPos::ZERO, block);
        map.set_node(NodePos::new(0, 0, 0), MapNode::AIR).unwrap();
        map.save_dirty_blocks(true).unwrap();
    }

    assert!(dir.join("world.mt").exists());
    assert!(dir.join("map_meta.txt").exists());
    assert!(dir.join("blocks").join("0").exists(), "block 0 file missing");

    let reread = MapgenParams::from_settings(&load_map_meta(&dir).unwrap());
    assert_eq!(reread.world_seed, 42);
    assert_eq!(reread.name, MapgenName::V7);
    assert_eq!(WorldMeta::load(&dir).unwrap(), meta);
}
