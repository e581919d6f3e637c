//! The on-disk world directory: `world.mt` with the world's identity and
//! backend choice, `map_meta.txt` with the generation parameters, and the
//! backend-specific block store next to them.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use flexstr::SharedStr;
use log::info;

use crate::database::{FlatFileDatabase, MapDatabase, MemoryDatabase};
use crate::mapgen::MapgenParams;
use crate::settings::Settings;

/// File name of the world identity file.
pub const WORLD_MT: &str = "world.mt";
/// File name of the map metadata file.
pub const MAP_META: &str = "map_meta.txt";
/// Subdirectory of the flat-file block store.
pub const BLOCKS_DIR: &str = "blocks";

/// The parsed `world.mt`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldMeta {
    /// Display name of the world.
    pub world_name: SharedStr,
    /// The game (node set) the world was created for.
    pub gameid: SharedStr,
    /// Name of the block-store backend.
    pub backend: SharedStr,
    /// The seed as the user typed it (may be text to hash).
    pub seed: SharedStr,
}

impl Default for WorldMeta {
    fn default() -> Self {
        Self {
            world_name: "world".into(),
            gameid: "base".into(),
            backend: "flatfile".into(),
            seed: String::new().into(),
        }
    }
}

impl WorldMeta {
    /// Reads `world.mt` from a world directory.
    ///
    /// # Errors
    /// I/O and parse failures.
    pub fn load(world_dir: &Path) -> Result<Self> {
        let settings = Settings::load(&world_dir.join(WORLD_MT))?;
        let defaults = Self::default();
        Ok(Self {
            world_name: settings
                .get_str_or("world_name", &defaults.world_name)
                .into(),
            gameid: settings.get_str_or("gameid", &defaults.gameid).into(),
            backend: settings.get_str_or("backend", &defaults.backend).into(),
            seed: settings.get_str_or("seed", "").into(),
        })
    }

    /// Writes `world.mt` into a world directory.
    ///
    /// # Errors
    /// I/O failures of the safe write.
    pub fn save(&self, world_dir: &Path) -> Result<()> {
        let mut settings = Settings::new();
        settings.set("world_name", &self.world_name);
        settings.set("gameid", &self.gameid);
        settings.set("backend", &self.backend);
        settings.set("seed", &self.seed);
        settings.save(&world_dir.join(WORLD_MT), false)
    }

    /// Opens the block-store backend this world declares.
    ///
    /// # Errors
    /// Unknown backend names and backend open failures.
    pub fn open_database(&self, world_dir: &Path) -> Result<Box<dyn MapDatabase>> {
        match self.backend.as_str() {
            "flatfile" => {
                let dir: PathBuf = world_dir.join(BLOCKS_DIR);
                info!("opening flat-file block store at {}", dir.display());
                Ok(Box::new(FlatFileDatabase::open(dir)?))
            }
            "dummy" | "memory" => Ok(Box::new(MemoryDatabase::new())),
            other => bail!("unknown map backend `{other}`"),
        }
    }
}

/// Reads `map_meta.txt`, returning the raw settings (mapgen-specific keys
/// included) for [`MapgenParams::from_settings`] and the variant
/// constructors.
///
/// # Errors
/// I/O and parse failures.
pub fn load_map_meta(world_dir: &Path) -> Result<Settings> {
    Settings::load(&world_dir.join(MAP_META))
}

/// Writes `map_meta.txt` with the `[end_of_params]` terminator.
///
/// # Errors
/// I/O failures of the safe write.
pub fn save_map_meta(world_dir: &Path, params: &MapgenParams) -> Result<()> {
    let mut settings = Settings::new();
    params.write_settings(&mut settings);
    settings.save(&world_dir.join(MAP_META), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapgen::MapgenName;
    use std::fs;

    fn temp_world(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("voxen_world_{tag}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn world_mt_round_trip() {
        let dir = temp_world("mt");
        let meta = WorldMeta {
            world_name: "testbed".into(),
            gameid: "base".into(),
            backend: "flatfile".into(),
            seed: "glacier".into(),
        };
        meta.save(&dir).unwrap();
        assert_eq!(WorldMeta::load(&dir).unwrap(), meta);
    }

    #[test]
    fn map_meta_round_trip() {
        let dir = temp_world("meta");
        let params = MapgenParams {
            name: MapgenName::Valleys,
            world_seed: 777,
            ..MapgenParams::default()
        };
        save_map_meta(&dir, &params).unwrap();

        let text = fs::read_to_string(dir.join(MAP_META)).unwrap();
        assert!(text.ends_with("[end_of_params]\n"));

        let reread = MapgenParams::from_settings(&load_map_meta(&dir).unwrap());
        assert_eq!(reread.name, MapgenName::Valleys);
        assert_eq!(reread.world_seed, 777);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let dir = temp_world("backend");
        let meta = WorldMeta {
            backend: "sqlite4".into(),
            ..WorldMeta::default()
        };
        assert!(meta.open_database(&dir).is_err());
    }
}
